//! Simulated UART peripheral with a circular receive DMA stream.
//!
//! [`SimUart`] is a cheap handle: clones share the same port, so a test keeps
//! one clone to inject bytes and inspect transmissions while the module owns
//! another.
//!
//! Injected bytes advance the DMA position immediately, like a real DMA engine
//! would, and land in the module's ring on the next `sync_receive`. Completed
//! laps are counted and, when lap reporting is enabled, handed out through
//! `take_completed_laps` the way transfer-complete interrupts would.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;
use uart_core::{HalError, UartPeripheral};

#[derive(Debug, Default)]
struct PortState {
    /// Length of the ring armed by `start_receive`
    ring_len: usize,
    /// DMA write position inside the ring
    position: usize,
    /// Laps completed since the last `take_completed_laps`
    laps: usize,
    /// Bytes received but not copied into the ring yet
    pending: Vec<u8>,
    receiving: bool,
    report_laps: bool,
    loopback: bool,
    transmitted: Vec<Vec<u8>>,
    /// Busy polls left before the transmitter is idle again
    busy_left: u32,
    busy_polls: u32,
    fail_start: bool,
    transmit_error: Option<HalError>,
    deinit: bool,
}

impl PortState {
    fn inject(&mut self, bytes: &[u8]) -> usize {
        if !self.receiving || self.ring_len == 0 {
            return 0;
        }
        let end = self.position + bytes.len();
        self.laps += end / self.ring_len;
        self.position = end % self.ring_len;
        self.pending.extend_from_slice(bytes);
        bytes.len()
    }
}

/// Handle to a simulated UART port
#[derive(Debug, Clone, Default)]
pub struct SimUart {
    state: Rc<RefCell<PortState>>,
}

impl SimUart {
    /// Create an idle port
    pub fn new() -> Self {
        Self::default()
    }

    /// Report completed DMA laps to the module
    pub fn with_lap_reporting(self, enabled: bool) -> Self {
        self.state.borrow_mut().report_laps = enabled;
        self
    }

    /// Feed every transmitted frame back into reception
    pub fn with_loopback(self, enabled: bool) -> Self {
        self.state.borrow_mut().loopback = enabled;
        self
    }

    /// Make the transmitter report busy for `polls` polls after each transmission
    pub fn with_transmit_latency(self, polls: u32) -> Self {
        self.state.borrow_mut().busy_polls = polls;
        self
    }

    /// Make the next `start_receive` calls fail
    pub fn set_fail_start(&self, fail: bool) {
        self.state.borrow_mut().fail_start = fail;
    }

    /// Make `start_transmit` fail with `error`, `None` to recover
    pub fn set_transmit_error(&self, error: Option<HalError>) {
        self.state.borrow_mut().transmit_error = error;
    }

    /// Hold the transmitter busy for the next `polls` polls
    pub fn hold_transmitter(&self, polls: u32) {
        self.state.borrow_mut().busy_left = polls;
    }

    /// Receive `bytes` on the line, returning how many the DMA engine took
    ///
    /// Nothing is taken while reception is stopped.
    pub fn inject(&self, bytes: &[u8]) -> usize {
        self.state.borrow_mut().inject(bytes)
    }

    /// Frames handed to the transmitter so far
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.state.borrow().transmitted.clone()
    }

    /// Take the frames handed to the transmitter so far
    pub fn take_transmitted(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.borrow_mut().transmitted)
    }

    /// Check if circular reception is armed
    pub fn is_receiving(&self) -> bool {
        self.state.borrow().receiving
    }

    /// Length of the ring armed for reception
    pub fn ring_len(&self) -> usize {
        self.state.borrow().ring_len
    }

    /// Check if the port was released
    pub fn is_deinit(&self) -> bool {
        self.state.borrow().deinit
    }
}

impl UartPeripheral for SimUart {
    fn start_receive(&mut self, ring: &mut [u8]) -> Result<(), HalError> {
        let mut state = self.state.borrow_mut();
        if state.fail_start {
            return Err(HalError::Error);
        }
        state.ring_len = ring.len();
        state.position = 0;
        state.laps = 0;
        state.pending.clear();
        state.receiving = true;
        Ok(())
    }

    fn stop_receive(&mut self) -> Result<(), HalError> {
        let mut state = self.state.borrow_mut();
        state.receiving = false;
        state.pending.clear();
        Ok(())
    }

    fn sync_receive(&mut self, ring: &mut [u8]) {
        let mut state = self.state.borrow_mut();
        let len = ring.len();
        if len == 0 || state.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut state.pending);
        // The first pending byte landed `pending.len()` positions behind the DMA
        let mut at = (state.position + len - pending.len() % len) % len;
        for byte in pending {
            ring[at] = byte;
            at = (at + 1) % len;
        }
    }

    fn receive_remaining(&self) -> usize {
        let state = self.state.borrow();
        state.ring_len - state.position
    }

    fn take_completed_laps(&mut self) -> Option<usize> {
        let mut state = self.state.borrow_mut();
        let laps = std::mem::take(&mut state.laps);
        state.report_laps.then_some(laps)
    }

    fn start_transmit(&mut self, data: &[u8]) -> Result<(), HalError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.transmit_error {
            return Err(error);
        }
        if state.busy_left > 0 {
            return Err(HalError::Busy);
        }
        trace!(target: "uart-sim", "TX {:02x?}", data);
        state.transmitted.push(data.to_vec());
        state.busy_left = state.busy_polls;
        if state.loopback {
            state.inject(data);
        }
        Ok(())
    }

    fn is_transmit_ready(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.busy_left == 0 {
            return true;
        }
        state.busy_left -= 1;
        false
    }

    fn deinit(&mut self) {
        let mut state = self.state.borrow_mut();
        state.receiving = false;
        state.deinit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_tracks_position_and_laps() {
        let mut port = SimUart::new().with_lap_reporting(true);
        let mut ring = [0u8; 8];
        port.start_receive(&mut ring).unwrap();

        assert_eq!(port.inject(b"abcde"), 5);
        assert_eq!(port.receive_remaining(), 3);
        assert_eq!(port.take_completed_laps(), Some(0));

        port.inject(b"fghijk");
        assert_eq!(port.receive_remaining(), 5);
        assert_eq!(port.take_completed_laps(), Some(1));

        port.sync_receive(&mut ring);
        assert_eq!(&ring, b"ijkdefgh");
    }

    #[test]
    fn test_sync_keeps_last_lap_only() {
        let mut port = SimUart::new();
        let mut ring = [0u8; 4];
        port.start_receive(&mut ring).unwrap();
        port.inject(b"0123456789");
        port.sync_receive(&mut ring);
        // position 2, newest bytes end right behind it
        assert_eq!(&ring, b"8967");
        assert_eq!(port.take_completed_laps(), None);
    }

    #[test]
    fn test_stopped_port_drops_bytes() {
        let mut port = SimUart::new();
        assert_eq!(port.inject(b"lost"), 0);

        let mut ring = [0u8; 4];
        port.start_receive(&mut ring).unwrap();
        port.stop_receive().unwrap();
        assert_eq!(port.inject(b"lost"), 0);
        assert!(!port.is_receiving());
    }

    #[test]
    fn test_transmit_latency() {
        let mut port = SimUart::new().with_transmit_latency(2);
        port.start_transmit(b"a").unwrap();
        assert!(!port.is_transmit_ready());
        assert_eq!(port.start_transmit(b"b"), Err(HalError::Busy));
        assert!(!port.is_transmit_ready());
        assert!(port.is_transmit_ready());
        assert_eq!(port.take_transmitted(), vec![b"a".to_vec()]);
    }
}
