//! # UART Transport Module
//!
//! [`UartModule`] owns one UART peripheral and everything around it: the
//! transmit buffer, the DMA receive ring, the frame assembler and the queue of
//! decoded frames.
//!
//! ## Servicing
//!
//! Reception never blocks. The DMA engine fills the ring in the background and
//! the application calls [`Module::run`] from its main loop:
//!
//! ```text
//! run()
//!  ├─ reconcile DMA progress (sync, remaining counter, completed laps)
//!  ├─ nothing new and no rescan pending? → return
//!  ├─ scan once with the active strategy → frames queued, bytes popped
//!  └─ frames produced? → frame-received callback (once)
//! ```
//!
//! ## Timeouts
//!
//! Waits busy-poll the [`Clock`]. Transmissions in flight are never aborted;
//! a wait that runs out reports [`TransportError::Timeout`] (or an empty
//! result for reads) and leaves the module untouched.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, error, info, trace, warn};

use crate::buffer::CircularBuffer;
use crate::config::{FramingConfig, ModuleConfig};
use crate::frame::{Frame, FrameQueue};
use crate::traits::{Clock, Module, TransportError, TransportResult, UartPeripheral};
use crate::triage::{Assembler, Triage};

/// Capacity of the scratch buffer used by [`UartModule::transmit_fmt`]
pub const FMT_BUFFER_LEN: usize = 256;

/// Callback run when a scan queued new frames
pub type FrameCallback = Box<dyn FnMut()>;

/// Formatting sink keeping the first [`FMT_BUFFER_LEN`] bytes
///
/// A fragment that does not fit is cut at the buffer end, then formatting
/// stops with an error.
#[derive(Default)]
struct FmtScratch {
    bytes: heapless::Vec<u8, FMT_BUFFER_LEN>,
}

impl fmt::Write for FmtScratch {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let taken = s.len().min(FMT_BUFFER_LEN - self.bytes.len());
        // cannot fail, `taken` fits the remaining room
        let _ = self.bytes.extend_from_slice(&s.as_bytes()[..taken]);
        if taken < s.len() {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

/// UART module with DMA reception and frame extraction
pub struct UartModule<P: UartPeripheral, C: Clock> {
    label: String,
    peripheral: P,
    clock: C,
    config: ModuleConfig,
    assembler: Assembler,
    tx: Vec<u8>,
    rx: CircularBuffer<u8>,
    frames: FrameQueue,
    on_frame: Option<FrameCallback>,
    receiving: bool,
    rescan: bool,
}

impl<P: UartPeripheral, C: Clock> UartModule<P, C> {
    /// Create the module and arm DMA reception
    ///
    /// A peripheral that refuses to start is logged and makes
    /// [`Module::do_post`] fail; the module itself stays usable for
    /// transmission.
    pub fn new(label: &str, peripheral: P, clock: C, config: ModuleConfig) -> Self {
        let mut module = Self {
            label: String::from(label),
            peripheral,
            clock,
            assembler: Assembler::new(FramingConfig::default(), config.effective_scan_depth()),
            tx: Vec::with_capacity(config.tx_len),
            rx: CircularBuffer::new(config.rx_len),
            frames: FrameQueue::new(config.frame_depth),
            config,
            on_frame: None,
            receiving: false,
            rescan: false,
        };
        module.start_reception();
        info!(
            target: module.label.as_str(),
            "UART initialized (tx {} B, rx {} B, {} frames)",
            module.config.tx_len,
            module.config.rx_len,
            module.config.frame_depth
        );
        module
    }

    /// Sizing and timing the module was built with
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Underlying peripheral
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// Underlying peripheral, mutably
    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    // ========================================================================
    // Transmission
    // ========================================================================

    /// Frame `data` and start sending it
    ///
    /// Waits up to the configured transmit timeout for the previous
    /// transmission to finish, then returns without waiting for this one.
    pub fn transmit(&mut self, data: &[u8]) -> TransportResult<()> {
        if !self.wait_transmit_ready(self.config.tx_timeout) {
            warn!(
                target: self.label.as_str(),
                "Transmit timed out waiting for previous transmission"
            );
            return Err(TransportError::Timeout);
        }

        self.assembler.config().encode_into(data, &mut self.tx);
        if let Err(e) = self.peripheral.start_transmit(&self.tx) {
            error!(target: self.label.as_str(), "Unable to transmit message: {}", e);
            return Err(e.into());
        }
        trace!(target: self.label.as_str(), "Transmitting {} B", self.tx.len());
        Ok(())
    }

    /// Frame and send `data`, then wait up to `timeout` ticks for completion
    pub fn transmit_blocking(&mut self, data: &[u8], timeout: u32) -> TransportResult<()> {
        self.transmit(data)?;
        if self.wait_transmit_ready(timeout) {
            Ok(())
        } else {
            Err(TransportError::Timeout)
        }
    }

    /// Frame and send a string
    pub fn transmit_str(&mut self, text: &str) -> TransportResult<()> {
        self.transmit(text.as_bytes())
    }

    /// Format and send a message
    ///
    /// Output beyond [`FMT_BUFFER_LEN`] bytes is cut off.
    pub fn transmit_fmt(&mut self, args: fmt::Arguments<'_>) -> TransportResult<()> {
        let mut scratch = FmtScratch::default();
        if fmt::Write::write_fmt(&mut scratch, args).is_err() {
            warn!(
                target: self.label.as_str(),
                "Formatted message truncated to {} B",
                FMT_BUFFER_LEN
            );
        }
        self.transmit(&scratch.bytes)
    }

    /// Wait up to `timeout` ticks for the transmitter to become idle
    pub fn wait_transmit_ready(&self, timeout: u32) -> bool {
        let start = self.clock.ticks();
        loop {
            if self.peripheral.is_transmit_ready() {
                return true;
            }
            if self.clock.elapsed_since(start) >= timeout {
                return false;
            }
        }
    }

    // ========================================================================
    // Reception
    // ========================================================================

    /// Copy up to `buf.len()` raw bytes out of the receive ring
    ///
    /// Bytes read here are no longer available to the frame assembler.
    pub fn receive(&mut self, buf: &mut [u8]) -> usize {
        self.rx.read(buf)
    }

    /// Copy up to `buf.len()` raw bytes without consuming them
    pub fn peek(&self, buf: &mut [u8]) -> usize {
        self.rx.peek(buf)
    }

    /// Wait up to `timeout` ticks until `buf.len()` bytes are available
    ///
    /// Returns 0 and reads nothing if they do not arrive in time.
    pub fn receive_timeout(&mut self, buf: &mut [u8], timeout: u32) -> usize {
        let start = self.clock.ticks();
        loop {
            self.sync_dma();
            if self.rx.len() >= buf.len() {
                return self.receive(buf);
            }
            if self.clock.elapsed_since(start) >= timeout {
                return 0;
            }
        }
    }

    /// Take the oldest decoded frame, or an empty one if none is waiting
    pub fn receive_frame(&mut self) -> Frame {
        self.frames.pop_front().unwrap_or_default()
    }

    /// Copy of the oldest decoded frame, left in the queue
    pub fn peek_frame(&self) -> Frame {
        self.frames.front().cloned().unwrap_or_default()
    }

    /// Discard the oldest decoded frame
    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Raw bytes waiting in the receive ring
    pub fn available_bytes(&self) -> usize {
        self.rx.len()
    }

    /// Decoded frames waiting in the queue
    pub fn available_frames(&self) -> usize {
        self.frames.len()
    }

    /// Frames dropped so far because the queue was full
    pub fn dropped_frames(&self) -> u32 {
        self.frames.dropped()
    }

    /// Discard every received byte, including ones not yet reconciled
    pub fn flush_recv(&mut self) {
        self.sync_dma();
        self.rx.set_read_pos(self.rx.write_pos());
        self.rescan = false;
    }

    /// Reallocate the receive ring and restart reception
    ///
    /// Unread bytes are lost.
    pub fn resize_receive_buffer(&mut self, len: usize) {
        if self.receiving {
            if let Err(e) = self.peripheral.stop_receive() {
                error!(target: self.label.as_str(), "Unable to stop reception: {}", e);
            }
        }
        self.rx.init(len);
        self.config.rx_len = len;
        self.rescan = false;
        self.start_reception();
        debug!(target: self.label.as_str(), "Receive buffer resized to {} B", len);
    }

    // ========================================================================
    // Framing
    // ========================================================================

    /// Use fixed-length frames of `len` bytes
    pub fn set_expected_rx_len(&mut self, len: usize) {
        self.reframe(|config| config.expected_len = len);
    }

    /// Stop using fixed-length frames
    pub fn clear_expected_rx_len(&mut self) {
        self.reframe(|config| config.expected_len = 0);
    }

    /// Set the start-of-frame sequence
    ///
    /// # Panics
    ///
    /// If `sequence` is empty.
    pub fn set_start_sequence(&mut self, sequence: &[u8]) {
        assert!(!sequence.is_empty(), "[{}] empty start-of-frame sequence", self.label);
        self.reframe(|config| config.start = sequence.to_vec());
    }

    /// Remove the start-of-frame sequence
    pub fn clear_start_sequence(&mut self) {
        self.reframe(|config| config.start.clear());
    }

    /// Set the end-of-frame sequence
    ///
    /// # Panics
    ///
    /// If `sequence` is empty.
    pub fn set_end_sequence(&mut self, sequence: &[u8]) {
        assert!(!sequence.is_empty(), "[{}] empty end-of-frame sequence", self.label);
        self.reframe(|config| config.end = sequence.to_vec());
    }

    /// Remove the end-of-frame sequence
    pub fn clear_end_sequence(&mut self) {
        self.reframe(|config| config.end.clear());
    }

    /// Set the escape sequence
    ///
    /// # Panics
    ///
    /// If `sequence` is empty.
    pub fn set_escape_sequence(&mut self, sequence: &[u8]) {
        assert!(!sequence.is_empty(), "[{}] empty escape sequence", self.label);
        self.reframe(|config| config.escape = sequence.to_vec());
    }

    /// Remove the escape sequence
    pub fn clear_escape_sequence(&mut self) {
        self.reframe(|config| config.escape.clear());
    }

    /// Replace the whole framing configuration
    pub fn set_framing(&mut self, framing: FramingConfig) {
        self.reframe(|config| *config = framing);
    }

    /// Current framing configuration
    pub fn framing(&self) -> &FramingConfig {
        self.assembler.config()
    }

    /// Active framing strategy
    pub fn triage(&self) -> Triage {
        self.assembler.triage()
    }

    /// Run `callback` after every scan that produced frames
    pub fn set_frame_received_callback(&mut self, callback: impl FnMut() + 'static) {
        self.on_frame = Some(Box::new(callback));
    }

    /// Remove the frame-received callback
    pub fn clear_frame_received_callback(&mut self) {
        self.on_frame = None;
    }

    fn reframe(&mut self, edit: impl FnOnce(&mut FramingConfig)) {
        let previous = self.assembler.triage();
        let triage = self.assembler.update(edit);
        // Bytes already buffered may form frames under the new rules
        self.rescan = true;

        debug!(target: self.label.as_str(), "Framing set to {}", triage.name());
        if triage == Triage::Unconfigured && previous != Triage::Unconfigured {
            warn!(
                target: self.label.as_str(),
                "No framing configured, received bytes will accumulate"
            );
        }
    }

    // ========================================================================
    // DMA
    // ========================================================================

    fn start_reception(&mut self) {
        match self.peripheral.start_receive(self.rx.storage_mut()) {
            Ok(()) => self.receiving = true,
            Err(e) => {
                self.receiving = false;
                error!(target: self.label.as_str(), "Unable to start reception: {}", e);
            }
        }
    }

    /// Move the write cursor to where the DMA engine is, returning new bytes
    fn sync_dma(&mut self) -> usize {
        if !self.receiving {
            return 0;
        }
        self.peripheral.sync_receive(self.rx.storage_mut());
        let remaining = self.peripheral.receive_remaining();
        let laps = self.peripheral.take_completed_laps();
        let fresh = self.rx.dma_counter_with_laps(remaining, laps);
        if fresh > 0 {
            self.rescan = true;
        }
        fresh
    }
}

impl<P: UartPeripheral, C: Clock> Module for UartModule<P, C> {
    fn do_post(&mut self) -> bool {
        if self.receiving {
            info!(target: self.label.as_str(), "POST OK (uart-core {})", crate::VERSION);
        } else {
            error!(target: self.label.as_str(), "POST failed: reception not running");
        }
        self.receiving
    }

    fn run(&mut self) {
        self.sync_dma();
        if !self.rescan {
            return;
        }
        self.rescan = false;

        let now = self.clock.ticks();
        let outcome = self.assembler.scan(&mut self.rx, &mut self.frames, now);
        self.rescan = outcome.pending;

        if outcome.dropped > 0 {
            warn!(
                target: self.label.as_str(),
                "Frame queue full, dropped {} frame(s)",
                outcome.dropped
            );
        }
        if outcome.frames > 0 {
            trace!(
                target: self.label.as_str(),
                "{} frame(s), {} B consumed, {} B left",
                outcome.frames,
                outcome.consumed,
                self.rx.len()
            );
            if let Some(callback) = self.on_frame.as_mut() {
                callback();
            }
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl<P: UartPeripheral, C: Clock> Drop for UartModule<P, C> {
    fn drop(&mut self) {
        if self.receiving {
            let _ = self.peripheral.stop_receive();
        }
        self.peripheral.deinit();
        debug!(target: self.label.as_str(), "UART deinitialized");
    }
}

impl<P: UartPeripheral, C: Clock> fmt::Debug for UartModule<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UartModule")
            .field("label", &self.label)
            .field("triage", &self.assembler.triage())
            .field("available_bytes", &self.rx.len())
            .field("available_frames", &self.frames.len())
            .field("receiving", &self.receiving)
            .finish()
    }
}

impl<P: UartPeripheral, C: Clock> embedded_io::ErrorType for UartModule<P, C> {
    type Error = TransportError;
}

impl<P: UartPeripheral, C: Clock> embedded_io::Read for UartModule<P, C> {
    /// Read raw bytes, waiting up to the receive timeout for the first one
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let start = self.clock.ticks();
        loop {
            self.sync_dma();
            if !self.rx.is_empty() {
                return Ok(self.receive(buf));
            }
            if self.clock.elapsed_since(start) >= self.config.rx_timeout {
                return Err(TransportError::Timeout);
            }
        }
    }
}

impl<P: UartPeripheral, C: Clock> embedded_io::Write for UartModule<P, C> {
    /// Send `buf` as one frame and wait for it to leave
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.transmit_blocking(buf, self.config.tx_timeout)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.wait_transmit_ready(self.config.tx_timeout) {
            Ok(())
        } else {
            Err(TransportError::Timeout)
        }
    }
}
