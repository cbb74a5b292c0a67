//! # Hardware Seams & Module Contract
//!
//! This module defines the narrow interface the UART module drives the
//! hardware through, and the contract every peripheral module of the board
//! support layer implements:
//!
//! - **UartPeripheral**: DMA reception, interrupt-driven transmission
//! - **Clock**: monotonic millisecond tick source for bounded waits
//! - **Module**: startup self-test and periodic servicing
//!
//! ## Design Rationale
//!
//! Keeping the vendor HAL behind these traits allows:
//! 1. **Host testing**: a simulated peripheral drives the real module code
//! 2. **Uniform scheduling**: UART, I2C, ADC modules are serviced alike
//! 3. **Explicit wiring**: nothing is reached through global state

use core::fmt;

/// Status reported by the vendor HAL for a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// Generic peripheral error
    Error,
    /// Peripheral is busy with a previous operation
    Busy,
    /// Peripheral did not respond in time
    Timeout,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HalError::Error => "peripheral error",
            HalError::Busy => "peripheral busy",
            HalError::Timeout => "peripheral timeout",
        })
    }
}

/// Errors that can occur during UART transport operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The previous transmission did not complete in time
    Timeout,
    /// The peripheral rejected the operation
    Peripheral(HalError),
}

impl From<HalError> for TransportError {
    fn from(e: HalError) -> Self {
        TransportError::Peripheral(e)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => f.write_str("transmission timed out"),
            TransportError::Peripheral(e) => write!(f, "{}", e),
        }
    }
}

impl embedded_io::Error for TransportError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            TransportError::Timeout | TransportError::Peripheral(HalError::Timeout) => {
                embedded_io::ErrorKind::TimedOut
            }
            TransportError::Peripheral(_) => embedded_io::ErrorKind::Other,
        }
    }
}

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// A UART peripheral with circular DMA reception
///
/// # DMA Model
///
/// Reception runs in circular mode over the module's receive ring and never
/// stops on its own. Progress is only visible through
/// [`receive_remaining`](Self::receive_remaining), which counts down from the
/// ring length as bytes land and reloads at the end of each lap.
///
/// On hardware the DMA engine writes straight into the ring handed to
/// [`start_receive`](Self::start_receive); the ring storage stays allocated
/// until reception is stopped or the module is dropped.
pub trait UartPeripheral {
    /// Arm circular DMA reception over `ring`
    fn start_receive(&mut self, ring: &mut [u8]) -> Result<(), HalError>;

    /// Stop DMA reception
    fn stop_receive(&mut self) -> Result<(), HalError>;

    /// Make bytes landed by the DMA engine visible in `ring`
    ///
    /// Targets whose DMA engine writes directly into the ring have nothing to
    /// do here.
    fn sync_receive(&mut self, _ring: &mut [u8]) {}

    /// DMA counter: bytes remaining until the end of the current lap
    fn receive_remaining(&self) -> usize;

    /// Laps completed since the previous call, from transfer-complete events
    ///
    /// `None` when the peripheral does not track them; a burst of exactly one
    /// lap between two `run()` calls is then invisible.
    fn take_completed_laps(&mut self) -> Option<usize> {
        None
    }

    /// Start an interrupt-driven transmission of `data`
    fn start_transmit(&mut self, data: &[u8]) -> Result<(), HalError>;

    /// Check if the transmitter is idle
    fn is_transmit_ready(&self) -> bool;

    /// Release the peripheral
    fn deinit(&mut self);
}

impl<T: UartPeripheral + ?Sized> UartPeripheral for &mut T {
    fn start_receive(&mut self, ring: &mut [u8]) -> Result<(), HalError> {
        T::start_receive(self, ring)
    }

    fn stop_receive(&mut self) -> Result<(), HalError> {
        T::stop_receive(self)
    }

    fn sync_receive(&mut self, ring: &mut [u8]) {
        T::sync_receive(self, ring)
    }

    fn receive_remaining(&self) -> usize {
        T::receive_remaining(self)
    }

    fn take_completed_laps(&mut self) -> Option<usize> {
        T::take_completed_laps(self)
    }

    fn start_transmit(&mut self, data: &[u8]) -> Result<(), HalError> {
        T::start_transmit(self, data)
    }

    fn is_transmit_ready(&self) -> bool {
        T::is_transmit_ready(self)
    }

    fn deinit(&mut self) {
        T::deinit(self)
    }
}

/// Monotonic millisecond tick source
///
/// The counter is allowed to wrap; waits compare elapsed ticks with wrapping
/// arithmetic.
pub trait Clock {
    /// Current tick count
    fn ticks(&self) -> u32;

    /// Ticks elapsed since `start`
    fn elapsed_since(&self, start: u32) -> u32 {
        self.ticks().wrapping_sub(start)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn ticks(&self) -> u32 {
        T::ticks(self)
    }
}

/// Contract shared by every peripheral module of the board-support layer
///
/// The application scheduler runs [`do_post`](Self::do_post) once at startup
/// and [`run`](Self::run) on every pass of its main loop, without knowing
/// which peripheral sits behind the module.
pub trait Module {
    /// Power-on self-test, `true` when the module is usable
    fn do_post(&mut self) -> bool;

    /// Service the module; must return in bounded time
    fn run(&mut self);

    /// Diagnostic name, also used as the log target
    fn label(&self) -> &str;
}

/// Run the self-test of every module
///
/// Every module is tested even after a failure, so each one gets its log line.
pub fn post_all(modules: &mut [&mut dyn Module]) -> bool {
    modules
        .iter_mut()
        .fold(true, |passed, module| module.do_post() && passed)
}

/// Service every module once
pub fn run_all(modules: &mut [&mut dyn Module]) {
    for module in modules.iter_mut() {
        module.run();
    }
}
