//! # UART Host Simulator
//!
//! Host-side stand-ins for the hardware behind a [`uart_core::UartModule`]:
//!
//! - **SimUart**: circular receive DMA stream, interrupt-driven transmitter,
//!   optional loopback and fault injection
//! - **SimClock**: millisecond tick counter advancing on every read
//! - **Scenario**: JSON-described traffic replayed through a real module
//!
//! ## Example
//!
//! ```rust
//! use uart_core::{Module, ModuleConfig, UartModule};
//! use uart_sim::{SimClock, SimUart};
//!
//! let port = SimUart::new();
//! let config = ModuleConfig::default();
//! let mut uart = UartModule::new("uart1", port.clone(), SimClock::default(), config);
//! uart.set_end_sequence(b"\r\n");
//!
//! port.inject(b"AT\r\nOK\r\n");
//! uart.run();
//! assert_eq!(uart.receive_frame(), "AT");
//! assert_eq!(uart.receive_frame(), "OK");
//! ```

pub mod clock;
pub mod port;
pub mod scenario;

pub use clock::SimClock;
pub use port::SimUart;
pub use scenario::{Outcome, Scenario, SimError, Step};
