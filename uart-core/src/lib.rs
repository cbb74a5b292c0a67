//! # UART Framing Core
//!
//! This crate provides the UART module of the board-support layer:
//!
//! - **Circular Buffer**: Owned ring whose write cursor follows the DMA engine
//! - **Pattern Matcher**: Depth-bounded delimiter search with escape awareness
//! - **Frame Assembler**: Four framing strategies selected from configuration
//! - **UartModule**: Transmit/receive API serviced from the application main loop
//!
//! ## Architecture
//!
//! ```text
//! DMA engine ─────► CircularBuffer<u8> ─────► Triage ─────► FrameQueue ─────► application
//!  (remaining          (dma_counter)        (run(), once)     (bounded)      receive_frame()
//!   counter)
//!
//! application ────► escape + SOF/EOF ─────► tx buffer ─────► UartPeripheral::start_transmit
//! ```
//!
//! ## Bounded-Time Strategy
//!
//! `run()` never blocks:
//! 1. DMA progress is read from the hardware counter, never waited for
//! 2. Delimiter searches stop after a configured number of matches
//! 3. Unfinished work is rescheduled for the next `run()` call
//! 4. Overflow drops the oldest bytes instead of stalling the producer

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod buffer;
pub mod config;
pub mod escape;
pub mod frame;
pub mod pattern;
pub mod traits;
pub mod transport;
pub mod triage;

// Re-export main types for convenience
pub use buffer::CircularBuffer;
pub use config::{FramingConfig, ModuleConfig};
pub use frame::{Frame, FrameQueue};
pub use traits::{Clock, HalError, Module, TransportError, UartPeripheral};
pub use transport::UartModule;
pub use triage::{Assembler, Triage};

/// Library version, reported in POST logs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
