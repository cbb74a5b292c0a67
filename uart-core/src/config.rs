//! # Module Configuration
//!
//! [`ModuleConfig`] sizes the buffers and timeouts of a UART module at
//! construction. [`FramingConfig`] describes how frames are recognised in the
//! receive stream and how outgoing payloads are framed; it can be changed at
//! any time and persisted with `postcard`.
//!
//! ## Framing Fields
//!
//! | Field          | Disabled when | Role                                    |
//! |----------------|---------------|-----------------------------------------|
//! | `expected_len` | `0`           | fixed frame length, wins over the rest  |
//! | `start`        | empty         | start-of-frame sequence                 |
//! | `end`          | empty         | end-of-frame sequence                   |
//! | `escape`       | empty         | marks the next sequence as literal data |

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::escape::escape_into;
use crate::frame::FRAME_QUEUE_DEPTH;
use crate::pattern::MAX_SCAN_DEPTH;

/// Smallest useful scan depth; two delimiters bound a frame, the last one
/// found is held back when the search is cut short
pub const MIN_SCAN_DEPTH: usize = 3;

/// Framing rules for both directions of the link
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Fixed frame length in bytes, 0 when frames are delimited
    pub expected_len: usize,
    /// Start-of-frame sequence
    pub start: Vec<u8>,
    /// End-of-frame sequence
    pub end: Vec<u8>,
    /// Escape sequence
    pub escape: Vec<u8>,
}

impl FramingConfig {
    /// Configuration with only a start-of-frame sequence
    pub fn start_delimited(start: &[u8]) -> Self {
        Self {
            start: start.to_vec(),
            ..Self::default()
        }
    }

    /// Configuration with only an end-of-frame sequence
    pub fn end_delimited(end: &[u8]) -> Self {
        Self {
            end: end.to_vec(),
            ..Self::default()
        }
    }

    /// Configuration with both delimiters
    pub fn delimited(start: &[u8], end: &[u8]) -> Self {
        Self {
            start: start.to_vec(),
            end: end.to_vec(),
            ..Self::default()
        }
    }

    /// Configuration for fixed-length frames
    pub fn fixed_length(len: usize) -> Self {
        Self {
            expected_len: len,
            ..Self::default()
        }
    }

    /// Add an escape sequence
    pub fn with_escape(mut self, escape: &[u8]) -> Self {
        self.escape = escape.to_vec();
        self
    }

    /// Sequences that have to be escaped inside payloads, in matching order
    ///
    /// Disabled (empty) sequences are left out.
    pub fn specials(&self) -> impl Iterator<Item = &[u8]> {
        [&self.escape, &self.start, &self.end]
            .into_iter()
            .map(Vec::as_slice)
            .filter(|s| !s.is_empty())
    }

    /// Build an outgoing frame: start, escaped payload, end
    ///
    /// Returns the number of bytes written to `out`, which is cleared first.
    pub fn encode_into(&self, payload: &[u8], out: &mut Vec<u8>) -> usize {
        let specials: heapless::Vec<&[u8], 3> = self.specials().collect();
        out.clear();
        out.extend_from_slice(&self.start);
        escape_into(out, payload, &self.escape, &specials);
        out.extend_from_slice(&self.end);
        out.len()
    }

    /// Serialize the configuration to a buffer using postcard
    pub fn to_slice<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buffer)
    }

    /// Deserialize a configuration from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }
}

/// Sizing and timing of a UART module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Initial transmit buffer length in bytes
    pub tx_len: usize,
    /// Receive ring length in bytes, also the DMA transfer length
    pub rx_len: usize,
    /// Decoded frames kept before new ones are dropped
    pub frame_depth: usize,
    /// Ticks to wait for the previous transmission before giving up
    pub tx_timeout: u32,
    /// Ticks a blocking byte read waits for data
    pub rx_timeout: u32,
    /// Delimiter matches examined per scan
    pub scan_depth: usize,
}

impl ModuleConfig {
    /// Config with the given buffer lengths and default timings
    pub fn with_buffers(tx_len: usize, rx_len: usize) -> Self {
        Self {
            tx_len,
            rx_len,
            ..Self::default()
        }
    }

    /// Scan depth clamped to what the assembler supports
    pub fn effective_scan_depth(&self) -> usize {
        self.scan_depth.clamp(MIN_SCAN_DEPTH, MAX_SCAN_DEPTH)
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            tx_len: 512,
            rx_len: 512,
            frame_depth: FRAME_QUEUE_DEPTH,
            tx_timeout: 100,
            rx_timeout: 50,
            scan_depth: 5,
        }
    }
}
