//! # Decoded Frames
//!
//! A [`Frame`] is one application message cut out of the receive stream by
//! the frame assembler, stamped with the tick count at which it was decoded.
//! Frames wait in a [`FrameQueue`] until the application takes them.
//!
//! The queue is bounded: when the application falls behind, new frames are
//! dropped rather than letting memory grow.

use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::CircularBuffer;

/// Default number of frames kept before new ones are dropped
pub const FRAME_QUEUE_DEPTH: usize = 10;

/// One decoded application message
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame content, delimiters and escapes removed
    pub data: Vec<u8>,
    /// Tick count when the frame was decoded
    pub timestamp: u32,
}

impl Frame {
    /// Create a frame from decoded content
    pub fn new(data: Vec<u8>, timestamp: u32) -> Self {
        Self { data, timestamp }
    }

    /// Number of content bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the frame has no content
    ///
    /// This is also what an empty queue hands out.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Content bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Content as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.data).ok()
    }
}

impl PartialEq<[u8]> for Frame {
    fn eq(&self, other: &[u8]) -> bool {
        self.data == other
    }
}

impl PartialEq<&[u8]> for Frame {
    fn eq(&self, other: &&[u8]) -> bool {
        self.data == *other
    }
}

impl<const N: usize> PartialEq<&[u8; N]> for Frame {
    fn eq(&self, other: &&[u8; N]) -> bool {
        self.data == other[..]
    }
}

impl PartialEq<str> for Frame {
    fn eq(&self, other: &str) -> bool {
        self.data == other.as_bytes()
    }
}

impl PartialEq<&str> for Frame {
    fn eq(&self, other: &&str) -> bool {
        self.data == other.as_bytes()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:02x?}", self.data),
        }
    }
}

/// Bounded FIFO of decoded frames
#[derive(Debug, Clone)]
pub struct FrameQueue {
    frames: CircularBuffer<Frame>,
    dropped: u32,
}

impl FrameQueue {
    /// Create a queue holding up to `depth` frames
    pub fn new(depth: usize) -> Self {
        Self {
            frames: CircularBuffer::new(depth),
            dropped: 0,
        }
    }

    /// Queue a frame
    ///
    /// Returns `false` if the queue was full and the frame was dropped.
    pub fn push(&mut self, frame: Frame) -> bool {
        let stored = self.frames.push(frame) == 1;
        if !stored {
            self.dropped = self.dropped.wrapping_add(1);
        }
        stored
    }

    /// Remove and return the oldest frame
    pub fn pop_front(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Oldest frame, left in the queue
    pub fn front(&self) -> Option<&Frame> {
        self.frames.front()
    }

    /// Drop the oldest frame, if any
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if no frame is waiting
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check if the next frame would be dropped
    pub fn is_full(&self) -> bool {
        self.frames.is_full()
    }

    /// Maximum number of queued frames
    pub fn depth(&self) -> usize {
        self.frames.capacity()
    }

    /// Frames dropped because the queue was full
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Discard every queued frame
    pub fn clear(&mut self) {
        while self.frames.pop_front().is_some() {}
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(FRAME_QUEUE_DEPTH)
    }
}
