//! # Circular Buffer Implementation
//!
//! This module provides the fixed-capacity ring used both as the DMA receive
//! buffer of the UART module and as the storage of its frame queue.
//!
//! ## DMA Reconciliation
//!
//! The receive DMA stream runs in circular mode over the buffer storage and
//! cannot be paused. Its only observable state is the "remaining until full"
//! counter, which counts down as bytes land and reloads at the end of each lap.
//! [`CircularBuffer::dma_counter`] turns that counter into a write position,
//! works out how many bytes arrived since the previous observation and moves
//! the write cursor accordingly.
//!
//! ## Memory Layout
//!
//! ```text
//! ┌──────────┬───────────────────────┬────────────────────────┐
//! │ consumed │    readable data      │   free (DMA writes)    │
//! │  region  │  (size elements)      │                        │
//! └──────────┴───────────────────────┴────────────────────────┘
//!            ▲                       ▲
//!          read                    write
//! ```
//!
//! When the DMA engine laps the reader, the oldest unread elements are
//! overwritten: the read cursor jumps to the write cursor and the size
//! saturates at capacity.

use alloc::vec::Vec;
use core::ops::Index;

/// A view of the readable region, split where it wraps around the storage end
#[derive(Debug)]
pub struct BufferSlice<'a, T> {
    /// First contiguous chunk (before wrap-around)
    pub first: &'a [T],
    /// Second contiguous chunk (after wrap-around, may be empty)
    pub second: &'a [T],
}

impl<'a, T> BufferSlice<'a, T> {
    /// Total length across both chunks
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    /// Check if the slice is empty
    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.second.is_empty()
    }
}

/// Fixed-capacity ring buffer with DMA-driven write cursor
///
/// All index arithmetic wraps modulo the capacity. A capacity of zero is
/// allowed: every operation except indexing then does nothing and reports
/// zero elements.
///
/// # Example
///
/// ```rust
/// use uart_core::buffer::CircularBuffer;
///
/// let mut ring: CircularBuffer<u8> = CircularBuffer::new(8);
/// ring.push_slice(b"hello");
///
/// let mut out = [0u8; 5];
/// assert_eq!(ring.peek(&mut out), 5);
/// assert_eq!(&out, b"hello");
/// assert_eq!(ring.len(), 5);
///
/// ring.pop_n(5);
/// assert!(ring.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    /// Backing storage, also the DMA target for receive rings
    data: Vec<T>,
    /// Index of the oldest unread element
    read: usize,
    /// Index where the next element lands
    write: usize,
    /// Number of unread elements
    size: usize,
    /// DMA write position seen by the previous reconciliation
    last_dma_pos: usize,
}

impl<T: Default + Clone> CircularBuffer<T> {
    /// Create a buffer holding up to `capacity` elements
    pub fn new(capacity: usize) -> Self {
        let mut buffer = Self {
            data: Vec::new(),
            read: 0,
            write: 0,
            size: 0,
            last_dma_pos: 0,
        };
        buffer.init(capacity);
        buffer
    }

    /// Reallocate the storage for `capacity` elements and reset to empty
    pub fn init(&mut self, capacity: usize) {
        self.data.clear();
        self.data.resize(capacity, T::default());
        self.clear();
    }

    /// Remove and return the oldest element
    pub fn pop_front(&mut self) -> Option<T> {
        if self.size == 0 {
            return None;
        }
        let value = core::mem::take(&mut self.data[self.read]);
        self.pop();
        Some(value)
    }
}

impl<T: Clone> CircularBuffer<T> {
    /// Push every element of `values`, returning how many fit
    ///
    /// Elements that do not fit are dropped; there is no all-or-nothing
    /// behaviour.
    pub fn push_slice(&mut self, values: &[T]) -> usize {
        values.iter().map(|v| self.push(v.clone())).sum()
    }

    /// Copy up to `buf.len()` elements into `buf` and consume them
    pub fn read(&mut self, buf: &mut [T]) -> usize {
        let len = self.peek(buf);
        self.pop_n(len);
        len
    }

    /// Copy up to `buf.len()` elements into `buf` without consuming them
    pub fn peek(&self, buf: &mut [T]) -> usize {
        let view = self.readable_split(buf.len());
        let first = view.first.len();
        buf[..first].clone_from_slice(view.first);
        buf[first..view.len()].clone_from_slice(view.second);
        view.len()
    }

    /// Replace the contents of `out` with every readable element, oldest first
    pub fn snapshot_into(&self, out: &mut Vec<T>) {
        let view = self.readable_split(self.size);
        out.clear();
        out.extend_from_slice(view.first);
        out.extend_from_slice(view.second);
    }
}

impl<T> CircularBuffer<T> {
    /// Total number of elements the buffer can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of unread elements
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if the buffer holds no unread element
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Check if another push would be dropped
    #[inline]
    pub fn is_full(&self) -> bool {
        self.size >= self.capacity()
    }

    /// Storage index of the oldest unread element
    #[inline]
    pub fn read_pos(&self) -> usize {
        self.read
    }

    /// Storage index where the next element lands
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write
    }

    /// Insert `value` at the write cursor
    ///
    /// Returns 1 if stored, 0 if the buffer was full and the value dropped.
    pub fn push(&mut self, value: T) -> usize {
        if self.size >= self.capacity() {
            return 0;
        }
        self.data[self.write] = value;
        self.write = self.wrap(self.write + 1);
        self.size += 1;
        1
    }

    /// Drop the oldest element, if any
    pub fn pop(&mut self) {
        self.pop_n(1);
    }

    /// Drop the `n` oldest elements
    ///
    /// `n` is clamped to the number of unread elements.
    pub fn pop_n(&mut self, n: usize) {
        let n = n.min(self.size);
        self.read = self.wrap(self.read + n);
        self.size -= n;
    }

    /// Oldest unread element
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Element `index` positions after the read cursor, cursors untouched
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.size {
            return None;
        }
        Some(&self.data[self.wrap(self.read + index)])
    }

    /// Get a split readable view of up to `max_len` elements
    pub fn readable_split(&self, max_len: usize) -> BufferSlice<'_, T> {
        let len = max_len.min(self.size);
        if len == 0 {
            return BufferSlice {
                first: &[],
                second: &[],
            };
        }

        let end = self.read + len;
        if end <= self.capacity() {
            BufferSlice {
                first: &self.data[self.read..end],
                second: &[],
            }
        } else {
            BufferSlice {
                first: &self.data[self.read..],
                second: &self.data[..end - self.capacity()],
            }
        }
    }

    /// Get a direct mutable view of the storage
    ///
    /// This is the region a DMA engine writes into. Writing through it does
    /// not move any cursor; call [`Self::dma_counter`] afterwards.
    #[inline]
    pub fn storage_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Reconcile the DMA "remaining until full" counter
    ///
    /// Returns the number of elements written since the previous call. A
    /// write position behind the previous one counts as exactly one lap.
    pub fn dma_counter(&mut self, remaining: usize) -> usize {
        self.dma_counter_with_laps(remaining, None)
    }

    /// Reconcile the DMA counter with a known number of completed laps
    ///
    /// `laps` is the number of times the DMA engine wrapped to the start of
    /// the storage since the previous call, as reported by transfer-complete
    /// events. With `None` the lap count is inferred from the position alone,
    /// so a burst of exactly one full lap is invisible.
    pub fn dma_counter_with_laps(&mut self, remaining: usize, laps: Option<usize>) -> usize {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0;
        }

        // Counter reloads to `capacity` when it reaches the end of a lap
        let position = (capacity - remaining.min(capacity)) % capacity;
        let wrapped = position < self.last_dma_pos;
        let laps = match laps {
            Some(laps) if wrapped => laps.max(1),
            Some(laps) => laps,
            None => usize::from(wrapped),
        };
        let written = laps * capacity + position - self.last_dma_pos;
        self.last_dma_pos = position;

        if written == 0 {
            return 0;
        }

        self.write = self.wrap(self.write + written % capacity);
        self.size += written;

        // The DMA engine overwrote unread data, keep the newest `capacity`
        if self.size > capacity {
            self.read = self.write;
            self.size = capacity;
        }

        written
    }

    /// Move the read cursor to `pos` and recompute the size from the write cursor
    ///
    /// Used to resynchronise after out-of-band peripheral resets. Placing the
    /// read cursor on the write cursor empties the buffer.
    pub fn set_read_pos(&mut self, pos: usize) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        self.read = pos % capacity;
        self.size = (self.write + capacity - self.read) % capacity;
    }

    /// Reset cursors and size, effectively clearing the buffer
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.size = 0;
        self.last_dma_pos = 0;
    }

    #[inline]
    fn wrap(&self, index: usize) -> usize {
        match self.capacity() {
            0 => 0,
            capacity => index % capacity,
        }
    }
}

impl<T> Index<usize> for CircularBuffer<T> {
    type Output = T;

    /// Access relative to the read cursor, without bounds against the size
    ///
    /// # Panics
    ///
    /// Panics if the buffer has a capacity of zero.
    fn index(&self, index: usize) -> &T {
        &self.data[self.wrap(self.read + index)]
    }
}
