//! Simulated millisecond tick source.

use std::cell::Cell;
use std::rc::Rc;

use uart_core::Clock;

/// Tick counter that moves forward by a fixed step every time it is read
///
/// Busy-wait loops in the module poll the clock, so a non-zero step lets
/// every timeout expire after a predictable number of polls. Clones share the
/// same counter.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Rc<Cell<u32>>,
    step: u32,
}

impl SimClock {
    /// Clock starting at 0, advancing `step` ticks per read
    pub fn new(step: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            step,
        }
    }

    /// Clock starting at `start`, for wrap-around tests
    pub fn starting_at(start: u32, step: u32) -> Self {
        let clock = Self::new(step);
        clock.now.set(start);
        clock
    }

    /// Current tick count, without advancing
    pub fn now(&self) -> u32 {
        self.now.get()
    }

    /// Move the clock forward by `ticks`
    pub fn advance(&self, ticks: u32) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clock for SimClock {
    fn ticks(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step));
        now
    }
}
