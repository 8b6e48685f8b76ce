//! Wait timer: counts while armed and reports done once a target is reached.

/// A counter that measures how long a `wait` condition has held.
///
/// `done` is a registered output: it reflects the count at the start of the
/// tick, so a timer armed on tick `k` with target `t` first reports done on
/// tick `k + t`. The count holds at the target while `wait` stays asserted and
/// clears on the first tick `wait` is deasserted.
#[derive(Debug, Clone)]
pub struct WaitTimer {
    target: u64,
    count: u64,
}

impl WaitTimer {
    /// Creates a timer that reports done after `target` armed ticks.
    pub fn new(target: u64) -> Self {
        Self { target, count: 0 }
    }

    /// Returns the target tick count.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Returns the number of consecutive armed ticks counted so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns `true` once the count has reached the target.
    pub fn done(&self) -> bool {
        self.count >= self.target
    }

    /// Advances the timer by one tick of its domain.
    pub fn arm(&mut self, wait: bool) {
        if !wait {
            self.count = 0;
        } else if !self.done() {
            self.count += 1;
        }
    }
}
