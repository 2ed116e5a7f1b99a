//! Sub-frame time slicing.

/// Shortest slice the dispatcher will run, so that zero or tiny periods
/// cannot stall the loop.
pub const MIN_SLICE: u32 = 7;

/// Length of the next slice: the shortest active period, clamped to at least
/// [`MIN_SLICE`] and at most the remaining budget.
pub fn next_slice(min_period: u32, remaining: u32) -> u32 {
    min_period.max(MIN_SLICE).min(remaining)
}

/// Iterator over the slices that exhaust `budget` for a fixed period.
#[derive(Debug, Clone)]
pub struct Slices {
    min_period: u32,
    remaining: u32,
}

impl Slices {
    pub fn new(min_period: u32, budget: u32) -> Self {
        Self {
            min_period,
            remaining: budget,
        }
    }
}

impl Iterator for Slices {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        let slice = next_slice(self.min_period, self.remaining);
        self.remaining -= slice;
        Some(slice)
    }
}
