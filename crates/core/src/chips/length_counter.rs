//! Note length counter of the 2A03 and MMC5 channels.

/// Length values indexed by bits 3-7 of the fourth channel register.
pub const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

/// Counts down on half frame clocks and silences the channel at zero.
/// Disabling the channel through the status register clears it.
#[derive(Debug, Clone, Default)]
pub struct LengthCounter {
    value: u8,
    halted: bool,
    enabled: bool,
}

impl LengthCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Half frame clock
    pub fn clock(&mut self) {
        if !self.halted && self.value > 0 {
            self.value -= 1;
        }
    }

    /// Load from the length table; ignored while the channel is disabled
    pub fn load(&mut self, index: u8) {
        if self.enabled {
            self.value = LENGTH_TABLE[(index & 0x1F) as usize];
        }
    }

    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value = 0;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Whether the channel may sound
    pub fn is_active(&self) -> bool {
        self.value > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_until_zero() {
        let mut lc = LengthCounter::new();
        lc.set_enabled(true);
        lc.load(3);
        assert_eq!(lc.value(), 2);
        lc.clock();
        lc.clock();
        lc.clock();
        assert_eq!(lc.value(), 0);
        assert!(!lc.is_active());
    }

    #[test]
    fn halted_counter_holds() {
        let mut lc = LengthCounter::new();
        lc.set_enabled(true);
        lc.load(1);
        lc.set_halted(true);
        lc.clock();
        assert_eq!(lc.value(), 254);
    }

    #[test]
    fn disabled_counter_is_cleared_and_refuses_loads() {
        let mut lc = LengthCounter::new();
        lc.set_enabled(true);
        lc.load(0);
        lc.set_enabled(false);
        assert_eq!(lc.value(), 0);
        lc.load(0);
        assert_eq!(lc.value(), 0);
    }
}
