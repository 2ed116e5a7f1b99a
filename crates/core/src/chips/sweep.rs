//! Hardware sweep unit of the 2A03 squares.

/// Sweep unit that periodically shifts a square's period up or down.
///
/// The target period is computed continuously and mutes the channel when it
/// exceeds $7FF, even while the sweep is disabled. Square 1 negates with one's
/// complement (subtracting one extra), square 2 with two's complement.
#[derive(Debug, Clone, Default)]
pub struct Sweep {
    enabled: bool,
    /// Divider period (0-7)
    period: u8,
    divider: u8,
    negate: bool,
    shift: u8,
    reload: bool,
    ones_complement: bool,
}

impl Sweep {
    /// Sweep for square 1 (`true`) or square 2 (`false`)
    pub fn new(ones_complement: bool) -> Self {
        Self {
            ones_complement,
            ..Self::default()
        }
    }

    /// $4001/$4005: EPPP NSSS
    pub fn write(&mut self, value: u8) {
        self.enabled = value & 0x80 != 0;
        self.period = (value >> 4) & 0x07;
        self.negate = value & 0x08 != 0;
        self.shift = value & 0x07;
        self.reload = true;
    }

    /// Period the sweep would move to from `period`
    pub fn target(&self, period: u16) -> u16 {
        let change = period >> self.shift;
        if self.negate {
            let change = change + self.ones_complement as u16;
            period.saturating_sub(change)
        } else {
            period + change
        }
    }

    /// Whether the sweep silences a channel playing `period`
    pub fn mutes(&self, period: u16) -> bool {
        period < 8 || self.target(period) > 0x7FF
    }

    /// Half frame clock; updates `period` when the divider fires
    pub fn clock(&mut self, period: &mut u16) {
        if self.divider == 0 && self.enabled && self.shift > 0 && !self.mutes(*period) {
            *period = self.target(*period);
        }
        if self.divider == 0 || self.reload {
            self.divider = self.period;
            self.reload = false;
        } else {
            self.divider -= 1;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
