//! Volume envelope shared by the 2A03 and MMC5 squares and the noise channel.

/// Envelope generator component.
///
/// Either outputs a constant volume or decays from 15 to 0 at a rate set by
/// the low nibble of the control register, optionally looping.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Start flag (set when a note is triggered)
    start: bool,
    /// Decay level counter (0-15)
    decay: u8,
    divider: u8,
    /// Constant volume, or divider period when decaying
    param: u8,
    looping: bool,
    constant: bool,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the control bits: bit 5 loop, bit 4 constant volume, bits 0-3 volume/period
    pub fn write_control(&mut self, value: u8) {
        self.looping = value & 0x20 != 0;
        self.constant = value & 0x10 != 0;
        self.param = value & 0x0F;
    }

    /// Quarter frame clock
    pub fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.param;
        } else if self.divider > 0 {
            self.divider -= 1;
        } else {
            self.divider = self.param;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        }
    }

    pub fn restart(&mut self) {
        self.start = true;
    }

    /// Current 4-bit volume
    pub fn volume(&self) -> u8 {
        if self.constant {
            self.param
        } else {
            self.decay
        }
    }

    /// Loop flag, which doubles as the length counter halt
    pub fn is_looping(&self) -> bool {
        self.looping
    }
}
