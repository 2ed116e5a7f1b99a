//! Triangle channel of the 2A03.

use super::length_counter::LengthCounter;
use crate::channels::ChannelId;
use crate::mixer::Mixer;

/// 32-step triangle sequence
const TRIANGLE_WAVE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11,
    12, 13, 14, 15,
];

/// Triangle channel.
///
/// The sequencer only advances while both the length counter and the linear
/// counter are non-zero, so a stopped triangle holds its last level instead of
/// dropping to zero. Periods of 0 and 1 are ultrasonic and freeze the sequencer.
#[derive(Debug, Clone, Default)]
pub struct Triangle {
    period: u16,
    counter: u32,
    step: u8,
    linear_counter: u8,
    linear_reload: u8,
    reload_flag: bool,
    /// Control flag: halts the length counter and keeps the reload flag set
    control: bool,
    length: LengthCounter,
    time: u32,
}

impl Triangle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Write register 0-3 ($4008-$400B)
    pub fn write(&mut self, reg: u16, value: u8) {
        match reg & 3 {
            0 => {
                self.control = value & 0x80 != 0;
                self.linear_reload = value & 0x7F;
                self.length.set_halted(self.control);
            }
            1 => {}
            2 => self.period = (self.period & 0x700) | value as u16,
            _ => {
                self.period = (self.period & 0xFF) | ((value as u16 & 0x07) << 8);
                self.length.load(value >> 3);
                self.reload_flag = true;
            }
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    pub fn is_active(&self) -> bool {
        self.length.is_active()
    }

    /// Quarter frame clock: linear counter
    pub fn quarter_clock(&mut self) {
        if self.reload_flag {
            self.linear_counter = self.linear_reload;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.reload_flag = false;
        }
    }

    /// Half frame clock: length counter
    pub fn half_clock(&mut self) {
        self.length.clock();
    }

    pub fn period_cycles(&self) -> u32 {
        self.period as u32 + 1
    }

    pub fn is_sounding(&self) -> bool {
        self.length.is_active() && self.linear_counter > 0 && self.period > 1
    }

    pub fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        let running = self.is_sounding();
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period_cycles();
            if running {
                self.step = (self.step + 1) & 0x1F;
                mixer.add_value(
                    ChannelId::Triangle,
                    TRIANGLE_WAVE[self.step as usize] as i32,
                    self.time,
                );
            }
        }
        self.counter -= time;
        self.time += time;
    }

    pub fn end_frame(&mut self) {
        self.time = 0;
    }

    pub fn frequency(&self, clock: f64) -> f64 {
        if !self.is_sounding() {
            return 0.0;
        }
        clock / (32.0 * (self.period as f64 + 1.0))
    }
}
