//! Noise channel of the 2A03.

use super::envelope::Envelope;
use super::length_counter::LengthCounter;
use crate::apu::TimingMode;
use crate::channels::ChannelId;
use crate::mixer::Mixer;

/// Noise channel driven by a 15-bit LFSR.
///
/// The feedback is bit 0 XOR bit 1 in long mode and bit 0 XOR bit 6 in short
/// (93-step) mode. The channel is audible while bit 0 of the register is clear.
#[derive(Debug, Clone)]
pub struct Noise {
    shift_register: u16,
    short_mode: bool,
    period_index: u8,
    periods: &'static [u16; 16],
    counter: u32,
    envelope: Envelope,
    length: LengthCounter,
    time: u32,
}

impl Noise {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            shift_register: 1,
            short_mode: false,
            period_index: 0,
            periods: timing.noise_periods(),
            counter: 0,
            envelope: Envelope::new(),
            length: LengthCounter::new(),
            time: 0,
        }
    }

    pub fn reset(&mut self) {
        let periods = self.periods;
        *self = Self::new(TimingMode::Ntsc);
        self.periods = periods;
    }

    pub fn set_timing(&mut self, timing: TimingMode) {
        self.periods = timing.noise_periods();
    }

    /// Write register 0-3 ($400C-$400F)
    pub fn write(&mut self, reg: u16, value: u8) {
        match reg & 3 {
            0 => {
                self.envelope.write_control(value);
                self.length.set_halted(value & 0x20 != 0);
            }
            1 => {}
            2 => {
                self.short_mode = value & 0x80 != 0;
                self.period_index = value & 0x0F;
            }
            _ => {
                self.length.load(value >> 3);
                self.envelope.restart();
            }
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    pub fn is_active(&self) -> bool {
        self.length.is_active()
    }

    pub fn quarter_clock(&mut self) {
        self.envelope.clock();
    }

    pub fn half_clock(&mut self) {
        self.length.clock();
    }

    pub fn period_cycles(&self) -> u32 {
        self.periods[self.period_index as usize] as u32
    }

    pub fn is_sounding(&self) -> bool {
        self.length.is_enabled() && self.length.is_active()
    }

    fn clock_lfsr(&mut self) {
        let tap = if self.short_mode { 6 } else { 1 };
        let feedback = (self.shift_register ^ (self.shift_register >> tap)) & 1;
        self.shift_register = (self.shift_register >> 1) | (feedback << 14);
    }

    pub fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        let sounding = self.is_sounding();
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period_cycles();
            let output = if sounding && self.shift_register & 1 == 0 {
                self.envelope.volume()
            } else {
                0
            };
            mixer.add_value(ChannelId::Noise, output as i32, self.time);
            self.clock_lfsr();
        }
        self.counter -= time;
        self.time += time;
    }

    pub fn end_frame(&mut self) {
        self.time = 0;
    }

    /// LFSR clock rate in Hz
    pub fn frequency(&self, clock: f64) -> f64 {
        if !self.is_sounding() {
            return 0.0;
        }
        clock / self.period_cycles() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence_length(short_mode: bool) -> usize {
        let mut noise = Noise::new(TimingMode::Ntsc);
        noise.short_mode = short_mode;
        let start = noise.shift_register;
        for n in 1..=40_000 {
            noise.clock_lfsr();
            if noise.shift_register == start {
                return n;
            }
        }
        0
    }

    #[test]
    fn long_mode_has_maximal_length() {
        assert_eq!(sequence_length(false), 32_767);
    }

    #[test]
    fn short_mode_repeats_after_93_steps() {
        assert_eq!(sequence_length(true), 93);
    }

    #[test]
    fn period_follows_region_table() {
        let mut noise = Noise::new(TimingMode::Ntsc);
        noise.write(2, 0x0F);
        assert_eq!(noise.period_cycles(), 4068);
        noise.set_timing(TimingMode::Pal);
        assert_eq!(noise.period_cycles(), 3778);
        noise.write(2, 0x80);
        assert!(noise.short_mode);
        assert_eq!(noise.period_cycles(), 4);
    }
}
