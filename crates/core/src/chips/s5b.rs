//! Sunsoft 5B, a YM2149F (AY-3-8910 family) PSG behind a mapper.
//!
//! Writes to $C000 select one of 16 internal registers, writes to $E000
//! store into the selected one.
//!
//! # Register Layout
//!
//! - 0x00-0x05: Channel A/B/C tone period (fine, coarse)
//! - 0x06: Noise period
//! - 0x07: Mixer control, a set bit disables tone (bits 0-2) or noise (bits 3-5)
//! - 0x08-0x0A: Channel volume, bit 4 selects the envelope
//! - 0x0B-0x0C: Envelope period (fine, coarse)
//! - 0x0D: Envelope shape, writing restarts the envelope
//! - 0x0E-0x0F: I/O ports, unused

use super::sound_chip::SoundChip;
use crate::apu::TimingMode;
use crate::channels::{ChannelId, ChipKind};
use crate::mixer::Mixer;

/// 32 steps, 1.5dB apart
const VOLUME_TABLE: [u8; 32] = [
    0, 1, 2, 2, 2, 3, 3, 4, 5, 6, 7, 8, 10, 11, 14, 16, 19, 23, 27, 32, 38, 45, 54, 64, 76, 90,
    108, 128, 152, 181, 215, 255,
];

const TONE_DIVIDER: u32 = 16;
const NOISE_DIVIDER: u32 = 32;
const ENVELOPE_DIVIDER: u32 = 8;

const CHANNELS: [ChannelId; 3] = [ChannelId::S5bCh1, ChannelId::S5bCh2, ChannelId::S5bCh3];

#[derive(Debug, Clone)]
struct Envelope {
    period: u16,
    /// Counts 31 down to 0 within each segment
    step: i8,
    attack: u8,
    hold: bool,
    alternate: bool,
    holding: bool,
}

impl Envelope {
    fn new() -> Self {
        Self {
            period: 0,
            step: 0,
            attack: 0,
            hold: true,
            alternate: false,
            holding: true,
        }
    }

    fn set_shape(&mut self, shape: u8) {
        self.attack = if shape & 0x04 != 0 { 0x1F } else { 0x00 };
        if shape & 0x08 == 0 {
            self.hold = true;
            self.alternate = self.attack != 0;
        } else {
            self.hold = shape & 0x01 != 0;
            self.alternate = shape & 0x02 != 0;
        }
        self.step = 0x1F;
        self.holding = false;
    }

    fn clock(&mut self) {
        if self.holding {
            return;
        }
        self.step -= 1;
        if self.step < 0 {
            if self.hold {
                if self.alternate {
                    self.attack ^= 0x1F;
                }
                self.holding = true;
                self.step = 0;
            } else {
                if self.alternate {
                    self.attack ^= 0x1F;
                }
                self.step &= 0x1F;
            }
        }
    }

    fn level(&self) -> u8 {
        self.step as u8 ^ self.attack
    }

    fn period_cycles(&self) -> u32 {
        ENVELOPE_DIVIDER * self.period.max(1) as u32
    }
}

/// The 5B sound unit.
#[derive(Debug)]
pub struct S5b {
    address: u8,
    regs: [u8; 16],
    tone_counter: [u32; 3],
    tone_high: [bool; 3],
    noise_counter: u32,
    lfsr: u32,
    envelope: Envelope,
    envelope_counter: u32,
    time: u32,
    timing: TimingMode,
}

impl S5b {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            address: 0,
            regs: [0; 16],
            tone_counter: [0; 3],
            tone_high: [false; 3],
            noise_counter: 0,
            lfsr: 1,
            envelope: Envelope::new(),
            envelope_counter: 0,
            time: 0,
            timing,
        }
    }

    /// Currently selected register
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.regs[(reg & 0x0F) as usize]
    }

    fn tone_period(&self, ch: usize) -> u16 {
        self.regs[ch * 2] as u16 | ((self.regs[ch * 2 + 1] as u16 & 0x0F) << 8)
    }

    fn tone_cycles(&self, ch: usize) -> u32 {
        TONE_DIVIDER * self.tone_period(ch).max(1) as u32
    }

    fn noise_cycles(&self) -> u32 {
        NOISE_DIVIDER * (self.regs[6] & 0x1F).max(1) as u32
    }

    fn tone_enabled(&self, ch: usize) -> bool {
        self.regs[7] & (1 << ch) == 0
    }

    fn noise_enabled(&self, ch: usize) -> bool {
        self.regs[7] & (8 << ch) == 0
    }

    fn uses_envelope(&self, ch: usize) -> bool {
        self.regs[8 + ch] & 0x10 != 0
    }

    /// Volume on the 32-step scale
    fn level(&self, ch: usize) -> u8 {
        if self.uses_envelope(ch) {
            self.envelope.level()
        } else {
            match self.regs[8 + ch] & 0x0F {
                0 => 0,
                v => v * 2 + 1,
            }
        }
    }

    fn is_audible(&self, ch: usize) -> bool {
        (self.tone_enabled(ch) || self.noise_enabled(ch))
            && (self.uses_envelope(ch) || self.regs[8 + ch] & 0x0F != 0)
    }

    fn output(&self, ch: usize) -> i32 {
        let tone = self.tone_high[ch] || !self.tone_enabled(ch);
        let noise = self.lfsr & 1 != 0 || !self.noise_enabled(ch);
        if tone && noise {
            VOLUME_TABLE[self.level(ch) as usize] as i32
        } else {
            0
        }
    }

    fn step_noise(&mut self) {
        let feedback = (self.lfsr ^ (self.lfsr >> 3)) & 1;
        self.lfsr = (self.lfsr >> 1) | (feedback << 16);
    }
}

impl SoundChip for S5b {
    fn kind(&self) -> ChipKind {
        ChipKind::S5b
    }

    fn reset(&mut self) {
        *self = Self::new(self.timing);
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xC000 => self.address = value & 0x0F,
            0xE000 => {
                let reg = self.address as usize;
                self.regs[reg] = value;
                match reg {
                    0x0B => self.envelope.period = (self.envelope.period & 0xFF00) | value as u16,
                    0x0C => {
                        self.envelope.period = (self.envelope.period & 0x00FF) | ((value as u16) << 8)
                    }
                    0x0D => {
                        self.envelope.set_shape(value & 0x0F);
                        self.envelope_counter = self.envelope.period_cycles();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        loop {
            let next = self
                .tone_counter
                .iter()
                .copied()
                .chain([self.noise_counter, self.envelope_counter])
                .min()
                .unwrap_or(0);
            if next > time {
                for counter in self.tone_counter.iter_mut() {
                    *counter -= time;
                }
                self.noise_counter -= time;
                self.envelope_counter -= time;
                self.time += time;
                return;
            }
            time -= next;
            self.time += next;

            for ch in 0..3 {
                self.tone_counter[ch] -= next;
                if self.tone_counter[ch] == 0 {
                    self.tone_counter[ch] = self.tone_cycles(ch);
                    self.tone_high[ch] = !self.tone_high[ch];
                }
            }
            self.noise_counter -= next;
            if self.noise_counter == 0 {
                self.noise_counter = self.noise_cycles();
                self.step_noise();
            }
            self.envelope_counter -= next;
            if self.envelope_counter == 0 {
                self.envelope.clock();
                // A held envelope sleeps until the next shape write
                self.envelope_counter = if self.envelope.holding {
                    u32::MAX
                } else {
                    self.envelope.period_cycles()
                };
            }

            for (ch, channel) in CHANNELS.iter().enumerate() {
                mixer.add_value(*channel, self.output(ch), self.time);
            }
        }
    }

    fn end_frame(&mut self) {
        self.time = 0;
    }

    fn frequency(&self, channel: usize) -> f64 {
        if channel > 2 || !self.is_audible(channel) || !self.tone_enabled(channel) {
            return 0.0;
        }
        self.timing.cpu_clock_hz() / (2.0 * self.tone_cycles(channel) as f64)
    }

    fn min_period(&self) -> u32 {
        (0..3)
            .filter(|&ch| self.is_audible(ch))
            .map(|ch| {
                let tone = self.tone_cycles(ch);
                if self.noise_enabled(ch) {
                    tone.min(self.noise_cycles())
                } else {
                    tone
                }
            })
            .min()
            .unwrap_or(u32::MAX)
    }

    /// Data writes are logged under the selected register number
    fn register_key(&self, addr: u16) -> Option<u16> {
        match addr {
            0xC000 => Some(addr),
            0xE000 => Some(self.address as u16),
            _ => None,
        }
    }

    fn set_timing(&mut self, timing: TimingMode) {
        self.timing = timing;
    }
}
