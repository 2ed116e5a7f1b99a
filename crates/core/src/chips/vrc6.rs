//! Konami VRC6: two pulse channels and a sawtooth.
//!
//! | Address | Pulse 1 / Pulse 2       | Sawtooth                 |
//! |---------|-------------------------|--------------------------|
//! | $x000   | MDDD VVVV (mode, duty, volume) | ..AA AAAA (accumulator rate) |
//! | $x001   | period low              | period low               |
//! | $x002   | E... PPPP (enable, period high) | E... PPPP          |
//!
//! Pulse 1 lives at $9000, pulse 2 at $A000, the sawtooth at $B000.

use super::sound_chip::SoundChip;
use crate::apu::TimingMode;
use crate::channels::{ChannelId, ChipKind};
use crate::mixer::Mixer;

#[derive(Debug, Clone)]
struct Vrc6Pulse {
    channel: ChannelId,
    volume: u8,
    duty: u8,
    /// Digitized mode: constant output at `volume`
    ignore_duty: bool,
    enabled: bool,
    period: u16,
    counter: u32,
    /// Duty step, counts 15 down to 0
    step: u8,
    time: u32,
}

impl Vrc6Pulse {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            volume: 0,
            duty: 0,
            ignore_duty: false,
            enabled: false,
            period: 0,
            counter: 0,
            step: 15,
            time: 0,
        }
    }

    fn write(&mut self, reg: u16, value: u8) {
        match reg {
            0 => {
                self.ignore_duty = value & 0x80 != 0;
                self.duty = (value >> 4) & 0x07;
                self.volume = value & 0x0F;
            }
            1 => self.period = (self.period & 0xF00) | value as u16,
            _ => {
                self.period = (self.period & 0xFF) | ((value as u16 & 0x0F) << 8);
                self.enabled = value & 0x80 != 0;
                if !self.enabled {
                    self.step = 15;
                }
            }
        }
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period as u32 + 1;
            if self.enabled {
                self.step = self.step.wrapping_sub(1) & 0x0F;
            }
            let high = self.ignore_duty || self.step <= self.duty;
            let output = if self.enabled && high { self.volume } else { 0 };
            mixer.add_value(self.channel, output as i32, self.time);
        }
        self.counter -= time;
        self.time += time;
    }

    fn frequency(&self, clock: f64) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        clock / (16.0 * (self.period as f64 + 1.0))
    }
}

#[derive(Debug, Clone, Default)]
struct Vrc6Sawtooth {
    rate: u8,
    accumulator: u8,
    /// Position in the 14-step accumulator cycle
    step: u8,
    enabled: bool,
    period: u16,
    counter: u32,
    time: u32,
}

impl Vrc6Sawtooth {
    fn write(&mut self, reg: u16, value: u8) {
        match reg {
            0 => self.rate = value & 0x3F,
            1 => self.period = (self.period & 0xF00) | value as u16,
            _ => {
                self.period = (self.period & 0xFF) | ((value as u16 & 0x0F) << 8);
                self.enabled = value & 0x80 != 0;
                if !self.enabled {
                    self.accumulator = 0;
                    self.step = 0;
                }
            }
        }
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period as u32 + 1;
            if self.enabled {
                self.step = (self.step + 1) % 14;
                if self.step == 0 {
                    self.accumulator = 0;
                } else if self.step % 2 == 0 {
                    self.accumulator = self.accumulator.wrapping_add(self.rate);
                }
            }
            let output = if self.enabled { self.accumulator >> 3 } else { 0 };
            mixer.add_value(ChannelId::Vrc6Sawtooth, output as i32, self.time);
        }
        self.counter -= time;
        self.time += time;
    }

    fn frequency(&self, clock: f64) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        clock / (14.0 * (self.period as f64 + 1.0))
    }
}

/// The VRC6 sound unit.
#[derive(Debug)]
pub struct Vrc6 {
    pulse1: Vrc6Pulse,
    pulse2: Vrc6Pulse,
    sawtooth: Vrc6Sawtooth,
    timing: TimingMode,
}

impl Vrc6 {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            pulse1: Vrc6Pulse::new(ChannelId::Vrc6Pulse1),
            pulse2: Vrc6Pulse::new(ChannelId::Vrc6Pulse2),
            sawtooth: Vrc6Sawtooth::default(),
            timing,
        }
    }
}

impl SoundChip for Vrc6 {
    fn kind(&self) -> ChipKind {
        ChipKind::Vrc6
    }

    fn reset(&mut self) {
        *self = Self::new(self.timing);
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x9000..=0x9002 => self.pulse1.write(addr & 3, value),
            0xA000..=0xA002 => self.pulse2.write(addr & 3, value),
            0xB000..=0xB002 => self.sawtooth.write(addr & 3, value),
            _ => {}
        }
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        self.pulse1.process(time, mixer);
        self.pulse2.process(time, mixer);
        self.sawtooth.process(time, mixer);
    }

    fn end_frame(&mut self) {
        self.pulse1.time = 0;
        self.pulse2.time = 0;
        self.sawtooth.time = 0;
    }

    fn frequency(&self, channel: usize) -> f64 {
        let clock = self.timing.cpu_clock_hz();
        match channel {
            0 => self.pulse1.frequency(clock),
            1 => self.pulse2.frequency(clock),
            2 => self.sawtooth.frequency(clock),
            _ => 0.0,
        }
    }

    fn min_period(&self) -> u32 {
        [
            self.pulse1.enabled.then_some(self.pulse1.period as u32 + 1),
            self.pulse2.enabled.then_some(self.pulse2.period as u32 + 1),
            self.sawtooth.enabled.then_some(self.sawtooth.period as u32 + 1),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(u32::MAX)
    }

    fn register_key(&self, addr: u16) -> Option<u16> {
        matches!(addr, 0x9000..=0x9003 | 0xA000..=0xA002 | 0xB000..=0xB002).then_some(addr)
    }

    fn set_timing(&mut self, timing: TimingMode) {
        self.timing = timing;
    }
}
