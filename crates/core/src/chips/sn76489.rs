//! Texas Instruments SN76489 Programmable Sound Generator
//!
//! Mapped for the Famicom at two ports:
//! - **$4028**: the chip's own latch/data byte stream
//! - **$4029**: Game Gear style stereo byte (bit 4+n sends channel n left,
//!   bit n sends it right)
//!
//! # Architecture
//! - 3 square wave tone channels
//! - 1 noise channel
//! - 4-bit attenuation per channel, 2dB per step, 15 is silent
//! - 10-bit frequency control for tone channels
//!
//! The noise generator follows the Sega variant: a 16-bit LFSR tapped at
//! bits 0 and 3.

use super::sound_chip::SoundChip;
use crate::apu::TimingMode;
use crate::channels::{ChannelId, ChipKind};
use crate::mixer::Mixer;

/// Output level for each attenuation step
const VOLUME_TABLE: [u8; 16] = [63, 50, 40, 32, 25, 20, 16, 13, 10, 8, 6, 5, 4, 3, 3, 0];

/// CPU cycles per tone counter decrement
const CLOCK_DIVIDER: u32 = 16;

const LFSR_RESET: u16 = 0x8000;

const TONE_CHANNELS: [ChannelId; 3] = [
    ChannelId::Sn7Square1,
    ChannelId::Sn7Square2,
    ChannelId::Sn7Square3,
];

#[derive(Debug, Clone)]
struct Tone {
    channel: ChannelId,
    /// 10-bit frequency value
    freq: u16,
    attenuation: u8,
    high: bool,
    counter: u32,
    time: u32,
}

impl Tone {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            freq: 0,
            attenuation: 0x0F,
            high: false,
            counter: 0,
            time: 0,
        }
    }

    /// Half-wave length in CPU cycles; a zero frequency acts as 1
    fn period_cycles(&self) -> u32 {
        CLOCK_DIVIDER * (self.freq.max(1) as u32)
    }

    fn is_sounding(&self) -> bool {
        self.attenuation != 0x0F && self.freq > 0
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period_cycles();
            self.high = !self.high;
            let output = if self.high {
                VOLUME_TABLE[self.attenuation as usize]
            } else {
                0
            };
            mixer.add_value(self.channel, output as i32, self.time);
        }
        self.counter -= time;
        self.time += time;
    }
}

#[derive(Debug, Clone)]
struct NoiseGen {
    /// Bits 0-1 rate, bit 2 white noise
    control: u8,
    lfsr: u16,
    attenuation: u8,
    counter: u32,
    time: u32,
}

impl NoiseGen {
    fn new() -> Self {
        Self {
            control: 0,
            lfsr: LFSR_RESET,
            attenuation: 0x0F,
            counter: 0,
            time: 0,
        }
    }

    /// Cycles per LFSR shift. Rate 3 follows tone channel 3.
    fn period_cycles(&self, tone3: &Tone) -> u32 {
        let half = match self.control & 0x03 {
            3 => tone3.period_cycles(),
            rate => CLOCK_DIVIDER * (0x10 << rate),
        };
        half * 2
    }

    fn shift(&mut self) {
        let feedback = if self.control & 0x04 != 0 {
            (self.lfsr ^ (self.lfsr >> 3)) & 1
        } else {
            self.lfsr & 1
        };
        self.lfsr = (self.lfsr >> 1) | (feedback << 15);
    }

    fn process(&mut self, mut time: u32, tone3: &Tone, mixer: &mut Mixer) {
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period_cycles(tone3);
            self.shift();
            let output = if self.lfsr & 1 != 0 {
                VOLUME_TABLE[self.attenuation as usize]
            } else {
                0
            };
            mixer.add_value(ChannelId::Sn7Noise, output as i32, self.time);
        }
        self.counter -= time;
        self.time += time;
    }
}

/// SN76489 PSG state
#[derive(Debug)]
pub struct Sn76489 {
    tones: [Tone; 3],
    noise: NoiseGen,
    /// Register selected by the last latch byte: channel * 2 + volume flag
    latched: u8,
    stereo: u8,
    stereo_dirty: bool,
    time: u32,
    timing: TimingMode,
}

impl Sn76489 {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            tones: TONE_CHANNELS.map(Tone::new),
            noise: NoiseGen::new(),
            latched: 0,
            stereo: 0xFF,
            stereo_dirty: true,
            time: 0,
            timing,
        }
    }

    /// Feed one byte of the latch/data stream
    fn write_data(&mut self, data: u8) {
        if data & 0x80 != 0 {
            self.latched = (data >> 4) & 0x07;
            self.write_register(data & 0x0F, false);
        } else {
            self.write_register(data & 0x3F, true);
        }
    }

    fn write_register(&mut self, value: u8, high_bits: bool) {
        let channel = (self.latched >> 1) as usize;
        let is_volume = self.latched & 1 != 0;
        match (channel, is_volume) {
            (3, true) => self.noise.attenuation = value & 0x0F,
            (3, false) => {
                self.noise.control = value & 0x07;
                self.noise.lfsr = LFSR_RESET;
            }
            (ch, true) => self.tones[ch].attenuation = value & 0x0F,
            (ch, false) if high_bits => {
                let tone = &mut self.tones[ch];
                tone.freq = (tone.freq & 0x00F) | ((value as u16 & 0x3F) << 4);
            }
            (ch, false) => {
                let tone = &mut self.tones[ch];
                tone.freq = (tone.freq & 0x3F0) | (value as u16 & 0x0F);
            }
        }
    }

    pub fn stereo_mask(&self) -> u8 {
        self.stereo
    }
}

impl SoundChip for Sn76489 {
    fn kind(&self) -> ChipKind {
        ChipKind::Sn76489
    }

    fn reset(&mut self) {
        *self = Self::new(self.timing);
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x4028 => self.write_data(value),
            0x4029 => {
                self.stereo = value;
                self.stereo_dirty = true;
            }
            _ => {}
        }
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if self.stereo_dirty {
            mixer.set_stereo_mask(self.stereo, self.time);
            self.stereo_dirty = false;
        }
        for tone in self.tones.iter_mut() {
            tone.process(time, mixer);
        }
        self.noise.process(time, &self.tones[2], mixer);
        self.time += time;
    }

    fn end_frame(&mut self) {
        for tone in self.tones.iter_mut() {
            tone.time = 0;
        }
        self.noise.time = 0;
        self.time = 0;
    }

    fn frequency(&self, channel: usize) -> f64 {
        let clock = self.timing.cpu_clock_hz();
        match channel {
            0..=2 => {
                let tone = &self.tones[channel];
                if !tone.is_sounding() {
                    return 0.0;
                }
                clock / (2.0 * tone.period_cycles() as f64)
            }
            3 if self.noise.attenuation != 0x0F => {
                clock / self.noise.period_cycles(&self.tones[2]) as f64
            }
            _ => 0.0,
        }
    }

    fn min_period(&self) -> u32 {
        let tones = self
            .tones
            .iter()
            .filter(|tone| tone.is_sounding())
            .map(Tone::period_cycles);
        let noise = (self.noise.attenuation != 0x0F)
            .then(|| self.noise.period_cycles(&self.tones[2]));
        tones.chain(noise).min().unwrap_or(u32::MAX)
    }

    fn register_key(&self, addr: u16) -> Option<u16> {
        matches!(addr, 0x4028 | 0x4029).then_some(addr)
    }

    fn set_timing(&mut self, timing: TimingMode) {
        self.timing = timing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_psg_creation() {
        let psg = Sn76489::new(TimingMode::Ntsc);
        assert!(psg.tones.iter().all(|tone| tone.attenuation == 0x0F));
        assert_eq!(psg.noise.attenuation, 0x0F);
        assert_eq!(psg.min_period(), u32::MAX);
    }

    #[test]
    fn test_psg_volume_write() {
        let mut psg = Sn76489::new(TimingMode::Ntsc);
        psg.write(0x4028, 0x90); // Channel 0, volume, value 0 (max)
        assert_eq!(psg.tones[0].attenuation, 0x00);
        psg.write(0x4028, 0xB5); // Channel 1, volume 5
        assert_eq!(psg.tones[1].attenuation, 0x05);
        psg.write(0x4028, 0xDF); // Channel 2, mute
        assert_eq!(psg.tones[2].attenuation, 0x0F);
        // A data byte after a volume latch rewrites the volume
        psg.write(0x4028, 0x03);
        assert_eq!(psg.tones[2].attenuation, 0x03);
    }

    #[test]
    fn test_psg_tone_frequency() {
        let mut psg = Sn76489::new(TimingMode::Ntsc);
        psg.write(0x4028, 0x84); // Latch tone 0, low 4 bits = 0x4
        psg.write(0x4028, 0x1A); // High 6 bits = 0x1A
        assert_eq!(psg.tones[0].freq, 0x1A4);
    }

    #[test]
    fn test_psg_noise_control() {
        let mut psg = Sn76489::new(TimingMode::Ntsc);
        psg.write(0x4028, 0xE7); // White noise, rate follows tone 3
        assert_eq!(psg.noise.control, 0x07);
        psg.write(0x4028, 0xC8);
        psg.write(0x4028, 0x02);
        assert_eq!(psg.noise.period_cycles(&psg.tones[2]), 2 * 16 * 0x28);
    }

    #[test]
    fn volume_table_falls_two_db_per_step() {
        assert_eq!(VOLUME_TABLE[0], 63);
        assert_eq!(VOLUME_TABLE[15], 0);
        let ratio = VOLUME_TABLE[3] as f64 / VOLUME_TABLE[0] as f64;
        assert!((20.0 * ratio.log10() + 6.0).abs() < 0.2);
    }

    #[test]
    fn tone_toggles_at_its_period() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut psg = Sn76489::new(TimingMode::Ntsc);
        psg.write(0x4028, 0x90);
        psg.write(0x4028, 0x8A);
        psg.write(0x4028, 0x00); // freq 10, half period 160 cycles
        assert_eq!(psg.min_period(), 160);

        psg.process(1, &mut mixer);
        let first = mixer.channel_value(ChannelId::Sn7Square1);
        psg.process(158, &mut mixer);
        assert_eq!(mixer.channel_value(ChannelId::Sn7Square1), first);
        psg.process(1, &mut mixer);
        assert_ne!(mixer.channel_value(ChannelId::Sn7Square1), first);
        assert!((psg.frequency(0) - 1_789_773.0 / 320.0).abs() < 1.0);
    }

    #[test]
    fn periodic_noise_repeats_every_sixteen_shifts() {
        let mut noise = NoiseGen::new();
        noise.control = 0x00;
        let start = noise.lfsr;
        for _ in 0..16 {
            noise.shift();
        }
        assert_eq!(noise.lfsr, start);
    }

    #[test]
    fn stereo_byte_is_kept_and_forwarded() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut psg = Sn76489::new(TimingMode::Ntsc);
        assert_eq!(psg.stereo_mask(), 0xFF);
        psg.write(0x4029, 0x1E);
        assert_eq!(psg.stereo_mask(), 0x1E);
        psg.process(10, &mut mixer);
        assert!(!psg.stereo_dirty);
        assert_eq!(psg.read(0x4029), None);
    }
}
