//! Namco 163 wavetable sound.
//!
//! The chip has 128 bytes of internal RAM holding both the 4-bit wave
//! samples and the per-channel registers. $F800 sets the RAM address
//! (bit 7 enables auto-increment), $4800 reads or writes the addressed byte.
//!
//! Channel `n` (0 = the highest) keeps its registers at `0x78 - 8n`:
//!
//! | Offset | Contents |
//! |--------|----------|
//! | +0, +2, +4 (bits 0-1) | 18-bit frequency |
//! | +1, +3, +5 | 24-bit phase |
//! | +4 (bits 2-7) | wave length, `256 - (value & 0xFC)` samples |
//! | +6 | wave start, in samples |
//! | +7 | volume (bits 0-3); at $7F bits 4-6 also hold the channel count - 1 |
//!
//! Only one channel is updated every 15 CPU cycles, so enabling more
//! channels lowers each channel's rate and, on hardware, multiplexes the
//! outputs.

use super::sound_chip::SoundChip;
use crate::apu::TimingMode;
use crate::channels::{ChannelId, ChipKind};
use crate::config::N163Mode;
use crate::mixer::Mixer;

pub const N163_RAM_SIZE: usize = 0x80;

/// CPU cycles between channel updates
const UPDATE_CYCLES: u32 = 15;

const CHANNELS: [ChannelId; 8] = [
    ChannelId::N163Ch1,
    ChannelId::N163Ch2,
    ChannelId::N163Ch3,
    ChannelId::N163Ch4,
    ChannelId::N163Ch5,
    ChannelId::N163Ch6,
    ChannelId::N163Ch7,
    ChannelId::N163Ch8,
];

/// RAM offset of a channel's register block
pub fn channel_base(channel: usize) -> usize {
    0x78 - 8 * channel
}

#[derive(Debug)]
pub struct N163 {
    ram: [u8; N163_RAM_SIZE],
    address: u8,
    auto_increment: bool,
    /// Channel updated next
    current: usize,
    /// Channel emitting in multiplexed mode
    last: Option<usize>,
    outputs: [i32; 8],
    mode: N163Mode,
    counter: u32,
    time: u32,
    timing: TimingMode,
}

impl N163 {
    pub fn new(timing: TimingMode, mode: N163Mode) -> Self {
        Self {
            ram: [0; N163_RAM_SIZE],
            address: 0,
            auto_increment: false,
            current: 0,
            last: None,
            outputs: [0; 8],
            mode,
            counter: 0,
            time: 0,
            timing,
        }
    }

    pub fn set_mode(&mut self, mode: N163Mode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> N163Mode {
        self.mode
    }

    /// Number of enabled channels, 1-8
    pub fn channel_count(&self) -> usize {
        ((self.ram[0x7F] >> 4) & 0x07) as usize + 1
    }

    pub fn ram(&self) -> &[u8; N163_RAM_SIZE] {
        &self.ram
    }

    fn frequency_reg(&self, base: usize) -> u32 {
        self.ram[base] as u32
            | (self.ram[base + 2] as u32) << 8
            | (self.ram[base + 4] as u32 & 0x03) << 16
    }

    fn wave_length(&self, base: usize) -> u32 {
        256 - (self.ram[base + 4] & 0xFC) as u32
    }

    fn volume(&self, base: usize) -> i32 {
        (self.ram[base + 7] & 0x0F) as i32
    }

    fn sample(&self, index: u32) -> i32 {
        let byte = self.ram[(index as usize >> 1) & 0x7F];
        let nibble = if index & 1 == 0 { byte & 0x0F } else { byte >> 4 };
        nibble as i32
    }

    /// Advance one channel's phase and compute its output
    fn update_channel(&mut self, channel: usize) -> i32 {
        let base = channel_base(channel);
        let length = self.wave_length(base) << 16;
        let mut phase = self.ram[base + 1] as u32
            | (self.ram[base + 3] as u32) << 8
            | (self.ram[base + 5] as u32) << 16;
        phase = (phase + self.frequency_reg(base)) % length;
        self.ram[base + 1] = phase as u8;
        self.ram[base + 3] = (phase >> 8) as u8;
        self.ram[base + 5] = (phase >> 16) as u8;

        let index = ((phase >> 16) + self.ram[base + 6] as u32) & 0xFF;
        (self.sample(index) - 8) * self.volume(base)
    }

    fn step(&mut self, mixer: &mut Mixer) {
        let count = self.channel_count();
        if self.current >= count {
            self.current = 0;
        }
        let channel = self.current;
        let output = self.update_channel(channel);
        self.outputs[channel] = output;

        match self.mode {
            N163Mode::Multiplexed => {
                if let Some(last) = self.last.filter(|&last| last != channel) {
                    mixer.add_value(CHANNELS[last], 0, self.time);
                }
                mixer.add_value(CHANNELS[channel], output, self.time);
                self.last = Some(channel);
            }
            N163Mode::Linear => {
                mixer.add_value(CHANNELS[channel], output / count as i32, self.time);
            }
        }
        self.current = (channel + 1) % count;
    }
}

impl SoundChip for N163 {
    fn kind(&self) -> ChipKind {
        ChipKind::N163
    }

    fn reset(&mut self) {
        *self = Self::new(self.timing, self.mode);
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0xF800 => {
                self.address = value & 0x7F;
                self.auto_increment = value & 0x80 != 0;
            }
            0x4800 => {
                self.ram[self.address as usize] = value;
                if self.auto_increment {
                    self.address = (self.address + 1) & 0x7F;
                }
            }
            _ => {}
        }
    }

    fn read(&mut self, addr: u16) -> Option<u8> {
        if addr != 0x4800 {
            return None;
        }
        let value = self.ram[self.address as usize];
        if self.auto_increment {
            self.address = (self.address + 1) & 0x7F;
        }
        Some(value)
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = UPDATE_CYCLES;
            self.step(mixer);
        }
        self.counter -= time;
        self.time += time;
    }

    fn end_frame(&mut self) {
        self.time = 0;
    }

    fn frequency(&self, channel: usize) -> f64 {
        let count = self.channel_count();
        if channel >= count {
            return 0.0;
        }
        let base = channel_base(channel);
        let freq = self.frequency_reg(base);
        if freq == 0 || self.volume(base) == 0 {
            return 0.0;
        }
        let cycles_per_update = (UPDATE_CYCLES as usize * count) as f64;
        let length = self.wave_length(base) as f64 * 65536.0;
        self.timing.cpu_clock_hz() * freq as f64 / (cycles_per_update * length)
    }

    fn min_period(&self) -> u32 {
        let sounding = (0..self.channel_count()).any(|ch| self.volume(channel_base(ch)) > 0);
        if sounding {
            UPDATE_CYCLES
        } else {
            u32::MAX
        }
    }

    /// Data writes are logged under the RAM address they land on
    fn register_key(&self, addr: u16) -> Option<u16> {
        match addr {
            0xF800 => Some(addr),
            0x4800 => Some(self.address as u16),
            _ => None,
        }
    }

    fn set_timing(&mut self, timing: TimingMode) {
        self.timing = timing;
    }
}
