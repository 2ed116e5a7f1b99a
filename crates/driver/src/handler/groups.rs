//! Registers shared by several channels of one chip.
//!
//! Handlers only own the registers of their own channel. Whatever is shared
//! (the 5B mixer and envelope, the SN76489 stereo byte, N163 RAM layout and
//! the DPCM sample layout) lives here, and each refresh flushes the values
//! that changed since the last write.

use crate::dpcm::SampleMap;
use crate::document::MAX_N163_CHANNELS;
use fami_core::chips::N163_RAM_SIZE;
use fami_core::logging::{log, LogCategory, LogLevel};
use fami_core::{Apu, EngineConfig, N163WavePolicy};

const S5B_ADDRESS: u16 = 0xC000;
const S5B_DATA: u16 = 0xE000;
const S5B_NOISE: u8 = 0x06;
const S5B_MIXER: u8 = 0x07;
const S5B_ENV_LOW: u8 = 0x0B;
const S5B_ENV_HIGH: u8 = 0x0C;
const S5B_ENV_SHAPE: u8 = 0x0D;

const SN7_STEREO: u16 = 0x4029;

const N163_ADDRESS: u16 = 0xF800;
const N163_DATA: u16 = 0x4800;
const N163_AUTO_INCREMENT: u8 = 0x80;

#[derive(Debug, Clone)]
pub struct S5bContext {
    /// Register 7: bit n disables tone n, bit n+3 disables noise n
    mixer: u8,
    noise_period: u8,
    envelope_period: u16,
    /// Shape waiting to be written; every shape write restarts the envelope
    envelope_shape: Option<u8>,
    written: [Option<u8>; 16],
}

impl Default for S5bContext {
    fn default() -> Self {
        Self {
            mixer: 0x3F,
            noise_period: 0,
            envelope_period: 0,
            envelope_shape: None,
            written: [None; 16],
        }
    }
}

impl S5bContext {
    pub fn set_mix(&mut self, channel: usize, tone: bool, noise: bool) {
        let tone_bit = 1 << channel;
        let noise_bit = 8 << channel;
        self.mixer |= tone_bit | noise_bit;
        if tone {
            self.mixer &= !tone_bit;
        }
        if noise {
            self.mixer &= !noise_bit;
        }
    }

    pub fn mixer(&self) -> u8 {
        self.mixer
    }

    pub fn set_noise_period(&mut self, period: u8) {
        self.noise_period = period & 0x1F;
    }

    pub fn set_envelope_high(&mut self, value: u8) {
        self.envelope_period = (self.envelope_period & 0x00FF) | (value as u16) << 8;
    }

    pub fn set_envelope_low(&mut self, value: u8) {
        self.envelope_period = (self.envelope_period & 0xFF00) | value as u16;
    }

    pub fn envelope_period(&self) -> u16 {
        self.envelope_period
    }

    pub fn trigger_envelope(&mut self, shape: u8) {
        self.envelope_shape = Some(shape & 0x0F);
    }

    /// Write a register unless it already holds the value
    pub fn write(&mut self, apu: &mut Apu, reg: u8, value: u8) {
        let slot = &mut self.written[(reg & 0x0F) as usize];
        if *slot != Some(value) {
            *slot = Some(value);
            apu.write(S5B_ADDRESS, reg & 0x0F);
            apu.write(S5B_DATA, value);
        }
    }

    pub fn flush(&mut self, apu: &mut Apu) {
        self.write(apu, S5B_MIXER, self.mixer);
        self.write(apu, S5B_NOISE, self.noise_period);
        self.write(apu, S5B_ENV_LOW, self.envelope_period as u8);
        self.write(apu, S5B_ENV_HIGH, (self.envelope_period >> 8) as u8);
        if let Some(shape) = self.envelope_shape.take() {
            self.written[S5B_ENV_SHAPE as usize] = Some(shape);
            apu.write(S5B_ADDRESS, S5B_ENV_SHAPE);
            apu.write(S5B_DATA, shape);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sn7Context {
    /// $4029: bit 4+n routes channel n left, bit n right
    stereo: u8,
    written: Option<u8>,
}

impl Default for Sn7Context {
    fn default() -> Self {
        Self {
            stereo: 0xFF,
            written: None,
        }
    }
}

impl Sn7Context {
    pub fn set_stereo(&mut self, channel: usize, left: bool, right: bool) {
        let channel = channel & 0x03;
        self.stereo &= !((0x10 | 0x01) << channel);
        if left {
            self.stereo |= 0x10 << channel;
        }
        if right {
            self.stereo |= 0x01 << channel;
        }
    }

    pub fn stereo(&self) -> u8 {
        self.stereo
    }

    pub fn flush(&mut self, apu: &mut Apu) {
        if self.written != Some(self.stereo) {
            self.written = Some(self.stereo);
            apu.write(SN7_STEREO, self.stereo);
        }
    }
}

#[derive(Debug, Clone)]
pub struct N163Context {
    channels: u8,
    policy: N163WavePolicy,
}

impl Default for N163Context {
    fn default() -> Self {
        Self {
            channels: 1,
            policy: N163WavePolicy::Clamp,
        }
    }
}

impl N163Context {
    pub fn new(channels: u8, policy: N163WavePolicy) -> Self {
        Self {
            channels: channels.clamp(1, MAX_N163_CHANNELS),
            policy,
        }
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn policy(&self) -> N163WavePolicy {
        self.policy
    }

    /// First wave sample address taken by channel registers
    pub fn register_area(&self) -> usize {
        (N163_RAM_SIZE - 8 * self.channels as usize) * 2
    }

    /// Where a wave of `size` samples asked for at `position` ends up
    pub fn place_wave(&self, position: u8, size: u8) -> u8 {
        let start = position as usize;
        let size = size as usize;
        let limit = self.register_area();
        match self.policy {
            N163WavePolicy::Clamp if start + size > limit => {
                let moved = limit.saturating_sub(size) & !1;
                log(LogCategory::Driver, LogLevel::Debug, || {
                    format!("N163 wave at {start} overlaps registers, moved to {moved}")
                });
                moved as u8
            }
            _ => position,
        }
    }

    /// Write 4-bit samples starting at a sample address, two per byte
    pub fn write_wave(&self, apu: &mut Apu, position: u8, samples: &[u8]) {
        let mut position = position as usize;
        let mut samples = samples.iter().map(|s| s & 0x0F);
        if position % 2 == 1 {
            // keep the low nibble already in RAM
            let byte = position / 2;
            let low = read_ram(apu, byte) & 0x0F;
            if let Some(high) = samples.next() {
                write_ram(apu, byte, &[low | high << 4]);
            }
            position += 1;
        }
        let mut bytes = Vec::with_capacity(samples.len() / 2 + 1);
        while let Some(low) = samples.next() {
            let high = samples.next().unwrap_or(0);
            bytes.push(low | high << 4);
        }
        let start = position / 2;
        let room = (N163_RAM_SIZE - start.min(N163_RAM_SIZE)).min(bytes.len());
        write_ram(apu, start, &bytes[..room]);
    }
}

/// Write consecutive N163 RAM bytes through the auto-increment port
pub fn write_ram(apu: &mut Apu, address: usize, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    apu.write(N163_ADDRESS, (address as u8 & 0x7F) | N163_AUTO_INCREMENT);
    for &byte in bytes {
        apu.write(N163_DATA, byte);
    }
}

fn read_ram(apu: &mut Apu, address: usize) -> u8 {
    apu.write(N163_ADDRESS, address as u8 & 0x7F);
    apu.read(N163_DATA).unwrap_or(0)
}

/// Shared per-chip state handed to every handler refresh
#[derive(Debug, Clone, Default)]
pub struct ChipGroups {
    pub dpcm: SampleMap,
    pub s5b: S5bContext,
    pub sn7: Sn7Context,
    pub n163: N163Context,
    /// Let `Kxy` auto-FM run while an FDS instrument's modulation delay counts down
    pub fds_auto_fm_during_delay: bool,
}

impl ChipGroups {
    pub fn new(config: &EngineConfig, n163_channels: u8, dpcm: SampleMap) -> Self {
        Self {
            dpcm,
            s5b: S5bContext::default(),
            sn7: Sn7Context::default(),
            n163: N163Context::new(n163_channels, config.n163_wave_policy),
            fds_auto_fm_during_delay: config.fds_auto_fm_during_delay,
        }
    }

    /// Forget cached register values, e.g. after the APU was reset
    pub fn invalidate(&mut self) {
        self.s5b = S5bContext::default();
        self.sn7 = Sn7Context::default();
    }
}
