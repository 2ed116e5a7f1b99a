//! Famicom Disk System wavetable channel.
//!
//! One 64-step, 6-bit wavetable voice with a volume envelope and a frequency
//! modulation unit. Registers live at $4040-$408A:
//!
//! - **$4040-$407F**: wave RAM, writable while $4089 bit 7 is set
//! - **$4080**: volume envelope (disable, direction, speed or gain)
//! - **$4082/$4083**: 12-bit wave pitch, $4083 bit 7 halts the wave and bit 6 the envelopes
//! - **$4084**: modulation envelope
//! - **$4085**: modulation counter (7-bit signed)
//! - **$4086/$4087**: 12-bit modulation frequency, $4087 bit 7 halts modulation
//! - **$4088**: modulation table input, accepted while modulation is halted
//! - **$4089**: wave RAM write enable and master volume
//! - **$408A**: envelope speed multiplier

use super::sound_chip::SoundChip;
use crate::apu::TimingMode;
use crate::channels::{ChannelId, ChipKind};
use crate::mixer::Mixer;

/// Modulation counter change per table entry; entry 4 resets the counter
const MOD_BIAS: [i8; 8] = [0, 1, 2, 4, 0, -4, -2, -1];
const MOD_RESET: u8 = 4;

/// Master volume as a fraction of 30: 2/2, 2/3, 2/4, 2/5
const MASTER_VOLUME: [u32; 4] = [30, 20, 15, 12];

/// Longest stretch of cycles emulated in one step
const CHUNK_CYCLES: u32 = 32;

#[derive(Debug, Clone, Default)]
struct FdsEnvelope {
    speed: u8,
    gain: u8,
    increase: bool,
    disabled: bool,
    timer: u32,
}

impl FdsEnvelope {
    fn write(&mut self, value: u8) {
        self.disabled = value & 0x80 != 0;
        self.increase = value & 0x40 != 0;
        self.speed = value & 0x3F;
        if self.disabled {
            self.gain = value & 0x3F;
        }
        self.timer = 0;
    }

    fn advance(&mut self, cycles: u32, master_speed: u8) {
        if self.disabled || master_speed == 0 {
            return;
        }
        let period = 8 * (self.speed as u32 + 1) * master_speed as u32;
        self.timer += cycles;
        while self.timer >= period {
            self.timer -= period;
            if self.increase {
                self.gain = (self.gain + 1).min(32);
            } else {
                self.gain = self.gain.saturating_sub(1);
            }
        }
    }
}

/// Pitch offset produced by the modulator, with the hardware's odd rounding.
fn modulated_pitch(pitch: u16, counter: i8, gain: u8) -> u32 {
    let mut temp = counter as i32 * gain as i32;
    let remainder = temp & 0x0F;
    temp >>= 4;
    if remainder > 0 && temp & 0x80 == 0 {
        temp += if counter < 0 { -1 } else { 2 };
    }
    if temp >= 192 {
        temp -= 256;
    } else if temp < -64 {
        temp += 256;
    }
    let mut offset = pitch as i32 * temp;
    let remainder = offset & 0x3F;
    offset >>= 6;
    if remainder >= 32 {
        offset += 1;
    }
    (pitch as i32 + offset).max(0) as u32
}

#[derive(Debug)]
pub struct Fds {
    wave: [u8; 64],
    wave_write: bool,
    wave_halt: bool,
    envelopes_halt: bool,
    pitch: u16,
    /// 22-bit phase, the top 6 bits index the wave
    wave_phase: u32,
    volume_env: FdsEnvelope,
    mod_env: FdsEnvelope,
    mod_table: [u8; 64],
    mod_pos: u8,
    mod_phase: u32,
    mod_freq: u16,
    mod_halt: bool,
    mod_counter: i8,
    master_volume: u8,
    master_env_speed: u8,
    time: u32,
    timing: TimingMode,
}

impl Fds {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            wave: [0; 64],
            wave_write: false,
            wave_halt: true,
            envelopes_halt: false,
            pitch: 0,
            wave_phase: 0,
            volume_env: FdsEnvelope::default(),
            mod_env: FdsEnvelope::default(),
            mod_table: [0; 64],
            mod_pos: 0,
            mod_phase: 0,
            mod_freq: 0,
            mod_halt: true,
            mod_counter: 0,
            master_volume: 0,
            master_env_speed: 0xE8,
            time: 0,
            timing,
        }
    }

    fn mod_enabled(&self) -> bool {
        !self.mod_halt && self.mod_freq > 0
    }

    fn is_sounding(&self) -> bool {
        !self.wave_halt && self.pitch > 0
    }

    fn current_pitch(&self) -> u32 {
        if self.mod_enabled() {
            modulated_pitch(self.pitch, self.mod_counter, self.mod_env.gain)
        } else {
            self.pitch as u32
        }
    }

    fn step_mod(&mut self) {
        let entry = self.mod_table[self.mod_pos as usize];
        self.mod_pos = (self.mod_pos + 1) & 0x3F;
        if entry == MOD_RESET {
            self.mod_counter = 0;
        } else {
            let next = self.mod_counter as i16 + MOD_BIAS[entry as usize] as i16;
            self.mod_counter = (((next + 64) & 0x7F) - 64) as i8;
        }
    }

    fn output(&self) -> i32 {
        let sample = self.wave[(self.wave_phase >> 16) as usize & 0x3F] as u32;
        let gain = self.volume_env.gain.min(32) as u32;
        let master = MASTER_VOLUME[self.master_volume as usize];
        (sample * gain * master / (32 * 30)) as i32
    }

    fn run_chunk(&mut self, cycles: u32) {
        if !self.envelopes_halt && !self.wave_halt {
            self.volume_env.advance(cycles, self.master_env_speed);
            self.mod_env.advance(cycles, self.master_env_speed);
        }
        if self.mod_enabled() {
            self.mod_phase += self.mod_freq as u32 * cycles;
            while self.mod_phase >= 0x10000 {
                self.mod_phase -= 0x10000;
                self.step_mod();
            }
        }
        if self.is_sounding() {
            self.wave_phase = (self.wave_phase + self.current_pitch() * cycles) & 0x3F_FFFF;
        }
    }
}

impl SoundChip for Fds {
    fn kind(&self) -> ChipKind {
        ChipKind::Fds
    }

    fn reset(&mut self) {
        *self = Self::new(self.timing);
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x4040..=0x407F => {
                if self.wave_write {
                    self.wave[(addr - 0x4040) as usize] = value & 0x3F;
                }
            }
            0x4080 => self.volume_env.write(value),
            0x4082 => self.pitch = (self.pitch & 0xF00) | value as u16,
            0x4083 => {
                self.pitch = (self.pitch & 0xFF) | ((value as u16 & 0x0F) << 8);
                self.wave_halt = value & 0x80 != 0;
                self.envelopes_halt = value & 0x40 != 0;
                if self.wave_halt {
                    self.wave_phase = 0;
                }
            }
            0x4084 => self.mod_env.write(value),
            0x4085 => self.mod_counter = (((value & 0x7F) as i8) << 1) >> 1,
            0x4086 => self.mod_freq = (self.mod_freq & 0xF00) | value as u16,
            0x4087 => {
                self.mod_freq = (self.mod_freq & 0xFF) | ((value as u16 & 0x0F) << 8);
                self.mod_halt = value & 0x80 != 0;
                if self.mod_halt {
                    self.mod_phase &= 0x3F_0000;
                }
            }
            0x4088 => {
                if self.mod_halt {
                    for _ in 0..2 {
                        self.mod_table[self.mod_pos as usize] = value & 0x07;
                        self.mod_pos = (self.mod_pos + 1) & 0x3F;
                    }
                }
            }
            0x4089 => {
                self.wave_write = value & 0x80 != 0;
                self.master_volume = value & 0x03;
            }
            0x408A => self.master_env_speed = value,
            _ => {}
        }
    }

    fn read(&mut self, addr: u16) -> Option<u8> {
        match addr {
            0x4040..=0x407F => Some(self.wave[(addr - 0x4040) as usize]),
            0x4090 => Some(self.volume_env.gain),
            0x4092 => Some(self.mod_env.gain),
            _ => None,
        }
    }

    fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        while time > 0 {
            let chunk = time.min(CHUNK_CYCLES);
            self.run_chunk(chunk);
            time -= chunk;
            self.time += chunk;
            mixer.add_value(ChannelId::Fds, self.output(), self.time);
        }
    }

    fn end_frame(&mut self) {
        self.time = 0;
    }

    fn frequency(&self, channel: usize) -> f64 {
        if channel != 0 || !self.is_sounding() {
            return 0.0;
        }
        self.timing.cpu_clock_hz() * self.current_pitch() as f64 / 4_194_304.0
    }

    fn min_period(&self) -> u32 {
        match self.current_pitch() {
            0 => u32::MAX,
            _ if !self.is_sounding() => u32::MAX,
            pitch => (0x10000 / pitch).max(1),
        }
    }

    fn register_key(&self, addr: u16) -> Option<u16> {
        matches!(addr, 0x4040..=0x408A).then_some(addr)
    }

    fn set_timing(&mut self, timing: TimingMode) {
        self.timing = timing;
    }
}
