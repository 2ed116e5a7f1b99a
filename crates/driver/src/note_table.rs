//! Note to register value tables for every chip.
//!
//! Tables are computed from equal temperament with A-4 = 440 Hz and the
//! CPU clock of the machine, so NTSC and PAL each get their own set.

use crate::document::NOTE_COUNT;
use fami_core::TimingMode;

const A4_NOTE: i32 = 57;
const A4_HZ: f64 = 440.0;

/// Linear pitch resolution: steps per semitone
pub const LINEAR_STEPS: i32 = 32;

const VRC7_MAX_FNUM: i32 = 0x1FF;

/// Which register format a channel's pitch is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchTable {
    /// 2A03, MMC5 and VRC6 pulse timers (11/12-bit period)
    Apu,
    /// VRC6 sawtooth, 14 steps per cycle
    Sawtooth,
    /// FDS 12-bit pitch
    Fds,
    /// N163 frequency per wave sample (scaled by the wave length on write)
    N163,
    /// VRC7 F-number shifted left by its block, so slides cross octaves
    Vrc7,
    /// Sunsoft 5B tone period
    S5b,
    /// SN76489 10-bit tone period
    Sn7,
    /// Noise rate index 0-15, higher is brighter
    Noise,
}

impl PitchTable {
    /// Period based tables count down as pitch rises
    pub fn is_inverted(self) -> bool {
        matches!(
            self,
            PitchTable::Apu | PitchTable::Sawtooth | PitchTable::S5b | PitchTable::Sn7
        )
    }

    pub fn max_period(self) -> i32 {
        match self {
            PitchTable::Apu => 0x7FF,
            PitchTable::Sawtooth | PitchTable::Fds | PitchTable::S5b => 0xFFF,
            PitchTable::N163 => 0xFFFF,
            PitchTable::Vrc7 => VRC7_MAX_FNUM << 7,
            PitchTable::Sn7 => 0x3FF,
            PitchTable::Noise => 0x0F,
        }
    }
}

pub fn note_hz(note: i32) -> f64 {
    A4_HZ * 2f64.powf((note - A4_NOTE) as f64 / 12.0)
}

#[derive(Debug, Clone)]
pub struct NoteTables {
    timing: TimingMode,
    n163_channels: u8,
    apu: [u16; NOTE_COUNT as usize],
    sawtooth: [u16; NOTE_COUNT as usize],
    fds: [u16; NOTE_COUNT as usize],
    n163: [u16; NOTE_COUNT as usize],
    s5b: [u16; NOTE_COUNT as usize],
    sn7: [u16; NOTE_COUNT as usize],
    vrc7: [u16; 12],
}

fn build(max: i32, f: impl Fn(f64) -> f64) -> [u16; NOTE_COUNT as usize] {
    std::array::from_fn(|note| f(note_hz(note as i32)).round().clamp(0.0, max as f64) as u16)
}

impl NoteTables {
    pub fn new(timing: TimingMode, n163_channels: u8) -> Self {
        let clock = timing.cpu_clock_hz();
        let n163_channels = n163_channels.clamp(1, 8);
        let fm_rate = clock / 36.0;
        Self {
            timing,
            n163_channels,
            apu: build(0x7FF, |hz| clock / (16.0 * hz) - 1.0),
            sawtooth: build(0xFFF, |hz| clock / (14.0 * hz) - 1.0),
            fds: build(0xFFF, |hz| hz * 4_194_304.0 / clock),
            n163: build(0xFFFF, |hz| hz * 15.0 * 65_536.0 * n163_channels as f64 / clock),
            s5b: build(0xFFF, |hz| clock / (32.0 * hz)),
            sn7: build(0x3FF, |hz| clock / (32.0 * hz)),
            vrc7: std::array::from_fn(|semitone| {
                // Octave 4 uses block 4
                let hz = note_hz(48 + semitone as i32);
                (hz * 262_144.0 / (fm_rate * 8.0)).round() as u16
            }),
        }
    }

    pub fn timing(&self) -> TimingMode {
        self.timing
    }

    pub fn n163_channels(&self) -> u8 {
        self.n163_channels
    }

    /// Register value of a note; VRC7 returns `fnum << block`
    pub fn period(&self, table: PitchTable, note: u8) -> i32 {
        let note = note.min(NOTE_COUNT - 1) as usize;
        match table {
            PitchTable::Apu => self.apu[note] as i32,
            PitchTable::Sawtooth => self.sawtooth[note] as i32,
            PitchTable::Fds => self.fds[note] as i32,
            PitchTable::N163 => self.n163[note] as i32,
            PitchTable::S5b => self.s5b[note] as i32,
            PitchTable::Sn7 => self.sn7[note] as i32,
            PitchTable::Vrc7 => (self.vrc7[note % 12] as i32) << (note / 12).min(7),
            PitchTable::Noise => (note % 16) as i32,
        }
    }

    /// VRC7 block (octave) of a note
    pub fn vrc7_block(note: u8) -> u8 {
        (note.min(NOTE_COUNT - 1) / 12).min(7)
    }

    /// Split a shifted VRC7 value into the lowest block that holds it and its F-number
    pub fn split_vrc7(value: i32) -> (u8, u16) {
        let value = value.clamp(0, PitchTable::Vrc7.max_period());
        let block = (0..=7u8)
            .find(|&block| value >> block <= VRC7_MAX_FNUM)
            .unwrap_or(7);
        (block, (value >> block) as u16)
    }

    /// Register value at a linear pitch position (`note * LINEAR_STEPS + fraction`)
    pub fn linear_period(&self, table: PitchTable, position: i32) -> i32 {
        let max = (NOTE_COUNT as i32 - 1) * LINEAR_STEPS;
        let position = position.clamp(0, max);
        let note = (position / LINEAR_STEPS) as u8;
        let fraction = position % LINEAR_STEPS;
        let low = self.period(table, note);
        if fraction == 0 {
            return low;
        }
        let high = self.period(table, note + 1);
        low + (high - low) * fraction / LINEAR_STEPS
    }
}
