//! Nonlinear combination of the 2A03 channel groups.
//!
//! The 2A03 DAC does not add its channels linearly. The two squares share
//! one resistor ladder and triangle, noise and DPCM share another, so each
//! group is recomputed as a whole whenever one member changes and only the
//! change of the combined output is handed to the band-limited buffer.

/// Combined output of the two square channels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PulseLevels {
    square1: u8,
    square2: u8,
}

impl PulseLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one square's 4-bit level (index 0 or 1)
    pub fn set(&mut self, index: usize, level: u8) {
        let level = level.min(15);
        match index {
            0 => self.square1 = level,
            _ => self.square2 = level,
        }
    }

    /// `95.88 / (8128 / (sq1 + sq2) + 100)`, 0 when both are silent
    pub fn output(&self) -> f64 {
        let sum = self.square1 as f64 + self.square2 as f64;
        if sum == 0.0 {
            0.0
        } else {
            95.88 / (8128.0 / sum + 100.0)
        }
    }
}

/// Combined output of triangle, noise and DPCM.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TndLevels {
    triangle: u8,
    noise: u8,
    dpcm: u8,
}

/// Member of the triangle/noise/DPCM group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TndInput {
    Triangle,
    Noise,
    Dpcm,
}

impl TndLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triangle and noise are 4-bit, DPCM is 7-bit
    pub fn set(&mut self, input: TndInput, level: u8) {
        match input {
            TndInput::Triangle => self.triangle = level.min(15),
            TndInput::Noise => self.noise = level.min(15),
            TndInput::Dpcm => self.dpcm = level.min(127),
        }
    }

    /// `159.79 / (1 / (t/8227 + n/12241 + d/22638) + 100)`, 0 when all are silent
    pub fn output(&self) -> f64 {
        let sum = self.triangle as f64 / 8227.0
            + self.noise as f64 / 12241.0
            + self.dpcm as f64 / 22638.0;
        if sum == 0.0 {
            0.0
        } else {
            159.79 / (1.0 / sum + 100.0)
        }
    }
}
