//! Vibrato and tremolo lookup.
//!
//! One quarter sine wave of 16 steps per depth; the full 64-step cycle is
//! built by mirroring and inverting the quarter across quadrants.

use crate::config::VibratoStyle;

const NEW_DEPTHS: [f64; 16] = [
    1.0, 1.5, 2.5, 4.0, 5.0, 7.0, 10.0, 12.0, 14.0, 17.0, 22.0, 30.0, 44.0, 64.0, 96.0, 128.0,
];

const OLD_DEPTHS: [f64; 16] = [
    1.0, 1.0, 2.0, 3.0, 4.0, 7.0, 8.0, 15.0, 16.0, 31.0, 32.0, 63.0, 64.0, 127.0, 128.0, 255.0,
];

/// Steps in one vibrato cycle
pub const VIBRATO_PHASES: u8 = 64;

#[derive(Debug, Clone)]
pub struct VibratoTable {
    style: VibratoStyle,
    quarters: [[i32; 16]; 16],
}

impl VibratoTable {
    pub fn new(style: VibratoStyle) -> Self {
        let depths = match style {
            VibratoStyle::New => &NEW_DEPTHS,
            VibratoStyle::Old => &OLD_DEPTHS,
        };
        let quarters = std::array::from_fn(|depth| {
            std::array::from_fn(|step| {
                let angle = (step as f64 / 16.0) * std::f64::consts::FRAC_PI_2;
                (angle.sin() * depths[depth] + 0.5).floor() as i32
            })
        });
        Self { style, quarters }
    }

    pub fn style(&self) -> VibratoStyle {
        self.style
    }

    fn quarter(&self, depth: u8, phase: u8) -> i32 {
        let table = &self.quarters[(depth & 0x0F) as usize];
        let index = (phase & 0x0F) as usize;
        match (phase >> 4) & 0x03 {
            0 => table[index],
            1 => table[15 - index],
            2 => -table[index],
            _ => -table[15 - index],
        }
    }

    /// Pitch offset for a vibrato depth (1-15) at a phase; depth 0 is off
    pub fn vibrato(&self, depth: u8, phase: u8) -> i32 {
        if depth == 0 {
            return 0;
        }
        let value = self.quarter(depth, phase);
        match self.style {
            VibratoStyle::New => value,
            // upward only, half depth
            VibratoStyle::Old => (value + self.quarters[(depth & 0x0F) as usize][15] + 1) >> 1,
        }
    }

    /// Volume reduction in eighths of a volume step; never negative
    pub fn tremolo(&self, depth: u8, phase: u8) -> i32 {
        if depth == 0 {
            return 0;
        }
        // half speed over the positive half of the wave
        let phase = ((phase >> 1) & 0x1F) as usize;
        let index = if phase < 16 { phase } else { 31 - phase };
        self.quarters[(depth & 0x0F) as usize][index] >> 1
    }
}
