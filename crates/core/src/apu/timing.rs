//! Machine timing for the two Famicom/NES regions.

use serde::{Deserialize, Serialize};

/// Console region timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum TimingMode {
    /// NTSC (North America, Japan) - 1.789773 MHz CPU clock
    #[default]
    Ntsc,
    /// PAL (Europe, Australia) - 1.662607 MHz CPU clock
    Pal,
}

impl TimingMode {
    /// CPU clock in whole cycles per second
    pub fn cpu_clock(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 1_789_773,
            TimingMode::Pal => 1_662_607,
        }
    }

    /// Get the CPU clock frequency in Hz for this timing mode
    pub fn cpu_clock_hz(&self) -> f64 {
        self.cpu_clock() as f64
    }

    /// Get the video frame rate in Hz for this timing mode
    pub fn frame_rate_hz(&self) -> f64 {
        match self {
            TimingMode::Ntsc => 60.0988,
            TimingMode::Pal => 50.0070,
        }
    }

    /// Nominal driver tick rate (ticks per second) used by tempo arithmetic
    pub fn tick_rate(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 60,
            TimingMode::Pal => 50,
        }
    }

    /// Get the frame sequencer frequency in Hz (240Hz NTSC, 200Hz PAL)
    pub fn frame_counter_hz(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 240,
            TimingMode::Pal => 200,
        }
    }

    /// Noise period table for the region, in CPU cycles
    pub fn noise_periods(&self) -> &'static [u16; 16] {
        match self {
            TimingMode::Ntsc => &NOISE_PERIODS_NTSC,
            TimingMode::Pal => &NOISE_PERIODS_PAL,
        }
    }

    /// DPCM rate table for the region, in CPU cycles per output bit
    pub fn dpcm_periods(&self) -> &'static [u16; 16] {
        match self {
            TimingMode::Ntsc => &DPCM_PERIODS_NTSC,
            TimingMode::Pal => &DPCM_PERIODS_PAL,
        }
    }
}

const NOISE_PERIODS_NTSC: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

const NOISE_PERIODS_PAL: [u16; 16] = [
    4, 8, 14, 30, 60, 88, 118, 148, 188, 236, 354, 472, 708, 944, 1890, 3778,
];

const DPCM_PERIODS_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

const DPCM_PERIODS_PAL: [u16; 16] = [
    398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pal_runs_slower_than_ntsc() {
        assert!(TimingMode::Pal.cpu_clock() < TimingMode::Ntsc.cpu_clock());
        assert_eq!(TimingMode::Ntsc.tick_rate(), 60);
        assert_eq!(TimingMode::Pal.tick_rate(), 50);
    }

    #[test]
    fn rate_tables_are_monotonic() {
        for mode in [TimingMode::Ntsc, TimingMode::Pal] {
            assert!(mode.noise_periods().windows(2).all(|w| w[0] < w[1]));
            assert!(mode.dpcm_periods().windows(2).all(|w| w[0] > w[1]));
        }
    }

    #[test]
    fn timing_serializes_by_name() {
        let json = serde_json::to_string(&TimingMode::Pal).unwrap();
        assert_eq!(json, "\"Pal\"");
    }
}
