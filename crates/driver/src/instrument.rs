//! Instruments: sequences plus chip specific voice data.

use crate::sequence::{Sequence, SequenceKind, SequenceSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FDS_WAVE_SIZE: usize = 64;
pub const FDS_MOD_SIZE: usize = 32;
pub const VRC7_CUSTOM_PATCH: u8 = 0;

/// Sample played for one note of a 2A03 instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpcmAssignment {
    pub sample: usize,
    /// Rate index, 0-15
    pub pitch: u8,
    pub looping: bool,
    /// Initial DAC value written before the sample starts
    pub delta: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstrumentData {
    /// 2A03, VRC6, MMC5, 5B and SN76489 voices; the DPCM map is only used by
    /// the DPCM channel
    Standard {
        #[serde(default)]
        dpcm: BTreeMap<u8, DpcmAssignment>,
    },
    Vrc7 {
        /// Built-in patch 1-15, or 0 for the custom patch
        patch: u8,
        custom: [u8; 8],
    },
    Fds {
        /// 64 samples, 0-63
        wave: Vec<u8>,
        /// 32 modulation table entries, 0-7
        modulation: Vec<u8>,
        mod_speed: u16,
        mod_depth: u8,
        /// Ticks before modulation starts
        mod_delay: u8,
    },
    N163 {
        /// 4-bit samples of every wave
        waves: Vec<Vec<u8>>,
        /// Samples per wave, a multiple of 4
        wave_size: u8,
        /// Sample address of the wave in chip RAM
        wave_position: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    #[serde(default)]
    pub sequences: SequenceSet,
    pub data: InstrumentData,
}

impl Instrument {
    pub fn standard(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sequences: Default::default(),
            data: InstrumentData::Standard {
                dpcm: BTreeMap::new(),
            },
        }
    }

    pub fn vrc7(name: &str, patch: u8) -> Self {
        Self {
            name: name.to_string(),
            sequences: Default::default(),
            data: InstrumentData::Vrc7 {
                patch: patch & 0x0F,
                custom: [0; 8],
            },
        }
    }

    /// FDS voice with a sine-like default wave
    pub fn fds(name: &str) -> Self {
        let wave = (0..FDS_WAVE_SIZE)
            .map(|i| {
                let angle = i as f64 / FDS_WAVE_SIZE as f64 * std::f64::consts::TAU;
                (31.5 + 31.5 * angle.sin()).round() as u8
            })
            .collect();
        Self {
            name: name.to_string(),
            sequences: Default::default(),
            data: InstrumentData::Fds {
                wave,
                modulation: vec![0; FDS_MOD_SIZE],
                mod_speed: 0,
                mod_depth: 0,
                mod_delay: 0,
            },
        }
    }

    /// N163 voice with a single wave
    pub fn n163(name: &str, wave: &[u8], wave_position: u8) -> Self {
        let size = (wave.len().clamp(4, 252) / 4 * 4) as u8;
        let mut samples = wave.to_vec();
        samples.resize(size as usize, 0);
        Self {
            name: name.to_string(),
            sequences: Default::default(),
            data: InstrumentData::N163 {
                waves: vec![samples],
                wave_size: size,
                wave_position,
            },
        }
    }

    pub fn with_sequence(mut self, kind: SequenceKind, sequence: Sequence) -> Self {
        self.sequences[kind.index()] = Some(sequence);
        self
    }

    pub fn with_dpcm(mut self, note: u8, assignment: DpcmAssignment) -> Self {
        if let InstrumentData::Standard { dpcm } = &mut self.data {
            dpcm.insert(note, assignment);
        }
        self
    }

    pub fn dpcm(&self, note: u8) -> Option<&DpcmAssignment> {
        match &self.data {
            InstrumentData::Standard { dpcm } => dpcm.get(&note),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fds_wave_spans_full_range() {
        let inst = Instrument::fds("sine");
        let InstrumentData::Fds { wave, .. } = &inst.data else {
            panic!("not an FDS instrument");
        };
        assert_eq!(wave.len(), FDS_WAVE_SIZE);
        assert_eq!(*wave.iter().max().unwrap(), 63);
        assert_eq!(*wave.iter().min().unwrap(), 0);
    }

    #[test]
    fn n163_wave_size_rounds_to_four() {
        let inst = Instrument::n163("saw", &[0, 2, 4, 6, 8, 10, 12], 0);
        let InstrumentData::N163 { waves, wave_size, .. } = &inst.data else {
            panic!("not an N163 instrument");
        };
        assert_eq!(*wave_size, 4);
        assert_eq!(waves[0].len(), 4);
    }

    #[test]
    fn dpcm_map_only_on_standard_instruments() {
        let assignment = DpcmAssignment {
            sample: 0,
            pitch: 15,
            looping: false,
            delta: None,
        };
        let inst = Instrument::standard("drums").with_dpcm(36, assignment);
        assert_eq!(inst.dpcm(36), Some(&assignment));
        assert_eq!(inst.dpcm(37), None);
        assert_eq!(Instrument::vrc7("fm", 3).with_dpcm(36, assignment).dpcm(36), None);
    }
}
