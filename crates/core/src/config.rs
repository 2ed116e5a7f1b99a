//! Engine configuration, persisted as JSON.

use crate::apu::TimingMode;
use crate::channels::{ChipKind, ChipSet};
use crate::mixer::MixerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Supported output sample rates, inclusive
pub const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 11_025..=96_000;

/// Allowed per-chip level trim in decibels, inclusive
pub const CHIP_LEVEL_RANGE_DB: std::ops::RangeInclusive<f32> = -12.0..=12.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Chip level for {chip:?} out of range: {db} dB")]
    InvalidLevel { chip: ChipKind, db: f32 },
    #[error("Invalid filter corners: low cut {low_cut} Hz, high cut {high_cut} Hz")]
    InvalidFilter { low_cut: f32, high_cut: f32 },
    #[error("Low-pass corner for {chip:?} out of range: {hz} Hz")]
    InvalidLowPass { chip: ChipKind, hz: f32 },
    #[error(transparent)]
    Mixer(#[from] MixerError),
}

/// How the N163 time-multiplexes its channels onto the single DAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum N163Mode {
    /// Hardware behaviour: one channel drives the output per 15-cycle slot
    #[default]
    Multiplexed,
    /// Averages all active channels, avoiding the multiplexing whine
    Linear,
}

/// What the N163 does with a wave whose sample range reaches into the
/// channel register area at the top of its RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum N163WavePolicy {
    /// Wrap the wave back into the free area below the registers
    #[default]
    Clamp,
    /// Read whatever the RAM holds, registers included
    Allow,
}

/// Level meter falloff after the hold delay expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeterDecay {
    /// Drop to zero at once
    #[default]
    Fast,
    /// Fall off by a fixed amount per frame
    Slow,
}

/// Runtime configuration consumed by the APU and mixer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub machine: TimingMode,
    /// Expansion chips; the 2A03 is always present
    pub chips: Vec<ChipKind>,
    pub sample_rate: u32,
    /// 1 for mono, 2 for interleaved stereo
    pub channels: u8,
    pub master_volume: f32,
    /// Per-chip trim in decibels
    pub chip_levels_db: BTreeMap<ChipKind, f32>,
    /// Per-chip low-pass corner in Hz, overriding the chip's default.
    /// Zero turns the chip's filter off.
    pub chip_low_pass_hz: BTreeMap<ChipKind, f32>,
    /// High-pass (DC blocking) corner in Hz
    pub low_cut_hz: f32,
    /// Low-pass corner in Hz
    pub high_cut_hz: f32,
    pub n163_mode: N163Mode,
    pub meter_decay: MeterDecay,
    /// Keep auto-FM modulation tracking the carrier while a modulation delay
    /// is pending. Off by default: auto-FM starts with the delayed modulation.
    pub fds_auto_fm_during_delay: bool,
    pub n163_wave_policy: N163WavePolicy,
}

/// Output filter of each chip's board, before the global filters
pub fn default_low_pass_hz(chip: ChipKind) -> Option<f32> {
    match chip {
        ChipKind::Vrc6 => Some(12_000.0),
        ChipKind::Fds => Some(2_000.0),
        ChipKind::Mmc5 => Some(12_000.0),
        ChipKind::N163 => Some(12_000.0),
        ChipKind::S5b => Some(12_000.0),
        ChipKind::Apu2A03 | ChipKind::Vrc7 | ChipKind::Sn76489 => None,
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            machine: TimingMode::Ntsc,
            chips: vec![ChipKind::Apu2A03],
            sample_rate: 48_000,
            channels: 1,
            master_volume: 1.0,
            chip_levels_db: BTreeMap::new(),
            chip_low_pass_hz: BTreeMap::new(),
            low_cut_hz: 16.0,
            high_cut_hz: 12_000.0,
            n163_mode: N163Mode::Multiplexed,
            meter_decay: MeterDecay::Fast,
            fds_auto_fm_during_delay: false,
            n163_wave_policy: N163WavePolicy::Clamp,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(MixerError::UnsupportedSampleRate(self.sample_rate).into());
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(MixerError::UnsupportedChannelCount(self.channels).into());
        }
        for (&chip, &db) in &self.chip_levels_db {
            if !CHIP_LEVEL_RANGE_DB.contains(&db) {
                return Err(ConfigError::InvalidLevel { chip, db });
            }
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        for (&chip, &hz) in &self.chip_low_pass_hz {
            if !(0.0..=nyquist).contains(&hz) {
                return Err(ConfigError::InvalidLowPass { chip, hz });
            }
        }
        if self.low_cut_hz < 0.0
            || self.high_cut_hz <= self.low_cut_hz
            || self.high_cut_hz > nyquist
        {
            return Err(ConfigError::InvalidFilter {
                low_cut: self.low_cut_hz,
                high_cut: self.high_cut_hz,
            });
        }
        Ok(())
    }

    /// Enabled chips as a set, always including the 2A03
    pub fn chip_set(&self) -> ChipSet {
        ChipSet::from_kinds(&self.chips).with(ChipKind::Apu2A03)
    }

    /// Level trim for a chip in decibels
    pub fn chip_level_db(&self, chip: ChipKind) -> f32 {
        self.chip_levels_db.get(&chip).copied().unwrap_or(0.0)
    }

    /// Low-pass corner applied to a chip's output, if any
    pub fn chip_low_pass_hz(&self, chip: ChipKind) -> Option<f32> {
        match self.chip_low_pass_hz.get(&chip) {
            Some(&hz) if hz > 0.0 => Some(hz),
            Some(_) => None,
            None => default_low_pass_hz(chip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.chip_set().contains(ChipKind::Apu2A03));
    }

    #[test]
    fn rejects_unsupported_sample_rate_and_channels() {
        let config = EngineConfig {
            sample_rate: 8_000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Mixer(MixerError::UnsupportedSampleRate(8_000)))
        ));

        let config = EngineConfig {
            channels: 6,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Mixer(MixerError::UnsupportedChannelCount(6)))
        ));
    }

    #[test]
    fn rejects_out_of_range_levels_and_filters() {
        let mut config = EngineConfig::default();
        config.chip_levels_db.insert(ChipKind::Vrc6, 20.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLevel {
                chip: ChipKind::Vrc6,
                ..
            })
        ));

        let config = EngineConfig {
            low_cut_hz: 500.0,
            high_cut_hz: 400.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "machine": "Pal", "chips": ["Vrc6", "N163"] }"#).unwrap();
        assert_eq!(config.machine, TimingMode::Pal);
        assert_eq!(config.sample_rate, 48_000);
        assert!(config.chip_set().contains(ChipKind::Apu2A03));
        assert!(config.chip_set().contains(ChipKind::N163));
    }

    #[test]
    fn chip_low_pass_defaults_and_overrides() {
        let mut config = EngineConfig::default();
        assert_eq!(config.chip_low_pass_hz(ChipKind::Fds), Some(2_000.0));
        assert_eq!(config.chip_low_pass_hz(ChipKind::Apu2A03), None);

        config.chip_low_pass_hz.insert(ChipKind::N163, 4_000.0);
        config.chip_low_pass_hz.insert(ChipKind::Vrc6, 0.0);
        assert!(config.validate().is_ok());
        assert_eq!(config.chip_low_pass_hz(ChipKind::N163), Some(4_000.0));
        assert_eq!(config.chip_low_pass_hz(ChipKind::Vrc6), None);

        config.chip_low_pass_hz.insert(ChipKind::S5b, 30_000.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLowPass { chip: ChipKind::S5b, .. })
        ));
    }

    #[test]
    fn save_and_load_file() {
        let mut config = EngineConfig {
            channels: 2,
            meter_decay: MeterDecay::Slow,
            ..Default::default()
        };
        config.chip_levels_db.insert(ChipKind::Fds, -3.0);

        let path = std::env::temp_dir().join(format!("fami_config_{}.json", std::process::id()));
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
        assert_eq!(loaded.chip_level_db(ChipKind::Fds), -3.0);
        assert_eq!(loaded.chip_level_db(ChipKind::Vrc7), 0.0);
    }
}
