//! Driver options and the combined player configuration file.

use fami_core::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Vibrato table shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VibratoStyle {
    /// Bipolar sine around the note
    #[default]
    New,
    /// Older trackers: offset only upwards, half depth
    Old,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub vibrato_style: VibratoStyle,
    /// Pitch effects move in fixed fractions of a semitone instead of period units
    pub linear_pitch: bool,
    /// `Fxx` values below this set the speed, the rest set the tempo
    pub speed_split: u8,
    /// Notes remembered for echo (`^n`) notes
    pub echo_depth: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            vibrato_style: VibratoStyle::New,
            linear_pitch: false,
            speed_split: 0x20,
            echo_depth: 4,
        }
    }
}

/// Everything the player reads from its settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub engine: EngineConfig,
    pub driver: DriverConfig,
}

impl PlayerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
