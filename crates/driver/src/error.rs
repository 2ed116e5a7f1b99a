use fami_core::{ChannelId, ConfigError, MixerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Mixer(#[from] MixerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("No document loaded")]
    NoDocument,
    #[error("Invalid N163 channel count: {0} (expected 1-8)")]
    InvalidChannelCount(u8),
    #[error("DPCM sample {index} ({len} bytes) does not fit in sample memory")]
    SampleMemoryFull { index: usize, len: usize },
    #[error("Channel {0:?} is not part of the song")]
    ChannelNotInSong(ChannelId),
    #[error("Player thread has stopped")]
    PlayerStopped,
    #[error("Failed to start the player thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Document error: {0}")]
    Document(String),
}
