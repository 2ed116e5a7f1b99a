//! Sound engine core: chip models, the APU dispatcher and the mixer.
//!
//! The 2A03 is always present. Any mix of VRC6, VRC7, FDS, MMC5, N163,
//! Sunsoft 5B and SN76489 can be enabled next to it. A driver feeds the
//! [`Apu`] with register writes and CPU cycles; the [`Mixer`] turns chip
//! output into 16-bit PCM.

pub mod apu;
pub mod channels;
pub mod chips;
pub mod config;
pub mod logging;
pub mod mixer;

pub use apu::{Apu, FrameSequencer, RegisterLog, SequencerTick, TimingMode};
pub use channels::{ChannelId, ChipKind, ChipSet, CHANNEL_COUNT};
pub use chips::{create_chip, SoundChip};
pub use config::{ConfigError, EngineConfig, MeterDecay, N163Mode, N163WavePolicy};
pub use mixer::{Mixer, MixerError};

/// One 16-bit PCM sample
pub type AudioSample = i16;
