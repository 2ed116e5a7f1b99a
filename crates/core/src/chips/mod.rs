//! Sound chip models.
//!
//! ## Building blocks
//!
//! - **Square**: 2A03 / MMC5 pulse with envelope, length counter and optional sweep
//! - **Triangle**: 32-step triangle with linear counter
//! - **Noise**: 15-bit LFSR noise
//! - **Dpcm**: delta modulation playback from [`SampleMemory`]
//!
//! ## Chips
//!
//! Every chip implements [`SoundChip`] and reports its output to the
//! [`Mixer`](crate::mixer::Mixer) with frame-relative timestamps.

pub mod apu2a03;
pub mod dpcm;
pub mod envelope;
pub mod fds;
pub mod length_counter;
pub mod mmc5;
pub mod n163;
pub mod noise;
pub mod s5b;
pub mod sn76489;
pub mod sound_chip;
pub mod square;
pub mod sweep;
pub mod triangle;
pub mod vrc6;
pub mod vrc7;

pub use apu2a03::Apu2A03;
pub use dpcm::{Dpcm, SampleMemory, SAMPLE_MEMORY_BASE, SAMPLE_MEMORY_SIZE};
pub use envelope::Envelope;
pub use fds::Fds;
pub use length_counter::{LengthCounter, LENGTH_TABLE};
pub use mmc5::Mmc5;
pub use n163::{N163, N163_RAM_SIZE};
pub use noise::Noise;
pub use s5b::S5b;
pub use sn76489::Sn76489;
pub use sound_chip::SoundChip;
pub use square::Square;
pub use sweep::Sweep;
pub use triangle::Triangle;
pub use vrc6::Vrc6;
pub use vrc7::Vrc7;

use crate::apu::TimingMode;
use crate::channels::ChipKind;
use crate::config::N163Mode;

/// Build a chip model in its power-on state
pub fn create_chip(kind: ChipKind, timing: TimingMode, n163_mode: N163Mode) -> Box<dyn SoundChip> {
    match kind {
        ChipKind::Apu2A03 => Box::new(Apu2A03::new(timing)),
        ChipKind::Vrc6 => Box::new(Vrc6::new(timing)),
        ChipKind::Vrc7 => Box::new(Vrc7::new(timing)),
        ChipKind::Fds => Box::new(Fds::new(timing)),
        ChipKind::Mmc5 => Box::new(Mmc5::new(timing)),
        ChipKind::N163 => Box::new(N163::new(timing, n163_mode)),
        ChipKind::S5b => Box::new(S5b::new(timing)),
        ChipKind::Sn76489 => Box::new(Sn76489::new(timing)),
    }
}
