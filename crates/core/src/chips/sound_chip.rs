//! Common interface of the sound chips driven by the APU dispatcher.

use crate::apu::{SequencerTick, TimingMode};
use crate::channels::ChipKind;
use crate::mixer::Mixer;

/// A sound chip mapped into the CPU address space.
///
/// Chips keep a frame-relative clock: [`process`](SoundChip::process) advances
/// it and stamps every output change reported to the mixer, and
/// [`end_frame`](SoundChip::end_frame) rewinds it to zero. Timestamps handed
/// to the mixer never go backwards within a frame.
pub trait SoundChip: Send {
    fn kind(&self) -> ChipKind;

    /// Return to power-on state
    fn reset(&mut self);

    /// Write a register. Addresses the chip does not decode are ignored.
    fn write(&mut self, addr: u16, value: u8);

    /// Read a register, `None` when the chip does not drive the bus there
    fn read(&mut self, addr: u16) -> Option<u8> {
        let _ = addr;
        None
    }

    /// Advance by `time` CPU cycles, reporting output changes to the mixer
    fn process(&mut self, time: u32, mixer: &mut Mixer);

    /// Rewind the frame-relative clock after the mixer closed a frame
    fn end_frame(&mut self);

    /// Current frequency of a channel in Hz, 0.0 when silent or unknown
    fn frequency(&self, channel: usize) -> f64;

    /// Shortest period among the sounding channels, in CPU cycles.
    /// `u32::MAX` when nothing is sounding.
    fn min_period(&self) -> u32;

    /// Called on every frame sequencer step, whether or not it clocks anything
    fn on_sequencer_tick(&mut self, tick: SequencerTick) {
        let _ = tick;
    }

    /// Key under which a write to `addr` is recorded by the register logger,
    /// `None` when the chip does not decode the address
    fn register_key(&self, addr: u16) -> Option<u16>;

    /// Switch between NTSC and PAL period tables
    fn set_timing(&mut self, timing: TimingMode) {
        let _ = timing;
    }
}
