//! Channel handlers: one per tracker channel, turning rows into register writes.
//!
//! Every handler wraps a [`ChannelState`] that runs the chip independent
//! tracker logic (notes, slides, delayed effects, sequences). The
//! [`ChannelHandler`] trait supplies that part through default methods, and
//! each chip family implements the register side: its own effects,
//! instrument voice data, `refresh` and `clear_registers`.
//!
//! Chips whose channels share registers (5B mixer and envelope, SN76489
//! stereo byte, N163 channel count and wave RAM) keep that state in
//! [`ChipGroups`], which the driver passes to every refresh.

pub mod apu2a03;
pub mod effects;
pub mod fds;
pub mod groups;
pub mod mmc5;
pub mod n163;
pub mod s5b;
pub mod sn7;
pub mod state;
pub mod vrc6;
pub mod vrc7;

pub use apu2a03::{Apu2A03Handler, DpcmHandler};
pub use effects::VibratoTable;
pub use fds::FdsHandler;
pub use groups::{ChipGroups, N163Context, S5bContext, Sn7Context};
pub use mmc5::Mmc5Handler;
pub use n163::N163Handler;
pub use s5b::S5bHandler;
pub use sn7::Sn7Handler;
pub use state::{ChannelOutput, ChannelState, Gate};
pub use vrc6::Vrc6Handler;
pub use vrc7::Vrc7Handler;

use crate::config::DriverConfig;
use crate::document::{ChannelNote, Document, Effect};
use crate::instrument::Instrument;
use crate::note_table::NoteTables;
use fami_core::logging::{log, LogCategory, LogLevel};
use fami_core::{Apu, ChannelId, ChipKind, TimingMode};
use std::sync::Arc;

/// Pitch lookup shared by every channel
#[derive(Debug, Clone)]
pub struct Tuning {
    pub tables: NoteTables,
    pub vibrato: VibratoTable,
    pub linear_pitch: bool,
    pub echo_depth: usize,
}

impl Tuning {
    pub fn new(timing: TimingMode, n163_channels: u8, config: &DriverConfig) -> Self {
        Self {
            tables: NoteTables::new(timing, n163_channels),
            vibrato: VibratoTable::new(config.vibrato_style),
            linear_pitch: config.linear_pitch,
            echo_depth: config.echo_depth,
        }
    }
}

pub trait ChannelHandler: Send {
    fn state(&self) -> &ChannelState;
    fn state_mut(&mut self) -> &mut ChannelState;

    fn channel(&self) -> ChannelId {
        self.state().channel()
    }

    /// Apply an effect column. Returns `false` when the channel has no use for it.
    fn handle_effect(&mut self, effect: Effect) -> bool {
        self.state_mut().handle_effect(effect)
    }

    /// Take the chip specific voice data of an instrument
    fn load_instrument(&mut self, instrument: &Instrument) {
        let _ = instrument;
    }

    /// Called once the row's note has been applied to the state
    fn on_row(&mut self, row: &ChannelNote, doc: &Document) {
        let _ = (row, doc);
    }

    /// Feed a row; a `Gxx` effect holds it back for a few ticks
    fn handle_note(&mut self, row: &ChannelNote, doc: &Document) {
        let (stored, pending) = self.state_mut().delay_row(row);
        if let Some(pending) = pending {
            self.play_row(&pending, doc);
        }
        if !stored {
            self.play_row(row, doc);
        }
    }

    fn play_row(&mut self, row: &ChannelNote, doc: &Document) {
        for effect in row.effects().filter(|e| !e.command.is_global()) {
            if !self.handle_effect(effect) {
                let channel = self.channel();
                log(LogCategory::Stubs, LogLevel::Trace, || {
                    format!("{}: effect {} ignored", channel.short_name(), effect)
                });
            }
        }
        if let Some(index) = row.instrument {
            match doc.instrument(index) {
                Some(instrument) => {
                    self.state_mut().load_instrument(index, instrument);
                    self.load_instrument(instrument);
                }
                None => log(LogCategory::Driver, LogLevel::Debug, || {
                    format!("instrument {index:02X} does not exist")
                }),
            }
        }
        self.state_mut().apply_row(row);
        self.on_row(row, doc);
    }

    /// Advance one tick
    fn process_tick(&mut self, doc: &Document) {
        if let Some(row) = self.state_mut().tick_delay() {
            self.play_row(&row, doc);
        }
        self.state_mut().process_tick();
    }

    /// Write this tick's registers; a silent pattern when the gate is closed
    fn refresh(&mut self, apu: &mut Apu, groups: &mut ChipGroups);

    /// Put the channel's registers in their silent state
    fn clear_registers(&mut self, apu: &mut Apu, groups: &mut ChipGroups);

    fn reset(&mut self) {
        self.state_mut().reset();
    }

    fn set_tuning(&mut self, tuning: Arc<Tuning>) {
        self.state_mut().set_tuning(tuning);
    }
}

/// Power-on writes: enable the length counters of the 2A03 and MMC5
/// squares, triangle and noise, and put the frame counter in 4-step mode
/// with its IRQ off. Writes to inactive chips are dropped by the APU.
pub fn init_registers(apu: &mut Apu) {
    apu.write(0x4015, 0x0F);
    apu.write(0x4017, 0x40);
    apu.write(0x5015, 0x03);
}

/// Handler for a tracker channel; `None` for channels without a column
pub fn create_handler(channel: ChannelId, tuning: Arc<Tuning>) -> Option<Box<dyn ChannelHandler>> {
    let handler: Box<dyn ChannelHandler> = match channel.chip() {
        ChipKind::Apu2A03 if channel == ChannelId::Dpcm => Box::new(DpcmHandler::new(tuning)),
        ChipKind::Apu2A03 => Box::new(Apu2A03Handler::new(channel, tuning)),
        ChipKind::Vrc6 => Box::new(Vrc6Handler::new(channel, tuning)),
        ChipKind::Mmc5 if channel == ChannelId::Mmc5Pcm => return None,
        ChipKind::Mmc5 => Box::new(Mmc5Handler::new(channel, tuning)),
        ChipKind::Fds => Box::new(FdsHandler::new(tuning)),
        ChipKind::N163 => Box::new(N163Handler::new(channel, tuning)),
        ChipKind::Vrc7 => Box::new(Vrc7Handler::new(channel, tuning)),
        ChipKind::S5b => Box::new(S5bHandler::new(channel, tuning)),
        ChipKind::Sn76489 => Box::new(Sn7Handler::new(channel, tuning)),
    };
    Some(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fami_core::EngineConfig;

    fn tuning() -> Arc<Tuning> {
        Arc::new(Tuning::new(TimingMode::Ntsc, 8, &DriverConfig::default()))
    }

    #[test]
    fn every_column_gets_a_handler() {
        let doc = Document::new(&ChipKind::ALL);
        for channel in doc.channels() {
            let handler = create_handler(channel, tuning()).unwrap();
            assert_eq!(handler.channel(), channel);
        }
        assert!(create_handler(ChannelId::Mmc5Pcm, tuning()).is_none());
    }

    #[test]
    fn idle_handlers_only_write_silence() {
        let config = EngineConfig {
            chips: ChipKind::ALL.to_vec(),
            ..Default::default()
        };
        let mut apu = Apu::new(&config).unwrap();
        let mut groups = ChipGroups::default();
        let doc = Document::new(&ChipKind::ALL);
        for channel in doc.channels() {
            let mut handler = create_handler(channel, tuning()).unwrap();
            handler.process_tick(&doc);
            handler.refresh(&mut apu, &mut groups);
        }
        apu.add_time(apu.frame_length());
        apu.process();
        for channel in doc.channels() {
            assert_eq!(apu.frequency(channel), 0.0, "{channel:?} sounds while idle");
        }
    }

    #[test]
    fn unsupported_effects_are_ignored() {
        let doc = Document::new(&[]);
        let mut handler = create_handler(ChannelId::Triangle, tuning()).unwrap();
        let row = ChannelNote::play(48)
            .with_effect(crate::document::EffectCommand::FdsModDepth, 0x10)
            .with_effect(crate::document::EffectCommand::Vibrato, 0x11);
        handler.handle_note(&row, &doc);
        assert_eq!(handler.state().note(), 48);
        assert!(handler.state().gate().is_audible());
    }
}
