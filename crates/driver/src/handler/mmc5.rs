//! MMC5 squares. They take the 2A03 register format without the sweep unit.

use super::apu2a03::PulseVoice;
use super::groups::ChipGroups;
use super::state::ChannelState;
use super::{ChannelHandler, Tuning};
use crate::note_table::PitchTable;
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

pub struct Mmc5Handler {
    state: ChannelState,
    voice: PulseVoice,
}

impl Mmc5Handler {
    pub fn new(channel: ChannelId, tuning: Arc<Tuning>) -> Self {
        let base = 0x5000 + 4 * channel.subindex() as u16;
        Self {
            state: ChannelState::new(channel, PitchTable::Apu, tuning),
            voice: PulseVoice::new(base, false),
        }
    }
}

impl ChannelHandler for Mmc5Handler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn refresh(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        self.voice.refresh(apu, &mut self.state);
    }

    fn clear_registers(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        self.voice.clear(apu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::document::{ChannelNote, Document, Note};
    use crate::handler::init_registers;
    use fami_core::{ChipKind, EngineConfig, TimingMode};

    #[test]
    fn second_square_uses_the_upper_registers() {
        let config = EngineConfig {
            chips: vec![ChipKind::Mmc5],
            ..Default::default()
        };
        let mut apu = Apu::new(&config).unwrap();
        init_registers(&mut apu);
        let mut groups = ChipGroups::default();
        let doc = Document::new(&[ChipKind::Mmc5]);
        let tuning = Arc::new(Tuning::new(TimingMode::Ntsc, 1, &DriverConfig::default()));
        let mut square = Mmc5Handler::new(ChannelId::Mmc5Square2, tuning);

        square.handle_note(&ChannelNote::play(57).with_volume(8), &doc);
        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);
        let log = apu.register_log();
        assert_eq!(log.value(ChipKind::Mmc5, 0x5004), Some(0x38));
        assert_eq!(log.value(ChipKind::Mmc5, 0x5001), None);
        apu.add_time(apu.frame_length());
        apu.process();
        let hz = apu.frequency(ChannelId::Mmc5Square2);
        assert!((hz - 440.0).abs() < 2.0, "{hz}");

        square.handle_note(&ChannelNote::EMPTY.with_note(Note::Halt), &doc);
        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);
        assert_eq!(apu.register_log().value(ChipKind::Mmc5, 0x5004), Some(0x30));
    }
}
