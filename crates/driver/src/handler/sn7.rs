//! SN76489 tone and noise channels.

use super::groups::ChipGroups;
use super::state::ChannelState;
use super::{ChannelHandler, Tuning};
use crate::document::{Effect, EffectCommand};
use crate::note_table::PitchTable;
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

const PORT: u16 = 0x4028;
const LATCH: u8 = 0x80;
const VOLUME: u8 = 0x10;
const SILENT: u8 = 0x0F;
const NOISE_INDEX: u8 = 3;
/// Noise clocked by the third tone channel
const RATE_TONE3: u8 = 0x03;
const WHITE_NOISE: u8 = 0x04;

pub struct Sn7Handler {
    state: ChannelState,
    index: u8,
    /// Last noise control byte; writing it resets the shift register
    noise_control: Option<u8>,
    /// Routing requested by `Exy`, applied on the next refresh
    stereo: Option<(bool, bool)>,
}

impl Sn7Handler {
    pub fn new(channel: ChannelId, tuning: Arc<Tuning>) -> Self {
        let index = channel.subindex() as u8;
        let table = if index == NOISE_INDEX {
            PitchTable::Noise
        } else {
            PitchTable::Sn7
        };
        Self {
            state: ChannelState::new(channel, table, tuning),
            index,
            noise_control: None,
            stereo: None,
        }
    }

    fn latch(&self, volume: bool, low: u8) -> u8 {
        LATCH | self.index << 5 | if volume { VOLUME } else { 0 } | (low & 0x0F)
    }

    /// Noise control from the duty (bit 0 white, bit 1 tone 3) and the pitch
    fn noise_control(duty: u8, period: i32) -> u8 {
        let rate = if duty & 0x02 != 0 {
            RATE_TONE3
        } else {
            2 - ((period & 0x0F) as u8 * 3 / 16)
        };
        let white = if duty & 0x01 != 0 { WHITE_NOISE } else { 0 };
        white | rate
    }
}

impl ChannelHandler for Sn7Handler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn handle_effect(&mut self, effect: Effect) -> bool {
        match effect.command {
            // Exy: x routes left, y routes right
            EffectCommand::Sn7Stereo => {
                self.stereo = Some((effect.high() != 0, effect.low() != 0));
                true
            }
            _ => self.state.handle_effect(effect),
        }
    }

    fn refresh(&mut self, apu: &mut Apu, groups: &mut ChipGroups) {
        let trigger = self.state.take_trigger();
        if let Some((left, right)) = self.stereo.take() {
            groups.sn7.set_stereo(self.index as usize, left, right);
        }
        groups.sn7.flush(apu);

        let out = self.state.output();
        let attenuation = if out.audible {
            SILENT - out.volume.min(SILENT)
        } else {
            SILENT
        };
        if !out.audible {
            apu.write(PORT, self.latch(true, attenuation));
            return;
        }
        if self.index == NOISE_INDEX {
            let control = Self::noise_control(out.duty, out.period);
            if trigger || self.noise_control != Some(control) {
                self.noise_control = Some(control);
                apu.write(PORT, self.latch(false, control));
            }
        } else {
            let period = out.period.clamp(0, 0x3FF) as u16;
            apu.write(PORT, self.latch(false, (period & 0x0F) as u8));
            apu.write(PORT, ((period >> 4) & 0x3F) as u8);
        }
        apu.write(PORT, self.latch(true, attenuation));
    }

    fn clear_registers(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        apu.write(PORT, self.latch(true, SILENT));
        if self.index != NOISE_INDEX {
            apu.write(PORT, self.latch(false, 0));
            apu.write(PORT, 0);
        }
        self.noise_control = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::document::{ChannelNote, Document, Note};
    use fami_core::{ChipKind, EngineConfig, TimingMode};

    fn setup() -> (Apu, ChipGroups, Document, Arc<Tuning>) {
        let config = EngineConfig {
            chips: vec![ChipKind::Sn76489],
            ..Default::default()
        };
        let tuning = Arc::new(Tuning::new(TimingMode::Ntsc, 1, &DriverConfig::default()));
        (
            Apu::new(&config).unwrap(),
            ChipGroups::default(),
            Document::new(&[ChipKind::Sn76489]),
            tuning,
        )
    }

    #[test]
    fn tone_note_and_silence() {
        let (mut apu, mut groups, doc, tuning) = setup();
        let mut ch = Sn7Handler::new(ChannelId::Sn7Square2, tuning);
        ch.handle_note(&ChannelNote::play(57).with_volume(12), &doc);
        ch.process_tick(&doc);
        ch.refresh(&mut apu, &mut groups);
        let hz = apu.frequency(ChannelId::Sn7Square2);
        assert!((hz - 440.0).abs() < 2.0, "{hz}");
        assert_eq!(
            apu.register_log().value(ChipKind::Sn76489, PORT),
            Some(0x80 | 1 << 5 | 0x10 | 3)
        );

        ch.handle_note(&ChannelNote::EMPTY.with_note(Note::Halt), &doc);
        ch.process_tick(&doc);
        ch.refresh(&mut apu, &mut groups);
        assert_eq!(apu.frequency(ChannelId::Sn7Square2), 0.0);
    }

    #[test]
    fn noise_control_is_written_on_change_only() {
        assert_eq!(Sn7Handler::noise_control(0, 15), 0);
        assert_eq!(Sn7Handler::noise_control(0, 0), 2);
        assert_eq!(Sn7Handler::noise_control(1, 8), WHITE_NOISE | 1);
        assert_eq!(Sn7Handler::noise_control(2, 8), RATE_TONE3);

        let (mut apu, mut groups, doc, tuning) = setup();
        let mut noise = Sn7Handler::new(ChannelId::Sn7Noise, tuning);
        noise.handle_note(&ChannelNote::play(15), &doc);
        noise.process_tick(&doc);
        noise.refresh(&mut apu, &mut groups);
        assert_eq!(noise.noise_control, Some(0));
        assert!(apu.frequency(ChannelId::Sn7Noise) > 0.0);
    }

    #[test]
    fn stereo_effect_updates_the_shared_byte() {
        let (mut apu, mut groups, doc, tuning) = setup();
        let mut ch = Sn7Handler::new(ChannelId::Sn7Square1, tuning);
        ch.handle_note(
            &ChannelNote::play(48).with_effect(EffectCommand::Sn7Stereo, 0x10),
            &doc,
        );
        ch.process_tick(&doc);
        ch.refresh(&mut apu, &mut groups);
        assert_eq!(groups.sn7.stereo(), 0xFE);
        assert_eq!(apu.register_log().value(ChipKind::Sn76489, 0x4029), Some(0xFE));
    }
}
