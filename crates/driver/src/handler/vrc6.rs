//! VRC6 pulses and sawtooth.

use super::groups::ChipGroups;
use super::state::ChannelState;
use super::{ChannelHandler, Tuning};
use crate::note_table::PitchTable;
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

const ENABLE: u8 = 0x80;
/// Duty values from 8 up play the pulse as a constant level
const DIGITIZED: u8 = 0x08;

pub struct Vrc6Handler {
    state: ChannelState,
    base: u16,
}

impl Vrc6Handler {
    pub fn new(channel: ChannelId, tuning: Arc<Tuning>) -> Self {
        let (base, table) = match channel {
            ChannelId::Vrc6Pulse1 => (0x9000, PitchTable::Apu),
            ChannelId::Vrc6Pulse2 => (0xA000, PitchTable::Apu),
            _ => (0xB000, PitchTable::Sawtooth),
        };
        Self {
            state: ChannelState::new(channel, table, tuning),
            base,
        }
    }

    fn is_sawtooth(&self) -> bool {
        self.base == 0xB000
    }

    fn control(&self, volume: u8, duty: u8) -> u8 {
        if self.is_sawtooth() {
            // accumulator rate; duty bit 0 doubles the resolution
            ((volume << 1) | (duty & 0x01)) & 0x3F
        } else {
            let digitized = if duty & DIGITIZED != 0 { 0x80 } else { 0x00 };
            digitized | (duty & 0x07) << 4 | volume
        }
    }
}

impl ChannelHandler for Vrc6Handler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn refresh(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        self.state.take_trigger();
        let out = self.state.output();
        let high = ((out.period >> 8) & 0x0F) as u8;
        if !out.audible {
            apu.write(self.base, self.control(0, out.duty));
            apu.write(self.base + 2, high);
            return;
        }
        apu.write(self.base, self.control(out.volume, out.duty));
        apu.write(self.base + 1, (out.period & 0xFF) as u8);
        apu.write(self.base + 2, ENABLE | high);
    }

    fn clear_registers(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        apu.write(self.base, 0);
        apu.write(self.base + 1, 0);
        apu.write(self.base + 2, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::document::{ChannelNote, Document, EffectCommand, Note};
    use fami_core::{ChipKind, EngineConfig, TimingMode};

    fn setup() -> (Apu, ChipGroups, Document, Arc<Tuning>) {
        let config = EngineConfig {
            chips: vec![ChipKind::Vrc6],
            ..Default::default()
        };
        let tuning = Arc::new(Tuning::new(TimingMode::Ntsc, 1, &DriverConfig::default()));
        (
            Apu::new(&config).unwrap(),
            ChipGroups::default(),
            Document::new(&[ChipKind::Vrc6]),
            tuning,
        )
    }

    fn reg(apu: &Apu, addr: u16) -> Option<u8> {
        apu.register_log().value(ChipKind::Vrc6, addr)
    }

    #[test]
    fn pulse_duty_and_volume() {
        let (mut apu, mut groups, doc, tuning) = setup();
        let mut pulse = Vrc6Handler::new(ChannelId::Vrc6Pulse2, tuning);
        let row = ChannelNote::play(48)
            .with_volume(10)
            .with_effect(EffectCommand::DutyCycle, 3);
        pulse.handle_note(&row, &doc);
        pulse.process_tick(&doc);
        pulse.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0xA000), Some(0x3A));
        assert_eq!(reg(&apu, 0xA001), Some(0xAB));
        assert_eq!(reg(&apu, 0xA002), Some(0x81));
        assert!(apu.frequency(ChannelId::Vrc6Pulse2) > 0.0);

        pulse.handle_note(&ChannelNote::EMPTY.with_note(Note::Halt), &doc);
        pulse.process_tick(&doc);
        pulse.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0xA002).map(|v| v & ENABLE), Some(0));
        assert_eq!(apu.frequency(ChannelId::Vrc6Pulse2), 0.0);
    }

    #[test]
    fn digitized_duty_sets_the_mode_bit() {
        let (mut apu, mut groups, doc, tuning) = setup();
        let mut pulse = Vrc6Handler::new(ChannelId::Vrc6Pulse1, tuning);
        let row = ChannelNote::play(48).with_effect(EffectCommand::DutyCycle, 8);
        pulse.handle_note(&row, &doc);
        pulse.process_tick(&doc);
        pulse.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x9000), Some(0x8F));
    }

    #[test]
    fn sawtooth_rate_follows_volume() {
        let (mut apu, mut groups, doc, tuning) = setup();
        let mut saw = Vrc6Handler::new(ChannelId::Vrc6Sawtooth, tuning);
        saw.handle_note(&ChannelNote::play(36).with_volume(15), &doc);
        saw.process_tick(&doc);
        saw.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0xB000), Some(30));

        saw.handle_note(
            &ChannelNote::EMPTY
                .with_volume(4)
                .with_effect(EffectCommand::DutyCycle, 1),
            &doc,
        );
        saw.process_tick(&doc);
        saw.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0xB000), Some(9));
        let hz = apu.frequency(ChannelId::Vrc6Sawtooth);
        assert!((hz - 65.4).abs() < 0.5, "{hz}");
    }
}
