//! FDS wavetable channel with its frequency modulator.
//!
//! The instrument supplies the 64-step wave, the 32-entry modulation table
//! and default modulation depth, speed and delay. `Hxx` sets the depth,
//! `Ixx`/`Jxx` the speed, and `Kxy` ties the modulation speed to the note
//! pitch (`pitch * x / y`).

use super::groups::ChipGroups;
use super::state::ChannelState;
use super::{ChannelHandler, Tuning};
use crate::document::{Document, Effect, EffectCommand};
use crate::instrument::{Instrument, InstrumentData, FDS_MOD_SIZE, FDS_WAVE_SIZE};
use crate::note_table::PitchTable;
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

const WAVE_RAM: u16 = 0x4040;
const VOLUME_ENV: u16 = 0x4080;
const PITCH_LOW: u16 = 0x4082;
const PITCH_HIGH: u16 = 0x4083;
const MOD_ENV: u16 = 0x4084;
const MOD_COUNTER: u16 = 0x4085;
const MOD_FREQ_LOW: u16 = 0x4086;
const MOD_FREQ_HIGH: u16 = 0x4087;
const MOD_TABLE: u16 = 0x4088;
const WAVE_WRITE: u16 = 0x4089;

/// Envelope disabled, the low 6 bits are a fixed gain
const ENV_DIRECT: u8 = 0x80;
const HALT: u8 = 0x80;
const MAX_GAIN: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Modulation {
    depth: u8,
    speed: u16,
    delay: u8,
}

pub struct FdsHandler {
    state: ChannelState,
    wave: Vec<u8>,
    table: Vec<u8>,
    voice_dirty: bool,
    /// Values from the instrument
    preset: Modulation,
    /// `Hxx` and `Ixx`/`Jxx` take precedence over the instrument
    depth_override: Option<u8>,
    speed_override: Option<u16>,
    /// `Kxy` ratio, `None` when off
    auto_fm: Option<(u8, u8)>,
    delay_counter: u8,
    last_mod_freq: Option<u16>,
}

impl FdsHandler {
    pub fn new(tuning: Arc<Tuning>) -> Self {
        Self {
            state: ChannelState::new(ChannelId::Fds, PitchTable::Fds, tuning),
            wave: Vec::new(),
            table: Vec::new(),
            voice_dirty: false,
            preset: Modulation::default(),
            depth_override: None,
            speed_override: None,
            auto_fm: None,
            delay_counter: 0,
            last_mod_freq: None,
        }
    }

    fn write_voice(&mut self, apu: &mut Apu) {
        apu.write(WAVE_WRITE, 0x80);
        for (i, &sample) in self.wave.iter().take(FDS_WAVE_SIZE).enumerate() {
            apu.write(WAVE_RAM + i as u16, sample & 0x3F);
        }
        apu.write(WAVE_WRITE, 0x00);

        // the table only accepts input while modulation is halted
        apu.write(MOD_FREQ_HIGH, HALT);
        for &entry in self.table.iter().take(FDS_MOD_SIZE) {
            apu.write(MOD_TABLE, entry & 0x07);
        }
        self.last_mod_freq = None;
        self.voice_dirty = false;
    }

    fn depth(&self) -> u8 {
        self.depth_override.unwrap_or(self.preset.depth)
    }

    fn speed(&self) -> u16 {
        self.speed_override.unwrap_or(self.preset.speed)
    }

    fn mod_speed(&self, pitch: i32, groups: &ChipGroups) -> u16 {
        let delaying = self.delay_counter > 0;
        match self.auto_fm {
            Some((num, den)) if !delaying || groups.fds_auto_fm_during_delay => {
                (pitch as u32 * num as u32 / den.max(1) as u32).min(0xFFF) as u16
            }
            Some(_) => 0,
            None if delaying => 0,
            None => self.speed(),
        }
    }

    fn write_modulation(&mut self, apu: &mut Apu, speed: u16) {
        let depth = self.depth();
        if depth == 0 || speed == 0 {
            if self.last_mod_freq.is_some() {
                apu.write(MOD_FREQ_HIGH, HALT);
                self.last_mod_freq = None;
            }
            return;
        }
        apu.write(MOD_ENV, ENV_DIRECT | (depth & 0x3F));
        if self.last_mod_freq != Some(speed) {
            apu.write(MOD_FREQ_LOW, (speed & 0xFF) as u8);
            apu.write(MOD_FREQ_HIGH, ((speed >> 8) & 0x0F) as u8);
            self.last_mod_freq = Some(speed);
        }
    }
}

impl ChannelHandler for FdsHandler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn handle_effect(&mut self, effect: Effect) -> bool {
        match effect.command {
            EffectCommand::FdsModDepth => self.depth_override = Some(effect.param & 0x3F),
            EffectCommand::FdsModSpeedHigh => {
                let low = self.speed() & 0x00FF;
                self.speed_override = Some(low | (effect.param as u16 & 0x0F) << 8);
            }
            EffectCommand::FdsModSpeedLow => {
                let high = self.speed() & 0x0F00;
                self.speed_override = Some(high | effect.param as u16);
            }
            EffectCommand::FdsAutoFm => {
                self.auto_fm = match (effect.high(), effect.low()) {
                    (0, _) | (_, 0) => None,
                    (num, den) => Some((num, den)),
                };
            }
            _ => return self.state.handle_effect(effect),
        }
        true
    }

    fn load_instrument(&mut self, instrument: &Instrument) {
        if let InstrumentData::Fds {
            wave,
            modulation,
            mod_speed,
            mod_depth,
            mod_delay,
        } = &instrument.data
        {
            if *wave != self.wave || *modulation != self.table {
                self.wave = wave.clone();
                self.table = modulation.clone();
                self.voice_dirty = true;
            }
            self.preset = Modulation {
                depth: *mod_depth,
                speed: *mod_speed,
                delay: *mod_delay,
            };
        }
    }

    fn process_tick(&mut self, doc: &Document) {
        if let Some(row) = self.state.tick_delay() {
            self.play_row(&row, doc);
        }
        self.state.process_tick();
        self.delay_counter = self.delay_counter.saturating_sub(1);
    }

    fn refresh(&mut self, apu: &mut Apu, groups: &mut ChipGroups) {
        let trigger = self.state.take_trigger();
        let out = self.state.output();
        if !out.audible {
            apu.write(VOLUME_ENV, ENV_DIRECT);
            apu.write(PITCH_HIGH, HALT);
            return;
        }
        if self.voice_dirty {
            self.write_voice(apu);
        }
        if trigger {
            self.delay_counter = self.preset.delay;
            apu.write(MOD_COUNTER, 0);
        }
        let gain = out.volume as u32 * MAX_GAIN / 15;
        apu.write(VOLUME_ENV, ENV_DIRECT | gain as u8);
        apu.write(PITCH_LOW, (out.period & 0xFF) as u8);
        apu.write(PITCH_HIGH, ((out.period >> 8) & 0x0F) as u8);

        let speed = self.mod_speed(out.period, groups);
        self.write_modulation(apu, speed);
    }

    fn clear_registers(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        apu.write(VOLUME_ENV, ENV_DIRECT);
        apu.write(PITCH_LOW, 0);
        apu.write(PITCH_HIGH, HALT);
        apu.write(MOD_FREQ_HIGH, HALT);
        apu.write(WAVE_WRITE, 0);
        self.last_mod_freq = None;
        self.voice_dirty = !self.wave.is_empty();
    }

    fn reset(&mut self) {
        self.state.reset();
        self.depth_override = None;
        self.speed_override = None;
        self.auto_fm = None;
        self.delay_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::document::{ChannelNote, Note};
    use fami_core::{ChipKind, EngineConfig, TimingMode};

    fn setup() -> (Apu, ChipGroups, Document, FdsHandler) {
        let config = EngineConfig {
            chips: vec![ChipKind::Fds],
            ..Default::default()
        };
        let mut doc = Document::new(&[ChipKind::Fds]);
        let mut inst = Instrument::fds("sine");
        if let InstrumentData::Fds {
            modulation,
            mod_delay,
            ..
        } = &mut inst.data
        {
            modulation.iter_mut().for_each(|m| *m = 1);
            *mod_delay = 2;
        }
        doc.instruments.insert(0, inst);
        let tuning = Arc::new(Tuning::new(TimingMode::Ntsc, 1, &DriverConfig::default()));
        (
            Apu::new(&config).unwrap(),
            ChipGroups::default(),
            doc,
            FdsHandler::new(tuning),
        )
    }

    fn reg(apu: &Apu, addr: u16) -> Option<u8> {
        apu.register_log().value(ChipKind::Fds, addr)
    }

    fn tick(fds: &mut FdsHandler, apu: &mut Apu, groups: &mut ChipGroups, doc: &Document) {
        fds.process_tick(doc);
        fds.refresh(apu, groups);
    }

    #[test]
    fn note_loads_the_wave_and_plays() {
        let (mut apu, mut groups, doc, mut fds) = setup();
        fds.handle_note(&ChannelNote::play(57).with_instrument(0), &doc);
        tick(&mut fds, &mut apu, &mut groups, &doc);

        assert_eq!(reg(&apu, WAVE_WRITE), Some(0x00));
        assert_eq!(reg(&apu, 0x4050), Some(63));
        assert_eq!(reg(&apu, VOLUME_ENV), Some(ENV_DIRECT | 32));
        apu.add_time(apu.frame_length());
        apu.process();
        let hz = apu.frequency(ChannelId::Fds);
        assert!((hz - 440.0).abs() < 1.0, "{hz}");

        fds.handle_note(&ChannelNote::EMPTY.with_note(Note::Halt), &doc);
        tick(&mut fds, &mut apu, &mut groups, &doc);
        assert_eq!(apu.frequency(ChannelId::Fds), 0.0);
    }

    #[test]
    fn modulation_waits_for_the_delay() {
        let (mut apu, mut groups, doc, mut fds) = setup();
        let row = ChannelNote::play(57)
            .with_instrument(0)
            .with_effect(EffectCommand::FdsModDepth, 0x20)
            .with_effect(EffectCommand::FdsModSpeedLow, 0x40);
        fds.handle_note(&row, &doc);
        tick(&mut fds, &mut apu, &mut groups, &doc);
        assert_eq!(reg(&apu, MOD_FREQ_HIGH), Some(HALT));

        tick(&mut fds, &mut apu, &mut groups, &doc);
        tick(&mut fds, &mut apu, &mut groups, &doc);
        assert_eq!(reg(&apu, MOD_ENV), Some(ENV_DIRECT | 0x20));
        assert_eq!(reg(&apu, MOD_FREQ_LOW), Some(0x40));
        assert_eq!(reg(&apu, MOD_FREQ_HIGH), Some(0x00));
    }

    #[test]
    fn auto_fm_follows_the_pitch() {
        let (mut apu, mut groups, doc, mut fds) = setup();
        groups.fds_auto_fm_during_delay = true;
        let row = ChannelNote::play(57)
            .with_instrument(0)
            .with_effect(EffectCommand::FdsModDepth, 0x10)
            .with_effect(EffectCommand::FdsAutoFm, 0x12);
        fds.handle_note(&row, &doc);
        tick(&mut fds, &mut apu, &mut groups, &doc);
        let pitch = fds.state().output_period() as u16;
        let speed = pitch / 2;
        assert_eq!(reg(&apu, MOD_FREQ_LOW), Some((speed & 0xFF) as u8));
        assert_eq!(reg(&apu, MOD_FREQ_HIGH), Some((speed >> 8) as u8));
    }
}
