//! 2A03 channel handlers: squares, triangle, noise and DPCM.

use super::groups::ChipGroups;
use super::state::ChannelState;
use super::{ChannelHandler, Tuning};
use crate::document::{ChannelNote, Document, Effect, EffectCommand, Note};
use crate::instrument::DpcmAssignment;
use crate::note_table::PitchTable;
use fami_core::logging::{log, LogCategory, LogLevel};
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

const STATUS: u16 = 0x4015;
/// Constant volume with the length counter halted
const CONSTANT_VOLUME: u8 = 0x30;
/// Sweep off, negate set so low periods are not muted
const SWEEP_OFF: u8 = 0x08;
const LENGTH_LOAD: u8 = 0xF8;

/// Register encoder for a pulse channel, used by the 2A03 and the MMC5
#[derive(Debug, Clone)]
pub(super) struct PulseVoice {
    base: u16,
    has_sweep: bool,
    last_high: Option<u8>,
    last_sweep: Option<u8>,
    /// Hardware sweep requested by `Hxy`/`Ixy`
    sweep: Option<u8>,
    sweep_pending: bool,
}

impl PulseVoice {
    pub(super) fn new(base: u16, has_sweep: bool) -> Self {
        Self {
            base,
            has_sweep,
            last_high: None,
            last_sweep: None,
            sweep: None,
            sweep_pending: false,
        }
    }

    fn set_sweep(&mut self, effect: Effect) {
        let up = effect.command == EffectCommand::SweepUp;
        let value = 0x80 | (effect.param & 0x77) | if up { 0x08 } else { 0x00 };
        self.sweep = Some(value);
        self.sweep_pending = true;
    }

    /// A new note drops the hardware sweep unless the row set one
    fn on_row(&mut self, row: &ChannelNote) {
        let plays = matches!(row.note, Some(Note::On(_)) | Some(Note::Echo(_)));
        let sweeps = row
            .effects()
            .any(|e| matches!(e.command, EffectCommand::SweepUp | EffectCommand::SweepDown));
        if plays && !sweeps {
            self.sweep = None;
        }
    }

    pub(super) fn refresh(&mut self, apu: &mut Apu, state: &mut ChannelState) {
        let trigger = state.take_trigger();
        let out = state.output();
        let volume = if out.audible { out.volume } else { 0 };
        apu.write(self.base, (out.duty & 0x03) << 6 | CONSTANT_VOLUME | volume);

        let low = (out.period & 0xFF) as u8;
        let high = ((out.period >> 8) & 0x07) as u8;
        if self.has_sweep {
            if let Some(sweep) = self.sweep {
                if self.sweep_pending {
                    self.sweep_pending = false;
                    self.last_sweep = Some(sweep);
                    apu.write(self.base + 1, sweep);
                    apu.write(self.base + 2, low);
                    apu.write(self.base + 3, high | LENGTH_LOAD);
                    self.last_high = None;
                }
                // the hardware owns the period until the next note
                return;
            }
            if self.last_sweep != Some(SWEEP_OFF) {
                self.last_sweep = Some(SWEEP_OFF);
                apu.write(self.base + 1, SWEEP_OFF);
            }
        }
        apu.write(self.base + 2, low);
        if trigger || self.last_high != Some(high) {
            self.last_high = Some(high);
            apu.write(self.base + 3, high | LENGTH_LOAD);
        }
    }

    pub(super) fn clear(&mut self, apu: &mut Apu) {
        apu.write(self.base, CONSTANT_VOLUME);
        if self.has_sweep {
            apu.write(self.base + 1, SWEEP_OFF);
        }
        apu.write(self.base + 2, 0);
        apu.write(self.base + 3, 0);
        self.last_high = None;
        self.last_sweep = None;
        self.sweep = None;
        self.sweep_pending = false;
    }
}

/// Square, triangle or noise
pub struct Apu2A03Handler {
    state: ChannelState,
    pulse: Option<PulseVoice>,
    last_high: Option<u8>,
}

impl Apu2A03Handler {
    pub fn new(channel: ChannelId, tuning: Arc<Tuning>) -> Self {
        let table = if channel == ChannelId::Noise {
            PitchTable::Noise
        } else {
            PitchTable::Apu
        };
        let pulse = match channel {
            ChannelId::Square1 => Some(PulseVoice::new(0x4000, true)),
            ChannelId::Square2 => Some(PulseVoice::new(0x4004, true)),
            _ => None,
        };
        Self {
            state: ChannelState::new(channel, table, tuning),
            pulse,
            last_high: None,
        }
    }

    fn refresh_triangle(&mut self, apu: &mut Apu) {
        let trigger = self.state.take_trigger();
        let out = self.state.output();
        // linear counter reloads every quarter frame while control is set
        let linear = if out.audible && out.volume > 0 { 0x81 } else { 0x80 };
        apu.write(0x4008, linear);
        apu.write(0x400A, (out.period & 0xFF) as u8);
        let high = ((out.period >> 8) & 0x07) as u8;
        if trigger || self.last_high != Some(high) {
            self.last_high = Some(high);
            apu.write(0x400B, high | LENGTH_LOAD);
        }
    }

    fn refresh_noise(&mut self, apu: &mut Apu) {
        let trigger = self.state.take_trigger();
        let out = self.state.output();
        let volume = if out.audible { out.volume } else { 0 };
        apu.write(0x400C, CONSTANT_VOLUME | volume);
        let rate = 0x0F ^ (out.period & 0x0F) as u8;
        apu.write(0x400E, (out.duty & 0x01) << 7 | rate);
        if trigger {
            apu.write(0x400F, LENGTH_LOAD);
        }
    }
}

impl ChannelHandler for Apu2A03Handler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn handle_effect(&mut self, effect: Effect) -> bool {
        match (effect.command, self.pulse.as_mut()) {
            (EffectCommand::SweepUp | EffectCommand::SweepDown, Some(pulse)) => {
                pulse.set_sweep(effect);
                true
            }
            _ => self.state.handle_effect(effect),
        }
    }

    fn on_row(&mut self, row: &ChannelNote, _doc: &Document) {
        if let Some(pulse) = self.pulse.as_mut() {
            pulse.on_row(row);
        }
    }

    fn refresh(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        if let Some(pulse) = self.pulse.as_mut() {
            pulse.refresh(apu, &mut self.state);
        } else if self.state.channel() == ChannelId::Triangle {
            self.refresh_triangle(apu);
        } else {
            self.refresh_noise(apu);
        }
    }

    fn clear_registers(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        match (self.pulse.as_mut(), self.state.channel()) {
            (Some(pulse), _) => pulse.clear(apu),
            (None, ChannelId::Triangle) => {
                apu.write(0x4008, 0x80);
                apu.write(0x400A, 0);
                apu.write(0x400B, 0);
            }
            _ => {
                apu.write(0x400C, CONSTANT_VOLUME);
                apu.write(0x400E, 0);
                apu.write(0x400F, 0);
            }
        }
        self.last_high = None;
    }
}

/// Sample start waiting for the next refresh
#[derive(Debug, Clone, Copy)]
struct DpcmTrigger {
    assignment: DpcmAssignment,
    offset: u8,
}

pub struct DpcmHandler {
    state: ChannelState,
    pending: Option<DpcmTrigger>,
    /// Last started sample, replayed by `Xxx`
    last: Option<DpcmTrigger>,
    playing: bool,
    loop_cleared: bool,
    offset: u8,
    pitch_override: Option<u8>,
    dac: Option<u8>,
    retrigger_period: u8,
    retrigger_counter: u8,
}

impl DpcmHandler {
    pub fn new(tuning: Arc<Tuning>) -> Self {
        Self {
            state: ChannelState::new(ChannelId::Dpcm, PitchTable::Noise, tuning),
            pending: None,
            last: None,
            playing: false,
            loop_cleared: false,
            offset: 0,
            pitch_override: None,
            dac: None,
            retrigger_period: 0,
            retrigger_counter: 0,
        }
    }

    fn start(&mut self, apu: &mut Apu, groups: &ChipGroups, trigger: DpcmTrigger) {
        let DpcmTrigger { assignment, offset } = trigger;
        let placement = match groups.dpcm.placement(assignment.sample) {
            Ok(placement) => placement,
            Err(e) => {
                log(LogCategory::Driver, LogLevel::Warn, || format!("DPCM: {e}"));
                return;
            }
        };
        let offset = offset.min(0xFF - placement.address);
        let length = placement.length.saturating_sub(offset.saturating_mul(4));

        apu.write(STATUS, 0x0F);
        apu.write(0x4010, (assignment.looping as u8) << 6 | (assignment.pitch & 0x0F));
        if let Some(delta) = assignment.delta {
            apu.write(0x4011, delta & 0x7F);
        }
        apu.write(0x4012, placement.address + offset);
        apu.write(0x4013, length);
        apu.write(STATUS, 0x1F);
        self.playing = true;
        self.loop_cleared = !assignment.looping;
        self.last = Some(trigger);
    }
}

impl ChannelHandler for DpcmHandler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn handle_effect(&mut self, effect: Effect) -> bool {
        match effect.command {
            EffectCommand::DpcmOffset => self.offset = effect.param,
            EffectCommand::DpcmPitch => self.pitch_override = Some(effect.param & 0x0F),
            EffectCommand::DacLoad => self.dac = Some(effect.param & 0x7F),
            EffectCommand::Retrigger => {
                self.retrigger_period = effect.param;
                self.retrigger_counter = effect.param;
            }
            EffectCommand::NoteCut
            | EffectCommand::NoteRelease
            | EffectCommand::Delay
            | EffectCommand::Transpose => return self.state.handle_effect(effect),
            _ => return false,
        }
        true
    }

    fn on_row(&mut self, row: &ChannelNote, doc: &Document) {
        if !matches!(row.note, Some(Note::On(_)) | Some(Note::Echo(_))) {
            return;
        }
        let note = self.state.note();
        let assignment = self
            .state
            .instrument()
            .and_then(|index| doc.instrument(index))
            .and_then(|instrument| instrument.dpcm(note));
        match assignment {
            Some(&assignment) => {
                let mut assignment = assignment;
                if let Some(pitch) = self.pitch_override.take() {
                    assignment.pitch = pitch;
                }
                self.pending = Some(DpcmTrigger {
                    assignment,
                    offset: std::mem::take(&mut self.offset),
                });
            }
            None => log(LogCategory::Driver, LogLevel::Debug, || {
                format!("no DPCM sample for note {note}")
            }),
        }
    }

    fn process_tick(&mut self, doc: &Document) {
        if let Some(row) = self.state.tick_delay() {
            self.play_row(&row, doc);
        }
        self.state.process_tick();
        if self.retrigger_period > 0 && self.pending.is_none() {
            if self.retrigger_counter <= 1 {
                self.retrigger_counter = self.retrigger_period;
                self.pending = self.last;
            } else {
                self.retrigger_counter -= 1;
            }
        }
    }

    fn refresh(&mut self, apu: &mut Apu, groups: &mut ChipGroups) {
        self.state.take_trigger();
        if let Some(dac) = self.dac.take() {
            apu.write(0x4011, dac);
        }
        if let Some(trigger) = self.pending.take() {
            self.start(apu, groups, trigger);
            return;
        }
        if !self.playing {
            return;
        }
        match self.state.gate() {
            super::Gate::Releasing if !self.loop_cleared => {
                // let the sample run out instead of looping
                if let Some(last) = self.last {
                    apu.write(0x4010, last.assignment.pitch & 0x0F);
                }
                self.loop_cleared = true;
            }
            super::Gate::Halted | super::Gate::Idle => {
                apu.write(STATUS, 0x0F);
                self.playing = false;
                self.retrigger_period = 0;
            }
            _ => {}
        }
    }

    fn clear_registers(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        apu.write(STATUS, 0x0F);
        apu.write(0x4010, 0);
        apu.write(0x4011, 0);
        self.pending = None;
        self.playing = false;
        self.retrigger_period = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::dpcm::{DpcmSample, SampleMap};
    use crate::handler::init_registers;
    use crate::instrument::Instrument;
    use fami_core::{ChipKind, EngineConfig, TimingMode};

    fn setup() -> (Apu, ChipGroups, Arc<Tuning>) {
        let mut apu = Apu::new(&EngineConfig::default()).unwrap();
        init_registers(&mut apu);
        let tuning = Arc::new(Tuning::new(TimingMode::Ntsc, 1, &DriverConfig::default()));
        (apu, ChipGroups::default(), tuning)
    }

    fn reg(apu: &Apu, addr: u16) -> Option<u8> {
        apu.register_log().value(ChipKind::Apu2A03, addr)
    }

    fn run_frame(apu: &mut Apu) {
        apu.add_time(apu.frame_length());
        apu.process();
    }

    #[test]
    fn square_note_writes_period_and_volume() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = Document::new(&[]);
        let mut square = Apu2A03Handler::new(ChannelId::Square1, tuning);
        square.handle_note(&ChannelNote::play(48).with_volume(15), &doc);
        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);

        assert_eq!(reg(&apu, 0x4000), Some(0x3F));
        assert_eq!(reg(&apu, 0x4001), Some(SWEEP_OFF));
        assert_eq!(reg(&apu, 0x4002), Some(0xAB));
        assert_eq!(reg(&apu, 0x4003).map(|v| v & 0x07), Some(0x01));
        run_frame(&mut apu);
        let hz = apu.frequency(ChannelId::Square1);
        assert!((hz - 261.6).abs() < 1.0, "{hz}");
    }

    #[test]
    fn high_period_byte_is_written_only_on_change() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = Document::new(&[]);
        let mut square = Apu2A03Handler::new(ChannelId::Square2, tuning);
        square.handle_note(&ChannelNote::play(48), &doc);
        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);
        run_frame(&mut apu);
        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);
        run_frame(&mut apu);
        assert!(apu.register_log().changed(ChipKind::Apu2A03, 0x4006));
        assert!(!apu.register_log().changed(ChipKind::Apu2A03, 0x4007));
    }

    #[test]
    fn sweep_takes_over_until_next_note() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = Document::new(&[]);
        let mut square = Apu2A03Handler::new(ChannelId::Square1, tuning);
        square.handle_note(
            &ChannelNote::play(48).with_effect(EffectCommand::SweepUp, 0x31),
            &doc,
        );
        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4001), Some(0x80 | 0x30 | 0x08 | 0x01));
        run_frame(&mut apu);

        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);
        run_frame(&mut apu);
        assert!(!apu.register_log().changed(ChipKind::Apu2A03, 0x4002));

        square.handle_note(&ChannelNote::play(50), &doc);
        square.process_tick(&doc);
        square.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4001), Some(SWEEP_OFF));
    }

    #[test]
    fn triangle_silences_through_the_linear_counter() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = Document::new(&[]);
        let mut triangle = Apu2A03Handler::new(ChannelId::Triangle, tuning);
        triangle.handle_note(&ChannelNote::play(36), &doc);
        triangle.process_tick(&doc);
        triangle.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4008), Some(0x81));
        run_frame(&mut apu);
        assert!(apu.frequency(ChannelId::Triangle) > 0.0);

        triangle.handle_note(&ChannelNote::EMPTY.with_note(Note::Halt), &doc);
        triangle.process_tick(&doc);
        triangle.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4008), Some(0x80));
    }

    #[test]
    fn noise_rate_rises_with_the_note() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = Document::new(&[]);
        let mut noise = Apu2A03Handler::new(ChannelId::Noise, tuning);
        noise.handle_note(&ChannelNote::play(15), &doc);
        noise.process_tick(&doc);
        noise.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x400E), Some(0x00));

        noise.handle_note(
            &ChannelNote::play(2).with_effect(EffectCommand::DutyCycle, 1),
            &doc,
        );
        noise.process_tick(&doc);
        noise.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x400E), Some(0x80 | 0x0D));
    }

    fn drum_doc() -> Document {
        let mut doc = Document::new(&[]);
        doc.samples = vec![DpcmSample::new("kick", vec![0x55; 0x81])];
        let assignment = DpcmAssignment {
            sample: 0,
            pitch: 0x0F,
            looping: true,
            delta: Some(0x40),
        };
        doc.instruments
            .insert(0, Instrument::standard("kit").with_dpcm(36, assignment));
        doc
    }

    #[test]
    fn dpcm_note_starts_its_sample() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = drum_doc();
        groups.dpcm = SampleMap::pack(&doc.samples);
        apu.load_sample_memory(groups.dpcm.image());

        let mut dpcm = DpcmHandler::new(tuning);
        dpcm.handle_note(&ChannelNote::play(36).with_instrument(0), &doc);
        dpcm.process_tick(&doc);
        dpcm.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4010), Some(0x4F));
        assert_eq!(reg(&apu, 0x4011), Some(0x40));
        assert_eq!(reg(&apu, 0x4012), Some(0x00));
        assert_eq!(reg(&apu, 0x4013), Some(0x08));
        assert_eq!(reg(&apu, STATUS), Some(0x1F));

        dpcm.handle_note(&ChannelNote::EMPTY.with_note(Note::Release), &doc);
        dpcm.process_tick(&doc);
        dpcm.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4010), Some(0x0F));

        dpcm.handle_note(&ChannelNote::EMPTY.with_note(Note::Halt), &doc);
        dpcm.process_tick(&doc);
        dpcm.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, STATUS), Some(0x0F));
    }

    #[test]
    fn dpcm_offset_and_pitch_effects() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = drum_doc();
        groups.dpcm = SampleMap::pack(&doc.samples);
        let mut dpcm = DpcmHandler::new(tuning);
        let row = ChannelNote::play(36)
            .with_instrument(0)
            .with_effect(EffectCommand::DpcmOffset, 1)
            .with_effect(EffectCommand::DpcmPitch, 0x03);
        dpcm.handle_note(&row, &doc);
        dpcm.process_tick(&doc);
        dpcm.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4010), Some(0x43));
        assert_eq!(reg(&apu, 0x4012), Some(0x01));
        assert_eq!(reg(&apu, 0x4013), Some(0x04));
    }

    #[test]
    fn dpcm_retrigger_replays_the_sample() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = drum_doc();
        groups.dpcm = SampleMap::pack(&doc.samples);
        let mut dpcm = DpcmHandler::new(tuning);
        let row = ChannelNote::play(36)
            .with_instrument(0)
            .with_effect(EffectCommand::Retrigger, 2);
        dpcm.handle_note(&row, &doc);
        dpcm.process_tick(&doc);
        dpcm.refresh(&mut apu, &mut groups);
        run_frame(&mut apu);

        let mut restarts = 0;
        for _ in 0..6 {
            dpcm.process_tick(&doc);
            dpcm.refresh(&mut apu, &mut groups);
            run_frame(&mut apu);
            if apu.register_log().changed(ChipKind::Apu2A03, 0x4012) {
                restarts += 1;
            }
        }
        assert_eq!(restarts, 3);
    }

    #[test]
    fn unknown_dpcm_note_plays_nothing() {
        let (mut apu, mut groups, tuning) = setup();
        let doc = drum_doc();
        groups.dpcm = SampleMap::pack(&doc.samples);
        let mut dpcm = DpcmHandler::new(tuning);
        dpcm.handle_note(&ChannelNote::play(40).with_instrument(0), &doc);
        dpcm.process_tick(&doc);
        dpcm.refresh(&mut apu, &mut groups);
        assert_eq!(reg(&apu, 0x4012), None);
    }
}
