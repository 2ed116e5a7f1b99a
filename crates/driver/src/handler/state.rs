//! Tracker state of one channel, shared by every chip handler.
//!
//! The state turns rows and ticks into a pitch and a volume. It knows
//! nothing about registers; handlers read [`ChannelOutput`] on refresh and
//! encode it for their chip.

use super::Tuning;
use crate::document::{ChannelNote, Effect, EffectCommand, Note, MAX_VOLUME, NOTE_COUNT};
use crate::instrument::Instrument;
use crate::note_table::{PitchTable, LINEAR_STEPS};
use crate::sequence::{ArpeggioMode, SequenceHandler};
use fami_core::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Channel volume is kept in eighths of a step so slides can be slow
const VOLUME_SHIFT: u32 = 3;
const MAX_CHANNEL_VOLUME: i32 = (MAX_VOLUME as i32) << VOLUME_SHIFT;
const VIBRATO_MASK: u8 = 0x3F;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gate {
    /// No note played yet
    #[default]
    Idle,
    Gated,
    Releasing,
    /// Note cut
    Halted,
}

impl Gate {
    pub fn is_audible(self) -> bool {
        matches!(self, Gate::Gated | Gate::Releasing)
    }
}

/// Active pitch slide; only one runs at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Slide {
    #[default]
    None,
    Up(i32),
    Down(i32),
    Portamento { speed: i32, target: Option<i32> },
    /// `Qxy`/`Rxy`: the note changes to `note` once the target is reached
    Note { speed: i32, target: i32, note: u8 },
}

/// What a handler writes this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOutput {
    /// Register value in the channel's pitch table format
    pub period: i32,
    /// 0-15
    pub volume: u8,
    pub duty: u8,
    pub note: u8,
    pub audible: bool,
}

/// Down-counter that fires once when it reaches zero
fn countdown(counter: &mut Option<u8>) -> bool {
    match counter {
        Some(0) => {
            *counter = None;
            true
        }
        Some(n) => {
            *n -= 1;
            false
        }
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct ChannelState {
    channel: ChannelId,
    table: PitchTable,
    tuning: Arc<Tuning>,
    gate: Gate,
    note: u8,
    period: i32,
    volume: i32,
    seq_volume: i32,
    duty: u8,
    instrument: Option<u8>,
    sequences: SequenceHandler,
    triggered: bool,

    slide: Slide,
    note_slide: Option<(bool, i32, u8)>,
    arpeggio: u8,
    arpeggio_step: u8,
    auto_arpeggio: Vec<i8>,
    vibrato_speed: u8,
    vibrato_depth: u8,
    vibrato_phase: u8,
    tremolo_speed: u8,
    tremolo_depth: u8,
    tremolo_phase: u8,
    volume_slide: u8,
    fine_pitch: i32,
    pitch_wheel: i32,

    cut_delay: Option<u8>,
    release_delay: Option<u8>,
    delayed_volume: Option<u8>,
    delayed_volume_value: u8,
    transpose_delay: Option<u8>,
    transpose: i8,
    delayed_row: Option<(u8, ChannelNote)>,

    echo: VecDeque<u8>,
    echo_depth: usize,
}

impl ChannelState {
    pub fn new(channel: ChannelId, table: PitchTable, tuning: Arc<Tuning>) -> Self {
        let echo_depth = tuning.echo_depth;
        Self {
            channel,
            table,
            tuning,
            gate: Gate::Idle,
            note: 0,
            period: 0,
            volume: MAX_CHANNEL_VOLUME,
            seq_volume: MAX_VOLUME as i32,
            duty: 0,
            instrument: None,
            sequences: SequenceHandler::new(),
            triggered: false,
            slide: Slide::None,
            note_slide: None,
            arpeggio: 0,
            arpeggio_step: 0,
            auto_arpeggio: Vec::new(),
            vibrato_speed: 0,
            vibrato_depth: 0,
            vibrato_phase: 0,
            tremolo_speed: 0,
            tremolo_depth: 0,
            tremolo_phase: 0,
            volume_slide: 0,
            fine_pitch: 0,
            pitch_wheel: 0,
            cut_delay: None,
            release_delay: None,
            delayed_volume: None,
            delayed_volume_value: 0,
            transpose_delay: None,
            transpose: 0,
            delayed_row: None,
            echo: VecDeque::with_capacity(echo_depth),
            echo_depth,
        }
    }

    /// Back to the power-on state, keeping the channel's identity
    pub fn reset(&mut self) {
        *self = Self::new(self.channel, self.table, Arc::clone(&self.tuning));
    }

    /// Switch note tables or pitch mode; the period restarts from the note
    pub fn set_tuning(&mut self, tuning: Arc<Tuning>) {
        self.echo_depth = tuning.echo_depth;
        self.echo.truncate(self.echo_depth);
        self.tuning = tuning;
        self.period = self.note_period(self.note);
        if let Slide::Portamento { target, .. } = &mut self.slide {
            *target = None;
        }
        if matches!(self.slide, Slide::Note { .. }) {
            self.slide = Slide::None;
        }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn table(&self) -> PitchTable {
        self.table
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    /// Pitch before vibrato and fine pitch: a period, or a linear position
    pub fn period(&self) -> i32 {
        self.period
    }

    pub fn instrument(&self) -> Option<u8> {
        self.instrument
    }

    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn sequences(&self) -> &SequenceHandler {
        &self.sequences
    }

    /// A note started since the last call; portamento notes do not count
    pub fn take_trigger(&mut self) -> bool {
        std::mem::take(&mut self.triggered)
    }

    pub fn set_pitch_wheel(&mut self, offset: i32) {
        self.pitch_wheel = offset;
    }

    /// Chord offsets cycled one per tick while no `0xy` arpeggio runs
    pub fn set_auto_arpeggio(&mut self, offsets: Vec<i8>) {
        self.auto_arpeggio = offsets;
        self.arpeggio_step = 0;
    }

    fn linear(&self) -> bool {
        self.tuning.linear_pitch && self.table != PitchTable::Noise
    }

    /// +1 when a larger period means a higher pitch
    fn up(&self) -> i32 {
        if !self.linear() && self.table.is_inverted() {
            -1
        } else {
            1
        }
    }

    fn max_period(&self) -> i32 {
        if self.linear() {
            (NOTE_COUNT as i32 - 1) * LINEAR_STEPS
        } else {
            self.table.max_period()
        }
    }

    fn note_period(&self, note: u8) -> i32 {
        let note = note.min(NOTE_COUNT - 1);
        if self.linear() {
            note as i32 * LINEAR_STEPS
        } else {
            self.tuning.tables.period(self.table, note)
        }
    }

    fn offset_note(&self, offset: i32) -> u8 {
        (self.note as i32 + offset).clamp(0, NOTE_COUNT as i32 - 1) as u8
    }

    fn set_period(&mut self, period: i32) {
        self.period = period.clamp(0, self.max_period());
    }

    /// Hold back a row with a `Gxx` effect. Returns `true` when the row was
    /// stored; a row still waiting from before is returned to be played now.
    pub fn delay_row(&mut self, row: &ChannelNote) -> (bool, Option<ChannelNote>) {
        let pending = self.delayed_row.take().map(|(_, row)| row);
        let delay = row
            .effects()
            .find(|e| e.command == EffectCommand::Delay)
            .map_or(0, |e| e.param);
        if delay > 0 {
            let mut row = *row;
            for slot in row.effects.iter_mut() {
                if slot.is_some_and(|e| e.command == EffectCommand::Delay) {
                    *slot = None;
                }
            }
            self.delayed_row = Some((delay, row));
            (true, pending)
        } else {
            (false, pending)
        }
    }

    /// Count down a delayed row; returns it on the tick it is due
    pub fn tick_delay(&mut self) -> Option<ChannelNote> {
        let (ticks, _) = self.delayed_row.as_mut()?;
        if *ticks > 1 {
            *ticks -= 1;
            return None;
        }
        self.delayed_row.take().map(|(_, row)| row)
    }

    /// Effects every chip understands. Returns `false` for anything else.
    pub fn handle_effect(&mut self, effect: Effect) -> bool {
        let param = effect.param;
        match effect.command {
            EffectCommand::Arpeggio => {
                if param == 0 && self.arpeggio != 0 {
                    self.period = self.note_period(self.note);
                }
                self.arpeggio = param;
                self.arpeggio_step = 0;
            }
            EffectCommand::PortaUp => {
                self.slide = if param == 0 { Slide::None } else { Slide::Up(param as i32) }
            }
            EffectCommand::PortaDown => {
                self.slide = if param == 0 { Slide::None } else { Slide::Down(param as i32) }
            }
            EffectCommand::Portamento => {
                self.slide = if param == 0 {
                    Slide::None
                } else {
                    Slide::Portamento {
                        speed: param as i32,
                        target: None,
                    }
                }
            }
            EffectCommand::Vibrato => {
                self.vibrato_speed = effect.high();
                self.vibrato_depth = effect.low();
                if self.vibrato_depth == 0 {
                    self.vibrato_phase = 0;
                }
            }
            EffectCommand::Tremolo => {
                self.tremolo_speed = effect.high();
                self.tremolo_depth = effect.low();
                if self.tremolo_depth == 0 {
                    self.tremolo_phase = 0;
                }
            }
            EffectCommand::VolumeSlide => self.volume_slide = param,
            EffectCommand::NoteCut => self.cut_delay = Some(param),
            EffectCommand::NoteRelease => self.release_delay = Some(param),
            EffectCommand::DelayedVolume => {
                self.delayed_volume = Some(effect.high());
                self.delayed_volume_value = effect.low();
            }
            EffectCommand::Transpose => {
                let semitones = effect.low() as i8;
                self.transpose_delay = Some(effect.high() & 0x07);
                self.transpose = if effect.high() & 0x08 != 0 { -semitones } else { semitones };
            }
            EffectCommand::Pitch => self.fine_pitch = param as i32 - 0x80,
            EffectCommand::NoteSlideUp | EffectCommand::NoteSlideDown => {
                let up = effect.command == EffectCommand::NoteSlideUp;
                let speed = effect.high() as i32 * 2 + 1;
                self.note_slide = Some((up, speed, effect.low()));
            }
            EffectCommand::DutyCycle => self.duty = param,
            // consumed before the row reaches the channel
            EffectCommand::Delay => {}
            _ => return false,
        }
        true
    }

    pub fn load_instrument(&mut self, index: u8, instrument: &Instrument) {
        self.instrument = Some(index);
        self.sequences.load(&instrument.sequences);
    }

    /// Volume column and note of a row; effects are handled before this
    pub fn apply_row(&mut self, row: &ChannelNote) {
        if let Some(volume) = row.volume {
            self.volume = (volume.min(MAX_VOLUME) as i32) << VOLUME_SHIFT;
        }
        match row.note {
            Some(Note::On(note)) => self.play_note(note),
            Some(Note::Echo(back)) => {
                if let Some(&note) = self.echo.get(back as usize) {
                    self.play_note(note);
                }
            }
            Some(Note::Halt) => self.halt(),
            Some(Note::Release) => self.release(),
            None => {}
        }
        if let Some((up, speed, semitones)) = self.note_slide.take() {
            let offset = if up { semitones as i32 } else { -(semitones as i32) };
            let note = self.offset_note(offset);
            self.slide = Slide::Note {
                speed,
                target: self.note_period(note),
                note,
            };
        }
    }

    pub fn play_note(&mut self, note: u8) {
        let note = note.min(NOTE_COUNT - 1);
        self.echo.push_front(note);
        self.echo.truncate(self.echo_depth);

        let period = self.note_period(note);
        self.note = note;
        match &mut self.slide {
            Slide::Portamento { target, .. } if self.gate.is_audible() => *target = Some(period),
            slide => {
                if matches!(slide, Slide::Note { .. }) {
                    *slide = Slide::None;
                }
                self.period = period;
                self.triggered = true;
            }
        }
        self.gate = Gate::Gated;
        self.seq_volume = MAX_VOLUME as i32;
        self.arpeggio_step = 0;
        self.sequences.start();
    }

    pub fn halt(&mut self) {
        self.gate = Gate::Halted;
        self.triggered = false;
        if matches!(self.slide, Slide::Note { .. }) {
            self.slide = Slide::None;
        }
    }

    pub fn release(&mut self) {
        if self.gate.is_audible() {
            self.gate = Gate::Releasing;
            self.sequences.release();
        }
    }

    /// Advance one tick: delayed effects, modulation, slides, then sequences
    pub fn process_tick(&mut self) {
        if countdown(&mut self.cut_delay) {
            self.halt();
        }
        if countdown(&mut self.release_delay) {
            self.release();
        }
        if countdown(&mut self.delayed_volume) {
            self.volume = (self.delayed_volume_value as i32) << VOLUME_SHIFT;
        }
        if countdown(&mut self.transpose_delay) {
            self.note = self.offset_note(self.transpose as i32);
            self.period = self.note_period(self.note);
        }

        if self.vibrato_depth > 0 {
            self.vibrato_phase = (self.vibrato_phase + self.vibrato_speed) & VIBRATO_MASK;
        }
        if self.tremolo_depth > 0 {
            self.tremolo_phase = (self.tremolo_phase + self.tremolo_speed) & VIBRATO_MASK;
        }

        if self.volume_slide != 0 {
            let up = (self.volume_slide >> 4) as i32;
            let down = (self.volume_slide & 0x0F) as i32;
            let step = if up > 0 { up } else { -down };
            self.volume = (self.volume + step).clamp(0, MAX_CHANNEL_VOLUME);
        }

        self.step_slide();
        self.step_arpeggio();

        if self.gate.is_audible() {
            self.step_sequences();
        }
    }

    fn step_slide(&mut self) {
        let up = self.up();
        match self.slide {
            Slide::None => {}
            Slide::Up(speed) => self.set_period(self.period + speed * up),
            Slide::Down(speed) => self.set_period(self.period - speed * up),
            Slide::Portamento {
                speed,
                target: Some(target),
            } => {
                let reached = self.approach(target, speed);
                if reached {
                    self.slide = Slide::Portamento { speed, target: None };
                }
            }
            Slide::Portamento { target: None, .. } => {}
            Slide::Note { speed, target, note } => {
                if self.approach(target, speed) {
                    self.note = note;
                    self.slide = Slide::None;
                }
            }
        }
    }

    /// Move the period toward `target`; lands exactly on it, never past
    fn approach(&mut self, target: i32, speed: i32) -> bool {
        let distance = target - self.period;
        if distance.abs() <= speed {
            self.period = target;
            true
        } else {
            self.period += speed * distance.signum();
            false
        }
    }

    fn step_arpeggio(&mut self) {
        let offsets: Vec<i32> = if self.arpeggio != 0 {
            let (x, y) = ((self.arpeggio >> 4) as i32, (self.arpeggio & 0x0F) as i32);
            if y == 0 {
                vec![0, x]
            } else {
                vec![0, x, y]
            }
        } else if !self.auto_arpeggio.is_empty() {
            self.auto_arpeggio.iter().map(|&o| o as i32).collect()
        } else {
            return;
        };
        let step = self.arpeggio_step as usize % offsets.len();
        self.period = self.note_period(self.offset_note(offsets[step]));
        self.arpeggio_step = ((step + 1) % offsets.len()) as u8;
    }

    fn step_sequences(&mut self) {
        let out = self.sequences.step();
        if let Some(volume) = out.volume {
            self.seq_volume = (volume as i32).clamp(0, MAX_VOLUME as i32);
        }
        if let Some(value) = out.arpeggio {
            match self.sequences.arpeggio_mode() {
                ArpeggioMode::Absolute => {
                    self.period = self.note_period(self.offset_note(value as i32));
                }
                ArpeggioMode::Fixed => {
                    self.period = self.note_period(value.max(0) as u8);
                }
                ArpeggioMode::Relative => {
                    self.note = self.offset_note(value as i32);
                    self.period = self.note_period(self.note);
                }
            }
        } else if out.arpeggio_ended && self.sequences.arpeggio_mode() == ArpeggioMode::Fixed {
            self.period = self.note_period(self.note);
        }
        let up = self.up();
        if let Some(pitch) = out.pitch {
            self.set_period(self.period + pitch as i32 * up);
        }
        if let Some(hi_pitch) = out.hi_pitch {
            self.set_period(self.period + hi_pitch as i32 * 16 * up);
        }
        if let Some(duty) = out.duty {
            self.duty = duty.max(0) as u8;
        }
    }

    /// Volume after the sequence, the volume column and tremolo, 0-15
    pub fn volume(&self) -> u8 {
        let tremolo = self.tuning.vibrato.tremolo(self.tremolo_depth, self.tremolo_phase);
        let channel = (self.volume - tremolo).max(0) >> VOLUME_SHIFT;
        let volume = self.seq_volume * channel / MAX_VOLUME as i32;
        if volume == 0 && self.seq_volume > 0 && channel > 0 {
            1
        } else {
            volume as u8
        }
    }

    /// Final pitch register value with vibrato, fine pitch and the pitch wheel
    pub fn output_period(&self) -> i32 {
        let vibrato = self.tuning.vibrato.vibrato(self.vibrato_depth, self.vibrato_phase);
        if self.linear() {
            let position = self.period + (vibrato << 1) + self.fine_pitch + self.pitch_wheel;
            self.tuning.tables.linear_period(self.table, position)
        } else {
            let offset = (vibrato + self.fine_pitch + self.pitch_wheel) * self.up();
            (self.period + offset).clamp(0, self.table.max_period())
        }
    }

    pub fn output(&self) -> ChannelOutput {
        ChannelOutput {
            period: self.output_period(),
            volume: self.volume(),
            duty: self.duty,
            note: self.note,
            audible: self.gate.is_audible(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::sequence::{Sequence, SequenceKind};
    use fami_core::TimingMode;

    fn tuning(linear: bool) -> Arc<Tuning> {
        let config = DriverConfig {
            linear_pitch: linear,
            ..Default::default()
        };
        Arc::new(Tuning::new(TimingMode::Ntsc, 1, &config))
    }

    fn pulse() -> ChannelState {
        ChannelState::new(ChannelId::Square1, PitchTable::Apu, tuning(false))
    }

    fn row(note: u8) -> ChannelNote {
        ChannelNote::play(note)
    }

    #[test]
    fn note_sets_period_and_gate() {
        let mut state = pulse();
        assert_eq!(state.gate(), Gate::Idle);
        state.apply_row(&row(48));
        assert_eq!(state.gate(), Gate::Gated);
        assert!(state.take_trigger());
        assert!(!state.take_trigger());
        let out = state.output();
        assert_eq!(out.period, 0x1AB);
        assert_eq!(out.volume, 15);
        assert!(out.audible);
    }

    #[test]
    fn portamento_lands_exactly_on_target() {
        let mut state = pulse();
        state.apply_row(&row(48));
        assert!(state.take_trigger());
        let start = state.period();
        let target = state.tuning().tables.period(PitchTable::Apu, 50);
        let speed = 10;
        let ticks = ((start - target) as f64 / speed as f64).ceil() as usize;

        state.handle_effect(Effect::new(EffectCommand::Portamento, speed as u8));
        state.apply_row(&row(50));
        assert!(!state.take_trigger(), "portamento notes do not retrigger");
        assert_eq!(state.period(), start);

        let mut periods = Vec::new();
        for _ in 0..ticks + 3 {
            state.process_tick();
            periods.push(state.period());
        }
        assert_eq!(periods[ticks - 1], target);
        assert!(periods[..ticks - 1].iter().all(|&p| p > target));
        assert!(periods[ticks..].iter().all(|&p| p == target));
        assert_eq!(
            state.slide,
            Slide::Portamento {
                speed: speed as i32,
                target: None
            }
        );
    }

    #[test]
    fn note_slide_clears_itself_and_moves_the_note() {
        let mut state = pulse();
        state.handle_effect(Effect::new(EffectCommand::NoteSlideUp, 0x72));
        state.apply_row(&row(48));
        let target = state.tuning().tables.period(PitchTable::Apu, 50);
        for _ in 0..20 {
            state.process_tick();
        }
        assert_eq!(state.period(), target);
        assert_eq!(state.note(), 50);
        assert_eq!(state.slide, Slide::None);
    }

    #[test]
    fn porta_up_lowers_an_inverted_period_and_clamps() {
        let mut state = pulse();
        state.apply_row(&row(90));
        state.handle_effect(Effect::new(EffectCommand::PortaUp, 0xFF));
        for _ in 0..10 {
            state.process_tick();
        }
        assert_eq!(state.period(), 0);
    }

    #[test]
    fn delayed_effects_fire_once() {
        let mut state = pulse();
        state.apply_row(&row(48));
        state.handle_effect(Effect::new(EffectCommand::NoteCut, 2));
        state.process_tick();
        state.process_tick();
        assert_eq!(state.gate(), Gate::Gated);
        state.process_tick();
        assert_eq!(state.gate(), Gate::Halted);
        assert!(!state.output().audible);

        state.apply_row(&row(48));
        state.handle_effect(Effect::new(EffectCommand::DelayedVolume, 0x14));
        state.process_tick();
        assert_eq!(state.volume(), 15);
        state.process_tick();
        assert_eq!(state.volume(), 4);
    }

    #[test]
    fn delayed_transpose() {
        let mut state = pulse();
        state.apply_row(&row(48));
        state.handle_effect(Effect::new(EffectCommand::Transpose, 0x93));
        state.process_tick();
        state.process_tick();
        assert_eq!(state.note(), 45);
        assert_eq!(state.period(), state.tuning().tables.period(PitchTable::Apu, 45));
    }

    #[test]
    fn volume_is_scaled_and_floors_at_one() {
        let mut state = pulse();
        let inst = Instrument::standard("soft")
            .with_sequence(SequenceKind::Volume, Sequence::new(&[1]).with_loop(0));
        state.load_instrument(0, &inst);
        state.apply_row(&row(48).with_volume(1));
        state.process_tick();
        // 1 * 1 / 15 rounds to zero but both parts are audible
        assert_eq!(state.volume(), 1);

        state.apply_row(&ChannelNote::EMPTY.with_volume(0));
        assert_eq!(state.volume(), 0);
    }

    #[test]
    fn volume_slide_moves_in_eighths() {
        let mut state = pulse();
        state.apply_row(&row(48));
        state.handle_effect(Effect::new(EffectCommand::VolumeSlide, 0x04));
        for _ in 0..4 {
            state.process_tick();
        }
        assert_eq!(state.volume(), 13);
        for _ in 0..200 {
            state.process_tick();
        }
        assert_eq!(state.volume(), 0);
    }

    #[test]
    fn arpeggio_cycles_and_restores() {
        let mut state = pulse();
        state.apply_row(&row(48));
        state.handle_effect(Effect::new(EffectCommand::Arpeggio, 0x47));
        let tables = state.tuning().tables.clone();
        let mut seen = Vec::new();
        for _ in 0..6 {
            state.process_tick();
            seen.push(state.period());
        }
        let expect: Vec<i32> = [48, 52, 55, 48, 52, 55]
            .iter()
            .map(|&n| tables.period(PitchTable::Apu, n))
            .collect();
        assert_eq!(seen, expect);
        state.handle_effect(Effect::new(EffectCommand::Arpeggio, 0));
        assert_eq!(state.period(), tables.period(PitchTable::Apu, 48));
    }

    #[test]
    fn echo_notes_replay_history() {
        let mut state = pulse();
        state.apply_row(&row(40));
        state.apply_row(&row(44));
        state.apply_row(&ChannelNote::EMPTY.with_note(Note::Echo(1)));
        assert_eq!(state.note(), 40);
        // the echoed note is itself remembered
        state.apply_row(&ChannelNote::EMPTY.with_note(Note::Echo(0)));
        assert_eq!(state.note(), 40);
        state.apply_row(&ChannelNote::EMPTY.with_note(Note::Echo(9)));
        assert_eq!(state.note(), 40);
    }

    #[test]
    fn delayed_row_plays_later() {
        let mut state = pulse();
        let delayed = row(60).with_effect(EffectCommand::Delay, 2);
        let (stored, pending) = state.delay_row(&delayed);
        assert!(stored);
        assert!(pending.is_none());
        assert!(state.tick_delay().is_none());
        let due = state.tick_delay().unwrap();
        assert_eq!(due.note, Some(Note::On(60)));
        assert!(due.effects().all(|e| e.command != EffectCommand::Delay));
    }

    #[test]
    fn linear_pitch_vibrato_stays_near_the_note() {
        let mut state = ChannelState::new(ChannelId::Square1, PitchTable::Apu, tuning(true));
        state.apply_row(&row(48));
        assert_eq!(state.period(), 48 * LINEAR_STEPS);
        assert_eq!(state.output_period(), 0x1AB);
        state.handle_effect(Effect::new(EffectCommand::Vibrato, 0x41));
        for _ in 0..64 {
            state.process_tick();
            let period = state.output_period();
            let above = state.tuning().tables.period(PitchTable::Apu, 47);
            let below = state.tuning().tables.period(PitchTable::Apu, 49);
            assert!(period <= above && period >= below);
        }
    }

    #[test]
    fn release_runs_sequences_past_the_release_point() {
        let mut state = pulse();
        let inst = Instrument::standard("pluck").with_sequence(
            SequenceKind::Volume,
            Sequence::new(&[15, 10, 4]).with_release(1),
        );
        state.load_instrument(0, &inst);
        state.apply_row(&row(48));
        for _ in 0..4 {
            state.process_tick();
        }
        assert_eq!(state.volume(), 10);
        state.apply_row(&ChannelNote::EMPTY.with_note(Note::Release));
        assert_eq!(state.gate(), Gate::Releasing);
        state.process_tick();
        assert_eq!(state.volume(), 4);
        assert!(state.output().audible);
    }
}
