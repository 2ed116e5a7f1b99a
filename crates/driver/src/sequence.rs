//! Instrument sequences and the per-channel sequence handler.
//!
//! A sequence is a list of per-tick values with an optional loop point and
//! an optional release point. Playback holds at the release point until the
//! note is released, then continues past it. Reaching the end without a
//! loop reports [`SequenceEvent::End`] once and then halts.

use serde::{Deserialize, Serialize};

pub const SEQUENCE_KINDS: usize = 5;
pub const MAX_SEQUENCE_LENGTH: usize = 252;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceKind {
    Volume,
    Arpeggio,
    Pitch,
    HiPitch,
    /// Duty cycle, noise mode or wave index depending on the chip
    Duty,
}

impl SequenceKind {
    pub const ALL: [SequenceKind; SEQUENCE_KINDS] = [
        SequenceKind::Volume,
        SequenceKind::Arpeggio,
        SequenceKind::Pitch,
        SequenceKind::HiPitch,
        SequenceKind::Duty,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// How arpeggio values apply to the note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArpeggioMode {
    /// Offset from the played note
    #[default]
    Absolute,
    /// Absolute note number
    Fixed,
    /// Offsets accumulate into the note
    Relative,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sequence {
    pub values: Vec<i8>,
    pub loop_point: Option<usize>,
    pub release_point: Option<usize>,
    pub arpeggio_mode: ArpeggioMode,
}

impl Sequence {
    pub fn new(values: &[i8]) -> Self {
        Self {
            values: values[..values.len().min(MAX_SEQUENCE_LENGTH)].to_vec(),
            ..Default::default()
        }
    }

    pub fn with_loop(mut self, point: usize) -> Self {
        self.loop_point = (point < self.values.len()).then_some(point);
        self
    }

    pub fn with_release(mut self, point: usize) -> Self {
        self.release_point = (point < self.values.len()).then_some(point);
        self
    }

    pub fn with_arpeggio_mode(mut self, mode: ArpeggioMode) -> Self {
        self.arpeggio_mode = mode;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Sequences of an instrument, indexed by [`SequenceKind`]
pub type SequenceSet = [Option<Sequence>; SEQUENCE_KINDS];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceState {
    #[default]
    Disabled,
    Running,
    /// Ran past the last value this tick
    End,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    Value(i8),
    /// The sequence finished; reported on one tick only
    End,
    Idle,
}

/// Playback position in one sequence
#[derive(Debug, Clone, Copy, Default)]
pub struct SequencePlayer {
    position: usize,
    state: SequenceState,
}

impl SequencePlayer {
    pub fn start(&mut self, sequence: &Sequence) {
        self.position = 0;
        self.state = if sequence.is_empty() {
            SequenceState::Disabled
        } else {
            SequenceState::Running
        };
    }

    pub fn release(&mut self, sequence: &Sequence) {
        if let Some(release) = sequence.release_point {
            if self.state != SequenceState::Disabled {
                self.position = release + 1;
                self.state = SequenceState::Running;
                if self.position >= sequence.len() {
                    self.wrap_or_end(sequence);
                }
            }
        }
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn wrap_or_end(&mut self, sequence: &Sequence) {
        match sequence.loop_point {
            Some(lp) if sequence.release_point.map_or(true, |rp| lp >= rp) => self.position = lp,
            _ => self.state = SequenceState::End,
        }
    }

    pub fn step(&mut self, sequence: &Sequence, releasing: bool) -> SequenceEvent {
        match self.state {
            SequenceState::Disabled | SequenceState::Halt => SequenceEvent::Idle,
            SequenceState::End => {
                self.state = SequenceState::Halt;
                SequenceEvent::End
            }
            SequenceState::Running => {
                let Some(&value) = sequence.values.get(self.position) else {
                    self.state = SequenceState::Halt;
                    return SequenceEvent::End;
                };
                self.position += 1;

                let at_release = sequence
                    .release_point
                    .is_some_and(|rp| self.position == rp + 1);
                if at_release || self.position >= sequence.len() {
                    let loop_before_release = match (sequence.loop_point, sequence.release_point) {
                        (Some(lp), Some(rp)) => lp < rp && !releasing,
                        (Some(_), None) => true,
                        _ => false,
                    };
                    if loop_before_release {
                        self.position = sequence.loop_point.unwrap_or(0);
                    } else if self.position >= sequence.len() {
                        self.wrap_or_end(sequence);
                    } else if !releasing {
                        // hold on the release point
                        self.position -= 1;
                    }
                }
                SequenceEvent::Value(value)
            }
        }
    }
}

/// Values produced by one tick of the sequence handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceOutput {
    pub volume: Option<i8>,
    pub arpeggio: Option<i8>,
    pub pitch: Option<i8>,
    pub hi_pitch: Option<i8>,
    pub duty: Option<i8>,
    /// The arpeggio sequence ended this tick
    pub arpeggio_ended: bool,
}

/// Runs every sequence of the channel's instrument
#[derive(Debug, Clone, Default)]
pub struct SequenceHandler {
    sequences: SequenceSet,
    players: [SequencePlayer; SEQUENCE_KINDS],
    releasing: bool,
}

impl SequenceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the sequences of a new instrument; playback restarts on the next note
    pub fn load(&mut self, sequences: &SequenceSet) {
        self.sequences = sequences.clone();
        self.players = Default::default();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn sequence(&self, kind: SequenceKind) -> Option<&Sequence> {
        self.sequences[kind.index()].as_ref()
    }

    pub fn state(&self, kind: SequenceKind) -> SequenceState {
        self.players[kind.index()].state()
    }

    pub fn arpeggio_mode(&self) -> ArpeggioMode {
        self.sequence(SequenceKind::Arpeggio)
            .map_or(ArpeggioMode::Absolute, |s| s.arpeggio_mode)
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing
    }

    pub fn start(&mut self) {
        self.releasing = false;
        for (player, sequence) in self.players.iter_mut().zip(&self.sequences) {
            match sequence {
                Some(sequence) => player.start(sequence),
                None => *player = SequencePlayer::default(),
            }
        }
    }

    pub fn release(&mut self) {
        self.releasing = true;
        for (player, sequence) in self.players.iter_mut().zip(&self.sequences) {
            if let Some(sequence) = sequence {
                player.release(sequence);
            }
        }
    }

    pub fn step(&mut self) -> SequenceOutput {
        let mut out = SequenceOutput::default();
        for kind in SequenceKind::ALL {
            let Some(sequence) = &self.sequences[kind.index()] else {
                continue;
            };
            let event = self.players[kind.index()].step(sequence, self.releasing);
            let value = match event {
                SequenceEvent::Value(v) => Some(v),
                SequenceEvent::End => {
                    if kind == SequenceKind::Arpeggio {
                        out.arpeggio_ended = true;
                    }
                    None
                }
                SequenceEvent::Idle => None,
            };
            match kind {
                SequenceKind::Volume => out.volume = value,
                SequenceKind::Arpeggio => out.arpeggio = value,
                SequenceKind::Pitch => out.pitch = value,
                SequenceKind::HiPitch => out.hi_pitch = value,
                SequenceKind::Duty => out.duty = value,
            }
        }
        out
    }
}
