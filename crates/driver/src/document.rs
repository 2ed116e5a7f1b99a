//! Song data as the driver consumes it: frames of patterns of rows.
//!
//! A row of one channel holds an optional note, volume and instrument
//! plus up to four effect columns. Notes are numbered `octave * 12 +
//! semitone` with C-0 = 0 and B-7 = 95.

use crate::dpcm::DpcmSample;
use crate::error::DriverError;
use crate::instrument::Instrument;
use fami_core::{ChannelId, ChipKind, ChipSet, TimingMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const NOTE_COUNT: u8 = 96;
pub const MAX_EFFECT_COLUMNS: usize = 4;
pub const MAX_VOLUME: u8 = 0x0F;
pub const MAX_N163_CHANNELS: u8 = 8;

pub const DEFAULT_SPEED: u8 = 6;
pub const DEFAULT_TEMPO: u16 = 150;

const NOTE_NAMES: [&str; 12] = [
    "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
];

/// Parse a note name such as `C-4` or `F#2`
pub fn note_from_name(name: &str) -> Option<u8> {
    let name = name.as_bytes();
    if name.len() != 3 {
        return None;
    }
    let semitone = NOTE_NAMES
        .iter()
        .position(|n| n.as_bytes() == &name[..2])?;
    let octave = (name[2] as char).to_digit(10)? as u8;
    let note = octave * 12 + semitone as u8;
    (note < NOTE_COUNT).then_some(note)
}

pub fn note_name(note: u8) -> String {
    format!("{}{}", NOTE_NAMES[note as usize % 12], note / 12)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Note {
    On(u8),
    /// Note cut
    Halt,
    /// Key release, instrument sequences jump past their release point
    Release,
    /// Replay the note `n` notes back (0 is the last one)
    Echo(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectCommand {
    Arpeggio,
    PortaUp,
    PortaDown,
    Portamento,
    Vibrato,
    Tremolo,
    VolumeSlide,
    Jump,
    Halt,
    Skip,
    Speed,
    Groove,
    Delay,
    NoteCut,
    NoteRelease,
    DelayedVolume,
    Transpose,
    Pitch,
    NoteSlideUp,
    NoteSlideDown,
    DutyCycle,
    SweepUp,
    SweepDown,
    DpcmOffset,
    DpcmPitch,
    DacLoad,
    Retrigger,
    FdsModDepth,
    FdsModSpeedHigh,
    FdsModSpeedLow,
    FdsAutoFm,
    S5bEnvelopeShape,
    S5bEnvelopeHigh,
    S5bEnvelopeLow,
    S5bNoise,
    Sn7Stereo,
}

impl EffectCommand {
    /// Column letter shown in pattern views
    pub fn letter(self) -> char {
        use EffectCommand::*;
        match self {
            Arpeggio => '0',
            PortaUp => '1',
            PortaDown => '2',
            Portamento => '3',
            Vibrato => '4',
            Tremolo => '7',
            VolumeSlide => 'A',
            Jump => 'B',
            Halt => 'C',
            Skip => 'D',
            Speed => 'F',
            Groove => 'O',
            Delay => 'G',
            NoteCut => 'S',
            NoteRelease => 'L',
            DelayedVolume => 'M',
            Transpose => 'T',
            Pitch => 'P',
            NoteSlideUp => 'Q',
            NoteSlideDown => 'R',
            DutyCycle => 'V',
            SweepUp | FdsModDepth | S5bEnvelopeShape => 'H',
            SweepDown | FdsModSpeedHigh | S5bEnvelopeHigh => 'I',
            FdsModSpeedLow | S5bEnvelopeLow => 'J',
            FdsAutoFm => 'K',
            DpcmOffset => 'Y',
            DpcmPitch | S5bNoise => 'W',
            DacLoad => 'Z',
            Retrigger => 'X',
            Sn7Stereo => 'E',
        }
    }

    /// Effects the driver applies to the song position instead of a channel
    pub fn is_global(self) -> bool {
        matches!(
            self,
            EffectCommand::Jump
                | EffectCommand::Halt
                | EffectCommand::Skip
                | EffectCommand::Speed
                | EffectCommand::Groove
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub command: EffectCommand,
    pub param: u8,
}

impl Effect {
    pub fn new(command: EffectCommand, param: u8) -> Self {
        Self { command, param }
    }

    pub fn high(&self) -> u8 {
        self.param >> 4
    }

    pub fn low(&self) -> u8 {
        self.param & 0x0F
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02X}", self.command.letter(), self.param)
    }
}

/// One channel's cell of a pattern row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNote {
    pub note: Option<Note>,
    pub volume: Option<u8>,
    pub instrument: Option<u8>,
    pub effects: [Option<Effect>; MAX_EFFECT_COLUMNS],
}

impl ChannelNote {
    pub const EMPTY: ChannelNote = ChannelNote {
        note: None,
        volume: None,
        instrument: None,
        effects: [None; MAX_EFFECT_COLUMNS],
    };

    pub fn play(note: u8) -> Self {
        Self {
            note: Some(Note::On(note.min(NOTE_COUNT - 1))),
            ..Self::EMPTY
        }
    }

    pub fn with_note(mut self, note: Note) -> Self {
        self.note = Some(note);
        self
    }

    pub fn with_instrument(mut self, instrument: u8) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume.min(MAX_VOLUME));
        self
    }

    /// Put an effect in the first free column; extra effects are dropped
    pub fn with_effect(mut self, command: EffectCommand, param: u8) -> Self {
        if let Some(slot) = self.effects.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(Effect::new(command, param));
        }
        self
    }

    pub fn effects(&self) -> impl Iterator<Item = Effect> + '_ {
        self.effects.iter().flatten().copied()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Rows past the end of the vector are empty
    pub rows: Vec<ChannelNote>,
}

impl Pattern {
    pub fn row(&self, row: usize) -> &ChannelNote {
        self.rows.get(row).unwrap_or(&ChannelNote::EMPTY)
    }

    pub fn set(&mut self, row: usize, note: ChannelNote) {
        if self.rows.len() <= row {
            self.rows.resize(row + 1, ChannelNote::EMPTY);
        }
        self.rows[row] = note;
    }
}

/// A song with everything the driver needs to play it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub title: String,
    pub machine: TimingMode,
    /// Expansion chips used by the song
    pub expansions: Vec<ChipKind>,
    pub n163_channels: u8,
    pub speed: u8,
    pub tempo: u16,
    pub grooves: Vec<Vec<u8>>,
    /// Groove played from the start instead of the fixed speed
    pub groove: Option<usize>,
    pub pattern_length: usize,
    /// Pattern index of every channel, per frame
    pub frames: Vec<Vec<usize>>,
    /// Patterns of every channel, indexed by channel then pattern
    pub patterns: Vec<Vec<Pattern>>,
    pub instruments: BTreeMap<u8, Instrument>,
    pub samples: Vec<DpcmSample>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            title: String::new(),
            machine: TimingMode::Ntsc,
            expansions: Vec::new(),
            n163_channels: 1,
            speed: DEFAULT_SPEED,
            tempo: DEFAULT_TEMPO,
            grooves: Vec::new(),
            groove: None,
            pattern_length: 64,
            frames: vec![Vec::new()],
            patterns: Vec::new(),
            instruments: BTreeMap::new(),
            samples: Vec::new(),
        }
    }
}

impl Document {
    /// Empty song with one frame and one pattern per channel
    pub fn new(expansions: &[ChipKind]) -> Self {
        let mut doc = Self {
            expansions: expansions.to_vec(),
            ..Default::default()
        };
        let channels = doc.channels().len();
        doc.frames = vec![vec![0; channels]];
        doc.patterns = vec![vec![Pattern::default()]; channels];
        doc
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let contents =
            fs::read_to_string(path).map_err(|e| DriverError::Document(e.to_string()))?;
        let doc: Self =
            serde_json::from_str(&contents).map_err(|e| DriverError::Document(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn chip_set(&self) -> ChipSet {
        ChipSet::from_kinds(&self.expansions).with(ChipKind::Apu2A03)
    }

    /// Tracker channels in column order
    pub fn channels(&self) -> Vec<ChannelId> {
        let chips = self.chip_set();
        let n163 = self.n163_channels.clamp(1, MAX_N163_CHANNELS) as usize;
        chips
            .iter()
            .flat_map(|chip| {
                let channels = chip.channels();
                match chip {
                    ChipKind::N163 => &channels[..n163],
                    // The PCM channel has no column
                    ChipKind::Mmc5 => &channels[..2],
                    _ => channels,
                }
            })
            .copied()
            .collect()
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        if !(1..=MAX_N163_CHANNELS).contains(&self.n163_channels) {
            return Err(DriverError::InvalidChannelCount(self.n163_channels));
        }
        let channels = self.channels().len();
        if self.frames.is_empty() {
            return Err(DriverError::Document("song has no frames".into()));
        }
        if self.pattern_length == 0 {
            return Err(DriverError::Document("pattern length is zero".into()));
        }
        if self.speed == 0 {
            return Err(DriverError::Document("speed is zero".into()));
        }
        for (index, frame) in self.frames.iter().enumerate() {
            if frame.len() > channels {
                return Err(DriverError::Document(format!(
                    "frame {index} lists {} channels, song has {channels}",
                    frame.len()
                )));
            }
        }
        if let Some(groove) = self.groove {
            match self.grooves.get(groove) {
                Some(g) if !g.is_empty() && g.iter().all(|&s| s > 0) => {}
                _ => return Err(DriverError::Document(format!("invalid groove {groove}"))),
            }
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Cell at a position; missing frames, patterns and rows read as empty
    pub fn note(&self, frame: usize, channel: usize, row: usize) -> &ChannelNote {
        self.frames
            .get(frame)
            .and_then(|patterns| patterns.get(channel))
            .and_then(|&pattern| self.patterns.get(channel)?.get(pattern))
            .map_or(&ChannelNote::EMPTY, |pattern| pattern.row(row))
    }

    /// Write a cell into the pattern the frame uses, creating it if needed
    pub fn set_note(&mut self, frame: usize, channel: usize, row: usize, note: ChannelNote) {
        if self.frames.len() <= frame {
            self.frames.resize(frame + 1, Vec::new());
        }
        if self.frames[frame].len() <= channel {
            self.frames[frame].resize(channel + 1, 0);
        }
        let pattern = self.frames[frame][channel];
        if self.patterns.len() <= channel {
            self.patterns.resize(channel + 1, Vec::new());
        }
        let patterns = &mut self.patterns[channel];
        if patterns.len() <= pattern {
            patterns.resize(pattern + 1, Pattern::default());
        }
        patterns[pattern].set(row, note);
    }

    pub fn instrument(&self, index: u8) -> Option<&Instrument> {
        self.instruments.get(&index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_names() {
        assert_eq!(note_from_name("C-0"), Some(0));
        assert_eq!(note_from_name("C-4"), Some(48));
        assert_eq!(note_from_name("A-4"), Some(57));
        assert_eq!(note_from_name("B-7"), Some(95));
        assert_eq!(note_from_name("H-4"), None);
        assert_eq!(note_from_name("C-8"), None);
        assert_eq!(note_name(49), "C#4");
    }

    #[test]
    fn channel_layout_follows_chips() {
        let doc = Document::new(&[ChipKind::N163, ChipKind::Vrc6, ChipKind::Mmc5]);
        let channels = doc.channels();
        assert_eq!(channels.len(), 5 + 3 + 2 + 1);
        assert_eq!(channels[5], ChannelId::Vrc6Pulse1);
        assert_eq!(channels[8], ChannelId::Mmc5Square1);
        assert_eq!(channels[10], ChannelId::N163Ch1);

        let mut doc = doc;
        doc.n163_channels = 4;
        assert_eq!(doc.channels().len(), 14);
    }

    #[test]
    fn missing_cells_read_as_empty() {
        let mut doc = Document::new(&[]);
        doc.set_note(0, 0, 3, ChannelNote::play(48));
        assert_eq!(doc.note(0, 0, 3).note, Some(Note::On(48)));
        assert!(doc.note(0, 0, 2).is_empty());
        assert!(doc.note(0, 0, 63).is_empty());
        assert!(doc.note(7, 0, 0).is_empty());
        assert!(doc.note(0, 12, 0).is_empty());
    }

    #[test]
    fn fifth_effect_is_dropped() {
        let note = (0..5).fold(ChannelNote::play(0), |note, i| {
            note.with_effect(EffectCommand::Pitch, i)
        });
        let params: Vec<u8> = note.effects().map(|e| e.param).collect();
        assert_eq!(params, vec![0, 1, 2, 3]);
    }

    #[test]
    fn validation() {
        let mut doc = Document::new(&[ChipKind::N163]);
        assert!(doc.validate().is_ok());
        doc.n163_channels = 9;
        assert!(matches!(doc.validate(), Err(DriverError::InvalidChannelCount(9))));
        doc.n163_channels = 8;
        doc.groove = Some(0);
        assert!(doc.validate().is_err());
        doc.grooves.push(vec![6, 5]);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn effect_display() {
        assert_eq!(Effect::new(EffectCommand::Vibrato, 0x4A).to_string(), "44A");
        assert_eq!(Effect::new(EffectCommand::Speed, 0x06).to_string(), "F06");
    }

    #[test]
    fn json_round_trip() {
        let mut doc = Document::new(&[ChipKind::Vrc6]);
        doc.set_note(
            0,
            5,
            0,
            ChannelNote::play(60)
                .with_volume(12)
                .with_effect(EffectCommand::Vibrato, 0x44),
        );
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
