//! Tracker side of the sound engine.
//!
//! A [`Document`] holds patterns, instruments and DPCM samples. The
//! [`SoundDriver`] plays it: a [`TempoCounter`] decides when rows are due,
//! channel handlers turn rows into register writes and a
//! [`fami_core::Apu`] renders them. [`Player`] runs the driver on its own
//! thread.

pub mod config;
pub mod document;
pub mod dpcm;
pub mod driver;
pub mod error;
pub mod handler;
pub mod instrument;
pub mod note_queue;
pub mod note_table;
pub mod player;
pub mod sequence;
pub mod tempo;

pub use config::{DriverConfig, PlayerConfig, VibratoStyle};
pub use document::{ChannelNote, Document, Effect, EffectCommand, Note, Pattern};
pub use dpcm::{DpcmSample, SampleMap};
pub use driver::{ChannelSnapshot, DriverCommand, PlayerSnapshot, SoundDriver};
pub use error::DriverError;
pub use handler::{create_handler, ChannelHandler, ChipGroups, Tuning};
pub use instrument::{DpcmAssignment, Instrument, InstrumentData};
pub use note_queue::{NoteQueue, NoteState};
pub use note_table::{NoteTables, PitchTable};
pub use player::{AudioSink, NullSink, Player, PlayerHandle};
pub use sequence::{Sequence, SequenceHandler, SequenceKind};
pub use tempo::TempoCounter;
