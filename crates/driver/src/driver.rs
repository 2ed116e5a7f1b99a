//! Sound driver: the per-tick scheduler between a song and the APU.
//!
//! Every tick the driver
//!
//! 1. asks the tempo counter whether a row is due and, if so, reads the row
//!    of every channel, applies the song level effects (`Bxx`, `Cxx`, `Dxx`,
//!    `Fxx`, `Oxx`) and puts the rest in that channel's mailbox,
//! 2. hands mailbox rows to the channel handlers,
//! 3. runs one tick of every handler and lets it write its registers,
//! 4. runs the APU for one frame and returns the finished samples.
//!
//! Instrument previews go through the same mailboxes. Chips whose channels
//! are interchangeable (N163, VRC7, 5B, SN76489 tones) spread preview notes
//! over their channels with a [`NoteQueue`].

use crate::config::{DriverConfig, PlayerConfig};
use crate::document::{note_name, ChannelNote, Document, EffectCommand, Note};
use crate::dpcm::SampleMap;
use crate::error::DriverError;
use crate::handler::{create_handler, init_registers, ChannelHandler, ChipGroups, Tuning};
use crate::note_queue::NoteQueue;
use crate::tempo::TempoCounter;
use fami_core::logging::{log, LogCategory, LogLevel};
use fami_core::apu::RegisterValue;
use fami_core::{Apu, ChannelId, ChipKind, EngineConfig};
use serde::Serialize;
use std::sync::Arc;

/// Requests the player thread forwards to the driver
#[derive(Debug, Clone)]
pub enum DriverCommand {
    Load(Arc<Document>),
    /// Start playback at the first row of a frame
    Play { frame: usize },
    Stop,
    /// Preview a note; `instrument` is loaded first when given
    NoteOn {
        channel: ChannelId,
        note: u8,
        instrument: Option<u8>,
    },
    NoteOff { channel: ChannelId, note: u8 },
    /// Pitch offset in the channel's pitch units, 0 to center
    PitchWheel { channel: ChannelId, offset: i32 },
    /// Semitone offsets cycled per tick, empty to turn off
    AutoArpeggio { channel: ChannelId, offsets: Vec<i8> },
    WriteRegister { address: u16, value: u8 },
    Configure(EngineConfig),
}

/// Position change requested by a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowJump {
    /// `Bxx`: go to frame xx
    Frame(usize),
    /// `Dxx`: next frame, row xx
    Skip(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    frame: usize,
    row: usize,
    /// `Cxx` was read; playback ends when the next row is due
    halt: bool,
}

/// Preview voices of one chip
#[derive(Debug, Clone)]
struct PreviewGroup {
    chip: ChipKind,
    /// Handler indices the queue hands out
    channels: Vec<usize>,
    queue: NoteQueue<u8>,
}

/// What a channel shows in the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub channel: ChannelId,
    pub name: &'static str,
    /// Sounding note, `None` when the channel is silent
    pub note: Option<String>,
    pub volume: u8,
    /// Meter level 0.0-1.0
    pub level: f32,
    pub frequency: f64,
}

/// Read-only view of the player state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub playing: bool,
    pub frame: usize,
    pub row: usize,
    pub tempo: u16,
    pub speed: u8,
    pub ticks: u64,
    pub channels: Vec<ChannelSnapshot>,
    pub registers: Vec<RegisterValue>,
}

pub struct SoundDriver {
    apu: Apu,
    engine: EngineConfig,
    config: DriverConfig,
    doc: Option<Arc<Document>>,
    tuning: Arc<Tuning>,
    handlers: Vec<Box<dyn ChannelHandler>>,
    /// Row waiting for each handler
    mailbox: Vec<Option<ChannelNote>>,
    groups: ChipGroups,
    previews: Vec<PreviewGroup>,
    tempo: TempoCounter,
    cursor: Cursor,
    playing: bool,
    ticks: u64,
}

impl SoundDriver {
    pub fn new(engine: EngineConfig, config: DriverConfig) -> Result<Self, DriverError> {
        engine.validate()?;
        let apu = Apu::new(&engine)?;
        let timing = engine.machine;
        Ok(Self {
            apu,
            tuning: Arc::new(Tuning::new(timing, 1, &config)),
            groups: ChipGroups::new(&engine, 1, SampleMap::default()),
            engine,
            config,
            doc: None,
            handlers: Vec::new(),
            mailbox: Vec::new(),
            previews: Vec::new(),
            tempo: TempoCounter::new(timing.tick_rate()),
            cursor: Cursor::default(),
            playing: false,
            ticks: 0,
        })
    }

    pub fn from_config(config: &PlayerConfig) -> Result<Self, DriverError> {
        Self::new(config.engine.clone(), config.driver.clone())
    }

    /// Set up chips, channels and sample memory for a song
    pub fn load_document(&mut self, doc: Arc<Document>) -> Result<(), DriverError> {
        doc.validate()?;
        self.playing = false;

        self.engine.machine = doc.machine;
        self.engine.chips = doc.expansions.clone();
        self.apu.change_machine(doc.machine);
        self.apu.set_chips(doc.chip_set());
        self.apu.reset();

        let samples = SampleMap::pack(&doc.samples);
        self.apu.load_sample_memory(samples.image());
        self.groups = ChipGroups::new(&self.engine, doc.n163_channels, samples);

        self.tuning = Arc::new(Tuning::new(doc.machine, doc.n163_channels, &self.config));
        self.handlers = doc
            .channels()
            .into_iter()
            .filter_map(|channel| create_handler(channel, Arc::clone(&self.tuning)))
            .collect();
        self.mailbox = vec![None; self.handlers.len()];
        self.previews = self.preview_groups();
        self.tempo = TempoCounter::new(doc.machine.tick_rate());
        self.cursor = Cursor::default();

        init_registers(&mut self.apu);
        log(LogCategory::Driver, LogLevel::Info, || {
            format!(
                "loaded \"{}\": {} channels, {} frames, {} DPCM samples",
                doc.title,
                self.handlers.len(),
                doc.frame_count(),
                doc.samples.len()
            )
        });
        self.doc = Some(doc);
        Ok(())
    }

    fn preview_groups(&self) -> Vec<PreviewGroup> {
        [ChipKind::N163, ChipKind::Vrc7, ChipKind::S5b, ChipKind::Sn76489]
            .into_iter()
            .filter_map(|chip| {
                let channels: Vec<usize> = self
                    .handlers
                    .iter()
                    .enumerate()
                    .filter(|(_, h)| h.channel().chip() == chip && h.channel() != ChannelId::Sn7Noise)
                    .map(|(index, _)| index)
                    .collect();
                (channels.len() > 1).then(|| PreviewGroup {
                    chip,
                    queue: NoteQueue::new(channels.len()),
                    channels,
                })
            })
            .collect()
    }

    pub fn document(&self) -> Option<&Arc<Document>> {
        self.doc.as_ref()
    }

    /// Begin playback at `frame`
    pub fn start(&mut self, frame: usize) -> Result<(), DriverError> {
        let doc = self.doc.as_ref().ok_or(DriverError::NoDocument)?;
        let groove = doc.groove.and_then(|index| doc.grooves.get(index).cloned());
        self.tempo.reset(doc.tempo, doc.speed, groove);
        self.cursor = Cursor {
            frame: frame % doc.frame_count(),
            ..Default::default()
        };
        for handler in self.handlers.iter_mut() {
            handler.reset();
        }
        self.mailbox.iter_mut().for_each(|slot| *slot = None);
        self.playing = true;
        log(LogCategory::Driver, LogLevel::Info, || {
            format!("playback started at frame {}", self.cursor.frame)
        });
        Ok(())
    }

    /// Stop playback and silence every channel
    pub fn stop(&mut self) {
        self.playing = false;
        self.groups.invalidate();
        for handler in self.handlers.iter_mut() {
            handler.clear_registers(&mut self.apu, &mut self.groups);
            handler.reset();
        }
        self.mailbox.iter_mut().for_each(|slot| *slot = None);
        for preview in self.previews.iter_mut() {
            preview.queue.clear();
        }
        log(LogCategory::Driver, LogLevel::Info, || "playback stopped".to_string());
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Run one tick and return the samples finished during it
    pub fn tick(&mut self) -> Vec<i16> {
        if self.playing && self.tempo.can_step_row() {
            if self.cursor.halt {
                self.stop();
            } else {
                self.read_row();
                self.tempo.step_row();
            }
        }
        if self.playing {
            self.tempo.tick();
        }

        if let Some(doc) = &self.doc {
            for (handler, slot) in self.handlers.iter_mut().zip(self.mailbox.iter_mut()) {
                if let Some(row) = slot.take() {
                    handler.handle_note(&row, doc);
                }
                handler.process_tick(doc);
                handler.refresh(&mut self.apu, &mut self.groups);
            }
        }

        self.ticks += 1;
        let length = self.apu.frame_length().saturating_sub(self.apu.frame_cycles());
        self.apu.add_time(length);
        self.apu.process();
        self.apu.take_samples()
    }

    /// Read the row under the cursor into the mailboxes and move the cursor
    fn read_row(&mut self) {
        let Some(doc) = self.doc.clone() else {
            return;
        };
        let Cursor { frame, row, .. } = self.cursor;
        let mut jump = None;
        for (channel, slot) in self.mailbox.iter_mut().enumerate() {
            let note = doc.note(frame, channel, row);
            for effect in note.effects().filter(|e| e.command.is_global()) {
                match effect.command {
                    EffectCommand::Speed if effect.param == 0 => {}
                    EffectCommand::Speed if effect.param < self.config.speed_split => {
                        self.tempo.set_speed(effect.param)
                    }
                    EffectCommand::Speed => self.tempo.set_tempo(effect.param as u16),
                    EffectCommand::Groove => match doc.grooves.get(effect.param as usize) {
                        Some(groove) => self.tempo.set_groove(groove.clone()),
                        None => log(LogCategory::Driver, LogLevel::Debug, || {
                            format!("groove {:02X} does not exist", effect.param)
                        }),
                    },
                    // one position change per row, the leftmost wins
                    EffectCommand::Jump if jump.is_none() => {
                        jump = Some(RowJump::Frame(effect.param as usize))
                    }
                    EffectCommand::Skip if jump.is_none() => {
                        jump = Some(RowJump::Skip(effect.param as usize))
                    }
                    EffectCommand::Halt => self.cursor.halt = true,
                    _ => {}
                }
            }
            if !note.is_empty() {
                *slot = Some(*note);
            }
        }

        let frames = doc.frame_count();
        let last_row = doc.pattern_length - 1;
        let (frame, row) = match jump {
            Some(RowJump::Frame(target)) => (target % frames, 0),
            Some(RowJump::Skip(target)) => ((frame + 1) % frames, target.min(last_row)),
            None if row >= last_row => ((frame + 1) % frames, 0),
            None => (frame, row + 1),
        };
        self.cursor.frame = frame;
        self.cursor.row = row;
    }

    fn handler_index(&self, channel: ChannelId) -> Option<usize> {
        self.handlers.iter().position(|h| h.channel() == channel)
    }

    fn preview_target(&mut self, index: usize, note: u8, release: bool) -> Option<usize> {
        let Some(group) = self.previews.iter_mut().find(|g| g.channels.contains(&index)) else {
            return Some(index);
        };
        if release {
            let voice = group.queue.release(note)?;
            return group.channels.get(voice).copied();
        }
        let assignment = group.queue.trigger(note)?;
        if let Some(evicted) = assignment.evicted {
            let chip = group.chip;
            log(LogCategory::Driver, LogLevel::Trace, || {
                format!("{} preview: {} took the voice of {}", chip.name(), note_name(note), note_name(evicted))
            });
        }
        group.channels.get(assignment.channel).copied()
    }

    pub fn handle_command(&mut self, command: DriverCommand) -> Result<(), DriverError> {
        match command {
            DriverCommand::Load(doc) => self.load_document(doc)?,
            DriverCommand::Play { frame } => self.start(frame)?,
            DriverCommand::Stop => self.stop(),
            DriverCommand::NoteOn {
                channel,
                note,
                instrument,
            } => {
                let index = self
                    .handler_index(channel)
                    .ok_or(DriverError::ChannelNotInSong(channel))?;
                if let Some(target) = self.preview_target(index, note, false) {
                    let mut row = ChannelNote::play(note);
                    row.instrument = instrument;
                    self.mailbox[target] = Some(row);
                }
            }
            DriverCommand::NoteOff { channel, note } => {
                let index = self
                    .handler_index(channel)
                    .ok_or(DriverError::ChannelNotInSong(channel))?;
                if let Some(target) = self.preview_target(index, note, true) {
                    self.mailbox[target] = Some(ChannelNote::EMPTY.with_note(Note::Release));
                }
            }
            DriverCommand::PitchWheel { channel, offset } => {
                if let Some(index) = self.handler_index(channel) {
                    self.handlers[index].state_mut().set_pitch_wheel(offset);
                }
            }
            DriverCommand::AutoArpeggio { channel, offsets } => {
                if let Some(index) = self.handler_index(channel) {
                    self.handlers[index].state_mut().set_auto_arpeggio(offsets);
                }
            }
            DriverCommand::WriteRegister { address, value } => self.apu.write(address, value),
            DriverCommand::Configure(engine) => {
                engine.validate()?;
                let engine = EngineConfig {
                    chips: self.engine.chips.clone(),
                    machine: self.engine.machine,
                    ..engine
                };
                self.apu.configure(&engine);
                self.groups.fds_auto_fm_during_delay = engine.fds_auto_fm_during_delay;
                self.engine = engine;
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let channels = self
            .handlers
            .iter()
            .map(|handler| {
                let channel = handler.channel();
                let state = handler.state();
                let frequency = self.apu.frequency(channel);
                ChannelSnapshot {
                    channel,
                    name: channel.short_name(),
                    note: (state.gate().is_audible() && frequency > 0.0)
                        .then(|| note_name(state.note())),
                    volume: state.volume(),
                    level: self.apu.channel_level(channel),
                    frequency,
                }
            })
            .collect();
        PlayerSnapshot {
            playing: self.playing,
            frame: self.cursor.frame,
            row: self.cursor.row,
            tempo: self.tempo.tempo(),
            speed: self.tempo.speed(),
            ticks: self.ticks,
            channels,
            registers: self.apu.register_log().snapshot(),
        }
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn position(&self) -> (usize, usize) {
        (self.cursor.frame, self.cursor.row)
    }
}
