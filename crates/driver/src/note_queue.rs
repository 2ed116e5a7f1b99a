//! Voice allocation for channel groups that share one instrument preview.
//!
//! A queue owns `n` physical channels. Triggering a note picks a free
//! channel if there is one; otherwise it steals the oldest released note,
//! and only when every channel holds a key-down note the oldest held one.
//! Every trigger takes a fresh, strictly increasing priority, so "oldest"
//! is well defined and stealing is deterministic.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    Hold,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Voice<K> {
    note: K,
    state: NoteState,
    priority: u64,
}

/// Result of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment<K> {
    pub channel: usize,
    /// Note that lost its channel
    pub evicted: Option<K>,
}

#[derive(Debug, Clone)]
pub struct NoteQueue<K = u8> {
    voices: Vec<Option<Voice<K>>>,
    next_priority: u64,
}

impl<K: Copy + PartialEq> NoteQueue<K> {
    pub fn new(channels: usize) -> Self {
        Self {
            voices: vec![None; channels],
            next_priority: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.voices.len()
    }

    pub fn channel_of(&self, note: K) -> Option<usize> {
        self.voices
            .iter()
            .position(|voice| voice.is_some_and(|v| v.note == note))
    }

    pub fn state_of(&self, note: K) -> Option<NoteState> {
        self.channel_of(note)
            .and_then(|ch| self.voices[ch].map(|v| v.state))
    }

    /// Note playing on a channel
    pub fn note_on(&self, channel: usize) -> Option<K> {
        self.voices.get(channel).copied().flatten().map(|v| v.note)
    }

    /// Assign a channel to a note. A note that already owns a channel keeps it.
    /// Returns `None` only when the queue has no channels.
    pub fn trigger(&mut self, note: K) -> Option<Assignment<K>> {
        let priority = self.next_priority;
        self.next_priority += 1;

        let (channel, evicted) = match self.channel_of(note) {
            Some(channel) => (channel, None),
            None => {
                let channel = self.pick_channel()?;
                (channel, self.voices[channel].map(|v| v.note))
            }
        };
        self.voices[channel] = Some(Voice {
            note,
            state: NoteState::Hold,
            priority,
        });
        Some(Assignment { channel, evicted })
    }

    fn pick_channel(&self) -> Option<usize> {
        if let Some(free) = self.voices.iter().position(Option::is_none) {
            return Some(free);
        }
        let oldest = |state: NoteState| {
            self.voices
                .iter()
                .enumerate()
                .filter_map(|(ch, voice)| voice.filter(|v| v.state == state).map(|v| (v.priority, ch)))
                .min()
                .map(|(_, ch)| ch)
        };
        oldest(NoteState::Release).or_else(|| oldest(NoteState::Hold))
    }

    /// Key up; the note keeps its channel until stolen or cut
    pub fn release(&mut self, note: K) -> Option<usize> {
        let channel = self.channel_of(note)?;
        if let Some(voice) = self.voices[channel].as_mut() {
            voice.state = NoteState::Release;
        }
        Some(channel)
    }

    /// Free the note's channel
    pub fn cut(&mut self, note: K) -> Option<usize> {
        let channel = self.channel_of(note)?;
        self.voices[channel] = None;
        Some(channel)
    }

    pub fn clear(&mut self) {
        self.voices.iter_mut().for_each(|voice| *voice = None);
    }

    /// Change the number of channels; returns notes dropped from removed channels
    pub fn resize(&mut self, channels: usize) -> Vec<K> {
        let dropped = self
            .voices
            .iter()
            .skip(channels)
            .flatten()
            .map(|v| v.note)
            .collect();
        self.voices.resize(channels, None);
        dropped
    }
}
