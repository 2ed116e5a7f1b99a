//! Last written value of every chip register, for debugging displays.
//!
//! The log is not authoritative chip state. Writes mark a register as
//! pending; closing a frame turns the pending marks into the `changed`
//! flags reported until the next frame closes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::channels::ChipKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterEntry {
    pub value: u8,
    /// Written during the last completed frame
    pub changed: bool,
    #[serde(skip)]
    pending: bool,
}

/// One register in a serialisable snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterValue {
    pub chip: ChipKind,
    pub key: u16,
    pub value: u8,
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterLog {
    entries: BTreeMap<(ChipKind, u16), RegisterEntry>,
}

impl RegisterLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, chip: ChipKind, key: u16, value: u8) {
        let entry = self.entries.entry((chip, key)).or_insert(RegisterEntry {
            value,
            changed: false,
            pending: false,
        });
        entry.value = value;
        entry.pending = true;
    }

    /// Close a frame: writes since the previous close become `changed`
    pub fn advance(&mut self) {
        for entry in self.entries.values_mut() {
            entry.changed = entry.pending;
            entry.pending = false;
        }
    }

    pub fn value(&self, chip: ChipKind, key: u16) -> Option<u8> {
        self.entries.get(&(chip, key)).map(|entry| entry.value)
    }

    pub fn changed(&self, chip: ChipKind, key: u16) -> bool {
        self.entries
            .get(&(chip, key))
            .is_some_and(|entry| entry.changed)
    }

    /// Every logged register in chip, then key order
    pub fn iter(&self) -> impl Iterator<Item = (ChipKind, u16, &RegisterEntry)> + '_ {
        self.entries
            .iter()
            .map(|(&(chip, key), entry)| (chip, key, entry))
    }

    pub fn iter_chip(&self, chip: ChipKind) -> impl Iterator<Item = (u16, &RegisterEntry)> + '_ {
        self.iter()
            .filter(move |(kind, _, _)| *kind == chip)
            .map(|(_, key, entry)| (key, entry))
    }

    pub fn snapshot(&self) -> Vec<RegisterValue> {
        self.iter()
            .map(|(chip, key, entry)| RegisterValue {
                chip,
                key,
                value: entry.value,
                changed: entry.changed,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
