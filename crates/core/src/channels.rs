//! Identities of the sound chips and of every channel they expose.

use serde::{Deserialize, Serialize};

/// One of the supported sound chips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChipKind {
    /// Built-in RP2A03 APU
    Apu2A03,
    /// Konami VRC6
    Vrc6,
    /// Konami VRC7 (OPLL derived FM)
    Vrc7,
    /// Famicom Disk System wavetable
    Fds,
    /// Nintendo MMC5
    Mmc5,
    /// Namco 163 wavetable
    N163,
    /// Sunsoft 5B (AY-3-8910 family)
    S5b,
    /// TI SN76489
    Sn76489,
}

impl ChipKind {
    pub const ALL: [ChipKind; 8] = [
        ChipKind::Apu2A03,
        ChipKind::Vrc6,
        ChipKind::Vrc7,
        ChipKind::Fds,
        ChipKind::Mmc5,
        ChipKind::N163,
        ChipKind::S5b,
        ChipKind::Sn76489,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            ChipKind::Apu2A03 => "2A03",
            ChipKind::Vrc6 => "VRC6",
            ChipKind::Vrc7 => "VRC7",
            ChipKind::Fds => "FDS",
            ChipKind::Mmc5 => "MMC5",
            ChipKind::N163 => "N163",
            ChipKind::S5b => "5B",
            ChipKind::Sn76489 => "SN76489",
        }
    }

    /// Channels this chip exposes, in tracker order
    pub fn channels(self) -> &'static [ChannelId] {
        use ChannelId::*;
        match self {
            ChipKind::Apu2A03 => &[Square1, Square2, Triangle, Noise, Dpcm],
            ChipKind::Vrc6 => &[Vrc6Pulse1, Vrc6Pulse2, Vrc6Sawtooth],
            ChipKind::Vrc7 => &[Vrc7Ch1, Vrc7Ch2, Vrc7Ch3, Vrc7Ch4, Vrc7Ch5, Vrc7Ch6],
            ChipKind::Fds => &[Fds],
            ChipKind::Mmc5 => &[Mmc5Square1, Mmc5Square2, Mmc5Pcm],
            ChipKind::N163 => &[
                N163Ch1, N163Ch2, N163Ch3, N163Ch4, N163Ch5, N163Ch6, N163Ch7, N163Ch8,
            ],
            ChipKind::S5b => &[S5bCh1, S5bCh2, S5bCh3],
            ChipKind::Sn76489 => &[Sn7Square1, Sn7Square2, Sn7Square3, Sn7Noise],
        }
    }
}

/// A set of chips, stored as a bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChipSet(u8);

impl ChipSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Only the built-in APU
    pub fn base() -> Self {
        Self::from_kinds(&[ChipKind::Apu2A03])
    }

    pub fn all() -> Self {
        Self::from_kinds(&ChipKind::ALL)
    }

    pub fn from_kinds(kinds: &[ChipKind]) -> Self {
        kinds.iter().fold(Self::empty(), |set, &kind| set.with(kind))
    }

    pub fn with(mut self, kind: ChipKind) -> Self {
        self.insert(kind);
        self
    }

    pub fn insert(&mut self, kind: ChipKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: ChipKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: ChipKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ChipKind> + '_ {
        ChipKind::ALL.into_iter().filter(|&kind| self.contains(kind))
    }

    /// Every channel of every chip in the set, in tracker order
    pub fn channels(&self) -> Vec<ChannelId> {
        self.iter()
            .flat_map(|kind| kind.channels().iter().copied())
            .collect()
    }
}

/// A physical sound channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelId {
    Square1,
    Square2,
    Triangle,
    Noise,
    Dpcm,
    Vrc6Pulse1,
    Vrc6Pulse2,
    Vrc6Sawtooth,
    Mmc5Square1,
    Mmc5Square2,
    Mmc5Pcm,
    N163Ch1,
    N163Ch2,
    N163Ch3,
    N163Ch4,
    N163Ch5,
    N163Ch6,
    N163Ch7,
    N163Ch8,
    Fds,
    Vrc7Ch1,
    Vrc7Ch2,
    Vrc7Ch3,
    Vrc7Ch4,
    Vrc7Ch5,
    Vrc7Ch6,
    S5bCh1,
    S5bCh2,
    S5bCh3,
    Sn7Square1,
    Sn7Square2,
    Sn7Square3,
    Sn7Noise,
}

/// Number of physical channels across every chip
pub const CHANNEL_COUNT: usize = 33;

impl ChannelId {
    /// Dense index, usable for per-channel arrays
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        ChipKind::ALL
            .iter()
            .flat_map(|kind| kind.channels().iter().copied())
            .find(|ch| ch.index() == index)
    }

    pub fn chip(self) -> ChipKind {
        use ChannelId::*;
        match self {
            Square1 | Square2 | Triangle | Noise | Dpcm => ChipKind::Apu2A03,
            Vrc6Pulse1 | Vrc6Pulse2 | Vrc6Sawtooth => ChipKind::Vrc6,
            Mmc5Square1 | Mmc5Square2 | Mmc5Pcm => ChipKind::Mmc5,
            N163Ch1 | N163Ch2 | N163Ch3 | N163Ch4 | N163Ch5 | N163Ch6 | N163Ch7 | N163Ch8 => {
                ChipKind::N163
            }
            Fds => ChipKind::Fds,
            Vrc7Ch1 | Vrc7Ch2 | Vrc7Ch3 | Vrc7Ch4 | Vrc7Ch5 | Vrc7Ch6 => ChipKind::Vrc7,
            S5bCh1 | S5bCh2 | S5bCh3 => ChipKind::S5b,
            Sn7Square1 | Sn7Square2 | Sn7Square3 | Sn7Noise => ChipKind::Sn76489,
        }
    }

    /// Position of the channel within its chip
    pub fn subindex(self) -> usize {
        let chip = self.chip();
        chip.channels()
            .iter()
            .position(|&ch| ch == self)
            .unwrap_or(0)
    }

    /// Channel `index` of `chip`, if the chip has that many channels
    pub fn of_chip(chip: ChipKind, index: usize) -> Option<Self> {
        chip.channels().get(index).copied()
    }

    pub fn short_name(self) -> &'static str {
        use ChannelId::*;
        match self {
            Square1 => "Pulse 1",
            Square2 => "Pulse 2",
            Triangle => "Triangle",
            Noise => "Noise",
            Dpcm => "DPCM",
            Vrc6Pulse1 => "VRC6 Pulse 1",
            Vrc6Pulse2 => "VRC6 Pulse 2",
            Vrc6Sawtooth => "Sawtooth",
            Mmc5Square1 => "MMC5 Pulse 1",
            Mmc5Square2 => "MMC5 Pulse 2",
            Mmc5Pcm => "MMC5 PCM",
            N163Ch1 => "Namco 1",
            N163Ch2 => "Namco 2",
            N163Ch3 => "Namco 3",
            N163Ch4 => "Namco 4",
            N163Ch5 => "Namco 5",
            N163Ch6 => "Namco 6",
            N163Ch7 => "Namco 7",
            N163Ch8 => "Namco 8",
            Fds => "FDS",
            Vrc7Ch1 => "FM 1",
            Vrc7Ch2 => "FM 2",
            Vrc7Ch3 => "FM 3",
            Vrc7Ch4 => "FM 4",
            Vrc7Ch5 => "FM 5",
            Vrc7Ch6 => "FM 6",
            S5bCh1 => "5B Square 1",
            S5bCh2 => "5B Square 2",
            S5bCh3 => "5B Square 3",
            Sn7Square1 => "SN Square 1",
            Sn7Square2 => "SN Square 2",
            Sn7Square3 => "SN Square 3",
            Sn7Noise => "SN Noise",
        }
    }
}
