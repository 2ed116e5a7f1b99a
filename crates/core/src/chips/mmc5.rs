//! Nintendo MMC5 audio: two 2A03-style squares and an 8-bit PCM channel.
//!
//! The squares have no sweep unit. MMC5 runs its own fixed 240Hz sequencer,
//! so envelopes and length counters are both clocked on every quarter-frame
//! step of the shared sequencer.

use super::sound_chip::SoundChip;
use super::square::Square;
use crate::apu::{SequencerTick, TimingMode};
use crate::channels::{ChannelId, ChipKind};
use crate::mixer::Mixer;

#[derive(Debug)]
pub struct Mmc5 {
    square1: Square,
    square2: Square,
    /// PCM read mode ($5010 bit 0); raw writes are ignored while set
    pcm_read_mode: bool,
    pcm: u8,
    pcm_dirty: bool,
    time: u32,
    timing: TimingMode,
}

impl Mmc5 {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            square1: Square::new(ChannelId::Mmc5Square1, None),
            square2: Square::new(ChannelId::Mmc5Square2, None),
            pcm_read_mode: false,
            pcm: 0,
            pcm_dirty: false,
            time: 0,
            timing,
        }
    }
}

impl SoundChip for Mmc5 {
    fn kind(&self) -> ChipKind {
        ChipKind::Mmc5
    }

    fn reset(&mut self) {
        *self = Self::new(self.timing);
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x5000..=0x5003 => self.square1.write(addr - 0x5000, value),
            0x5004..=0x5007 => self.square2.write(addr - 0x5004, value),
            0x5010 => self.pcm_read_mode = value & 0x01 != 0,
            // A zero byte is the PCM IRQ trigger, not a level
            0x5011 if !self.pcm_read_mode && value != 0 => {
                self.pcm = value;
                self.pcm_dirty = true;
            }
            0x5015 => {
                self.square1.set_enabled(value & 0x01 != 0);
                self.square2.set_enabled(value & 0x02 != 0);
            }
            _ => {}
        }
    }

    fn read(&mut self, addr: u16) -> Option<u8> {
        (addr == 0x5015)
            .then(|| self.square1.is_active() as u8 | (self.square2.is_active() as u8) << 1)
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        if self.pcm_dirty {
            mixer.add_value(ChannelId::Mmc5Pcm, self.pcm as i32, self.time);
            self.pcm_dirty = false;
        }
        self.square1.process(time, mixer);
        self.square2.process(time, mixer);
        self.time += time;
    }

    fn end_frame(&mut self) {
        self.square1.end_frame();
        self.square2.end_frame();
        self.time = 0;
    }

    fn frequency(&self, channel: usize) -> f64 {
        let clock = self.timing.cpu_clock_hz();
        match channel {
            0 => self.square1.frequency(clock),
            1 => self.square2.frequency(clock),
            _ => 0.0,
        }
    }

    fn min_period(&self) -> u32 {
        [&self.square1, &self.square2]
            .into_iter()
            .filter(|sq| sq.is_sounding())
            .map(Square::period_cycles)
            .min()
            .unwrap_or(u32::MAX)
    }

    fn on_sequencer_tick(&mut self, tick: SequencerTick) {
        if tick.quarter {
            for square in [&mut self.square1, &mut self.square2] {
                square.quarter_clock();
                square.half_clock();
            }
        }
    }

    fn register_key(&self, addr: u16) -> Option<u16> {
        matches!(addr, 0x5000..=0x5007 | 0x5010 | 0x5011 | 0x5015).then_some(addr)
    }

    fn set_timing(&mut self, timing: TimingMode) {
        self.timing = timing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn length_counters_run_at_quarter_frame_rate() {
        let mut mmc5 = Mmc5::new(TimingMode::Ntsc);
        mmc5.write(0x5015, 0x03);
        mmc5.write(0x5000, 0x1F);
        mmc5.write(0x5003, 0x18); // length 2
        assert_eq!(mmc5.read(0x5015), Some(0x01));

        let quarter_only = SequencerTick {
            quarter: true,
            half: false,
        };
        mmc5.on_sequencer_tick(quarter_only);
        mmc5.on_sequencer_tick(quarter_only);
        assert_eq!(mmc5.read(0x5015), Some(0x00));
    }

    #[test]
    fn pcm_ignores_zero_and_read_mode() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut mmc5 = Mmc5::new(TimingMode::Ntsc);
        mmc5.write(0x5011, 0x80);
        mmc5.process(10, &mut mixer);
        assert_eq!(mixer.channel_value(ChannelId::Mmc5Pcm), 0x80);

        mmc5.write(0x5011, 0x00);
        mmc5.write(0x5010, 0x01);
        mmc5.write(0x5011, 0x20);
        mmc5.process(10, &mut mixer);
        assert_eq!(mixer.channel_value(ChannelId::Mmc5Pcm), 0x80);
    }

    #[test]
    fn squares_use_full_period_range() {
        let mut mmc5 = Mmc5::new(TimingMode::Ntsc);
        mmc5.write(0x5015, 0x02);
        mmc5.write(0x5006, 0xFF);
        mmc5.write(0x5007, 0x0F);
        assert_eq!(mmc5.min_period(), 0x800 * 2);
        assert!(mmc5.frequency(1) > 50.0);
        assert_eq!(mmc5.register_key(0x5012), None);
    }
}
