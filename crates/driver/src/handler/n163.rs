//! Namco 163 wavetable channels.
//!
//! Waves come from the instrument and are copied into chip RAM when the
//! instrument or the selected wave (the duty value) changes. The channel
//! count shares the volume byte of the top channel, so every volume write
//! carries it.

use super::groups::{write_ram, ChipGroups};
use super::state::ChannelState;
use super::{ChannelHandler, Tuning};
use crate::instrument::{Instrument, InstrumentData};
use crate::note_table::PitchTable;
use fami_core::chips::n163::channel_base;
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

const MAX_FREQUENCY: i64 = 0x3FFFF;

#[derive(Debug, Clone, Default)]
struct Voice {
    waves: Vec<Vec<u8>>,
    size: u8,
    position: u8,
}

pub struct N163Handler {
    state: ChannelState,
    base: usize,
    voice: Voice,
    /// Wave currently in RAM and where it was put
    loaded: Option<(usize, u8)>,
}

impl N163Handler {
    pub fn new(channel: ChannelId, tuning: Arc<Tuning>) -> Self {
        Self {
            state: ChannelState::new(channel, PitchTable::N163, tuning),
            base: channel_base(channel.subindex()),
            voice: Voice::default(),
            loaded: None,
        }
    }

    fn count_bits(groups: &ChipGroups) -> u8 {
        (groups.n163.channels() - 1) << 4
    }

    /// Copy the selected wave into RAM; returns its sample address
    fn load_wave(&mut self, apu: &mut Apu, groups: &ChipGroups, index: usize) -> Option<u8> {
        let wave = self.voice.waves.get(index)?;
        if let Some((loaded, position)) = self.loaded {
            if loaded == index {
                return Some(position);
            }
        }
        let position = groups.n163.place_wave(self.voice.position, self.voice.size);
        groups.n163.write_wave(apu, position, wave);
        self.loaded = Some((index, position));
        Some(position)
    }
}

impl ChannelHandler for N163Handler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn load_instrument(&mut self, instrument: &Instrument) {
        if let InstrumentData::N163 {
            waves,
            wave_size,
            wave_position,
        } = &instrument.data
        {
            let voice = Voice {
                waves: waves.clone(),
                size: (*wave_size).max(4) & 0xFC,
                position: *wave_position,
            };
            if voice.waves != self.voice.waves
                || voice.size != self.voice.size
                || voice.position != self.voice.position
            {
                self.voice = voice;
                self.loaded = None;
            }
        }
    }

    fn refresh(&mut self, apu: &mut Apu, groups: &mut ChipGroups) {
        self.state.take_trigger();
        let out = self.state.output();
        let count = Self::count_bits(groups);
        let base = self.base;
        if !out.audible || self.voice.waves.is_empty() {
            write_ram(apu, base + 7, &[count]);
            return;
        }
        let index = out.duty as usize % self.voice.waves.len();
        let Some(position) = self.load_wave(apu, groups, index) else {
            return;
        };
        let size = self.voice.size as i64;
        let frequency = (out.period as i64 * size).clamp(0, MAX_FREQUENCY) as u32;
        let length = (256 - size) as u8 & 0xFC;
        write_ram(apu, base, &[frequency as u8]);
        write_ram(apu, base + 2, &[(frequency >> 8) as u8]);
        write_ram(apu, base + 4, &[length | (frequency >> 16) as u8 & 0x03]);
        write_ram(apu, base + 6, &[position]);
        write_ram(apu, base + 7, &[count | out.volume]);
    }

    fn clear_registers(&mut self, apu: &mut Apu, groups: &mut ChipGroups) {
        let count = Self::count_bits(groups);
        write_ram(apu, self.base, &[0, 0, 0, 0, 0, 0, 0, count]);
        self.loaded = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::document::{ChannelNote, Document, EffectCommand};
    use crate::handler::N163Context;
    use fami_core::{ChipKind, EngineConfig, N163WavePolicy, TimingMode};

    fn setup(channels: u8) -> (Apu, ChipGroups, Document, Arc<Tuning>) {
        let config = EngineConfig {
            chips: vec![ChipKind::N163],
            ..Default::default()
        };
        let mut doc = Document::new(&[ChipKind::N163]);
        doc.n163_channels = channels;
        let saw: Vec<u8> = (0..16).collect();
        let mut inst = Instrument::n163("saw", &saw, 0);
        if let InstrumentData::N163 { waves, .. } = &mut inst.data {
            waves.push(vec![15; 16]);
        }
        doc.instruments.insert(0, inst);
        let groups = ChipGroups {
            n163: N163Context::new(channels, N163WavePolicy::Clamp),
            ..Default::default()
        };
        let tuning = Arc::new(Tuning::new(TimingMode::Ntsc, channels, &DriverConfig::default()));
        (Apu::new(&config).unwrap(), groups, doc, tuning)
    }

    fn ram(apu: &Apu, address: u16) -> Option<u8> {
        apu.register_log().value(ChipKind::N163, address)
    }

    #[test]
    fn note_writes_wave_and_frequency() {
        let (mut apu, mut groups, doc, tuning) = setup(1);
        let mut handler = N163Handler::new(ChannelId::N163Ch1, tuning);
        handler.handle_note(&ChannelNote::play(57).with_instrument(0), &doc);
        handler.process_tick(&doc);
        handler.refresh(&mut apu, &mut groups);

        assert_eq!(ram(&apu, 0x00), Some(0x10));
        assert_eq!(ram(&apu, 0x07), Some(0xFE));
        assert_eq!(ram(&apu, 0x7C), Some(0xF0));
        assert_eq!(ram(&apu, 0x7E), Some(0));
        assert_eq!(ram(&apu, 0x7F), Some(0x0F));
        let hz = apu.frequency(ChannelId::N163Ch1);
        assert!((hz - 440.0).abs() < 3.0, "{hz}");
    }

    #[test]
    fn duty_switches_waves() {
        let (mut apu, mut groups, doc, tuning) = setup(1);
        let mut handler = N163Handler::new(ChannelId::N163Ch1, tuning);
        handler.handle_note(&ChannelNote::play(57).with_instrument(0), &doc);
        handler.process_tick(&doc);
        handler.refresh(&mut apu, &mut groups);
        handler.handle_note(
            &ChannelNote::EMPTY.with_effect(EffectCommand::DutyCycle, 1),
            &doc,
        );
        handler.process_tick(&doc);
        handler.refresh(&mut apu, &mut groups);
        assert_eq!(ram(&apu, 0x00), Some(0xFF));
    }

    #[test]
    fn channel_count_rides_on_every_volume_write() {
        let (mut apu, mut groups, doc, tuning) = setup(4);
        let mut handler = N163Handler::new(ChannelId::N163Ch3, Arc::clone(&tuning));
        handler.handle_note(&ChannelNote::play(57).with_instrument(0).with_volume(9), &doc);
        handler.process_tick(&doc);
        handler.refresh(&mut apu, &mut groups);
        assert_eq!(ram(&apu, 0x6F), Some(0x39));
        // channel 1 has not written its volume byte, so the chip still runs one channel
        assert_eq!(apu.frequency(ChannelId::N163Ch3), 0.0);

        let mut top = N163Handler::new(ChannelId::N163Ch1, tuning);
        top.refresh(&mut apu, &mut groups);
        assert_eq!(ram(&apu, 0x7F), Some(0x30));
        assert!(apu.frequency(ChannelId::N163Ch3) > 0.0);
    }
}
