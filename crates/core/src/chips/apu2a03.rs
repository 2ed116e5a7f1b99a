//! RP2A03 / RP2A07 built-in sound channels.
//!
//! Two squares, a triangle, noise and the DPCM channel, mapped at
//! $4000-$4013 plus the status register at $4015. The frame counter
//! register $4017 belongs to the dispatcher's frame sequencer; the chip
//! only receives the resulting clocks.

use super::dpcm::{Dpcm, SampleMemory};
use super::noise::Noise;
use super::sound_chip::SoundChip;
use super::square::Square;
use super::sweep::Sweep;
use super::triangle::Triangle;
use crate::apu::{SequencerTick, TimingMode};
use crate::channels::{ChannelId, ChipKind};
use crate::mixer::Mixer;

/// The 2A03 sound unit.
#[derive(Debug)]
pub struct Apu2A03 {
    pub square1: Square,
    pub square2: Square,
    pub triangle: Triangle,
    pub noise: Noise,
    pub dpcm: Dpcm,
    memory: SampleMemory,
    timing: TimingMode,
}

impl Apu2A03 {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            square1: Square::new(ChannelId::Square1, Some(Sweep::new(true))),
            square2: Square::new(ChannelId::Square2, Some(Sweep::new(false))),
            triangle: Triangle::new(),
            noise: Noise::new(timing),
            dpcm: Dpcm::new(timing),
            memory: SampleMemory::new(),
            timing,
        }
    }

    /// Replace the DPCM sample window contents
    pub fn load_sample_memory(&mut self, bytes: &[u8]) {
        self.memory.load(bytes);
    }

    pub fn sample_memory(&self) -> &SampleMemory {
        &self.memory
    }

    fn status(&self) -> u8 {
        let mut status = 0;
        status |= self.square1.is_active() as u8;
        status |= (self.square2.is_active() as u8) << 1;
        status |= (self.triangle.is_active() as u8) << 2;
        status |= (self.noise.is_active() as u8) << 3;
        status |= (self.dpcm.is_active() as u8) << 4;
        status |= (self.dpcm.irq_pending() as u8) << 7;
        status
    }
}

impl SoundChip for Apu2A03 {
    fn kind(&self) -> ChipKind {
        ChipKind::Apu2A03
    }

    fn reset(&mut self) {
        self.square1.reset();
        self.square2.reset();
        self.triangle.reset();
        self.noise.reset();
        self.dpcm.reset();
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000..=0x4003 => self.square1.write(addr - 0x4000, value),
            0x4004..=0x4007 => self.square2.write(addr - 0x4004, value),
            0x4008..=0x400B => self.triangle.write(addr - 0x4008, value),
            0x400C..=0x400F => self.noise.write(addr - 0x400C, value),
            0x4010..=0x4013 => self.dpcm.write(addr - 0x4010, value),
            0x4015 => {
                self.square1.set_enabled(value & 0x01 != 0);
                self.square2.set_enabled(value & 0x02 != 0);
                self.triangle.set_enabled(value & 0x04 != 0);
                self.noise.set_enabled(value & 0x08 != 0);
                self.dpcm.set_enabled(value & 0x10 != 0);
            }
            _ => {}
        }
    }

    fn read(&mut self, addr: u16) -> Option<u8> {
        (addr == 0x4015).then(|| self.status())
    }

    fn process(&mut self, time: u32, mixer: &mut Mixer) {
        self.square1.process(time, mixer);
        self.square2.process(time, mixer);
        self.triangle.process(time, mixer);
        self.noise.process(time, mixer);
        self.dpcm.process(time, &self.memory, mixer);
    }

    fn end_frame(&mut self) {
        self.square1.end_frame();
        self.square2.end_frame();
        self.triangle.end_frame();
        self.noise.end_frame();
        self.dpcm.end_frame();
    }

    fn frequency(&self, channel: usize) -> f64 {
        let clock = self.timing.cpu_clock_hz();
        match channel {
            0 => self.square1.frequency(clock),
            1 => self.square2.frequency(clock),
            2 => self.triangle.frequency(clock),
            3 => self.noise.frequency(clock),
            4 => self.dpcm.frequency(clock),
            _ => 0.0,
        }
    }

    fn min_period(&self) -> u32 {
        let periods = [
            self.square1.is_sounding().then(|| self.square1.period_cycles()),
            self.square2.is_sounding().then(|| self.square2.period_cycles()),
            self.triangle.is_sounding().then(|| self.triangle.period_cycles()),
            self.noise.is_sounding().then(|| self.noise.period_cycles()),
            self.dpcm.is_sounding().then(|| self.dpcm.period_cycles()),
        ];
        periods.into_iter().flatten().min().unwrap_or(u32::MAX)
    }

    fn on_sequencer_tick(&mut self, tick: SequencerTick) {
        if tick.quarter {
            self.square1.quarter_clock();
            self.square2.quarter_clock();
            self.triangle.quarter_clock();
            self.noise.quarter_clock();
        }
        if tick.half {
            self.square1.half_clock();
            self.square2.half_clock();
            self.triangle.half_clock();
            self.noise.half_clock();
        }
    }

    fn register_key(&self, addr: u16) -> Option<u16> {
        matches!(addr, 0x4000..=0x4013 | 0x4015 | 0x4017).then_some(addr)
    }

    fn set_timing(&mut self, timing: TimingMode) {
        self.timing = timing;
        self.noise.set_timing(timing);
        self.dpcm.set_timing(timing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn status_reflects_length_counters() {
        let mut apu = Apu2A03::new(TimingMode::Ntsc);
        apu.write(0x4015, 0x0F);
        apu.write(0x4003, 0x08);
        apu.write(0x400B, 0x08);
        assert_eq!(apu.read(0x4015), Some(0x05));

        apu.write(0x4015, 0x00);
        assert_eq!(apu.read(0x4015), Some(0x00));
    }

    #[test]
    fn status_bit7_is_dpcm_irq_not_written_value() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut apu = Apu2A03::new(TimingMode::Ntsc);
        apu.load_sample_memory(&[0x00]);
        apu.write(0x4010, 0x8F);
        apu.write(0x4013, 0x00);
        apu.write(0x4015, 0x10);
        assert_eq!(apu.read(0x4015), Some(0x10));

        apu.process(2000, &mut mixer);
        assert_eq!(apu.read(0x4015), Some(0x80));

        // Writing the status register acknowledges the IRQ
        apu.write(0x4015, 0x80);
        assert_eq!(apu.read(0x4015), Some(0x00));
    }

    #[test]
    fn only_status_register_is_readable() {
        let mut apu = Apu2A03::new(TimingMode::Ntsc);
        assert_eq!(apu.read(0x4000), None);
        assert_eq!(apu.read(0x4017), None);
        assert_eq!(apu.register_key(0x4017), Some(0x4017));
        assert_eq!(apu.register_key(0x4040), None);
    }

    #[test]
    fn half_frame_clocks_shorten_notes() {
        let mut apu = Apu2A03::new(TimingMode::Ntsc);
        apu.write(0x4015, 0x01);
        apu.write(0x4000, 0x10); // constant volume, length not halted
        apu.write(0x4003, 0x18); // length index 3 = 2
        let tick = SequencerTick {
            quarter: true,
            half: true,
        };
        apu.on_sequencer_tick(tick);
        assert_eq!(apu.read(0x4015), Some(0x01));
        apu.on_sequencer_tick(tick);
        assert_eq!(apu.read(0x4015), Some(0x00));
    }

    #[test]
    fn min_period_ignores_silent_channels() {
        let mut apu = Apu2A03::new(TimingMode::Ntsc);
        assert_eq!(apu.min_period(), u32::MAX);
        apu.write(0x4015, 0x01);
        apu.write(0x4001, 0x08);
        apu.write(0x4002, 0xAB);
        apu.write(0x4003, 0x09);
        assert_eq!(apu.min_period(), 0x1AC * 2);
        assert!(apu.frequency(0) > 260.0);
        assert_eq!(apu.frequency(1), 0.0);
    }
}
