//! APU dispatcher: owns the chips, the frame sequencer and the mixer.
//!
//! ## Components
//!
//! - **FrameSequencer**: 240Hz quarter / 120Hz half frame clocks
//! - **Slices**: sub-frame time slicing bounded by the shortest active period
//! - **RegisterLog**: last written value of every register, for displays
//! - **TimingMode**: NTSC / PAL clock rates and period tables
//!
//! ## Time
//!
//! Callers queue CPU cycles with [`Apu::add_time`] and run them with
//! [`Apu::process`]. Register writes land at the point in time reached so
//! far, so a driver alternates writes with `add_time`/`process`. Whenever a
//! full video frame of cycles has run, the mixer closes the frame and the
//! finished samples are collected for [`Apu::take_samples`].

pub mod frame_sequencer;
pub mod register_log;
pub mod slice;
pub mod timing;

pub use frame_sequencer::{FrameSequencer, SequencerTick};
pub use register_log::{RegisterEntry, RegisterLog, RegisterValue};
pub use slice::{next_slice, Slices, MIN_SLICE};
pub use timing::TimingMode;

use crate::channels::{ChannelId, ChipKind, ChipSet};
use crate::chips::{create_chip, Apu2A03, SoundChip};
use crate::config::{EngineConfig, N163Mode};
use crate::logging::{log, LogCategory, LogLevel};
use crate::mixer::{Mixer, MixerError};

/// Frame counter control register, decoded by the dispatcher itself
pub const FRAME_COUNTER_ADDR: u16 = 0x4017;

/// Multi-chip sound unit.
pub struct Apu {
    apu2a03: Apu2A03,
    /// One model per expansion chip kind, active or not
    expansions: Vec<Box<dyn SoundChip>>,
    active: ChipSet,
    sequencer: FrameSequencer,
    mixer: Mixer,
    log: RegisterLog,
    timing: TimingMode,
    n163_mode: N163Mode,
    /// Cycles queued by `add_time` and not yet run
    pending: u32,
    /// Cycles run in the current frame
    frame_cycles: u32,
    /// Length of the current frame; one cycle longer whenever the
    /// fractional part of the clock / tick rate ratio carries over
    frame_length: u32,
    /// Carried fraction of a cycle, in 1/tick_rate units
    frame_phase: u32,
    samples: Vec<i16>,
}

impl Apu {
    pub fn new(config: &EngineConfig) -> Result<Self, MixerError> {
        let timing = config.machine;
        let mixer = Mixer::new(config)?;
        let expansions = ChipKind::ALL
            .into_iter()
            .filter(|&kind| kind != ChipKind::Apu2A03)
            .map(|kind| create_chip(kind, timing, config.n163_mode))
            .collect();

        Ok(Self {
            apu2a03: Apu2A03::new(timing),
            expansions,
            active: config.chip_set(),
            sequencer: FrameSequencer::new(timing),
            mixer,
            log: RegisterLog::new(),
            timing,
            n163_mode: config.n163_mode,
            pending: 0,
            frame_cycles: 0,
            frame_length: base_frame_length(timing),
            frame_phase: 0,
            samples: Vec::new(),
        })
    }

    /// Apply the runtime parts of a config: machine, chips, levels, filters, meters
    pub fn configure(&mut self, config: &EngineConfig) {
        self.change_machine(config.machine);
        if config.n163_mode != self.n163_mode {
            self.n163_mode = config.n163_mode;
            for chip in self.expansions.iter_mut() {
                if chip.kind() == ChipKind::N163 {
                    *chip = create_chip(ChipKind::N163, self.timing, config.n163_mode);
                }
            }
        }
        self.set_chips(config.chip_set());
        for chip in ChipKind::ALL {
            self.mixer.set_chip_level(chip, config.chip_level_db(chip));
            self.mixer.set_chip_low_pass(chip, config.chip_low_pass_hz(chip));
        }
        self.mixer.set_volume(config.master_volume);
        self.mixer.set_filters(config.low_cut_hz, config.high_cut_hz);
        self.mixer.set_meter_decay(config.meter_decay);
    }

    /// Select the expansion chips; the 2A03 is always present.
    /// Newly enabled chips start from power-on state.
    pub fn set_chips(&mut self, chips: ChipSet) {
        let chips = chips.with(ChipKind::Apu2A03);
        for chip in self.expansions.iter_mut() {
            if chips.contains(chip.kind()) && !self.active.contains(chip.kind()) {
                chip.reset();
            }
        }
        log(LogCategory::Apu, LogLevel::Debug, || {
            let names: Vec<&str> = chips.iter().map(ChipKind::name).collect();
            format!("active chips: {}", names.join(", "))
        });
        self.active = chips;
    }

    pub fn chips(&self) -> ChipSet {
        self.active
    }

    /// Switch between NTSC and PAL clocking. A frame in progress is closed
    /// first, so the new clock starts on a frame boundary.
    pub fn change_machine(&mut self, timing: TimingMode) {
        if timing == self.timing {
            return;
        }
        self.process();
        if self.frame_cycles > 0 {
            self.end_frame();
        }
        self.timing = timing;
        self.apu2a03.set_timing(timing);
        for chip in self.expansions.iter_mut() {
            chip.set_timing(timing);
        }
        self.sequencer.set_timing(timing);
        self.mixer.set_clock_rate(timing.cpu_clock_hz());
        self.frame_length = base_frame_length(timing);
        self.frame_phase = 0;
        log(LogCategory::Apu, LogLevel::Info, || {
            format!("machine: {:?}, {} cycles per frame", timing, self.frame_length)
        });
    }

    pub fn timing(&self) -> TimingMode {
        self.timing
    }

    /// Power-on state for every chip; queued time and buffered audio are dropped
    pub fn reset(&mut self) {
        self.apu2a03.reset();
        for chip in self.expansions.iter_mut() {
            chip.reset();
        }
        self.sequencer.reset();
        self.mixer.clear();
        self.log.clear();
        self.pending = 0;
        self.frame_cycles = 0;
        self.frame_length = base_frame_length(self.timing);
        self.frame_phase = 0;
        self.samples.clear();
    }

    fn for_each_active(&mut self, mut f: impl FnMut(&mut dyn SoundChip, &mut Mixer)) {
        let Self {
            apu2a03,
            expansions,
            active,
            mixer,
            ..
        } = self;
        f(apu2a03, mixer);
        for chip in expansions.iter_mut() {
            if active.contains(chip.kind()) {
                f(chip.as_mut(), mixer);
            }
        }
    }

    fn min_period(&mut self) -> u32 {
        let mut min = u32::MAX;
        self.for_each_active(|chip, _| min = min.min(chip.min_period()));
        min
    }

    fn sequencer_tick(&mut self, tick: SequencerTick) {
        self.for_each_active(|chip, _| chip.on_sequencer_tick(tick));
    }

    /// Write a register at the current point in time. Every active chip that
    /// decodes the address receives the write; unmapped writes are dropped.
    pub fn write(&mut self, addr: u16, value: u8) {
        self.process();

        if addr == FRAME_COUNTER_ADDR {
            self.log.record(ChipKind::Apu2A03, addr, value);
            if let Some(tick) = self.sequencer.write_control(value) {
                self.sequencer_tick(tick);
            }
            return;
        }

        let mut mapped = false;
        if let Some(key) = self.apu2a03.register_key(addr) {
            self.log.record(ChipKind::Apu2A03, key, value);
            self.apu2a03.write(addr, value);
            mapped = true;
        }
        for chip in self.expansions.iter_mut() {
            if !self.active.contains(chip.kind()) {
                continue;
            }
            // Latched chips key data writes by the latch, so ask before writing
            if let Some(key) = chip.register_key(addr) {
                self.log.record(chip.kind(), key, value);
                chip.write(addr, value);
                mapped = true;
            }
        }
        if !mapped {
            log(LogCategory::Stubs, LogLevel::Trace, || {
                format!("unmapped write ${:04X} = ${:02X}", addr, value)
            });
        }
    }

    /// Read a register; `None` is open bus
    pub fn read(&mut self, addr: u16) -> Option<u8> {
        self.process();
        let mut result = None;
        self.for_each_active(|chip, _| {
            if result.is_none() {
                result = chip.read(addr);
            }
        });
        result
    }

    /// Queue CPU cycles to run on the next [`process`](Self::process)
    pub fn add_time(&mut self, cycles: u32) {
        self.pending = self.pending.saturating_add(cycles);
    }

    /// Run all queued cycles.
    ///
    /// Time is cut at every frame sequencer step and frame end, and within
    /// those spans into slices no longer than the shortest active period
    /// (never below [`MIN_SLICE`]). Every active chip runs every slice.
    pub fn process(&mut self) {
        while self.pending > 0 {
            let until_frame_end = self.frame_length.saturating_sub(self.frame_cycles).max(1);
            let span = self
                .pending
                .min(self.sequencer.cycles_until_step())
                .min(until_frame_end);

            let mut left = span;
            while left > 0 {
                let slice = next_slice(self.min_period(), left);
                self.for_each_active(|chip, mixer| chip.process(slice, mixer));
                left -= slice;
            }

            if let Some(tick) = self.sequencer.clock(span) {
                self.sequencer_tick(tick);
            }
            self.pending -= span;
            self.frame_cycles += span;

            if self.frame_cycles >= self.frame_length {
                self.end_frame();
            }
        }
    }

    /// Close the audio frame: flush the mixer, rewind chip clocks, age meters
    /// and the register log.
    fn end_frame(&mut self) {
        self.mixer.finish_frame(self.frame_cycles);
        self.apu2a03.end_frame();
        for chip in self.expansions.iter_mut() {
            chip.end_frame();
        }
        self.mixer.decay_levels();
        self.log.advance();
        self.frame_cycles = 0;
        self.mixer.read_samples(&mut self.samples);

        let rate = self.timing.tick_rate();
        self.frame_phase += self.timing.cpu_clock() % rate;
        self.frame_length = base_frame_length(self.timing);
        if self.frame_phase >= rate {
            self.frame_phase -= rate;
            self.frame_length += 1;
        }
    }

    /// Drain finished samples, interleaved when the output is stereo
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    pub fn samples_pending(&self) -> usize {
        self.samples.len()
    }

    /// Current frequency of a channel in Hz, 0.0 when its chip is inactive
    pub fn frequency(&self, channel: ChannelId) -> f64 {
        let kind = channel.chip();
        if !self.active.contains(kind) {
            return 0.0;
        }
        if kind == ChipKind::Apu2A03 {
            return self.apu2a03.frequency(channel.subindex());
        }
        self.expansions
            .iter()
            .find(|chip| chip.kind() == kind)
            .map_or(0.0, |chip| chip.frequency(channel.subindex()))
    }

    pub fn register_log(&self) -> &RegisterLog {
        &self.log
    }

    /// Replace the DPCM sample window at $C000
    pub fn load_sample_memory(&mut self, bytes: &[u8]) {
        self.apu2a03.load_sample_memory(bytes);
        log(LogCategory::Apu, LogLevel::Debug, || {
            format!("loaded {} bytes of DPCM sample memory", bytes.len())
        });
    }

    /// Cycles run so far in the current frame
    pub fn frame_cycles(&self) -> u32 {
        self.frame_cycles
    }

    /// Length of the current audio frame in CPU cycles
    pub fn frame_length(&self) -> u32 {
        self.frame_length
    }

    pub fn channel_level(&self, channel: ChannelId) -> f32 {
        self.mixer.channel_level(channel)
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }
}

fn base_frame_length(timing: TimingMode) -> u32 {
    timing.cpu_clock() / timing.tick_rate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelId;

    fn apu_with(chips: &[ChipKind]) -> Apu {
        let config = EngineConfig {
            chips: chips.to_vec(),
            ..Default::default()
        };
        Apu::new(&config).unwrap()
    }

    fn key_square1(apu: &mut Apu) {
        apu.write(0x4015, 0x01);
        apu.write(0x4000, 0xBF);
        apu.write(0x4001, 0x08);
        apu.write(0x4002, 0xAB);
        apu.write(0x4003, 0x09);
    }

    #[test]
    fn frame_produces_samples_at_output_rate() {
        let mut apu = apu_with(&[]);
        key_square1(&mut apu);
        assert_eq!(apu.frame_length(), 1_789_773 / 60);

        for _ in 0..60 {
            apu.add_time(apu.frame_length());
            apu.process();
        }
        let samples = apu.take_samples();
        // One second of audio, give or take the blip buffer's latency
        assert!((47_900..=48_000).contains(&samples.len()), "{}", samples.len());
        assert!(samples.iter().any(|&s| s != 0));
        assert_eq!(apu.frame_cycles(), 0);
    }

    #[test]
    fn process_consumes_exactly_the_queued_time() {
        let mut apu = apu_with(&[ChipKind::Vrc6]);
        key_square1(&mut apu);
        apu.add_time(1000);
        apu.add_time(234);
        apu.process();
        assert_eq!(apu.frame_cycles(), 1234);
        apu.process();
        assert_eq!(apu.frame_cycles(), 1234);
    }

    #[test]
    fn status_read_reflects_dpcm_irq() {
        let mut apu = apu_with(&[]);
        apu.load_sample_memory(&[0x55]);
        apu.write(0x4010, 0x8F);
        apu.write(0x4013, 0x00);
        apu.write(0x4015, 0x10);
        assert_eq!(apu.read(0x4015), Some(0x10));
        apu.add_time(2_000);
        assert_eq!(apu.read(0x4015), Some(0x80));
        assert_eq!(apu.read(0x4000), None);
    }

    #[test]
    fn five_step_write_clocks_length_counters_immediately() {
        let mut apu = apu_with(&[]);
        apu.write(0x4015, 0x01);
        apu.write(0x4000, 0x10);
        apu.write(0x4003, 0x18); // length 2
        apu.write(0x4017, 0x80);
        apu.write(0x4017, 0x80);
        assert_eq!(apu.read(0x4015), Some(0x00));
        assert_eq!(apu.register_log().value(ChipKind::Apu2A03, 0x4017), Some(0x80));
    }

    #[test]
    fn sequencer_runs_at_240hz() {
        let mut apu = apu_with(&[]);
        apu.write(0x4015, 0x01);
        apu.write(0x4000, 0x10);
        // Length index 1 = 254 half frames, a bit over two seconds at 120Hz
        apu.write(0x4003, 0x08);
        apu.add_time(1_789_773 * 2);
        apu.process();
        assert_eq!(apu.read(0x4015), Some(0x01));
        apu.add_time(1_789_773 / 5);
        apu.process();
        assert_eq!(apu.read(0x4015), Some(0x00));
    }

    #[test]
    fn writes_reach_only_active_chips() {
        let mut apu = apu_with(&[ChipKind::N163]);
        apu.write(0xF800, 0x80);
        apu.write(0x4800, 0x12);
        apu.write(0xF800, 0x00);
        assert_eq!(apu.read(0x4800), Some(0x12));
        assert_eq!(apu.register_log().value(ChipKind::N163, 0x00), Some(0x12));

        // MMC5 is not enabled: the write is open bus
        apu.write(0x5015, 0x01);
        assert_eq!(apu.read(0x5015), None);
        assert_eq!(apu.register_log().value(ChipKind::Mmc5, 0x5015), None);

        apu.set_chips(ChipSet::base().with(ChipKind::Mmc5));
        apu.write(0x5015, 0x01);
        assert_eq!(apu.register_log().value(ChipKind::Mmc5, 0x5015), Some(0x01));
        assert_eq!(apu.read(0x4800), None);
    }

    #[test]
    fn frequency_follows_machine() {
        let mut apu = apu_with(&[]);
        key_square1(&mut apu);
        let ntsc = apu.frequency(ChannelId::Square1);
        assert!((ntsc - 261.6).abs() < 0.5);
        apu.change_machine(TimingMode::Pal);
        assert!(apu.frequency(ChannelId::Square1) < ntsc);
        assert_eq!(apu.frame_length(), 1_662_607 / 50);
        assert_eq!(apu.frequency(ChannelId::Vrc6Pulse1), 0.0);
    }

    #[test]
    fn frame_lengths_carry_the_clock_fraction() {
        let mut apu = apu_with(&[]);
        let mut total = 0u64;
        let mut lengths = std::collections::BTreeSet::new();
        // 1_789_773 / 60 leaves 33/60 of a cycle per frame
        for _ in 0..600 {
            let length = apu.frame_length();
            lengths.insert(length);
            total += length as u64;
            apu.add_time(length);
            apu.process();
            assert_eq!(apu.frame_cycles(), 0);
        }
        assert_eq!(lengths.into_iter().collect::<Vec<_>>(), vec![29_829, 29_830]);
        // ten seconds of frames miss at most one cycle
        assert!((1_789_773 * 10 - total) <= 1, "{total}");
    }

    #[test]
    fn machine_change_mid_frame_closes_the_frame() {
        let mut apu = apu_with(&[]);
        key_square1(&mut apu);
        apu.change_machine(TimingMode::Pal);
        apu.add_time(30_000);
        apu.process();
        assert_eq!(apu.frame_cycles(), 30_000);

        // past the end of an NTSC frame
        apu.change_machine(TimingMode::Ntsc);
        assert_eq!(apu.frame_cycles(), 0);
        assert!(!apu.take_samples().is_empty());
        apu.add_time(100);
        apu.process();
        assert_eq!(apu.frame_cycles(), 100);

        apu.add_time(apu.frame_length() - 100);
        apu.process();
        assert_eq!(apu.frame_cycles(), 0);
        let samples = apu.take_samples();
        assert!((780..=820).contains(&samples.len()), "{}", samples.len());
    }

    #[test]
    fn configure_switches_machine_while_time_is_queued() {
        let mut apu = apu_with(&[ChipKind::Vrc6]);
        apu.change_machine(TimingMode::Pal);
        apu.add_time(32_000);
        apu.process();
        apu.add_time(500);

        // the queued cycles run on the old clock before the switch
        apu.configure(&EngineConfig {
            chips: vec![ChipKind::Vrc6],
            ..Default::default()
        });
        assert_eq!(apu.timing(), TimingMode::Ntsc);
        assert_eq!(apu.frame_cycles(), 0);
        assert_eq!(apu.frame_length(), 1_789_773 / 60);
        apu.add_time(apu.frame_length() * 2);
        apu.process();
        assert_eq!(apu.frame_cycles(), 0);
    }

    #[test]
    fn reset_drops_state() {
        let mut apu = apu_with(&[]);
        key_square1(&mut apu);
        apu.add_time(10_000);
        apu.process();
        apu.reset();
        assert_eq!(apu.frame_cycles(), 0);
        assert!(apu.register_log().is_empty());
        assert_eq!(apu.read(0x4015), Some(0x00));
        assert!(apu.take_samples().is_empty());
    }
}
