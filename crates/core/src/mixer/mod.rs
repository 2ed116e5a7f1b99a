//! Band-limited mixing of every chip channel into one PCM stream.
//!
//! Chips report the raw output of a channel with [`Mixer::add_value`] and a
//! frame-relative CPU cycle timestamp. The mixer converts raw values into
//! output units:
//!
//! - the 2A03 channels go through the nonlinear [`PulseLevels`] and
//!   [`TndLevels`] aggregators and only the change of the combined level is
//!   written,
//! - expansion channels are summed linearly with a per-channel weight.
//!
//! Output units match the NESdev mixer scale (the 2A03 formulas times 5000),
//! then chip level trims and the master volume are applied before the value
//! reaches the band-limited [`SampleBuffer`]. After a frame is finished the
//! lanes are read out, summed, run through the low-cut and high-cut filters
//! and clamped to 16-bit PCM.

mod buffer;
mod filter;
mod levels;
mod meter;

pub use buffer::{Lane, Pan, SampleBuffer, LANE_COUNT};
pub use filter::{HighPass, LowPass};
pub use levels::{PulseLevels, TndInput, TndLevels};
pub use meter::{ChannelMeters, METER_HOLD_FRAMES, METER_MAX, METER_SLOW_FALLOFF};

use crate::channels::{ChannelId, ChipKind, CHANNEL_COUNT};
use crate::config::{EngineConfig, MeterDecay, SAMPLE_RATE_RANGE};
use crate::logging::{log, LogCategory, LogLevel};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(u8),
    #[error("Sample buffer too large: {0} samples")]
    BufferTooLarge(u32),
}

/// Output units per unit of the 2A03 mixing formulas
pub const APU_UNITS: f64 = 5000.0;

/// Output units to band-limited buffer units
const BLIP_SCALE: f64 = 4.0;

/// Default length of the sample buffer
pub const DEFAULT_BUFFER_MS: u32 = 100;

/// Largest sample buffer the mixer will allocate per lane
pub const MAX_BUFFER_SAMPLES: u32 = 65_536;

/// Output units per step of a linearly mixed channel's raw value.
pub fn channel_weight(channel: ChannelId) -> f64 {
    use ChannelId::*;
    match channel.chip() {
        ChipKind::Apu2A03 => 0.0,
        ChipKind::Vrc6 => 40.0,
        ChipKind::Mmc5 if channel == Mmc5Pcm => 5.0,
        ChipKind::Mmc5 => 43.0,
        ChipKind::Fds => 20.0,
        ChipKind::N163 => 20.0,
        ChipKind::S5b => 3.75,
        ChipKind::Vrc7 => 1.0,
        ChipKind::Sn76489 => 12.0,
    }
}

fn lane_of(chip: ChipKind) -> Lane {
    match chip {
        ChipKind::Apu2A03 => Lane::Apu2A03,
        ChipKind::Vrc6 => Lane::Vrc6,
        ChipKind::Vrc7 => Lane::Vrc7,
        ChipKind::Fds => Lane::Fds,
        ChipKind::Mmc5 => Lane::Mmc5,
        ChipKind::N163 => Lane::N163,
        ChipKind::S5b => Lane::S5b,
        ChipKind::Sn76489 => Lane::Sn7Left,
    }
}

fn chip_of(lane: Lane) -> ChipKind {
    match lane {
        Lane::Apu2A03 => ChipKind::Apu2A03,
        Lane::Vrc6 => ChipKind::Vrc6,
        Lane::Vrc7 => ChipKind::Vrc7,
        Lane::Fds => ChipKind::Fds,
        Lane::Mmc5 => ChipKind::Mmc5,
        Lane::N163 => ChipKind::N163,
        Lane::S5b => ChipKind::S5b,
        Lane::Sn7Left | Lane::Sn7Right => ChipKind::Sn76489,
    }
}

fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub struct Mixer {
    buffer: SampleBuffer,
    pulse: PulseLevels,
    tnd: TndLevels,
    /// Last raw value reported per channel
    raw: [i32; CHANNEL_COUNT],
    /// Current level of each lane in output units, before gain
    lane_levels: [f64; LANE_COUNT],
    chip_gain: [f32; ChipKind::ALL.len()],
    volume: f32,
    meters: ChannelMeters,
    /// Game Gear style stereo byte: high nibble left, low nibble right
    sn7_stereo: u8,
    stereo: bool,
    sample_rate: u32,
    clock_rate: f64,
    low_cut_hz: f32,
    high_cut_hz: f32,
    low_cut: [HighPass; 2],
    high_cut: [LowPass; 2],
    left: Vec<f32>,
    center: Vec<f32>,
    right: Vec<f32>,
    /// Latest timestamp seen in the current frame
    now: u32,
}

impl Mixer {
    /// Allocate a mixer with the default buffer length
    pub fn new(config: &EngineConfig) -> Result<Self, MixerError> {
        Self::with_buffer_length(config, DEFAULT_BUFFER_MS)
    }

    pub fn with_buffer_length(config: &EngineConfig, buffer_ms: u32) -> Result<Self, MixerError> {
        if !SAMPLE_RATE_RANGE.contains(&config.sample_rate) {
            return Err(MixerError::UnsupportedSampleRate(config.sample_rate));
        }
        if !matches!(config.channels, 1 | 2) {
            return Err(MixerError::UnsupportedChannelCount(config.channels));
        }
        let size = (config.sample_rate as u64 * buffer_ms as u64 / 1000) as u32 + 1;
        if size > MAX_BUFFER_SAMPLES {
            return Err(MixerError::BufferTooLarge(size));
        }

        let clock_rate = config.machine.cpu_clock_hz();
        let sample_rate = config.sample_rate;
        let mut chip_gain = [1.0; ChipKind::ALL.len()];
        for chip in ChipKind::ALL {
            chip_gain[chip as usize] = db_to_gain(config.chip_level_db(chip));
        }

        log(LogCategory::Mixer, LogLevel::Debug, || {
            format!(
                "mixer: {} Hz, {} channel(s), {} samples per lane",
                sample_rate, config.channels, size
            )
        });

        let mut buffer = SampleBuffer::new(size, clock_rate, sample_rate);
        for lane in Lane::ALL {
            buffer.set_low_pass(lane, config.chip_low_pass_hz(chip_of(lane)));
        }

        Ok(Self {
            buffer,
            pulse: PulseLevels::new(),
            tnd: TndLevels::new(),
            raw: [0; CHANNEL_COUNT],
            lane_levels: [0.0; LANE_COUNT],
            chip_gain,
            volume: config.master_volume.max(0.0),
            meters: ChannelMeters::new(config.meter_decay),
            sn7_stereo: 0xFF,
            stereo: config.channels == 2,
            sample_rate,
            clock_rate,
            low_cut_hz: config.low_cut_hz,
            high_cut_hz: config.high_cut_hz,
            low_cut: [HighPass::new(sample_rate, config.low_cut_hz); 2],
            high_cut: [LowPass::new(sample_rate, config.high_cut_hz); 2],
            left: Vec::new(),
            center: Vec::new(),
            right: Vec::new(),
            now: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn output_channels(&self) -> u8 {
        if self.stereo {
            2
        } else {
            1
        }
    }

    pub fn clock_rate(&self) -> f64 {
        self.clock_rate
    }

    /// Change the input clock (machine switch)
    pub fn set_clock_rate(&mut self, clock_rate: f64) {
        self.clock_rate = clock_rate;
        self.buffer.set_clock_rate(clock_rate);
    }

    /// Report a channel's raw output at a frame-relative cycle
    pub fn add_value(&mut self, channel: ChannelId, value: i32, time: u32) {
        self.now = self.now.max(time);
        self.meters.store(channel, value);
        let idx = channel.index();
        let old = self.raw[idx];
        if old == value {
            return;
        }
        self.raw[idx] = value;

        let level = value.clamp(0, 127) as u8;
        match channel {
            ChannelId::Square1 => self.pulse.set(0, level),
            ChannelId::Square2 => self.pulse.set(1, level),
            ChannelId::Triangle => self.tnd.set(TndInput::Triangle, level),
            ChannelId::Noise => self.tnd.set(TndInput::Noise, level),
            ChannelId::Dpcm => self.tnd.set(TndInput::Dpcm, level),
            ChannelId::Sn7Square1
            | ChannelId::Sn7Square2
            | ChannelId::Sn7Square3
            | ChannelId::Sn7Noise => {
                self.update_sn7(time);
                return;
            }
            _ => {
                let lane = lane_of(channel.chip());
                self.lane_levels[lane.index()] += (value - old) as f64 * channel_weight(channel);
                self.emit(lane, time);
                return;
            }
        }
        self.lane_levels[Lane::Apu2A03.index()] = (self.pulse.output() + self.tnd.output()) * APU_UNITS;
        self.emit(Lane::Apu2A03, time);
    }

    /// Route SN76489 channels left/right, Game Gear style (bit 4+n left, bit n right)
    pub fn set_stereo_mask(&mut self, mask: u8, time: u32) {
        self.now = self.now.max(time);
        self.sn7_stereo = mask;
        self.update_sn7(time);
    }

    fn update_sn7(&mut self, time: u32) {
        let channels = ChipKind::Sn76489.channels();
        let mut left = 0.0;
        let mut right = 0.0;
        for (i, ch) in channels.iter().enumerate() {
            let level = self.raw[ch.index()] as f64 * channel_weight(*ch);
            if !self.stereo {
                left += level;
                continue;
            }
            if self.sn7_stereo & (0x10 << i) != 0 {
                left += level;
            }
            if self.sn7_stereo & (0x01 << i) != 0 {
                right += level;
            }
        }
        self.lane_levels[Lane::Sn7Left.index()] = left;
        self.lane_levels[Lane::Sn7Right.index()] = right;
        self.emit(Lane::Sn7Left, time);
        self.emit(Lane::Sn7Right, time);
    }

    fn emit(&mut self, lane: Lane, time: u32) {
        let gain = (self.chip_gain[chip_of(lane) as usize] * self.volume) as f64;
        let amplitude = (self.lane_levels[lane.index()] * gain * BLIP_SCALE).round();
        let amplitude = amplitude.clamp(i32::MIN as f64 / 2.0, i32::MAX as f64 / 2.0) as i32;
        self.buffer.set_amplitude(lane, time, amplitude);
    }

    /// Re-emit every lane at the latest point reached in the frame
    fn refresh_lanes(&mut self) {
        let now = self.now;
        for lane in Lane::ALL {
            self.emit(lane, now);
        }
    }

    /// Close the frame after `cycles` CPU cycles; returns samples now readable
    pub fn finish_frame(&mut self, cycles: u32) -> usize {
        self.buffer.end_frame(cycles);
        self.now = 0;
        self.buffer.samples_avail()
    }

    pub fn samples_avail(&self) -> usize {
        self.buffer.samples_avail()
    }

    /// Append every finished sample to `out` (interleaved when stereo);
    /// returns the number of sample frames written.
    pub fn read_samples(&mut self, out: &mut Vec<i16>) -> usize {
        let avail = self.buffer.samples_avail();
        let frames = self
            .buffer
            .read_mixed(avail, &mut self.left, &mut self.center, &mut self.right);

        out.reserve(frames * self.output_channels() as usize);
        for i in 0..frames {
            if self.stereo {
                let l = self.left[i] + self.center[i];
                let r = self.right[i] + self.center[i];
                out.push(Self::post_filter(&mut self.low_cut[0], &mut self.high_cut[0], l));
                out.push(Self::post_filter(&mut self.low_cut[1], &mut self.high_cut[1], r));
            } else {
                let m = self.left[i] + self.center[i] + self.right[i];
                out.push(Self::post_filter(&mut self.low_cut[0], &mut self.high_cut[0], m));
            }
        }
        frames
    }

    fn post_filter(low_cut: &mut HighPass, high_cut: &mut LowPass, sample: f32) -> i16 {
        let filtered = high_cut.process(low_cut.process(sample));
        filtered.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }

    /// Set the low-cut and high-cut corner frequencies
    pub fn set_filters(&mut self, low_cut_hz: f32, high_cut_hz: f32) {
        self.low_cut_hz = low_cut_hz;
        self.high_cut_hz = high_cut_hz;
        self.low_cut = [HighPass::new(self.sample_rate, low_cut_hz); 2];
        self.high_cut = [LowPass::new(self.sample_rate, high_cut_hz); 2];
    }

    pub fn filters(&self) -> (f32, f32) {
        (self.low_cut_hz, self.high_cut_hz)
    }

    /// Meter level of a channel, 0.0..=15.0
    pub fn channel_level(&self, channel: ChannelId) -> f32 {
        self.meters.level(channel)
    }

    /// Last raw value reported by a channel
    pub fn channel_value(&self, channel: ChannelId) -> i32 {
        self.raw[channel.index()]
    }

    /// Age the level meters by one frame
    pub fn decay_levels(&mut self) {
        self.meters.decay();
    }

    pub fn set_meter_decay(&mut self, decay: MeterDecay) {
        self.meters.set_decay(decay);
    }

    /// Trim a chip's output level in decibels
    pub fn set_chip_level(&mut self, chip: ChipKind, db: f32) {
        self.chip_gain[chip as usize] = db_to_gain(db);
        self.refresh_lanes();
    }

    /// Post-synthesis low-pass corner of a chip's lanes; `None` turns it off
    pub fn set_chip_low_pass(&mut self, chip: ChipKind, corner_hz: Option<f32>) {
        for lane in Lane::ALL {
            if chip_of(lane) == chip {
                self.buffer.set_low_pass(lane, corner_hz);
            }
        }
    }

    pub fn has_low_pass(&self, chip: ChipKind) -> bool {
        self.buffer.has_low_pass(lane_of(chip))
    }

    /// Latest frame-relative cycle a channel reported at
    pub fn frame_time(&self) -> u32 {
        self.now
    }

    /// Master output volume, 1.0 is unity
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
        self.refresh_lanes();
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Current amplitude of a lane in buffer units
    pub fn lane_amplitude(&self, lane: Lane) -> i32 {
        self.buffer.amplitude(lane)
    }

    /// Drop all pending samples and channel state
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pulse = PulseLevels::new();
        self.tnd = TndLevels::new();
        self.raw = [0; CHANNEL_COUNT];
        self.lane_levels = [0.0; LANE_COUNT];
        self.meters.clear();
        self.now = 0;
        self.low_cut.iter_mut().for_each(HighPass::reset);
        self.high_cut.iter_mut().for_each(LowPass::reset);
    }
}
