//! Band-limited sample buffer split into one lane per chip group.
//!
//! Every lane is a `BlipBuf` clocked at the CPU rate. Lanes let a chip carry
//! its own low-pass corner after synthesis while still sharing one frame
//! clock and one read-out with the rest of the mix.

use super::filter::LowPass;
use blip_buf::BlipBuf;

/// Output lanes of the sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Apu2A03,
    Vrc6,
    Vrc7,
    Fds,
    Mmc5,
    N163,
    S5b,
    /// SN76489 channels routed left (all of them in mono output)
    Sn7Left,
    /// SN76489 channels routed right
    Sn7Right,
}

pub const LANE_COUNT: usize = 9;

impl Lane {
    pub const ALL: [Lane; LANE_COUNT] = [
        Lane::Apu2A03,
        Lane::Vrc6,
        Lane::Vrc7,
        Lane::Fds,
        Lane::Mmc5,
        Lane::N163,
        Lane::S5b,
        Lane::Sn7Left,
        Lane::Sn7Right,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Which side of a stereo output the lane feeds
    pub fn pan(self) -> Pan {
        match self {
            Lane::Sn7Left => Pan::Left,
            Lane::Sn7Right => Pan::Right,
            _ => Pan::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pan {
    Left,
    Center,
    Right,
}

struct LaneBuffer {
    blip: BlipBuf,
    /// Last amplitude written, in blip units
    amplitude: i32,
    low_pass: Option<LowPass>,
}

/// The shared accumulator of time-stamped amplitude deltas.
pub struct SampleBuffer {
    lanes: Vec<LaneBuffer>,
    scratch: Vec<i16>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(size: u32, clock_rate: f64, sample_rate: u32) -> Self {
        let lanes = Lane::ALL
            .iter()
            .map(|_| {
                let mut blip = BlipBuf::new(size);
                blip.set_rates(clock_rate, sample_rate as f64);
                LaneBuffer {
                    blip,
                    amplitude: 0,
                    low_pass: None,
                }
            })
            .collect();
        Self {
            lanes,
            scratch: vec![0; size as usize],
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_clock_rate(&mut self, clock_rate: f64) {
        for lane in &mut self.lanes {
            lane.blip.set_rates(clock_rate, self.sample_rate as f64);
        }
    }

    /// Post-synthesis low-pass corner of a lane; `None` leaves it unfiltered
    pub fn set_low_pass(&mut self, lane: Lane, corner_hz: Option<f32>) {
        let sample_rate = self.sample_rate;
        self.lanes[lane.index()].low_pass = corner_hz.map(|hz| LowPass::new(sample_rate, hz));
    }

    pub fn has_low_pass(&self, lane: Lane) -> bool {
        self.lanes[lane.index()].low_pass.is_some()
    }

    /// Move a lane to `amplitude` at `time`, recording only the difference
    pub fn set_amplitude(&mut self, lane: Lane, time: u32, amplitude: i32) {
        let buffer = &mut self.lanes[lane.index()];
        let delta = amplitude - buffer.amplitude;
        if delta != 0 {
            buffer.blip.add_delta(time, delta);
            buffer.amplitude = amplitude;
        }
    }

    pub fn amplitude(&self, lane: Lane) -> i32 {
        self.lanes[lane.index()].amplitude
    }

    /// Close the current frame after `cycles` clocks
    pub fn end_frame(&mut self, cycles: u32) {
        for lane in &mut self.lanes {
            lane.blip.end_frame(cycles);
        }
    }

    pub fn samples_avail(&self) -> usize {
        self.lanes
            .iter()
            .map(|lane| lane.blip.samples_avail() as usize)
            .min()
            .unwrap_or(0)
    }

    /// Drain up to `count` samples of every lane, summing them per pan position
    /// into `left`, `center` and `right`.
    pub fn read_mixed(
        &mut self,
        count: usize,
        left: &mut Vec<f32>,
        center: &mut Vec<f32>,
        right: &mut Vec<f32>,
    ) -> usize {
        let count = count.min(self.samples_avail()).min(self.scratch.len());
        for out in [&mut *left, &mut *center, &mut *right] {
            out.clear();
            out.resize(count, 0.0);
        }
        for (lane_id, lane) in Lane::ALL.iter().zip(self.lanes.iter_mut()) {
            let read = lane.blip.read_samples(&mut self.scratch[..count], false) as usize;
            let out = match lane_id.pan() {
                Pan::Left => &mut *left,
                Pan::Center => &mut *center,
                Pan::Right => &mut *right,
            };
            for (acc, &sample) in out.iter_mut().zip(&self.scratch[..read]) {
                let sample = sample as f32;
                *acc += match lane.low_pass.as_mut() {
                    Some(lp) => lp.process(sample),
                    None => sample,
                };
            }
        }
        count
    }

    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.blip.clear();
            lane.amplitude = 0;
            if let Some(lp) = lane.low_pass.as_mut() {
                lp.reset();
            }
        }
    }
}
