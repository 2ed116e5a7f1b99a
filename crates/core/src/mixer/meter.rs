//! Per-channel peak meters for visualisation.

use crate::channels::{ChannelId, CHANNEL_COUNT};
use crate::config::MeterDecay;

/// Frames a new peak is held before it starts falling
pub const METER_HOLD_FRAMES: u8 = 3;

/// Amount a slow meter drops per frame once the hold expires
pub const METER_SLOW_FALLOFF: f32 = 0.6;

/// Highest value a meter can show
pub const METER_MAX: f32 = 15.0;

#[derive(Debug, Clone)]
pub struct ChannelMeters {
    levels: [f32; CHANNEL_COUNT],
    hold: [u8; CHANNEL_COUNT],
    decay: MeterDecay,
}

impl ChannelMeters {
    pub fn new(decay: MeterDecay) -> Self {
        Self {
            levels: [0.0; CHANNEL_COUNT],
            hold: [0; CHANNEL_COUNT],
            decay,
        }
    }

    pub fn set_decay(&mut self, decay: MeterDecay) {
        self.decay = decay;
    }

    /// Feed a raw channel output; peaks are held, lower values are ignored
    pub fn store(&mut self, channel: ChannelId, raw: i32) {
        let level = meter_scale(channel, raw);
        let idx = channel.index();
        if level >= self.levels[idx] {
            self.levels[idx] = level;
            self.hold[idx] = METER_HOLD_FRAMES;
        }
    }

    /// Age all meters by one frame
    pub fn decay(&mut self) {
        for (level, hold) in self.levels.iter_mut().zip(self.hold.iter_mut()) {
            if *hold > 0 {
                *hold -= 1;
                continue;
            }
            *level = match self.decay {
                MeterDecay::Fast => 0.0,
                MeterDecay::Slow => (*level - METER_SLOW_FALLOFF).max(0.0),
            };
        }
    }

    pub fn level(&self, channel: ChannelId) -> f32 {
        self.levels[channel.index()]
    }

    pub fn clear(&mut self) {
        self.levels = [0.0; CHANNEL_COUNT];
        self.hold = [0; CHANNEL_COUNT];
    }
}

/// Map a channel's raw output range onto the 0..=15 meter range.
fn meter_scale(channel: ChannelId, raw: i32) -> f32 {
    use ChannelId::*;
    let raw = raw.unsigned_abs() as f32;
    let level = match channel {
        Vrc6Sawtooth => raw * 3.0 / 4.0,
        Dpcm => raw / 8.0,
        Mmc5Pcm => raw / 16.0,
        Fds => raw / 4.0,
        N163Ch1 | N163Ch2 | N163Ch3 | N163Ch4 | N163Ch5 | N163Ch6 | N163Ch7 | N163Ch8 => {
            raw / 8.0
        }
        Vrc7Ch1 | Vrc7Ch2 | Vrc7Ch3 | Vrc7Ch4 | Vrc7Ch5 | Vrc7Ch6 => log_meter(raw, 5.0),
        S5bCh1 | S5bCh2 | S5bCh3 => log_meter(raw, 6.2),
        Sn7Square1 | Sn7Square2 | Sn7Square3 | Sn7Noise => raw / 4.0,
        _ => raw,
    };
    level.min(METER_MAX)
}

fn log_meter(raw: f32, factor: f32) -> f32 {
    if raw < 1.0 {
        0.0
    } else {
        raw.log10() * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_meter_drops_after_hold() {
        let mut meters = ChannelMeters::new(MeterDecay::Fast);
        meters.store(ChannelId::Square1, 12);
        for _ in 0..METER_HOLD_FRAMES {
            meters.decay();
            assert_eq!(meters.level(ChannelId::Square1), 12.0);
        }
        meters.decay();
        assert_eq!(meters.level(ChannelId::Square1), 0.0);
    }

    #[test]
    fn slow_meter_falls_off_gradually() {
        let mut meters = ChannelMeters::new(MeterDecay::Slow);
        meters.store(ChannelId::Noise, 10);
        for _ in 0..=METER_HOLD_FRAMES {
            meters.decay();
        }
        let level = meters.level(ChannelId::Noise);
        assert!((level - (10.0 - METER_SLOW_FALLOFF)).abs() < 1e-6);
    }

    #[test]
    fn lower_values_do_not_replace_peak() {
        let mut meters = ChannelMeters::new(MeterDecay::Fast);
        meters.store(ChannelId::Triangle, 15);
        meters.store(ChannelId::Triangle, 3);
        assert_eq!(meters.level(ChannelId::Triangle), 15.0);
    }

    #[test]
    fn wide_ranges_are_scaled_into_meter_range() {
        let mut meters = ChannelMeters::new(MeterDecay::Fast);
        meters.store(ChannelId::Dpcm, 127);
        meters.store(ChannelId::Vrc6Sawtooth, 31);
        assert!(meters.level(ChannelId::Dpcm) <= METER_MAX);
        assert_eq!(meters.level(ChannelId::Vrc6Sawtooth), METER_MAX);
    }
}
