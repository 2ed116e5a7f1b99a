//! Square channel of the 2A03, also used for the two MMC5 squares.

use super::envelope::Envelope;
use super::length_counter::LengthCounter;
use super::sweep::Sweep;
use crate::channels::ChannelId;
use crate::mixer::Mixer;

/// Duty patterns indexed by (duty, step)
/// 0: 0 1 0 0 0 0 0 0 (12.5%)
/// 1: 0 1 1 0 0 0 0 0 (25%)
/// 2: 0 1 1 1 1 0 0 0 (50%)
/// 3: 1 0 0 1 1 1 1 1 (25% negated)
const DUTY_TABLE: [[bool; 8]; 4] = [
    [false, true, false, false, false, false, false, false],
    [false, true, true, false, false, false, false, false],
    [false, true, true, true, true, false, false, false],
    [true, false, false, true, true, true, true, true],
];

/// Square channel with envelope, length counter and an optional sweep.
#[derive(Debug, Clone)]
pub struct Square {
    channel: ChannelId,
    duty: u8,
    /// Position in the duty pattern (0-7)
    step: u8,
    /// 11-bit period register
    period: u16,
    /// Cycles until the next duty step
    counter: u32,
    envelope: Envelope,
    length: LengthCounter,
    sweep: Option<Sweep>,
    /// Frame-relative clock
    time: u32,
}

impl Square {
    pub fn new(channel: ChannelId, sweep: Option<Sweep>) -> Self {
        Self {
            channel,
            duty: 0,
            step: 0,
            period: 0,
            counter: 0,
            envelope: Envelope::new(),
            length: LengthCounter::new(),
            sweep,
            time: 0,
        }
    }

    pub fn reset(&mut self) {
        let sweep = self
            .sweep
            .is_some()
            .then(|| Sweep::new(self.channel == ChannelId::Square1));
        *self = Self::new(self.channel, sweep);
    }

    /// Write register 0-3 of the channel
    pub fn write(&mut self, reg: u16, value: u8) {
        match reg & 3 {
            0 => {
                self.duty = value >> 6;
                self.envelope.write_control(value);
                self.length.set_halted(value & 0x20 != 0);
            }
            1 => {
                if let Some(sweep) = self.sweep.as_mut() {
                    sweep.write(value);
                }
            }
            2 => self.period = (self.period & 0x700) | value as u16,
            _ => {
                self.period = (self.period & 0xFF) | ((value as u16 & 0x07) << 8);
                self.length.load(value >> 3);
                self.envelope.restart();
                self.step = 0;
            }
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    /// Length counter is running (status register bit)
    pub fn is_active(&self) -> bool {
        self.length.is_active()
    }

    pub fn quarter_clock(&mut self) {
        self.envelope.clock();
    }

    pub fn half_clock(&mut self) {
        self.length.clock();
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.clock(&mut self.period);
        }
    }

    pub fn period(&self) -> u16 {
        self.period
    }

    /// Cycles per duty step
    pub fn period_cycles(&self) -> u32 {
        (self.period as u32 + 1) * 2
    }

    /// Whether the channel currently produces sound
    pub fn is_sounding(&self) -> bool {
        let muted = match &self.sweep {
            Some(sweep) => sweep.mutes(self.period),
            None => self.period < 8,
        };
        self.length.is_enabled() && self.length.is_active() && !muted
    }

    pub fn process(&mut self, mut time: u32, mixer: &mut Mixer) {
        let sounding = self.is_sounding();
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period_cycles();
            self.step = (self.step + 1) & 7;
            let high = DUTY_TABLE[self.duty as usize][self.step as usize];
            let output = if sounding && high {
                self.envelope.volume()
            } else {
                0
            };
            mixer.add_value(self.channel, output as i32, self.time);
        }
        self.counter -= time;
        self.time += time;
    }

    pub fn end_frame(&mut self) {
        self.time = 0;
    }

    pub fn frequency(&self, clock: f64) -> f64 {
        if !self.is_sounding() {
            return 0.0;
        }
        clock / (16.0 * (self.period as f64 + 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn playing_square(period: u16) -> Square {
        let mut sq = Square::new(ChannelId::Square1, Some(Sweep::new(true)));
        sq.set_enabled(true);
        sq.write(0, 0xBF); // 50% duty, constant volume 15
        sq.write(1, 0x08); // sweep off, negate so no muting
        sq.write(2, (period & 0xFF) as u8);
        sq.write(3, (period >> 8) as u8 | 0x08);
        sq
    }

    #[test]
    fn duty_patterns_have_expected_widths() {
        let widths: Vec<usize> = DUTY_TABLE
            .iter()
            .map(|row| row.iter().filter(|&&b| b).count())
            .collect();
        assert_eq!(widths, vec![1, 2, 4, 6]);
    }

    #[test]
    fn steps_at_twice_period_plus_one() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut sq = playing_square(0x1AB);
        assert_eq!(sq.period_cycles(), 0x1AC * 2);

        // First step happens immediately, then every period_cycles
        sq.process(1, &mut mixer);
        let step = sq.step;
        sq.process(sq.period_cycles() - 2, &mut mixer);
        assert_eq!(sq.step, step);
        sq.process(1, &mut mixer);
        assert_eq!(sq.step, (step + 1) & 7);
        assert_eq!(sq.time, 0x1AC * 2);
    }

    #[test]
    fn low_periods_and_stopped_length_mute() {
        assert!(!playing_square(7).is_sounding());
        assert!(playing_square(8).is_sounding());

        let mut sq = playing_square(0x100);
        sq.set_enabled(false);
        assert!(!sq.is_sounding());
        assert!(!sq.is_active());
    }

    #[test]
    fn output_alternates_with_duty() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut sq = playing_square(0x40);
        let mut seen = Vec::new();
        for _ in 0..8 {
            sq.process(sq.period_cycles(), &mut mixer);
            seen.push(mixer.channel_value(ChannelId::Square1));
        }
        assert!(seen.contains(&15));
        assert!(seen.contains(&0));
    }

    #[test]
    fn frequency_matches_period() {
        let sq = playing_square(0x1AB);
        let hz = sq.frequency(1_789_773.0);
        assert!((hz - 261.4).abs() < 0.1, "{hz}");
    }

    #[test]
    fn mmc5_square_has_no_sweep_mute() {
        let mut sq = Square::new(ChannelId::Mmc5Square1, None);
        sq.set_enabled(true);
        sq.write(0, 0x3F);
        sq.write(1, 0xFF); // no sweep register on MMC5
        sq.write(2, 0xFF);
        sq.write(3, 0x0F);
        assert_eq!(sq.period(), 0x7FF);
        assert!(sq.is_sounding());
    }
}
