//! One-pole output filters applied after band-limited synthesis.

use std::f32::consts::PI;

fn pole_coeff(sample_rate: f32, cutoff_hz: f32) -> f32 {
    (-2.0 * PI * cutoff_hz / sample_rate).exp()
}

/// One-pole low-pass
#[derive(Debug, Clone, Copy)]
pub struct LowPass {
    coeff: f32,
    state: f32,
}

impl LowPass {
    pub fn new(sample_rate: u32, cutoff_hz: f32) -> Self {
        Self {
            coeff: pole_coeff(sample_rate as f32, cutoff_hz),
            state: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        self.state = input + self.coeff * (self.state - input);
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// One-pole high-pass (DC blocker)
#[derive(Debug, Clone, Copy)]
pub struct HighPass {
    coeff: f32,
    last_in: f32,
    last_out: f32,
}

impl HighPass {
    pub fn new(sample_rate: u32, cutoff_hz: f32) -> Self {
        Self {
            coeff: pole_coeff(sample_rate as f32, cutoff_hz),
            last_in: 0.0,
            last_out: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let out = input - self.last_in + self.coeff * self.last_out;
        self.last_in = input;
        self.last_out = out;
        out
    }

    pub fn reset(&mut self) {
        self.last_in = 0.0;
        self.last_out = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_pass_removes_dc() {
        let mut hp = HighPass::new(48_000, 20.0);
        let mut out = 0.0;
        for _ in 0..48_000 {
            out = hp.process(1000.0);
        }
        assert!(out.abs() < 1.0, "dc leaked through: {out}");
    }

    #[test]
    fn low_pass_settles_on_dc() {
        let mut lp = LowPass::new(48_000, 2000.0);
        let mut out = 0.0;
        for _ in 0..4800 {
            out = lp.process(1000.0);
        }
        assert!((out - 1000.0).abs() < 1.0);
    }

    #[test]
    fn low_pass_attenuates_nyquist() {
        let mut lp = LowPass::new(48_000, 2000.0);
        let mut peak: f32 = 0.0;
        for i in 0..4800 {
            let input = if i % 2 == 0 { 1000.0 } else { -1000.0 };
            let out = lp.process(input);
            if i > 100 {
                peak = peak.max(out.abs());
            }
        }
        assert!(peak < 300.0, "nyquist peak {peak}");
    }
}
