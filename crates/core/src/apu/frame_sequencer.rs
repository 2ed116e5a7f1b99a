//! Frame sequencer that drives envelope, length counter, and sweep units.
//!
//! The sequencer steps at approximately 240Hz (NTSC) or 200Hz (PAL). Each step
//! fans out a quarter-frame clock (envelopes, triangle linear counter) and on
//! some steps a half-frame clock (length counters, sweeps). The 60Hz clock of
//! the hardware is reserved for the frame IRQ, which a sound player never uses,
//! so it is never produced here.

use super::timing::TimingMode;

/// Clocks produced by one sequencer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequencerTick {
    /// 240Hz clock: envelopes and linear counter
    pub quarter: bool,
    /// 120Hz clock: length counters and sweeps
    pub half: bool,
}

impl SequencerTick {
    const NONE: Self = Self {
        quarter: false,
        half: false,
    };
    const QUARTER: Self = Self {
        quarter: true,
        half: false,
    };
    const BOTH: Self = Self {
        quarter: true,
        half: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.quarter && !self.half
    }
}

/// Frame sequencer component.
///
/// Supports two modes:
/// - 4-step mode: quarter clocks on every step, half clocks on steps 1 and 3
/// - 5-step mode: quarter clocks on steps 0-3, half clocks on steps 0 and 2,
///   step 4 is silent
#[derive(Debug, Clone)]
pub struct FrameSequencer {
    /// Current mode: false = 4-step, true = 5-step
    five_step: bool,
    /// Current step in the sequence (0-3 for 4-step, 0-4 for 5-step)
    step: u8,
    /// Accumulates `cycles * rate`; a step is due when it reaches the CPU clock
    accumulator: u64,
    cpu_clock: u64,
    rate: u64,
}

impl FrameSequencer {
    /// Create a new sequencer for the specified timing mode
    pub fn new(timing: TimingMode) -> Self {
        Self {
            five_step: false,
            step: 0,
            accumulator: 0,
            cpu_clock: timing.cpu_clock() as u64,
            rate: timing.frame_counter_hz() as u64,
        }
    }

    /// Update timing mode (for switching between NTSC/PAL)
    pub fn set_timing(&mut self, timing: TimingMode) {
        self.cpu_clock = timing.cpu_clock() as u64;
        self.rate = timing.frame_counter_hz() as u64;
        self.accumulator = self.accumulator.min(self.cpu_clock - 1);
    }

    pub fn reset(&mut self) {
        self.five_step = false;
        self.step = 0;
        self.accumulator = 0;
    }

    pub fn is_five_step(&self) -> bool {
        self.five_step
    }

    /// Current position in the step sequence
    pub fn position(&self) -> u8 {
        self.step
    }

    /// Write to the frame counter control register ($4017).
    ///
    /// Selecting 5-step mode clocks the quarter and half frame units right
    /// away; the returned tick must be applied by the caller.
    pub fn write_control(&mut self, value: u8) -> Option<SequencerTick> {
        self.step = 0;
        if value & 0x80 != 0 {
            self.five_step = true;
            Some(SequencerTick::BOTH)
        } else {
            self.five_step = false;
            None
        }
    }

    /// Advance to the next step and report which units it clocks
    pub fn step(&mut self) -> SequencerTick {
        if self.five_step {
            self.step = (self.step + 1) % 5;
            match self.step {
                0 | 2 => SequencerTick::BOTH,
                1 | 3 => SequencerTick::QUARTER,
                _ => SequencerTick::NONE,
            }
        } else {
            self.step = (self.step + 1) % 4;
            match self.step {
                1 | 3 => SequencerTick::BOTH,
                _ => SequencerTick::QUARTER,
            }
        }
    }

    /// CPU cycles left until the next step is due (at least 1)
    pub fn cycles_until_step(&self) -> u32 {
        let missing = self.cpu_clock - self.accumulator;
        missing.div_ceil(self.rate).max(1) as u32
    }

    /// Advance by `cycles` and step if the boundary was reached.
    ///
    /// Callers never pass more than [`cycles_until_step`](Self::cycles_until_step),
    /// so at most one step happens per call.
    pub fn clock(&mut self, cycles: u32) -> Option<SequencerTick> {
        self.accumulator += cycles as u64 * self.rate;
        if self.accumulator >= self.cpu_clock {
            self.accumulator -= self.cpu_clock;
            Some(self.step())
        } else {
            None
        }
    }
}
