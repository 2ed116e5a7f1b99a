//! Sunsoft 5B square channels.
//!
//! Duty bit 0 mixes in the noise generator and bit 1 turns the tone off.
//! `Hxx` picks an envelope shape (0 goes back to fixed volume) and restarts
//! the envelope, `Ixx`/`Jxx` set its period, `Wxx` the noise period. The
//! mixer, noise and envelope registers are shared and written through
//! [`S5bContext`](super::S5bContext).

use super::groups::ChipGroups;
use super::state::ChannelState;
use super::{ChannelHandler, Tuning};
use crate::document::{Effect, EffectCommand};
use crate::note_table::PitchTable;
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

const USE_ENVELOPE: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SharedWrite {
    Shape(u8),
    EnvelopeHigh(u8),
    EnvelopeLow(u8),
    Noise(u8),
}

pub struct S5bHandler {
    state: ChannelState,
    index: usize,
    envelope: bool,
    /// Shared register changes made by this row's effects
    pending: Vec<SharedWrite>,
}

impl S5bHandler {
    pub fn new(channel: ChannelId, tuning: Arc<Tuning>) -> Self {
        Self {
            index: channel.subindex(),
            state: ChannelState::new(channel, PitchTable::S5b, tuning),
            envelope: false,
            pending: Vec::new(),
        }
    }

    fn apply_shared(&mut self, groups: &mut ChipGroups) {
        for write in self.pending.drain(..) {
            match write {
                SharedWrite::Shape(shape) => groups.s5b.trigger_envelope(shape),
                SharedWrite::EnvelopeHigh(value) => groups.s5b.set_envelope_high(value),
                SharedWrite::EnvelopeLow(value) => groups.s5b.set_envelope_low(value),
                SharedWrite::Noise(period) => groups.s5b.set_noise_period(period),
            }
        }
    }
}

impl ChannelHandler for S5bHandler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn handle_effect(&mut self, effect: Effect) -> bool {
        let write = match effect.command {
            EffectCommand::S5bEnvelopeShape => {
                self.envelope = effect.param & 0x0F != 0;
                if !self.envelope {
                    return true;
                }
                SharedWrite::Shape(effect.param & 0x0F)
            }
            EffectCommand::S5bEnvelopeHigh => SharedWrite::EnvelopeHigh(effect.param),
            EffectCommand::S5bEnvelopeLow => SharedWrite::EnvelopeLow(effect.param),
            EffectCommand::S5bNoise => SharedWrite::Noise(effect.param & 0x1F),
            _ => return self.state.handle_effect(effect),
        };
        self.pending.push(write);
        true
    }

    fn refresh(&mut self, apu: &mut Apu, groups: &mut ChipGroups) {
        self.state.take_trigger();
        self.apply_shared(groups);
        let out = self.state.output();
        let reg = self.index as u8;
        if out.audible {
            let tone = out.duty & 0x02 == 0;
            let noise = out.duty & 0x01 != 0;
            groups.s5b.set_mix(self.index, tone, noise);
            groups.s5b.write(apu, reg * 2, (out.period & 0xFF) as u8);
            groups.s5b.write(apu, reg * 2 + 1, ((out.period >> 8) & 0x0F) as u8);
            let volume = if self.envelope {
                USE_ENVELOPE | out.volume
            } else {
                out.volume
            };
            groups.s5b.write(apu, 8 + reg, volume);
        } else {
            groups.s5b.set_mix(self.index, false, false);
            groups.s5b.write(apu, 8 + reg, 0);
        }
        groups.s5b.flush(apu);
    }

    fn clear_registers(&mut self, apu: &mut Apu, groups: &mut ChipGroups) {
        let reg = self.index as u8;
        groups.s5b.set_mix(self.index, false, false);
        groups.s5b.write(apu, reg * 2, 0);
        groups.s5b.write(apu, reg * 2 + 1, 0);
        groups.s5b.write(apu, 8 + reg, 0);
        groups.s5b.flush(apu);
        self.pending.clear();
    }

    fn reset(&mut self) {
        self.state.reset();
        self.envelope = false;
        self.pending.clear();
    }
}
