//! VRC7 FM channels.
//!
//! Pitch is kept as `fnum << block`; every refresh splits it into the
//! lowest block that holds the F-number, so slides cross octaves smoothly.

use super::groups::ChipGroups;
use super::state::{ChannelState, Gate};
use super::{ChannelHandler, Tuning};
use crate::instrument::{Instrument, InstrumentData, VRC7_CUSTOM_PATCH};
use crate::note_table::{NoteTables, PitchTable};
use fami_core::{Apu, ChannelId};
use std::sync::Arc;

const ADDRESS: u16 = 0x9010;
const DATA: u16 = 0x9030;

const KEY_ON: u8 = 0x10;
const SUSTAIN: u8 = 0x20;

fn write_reg(apu: &mut Apu, reg: u8, value: u8) {
    apu.write(ADDRESS, reg);
    apu.write(DATA, value);
}

pub struct Vrc7Handler {
    state: ChannelState,
    index: u8,
    patch: u8,
    custom: [u8; 8],
    custom_dirty: bool,
}

impl Vrc7Handler {
    pub fn new(channel: ChannelId, tuning: Arc<Tuning>) -> Self {
        Self {
            index: channel.subindex() as u8,
            state: ChannelState::new(channel, PitchTable::Vrc7, tuning),
            patch: 1,
            custom: [0; 8],
            custom_dirty: false,
        }
    }
}

impl ChannelHandler for Vrc7Handler {
    fn state(&self) -> &ChannelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        &mut self.state
    }

    fn load_instrument(&mut self, instrument: &Instrument) {
        if let InstrumentData::Vrc7 { patch, custom } = &instrument.data {
            self.patch = patch & 0x0F;
            if self.patch == VRC7_CUSTOM_PATCH {
                self.custom = *custom;
                self.custom_dirty = true;
            }
        }
    }

    fn refresh(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        let trigger = self.state.take_trigger();
        let out = self.state.output();
        let (block, fnum) = NoteTables::split_vrc7(out.period);
        let pitch = block << 1 | (fnum >> 8) as u8 & 0x01;

        let key = match self.state.gate() {
            Gate::Gated => KEY_ON,
            Gate::Releasing => SUSTAIN,
            Gate::Idle | Gate::Halted => {
                write_reg(apu, 0x20 + self.index, pitch);
                return;
            }
        };

        if self.custom_dirty {
            for (reg, &value) in self.custom.iter().enumerate() {
                write_reg(apu, reg as u8, value);
            }
            self.custom_dirty = false;
        }
        let attenuation = 0x0F - out.volume.min(0x0F);
        write_reg(apu, 0x30 + self.index, self.patch << 4 | attenuation);
        write_reg(apu, 0x10 + self.index, fnum as u8);
        if trigger {
            // a key off first restarts the envelopes
            write_reg(apu, 0x20 + self.index, pitch);
        }
        write_reg(apu, 0x20 + self.index, key | pitch);
    }

    fn clear_registers(&mut self, apu: &mut Apu, _groups: &mut ChipGroups) {
        write_reg(apu, 0x10 + self.index, 0);
        write_reg(apu, 0x20 + self.index, 0);
        write_reg(apu, 0x30 + self.index, 0x0F);
        self.custom_dirty = self.patch == VRC7_CUSTOM_PATCH;
    }
}
