//! Delta modulation channel of the 2A03 and the sample memory it reads.
//!
//! ## Register Interface
//!
//! - **$4010**: Flags and rate (IRQ enable, loop, rate index)
//! - **$4011**: Direct load (7-bit output level)
//! - **$4012**: Sample address ($C000 + address * 64)
//! - **$4013**: Sample length (length * 16 + 1 bytes)

use crate::apu::TimingMode;
use crate::channels::ChannelId;
use crate::mixer::Mixer;

/// First CPU address of the sample window
pub const SAMPLE_MEMORY_BASE: u16 = 0xC000;

/// Size of the sample window in bytes
pub const SAMPLE_MEMORY_SIZE: usize = 0x4000;

/// 16 KB of DPCM sample data mapped at $C000-$FFFF.
#[derive(Debug, Clone)]
pub struct SampleMemory {
    data: Vec<u8>,
}

impl SampleMemory {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Replace the contents; anything past 16 KB is dropped
    pub fn load(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(SAMPLE_MEMORY_SIZE);
        self.data.clear();
        self.data.extend_from_slice(&bytes[..len]);
    }

    /// Byte at a CPU address. Addresses outside the loaded window read 0.
    pub fn read(&self, addr: u16) -> u8 {
        addr.checked_sub(SAMPLE_MEMORY_BASE)
            .and_then(|offset| self.data.get(offset as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for SampleMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// NES DMC (Delta Modulation Channel).
///
/// Plays 1-bit delta-encoded samples from [`SampleMemory`].
#[derive(Debug, Clone)]
pub struct Dpcm {
    irq_enabled: bool,
    looping: bool,
    rate_index: u8,
    periods: &'static [u16; 16],
    /// 7-bit output level
    delta_counter: u8,
    /// Start address of the sample ($C000 + address * 64)
    sample_address: u16,
    /// Sample length in bytes (length * 16 + 1)
    sample_length: u16,

    current_address: u16,
    bytes_remaining: u16,
    sample_buffer: u8,
    buffer_filled: bool,
    shift_register: u8,
    bits_remaining: u8,
    silence: bool,
    irq_pending: bool,

    counter: u32,
    time: u32,
}

impl Dpcm {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            irq_enabled: false,
            looping: false,
            rate_index: 0,
            periods: timing.dpcm_periods(),
            delta_counter: 0,
            sample_address: SAMPLE_MEMORY_BASE,
            sample_length: 1,
            current_address: SAMPLE_MEMORY_BASE,
            bytes_remaining: 0,
            sample_buffer: 0,
            buffer_filled: false,
            shift_register: 0,
            bits_remaining: 0,
            silence: true,
            irq_pending: false,
            counter: 0,
            time: 0,
        }
    }

    pub fn reset(&mut self) {
        let periods = self.periods;
        *self = Self::new(TimingMode::Ntsc);
        self.periods = periods;
    }

    pub fn set_timing(&mut self, timing: TimingMode) {
        self.periods = timing.dpcm_periods();
    }

    /// Write register 0-3 ($4010-$4013)
    pub fn write(&mut self, reg: u16, value: u8) {
        match reg & 3 {
            0 => {
                self.irq_enabled = value & 0x80 != 0;
                self.looping = value & 0x40 != 0;
                self.rate_index = value & 0x0F;
                if !self.irq_enabled {
                    self.irq_pending = false;
                }
            }
            1 => self.delta_counter = value & 0x7F,
            2 => self.sample_address = SAMPLE_MEMORY_BASE | ((value as u16) << 6),
            _ => self.sample_length = ((value as u16) << 4) + 1,
        }
    }

    /// Status register bit 4: start the sample if idle, or stop it
    pub fn set_enabled(&mut self, enabled: bool) {
        self.irq_pending = false;
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    /// Bytes still to be fetched
    pub fn is_active(&self) -> bool {
        self.bytes_remaining > 0
    }

    pub fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    pub fn delta_counter(&self) -> u8 {
        self.delta_counter
    }

    pub fn period_cycles(&self) -> u32 {
        self.periods[self.rate_index as usize] as u32
    }

    /// Whether the channel needs to be clocked at its own rate
    pub fn is_sounding(&self) -> bool {
        self.is_active() || !self.silence || self.buffer_filled
    }

    fn fetch(&mut self, memory: &SampleMemory) {
        if self.buffer_filled || self.bytes_remaining == 0 {
            return;
        }
        self.sample_buffer = memory.read(self.current_address);
        self.buffer_filled = true;
        self.current_address = self.current_address.wrapping_add(1) | 0x8000;
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enabled {
                self.irq_pending = true;
            }
        }
    }

    pub fn process(&mut self, mut time: u32, memory: &SampleMemory, mixer: &mut Mixer) {
        while time >= self.counter {
            time -= self.counter;
            self.time += self.counter;
            self.counter = self.period_cycles();

            self.fetch(memory);

            if self.bits_remaining == 0 {
                self.bits_remaining = 8;
                if self.buffer_filled {
                    self.shift_register = self.sample_buffer;
                    self.buffer_filled = false;
                    self.silence = false;
                } else {
                    self.silence = true;
                }
            }

            if !self.silence {
                if self.shift_register & 1 != 0 {
                    if self.delta_counter <= 125 {
                        self.delta_counter += 2;
                    }
                } else if self.delta_counter >= 2 {
                    self.delta_counter -= 2;
                }
            }
            self.shift_register >>= 1;
            self.bits_remaining -= 1;

            mixer.add_value(ChannelId::Dpcm, self.delta_counter as i32, self.time);
        }
        self.counter -= time;
        self.time += time;
    }

    pub fn end_frame(&mut self) {
        self.time = 0;
    }

    /// Sample playback rate in bits per second
    pub fn frequency(&self, clock: f64) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        clock / self.period_cycles() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn sample_memory_reads_zero_outside_window() {
        let mut memory = SampleMemory::new();
        memory.load(&[0xAA, 0x55]);
        assert_eq!(memory.read(0xC000), 0xAA);
        assert_eq!(memory.read(0xC001), 0x55);
        assert_eq!(memory.read(0xC002), 0);
        assert_eq!(memory.read(0x8000), 0);
        assert_eq!(memory.read(0xFFFF), 0);
    }

    #[test]
    fn sample_memory_is_capped_at_16k() {
        let mut memory = SampleMemory::new();
        memory.load(&vec![1u8; SAMPLE_MEMORY_SIZE + 100]);
        assert_eq!(memory.len(), SAMPLE_MEMORY_SIZE);
        assert_eq!(memory.read(0xFFFF), 1);
    }

    #[test]
    fn address_and_length_registers() {
        let mut dpcm = Dpcm::new(TimingMode::Ntsc);
        dpcm.write(2, 0x01);
        dpcm.write(3, 0x02);
        assert_eq!(dpcm.sample_address, 0xC040);
        assert_eq!(dpcm.sample_length, 33);
    }

    #[test]
    fn all_ones_sample_ramps_up_and_raises_irq() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut memory = SampleMemory::new();
        memory.load(&[0xFF]);

        let mut dpcm = Dpcm::new(TimingMode::Ntsc);
        dpcm.write(0, 0x8F); // IRQ on, fastest rate
        dpcm.write(1, 0x40);
        dpcm.write(2, 0x00);
        dpcm.write(3, 0x00); // 1 byte
        dpcm.set_enabled(true);
        assert!(dpcm.is_active());

        dpcm.process(dpcm.period_cycles() * 10, &memory, &mut mixer);
        assert!(!dpcm.is_active());
        assert!(dpcm.irq_pending());
        assert_eq!(dpcm.delta_counter(), 0x40 + 16);

        dpcm.set_enabled(false);
        assert!(!dpcm.irq_pending());
    }

    #[test]
    fn looping_sample_never_raises_irq() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let memory = SampleMemory::new();
        let mut dpcm = Dpcm::new(TimingMode::Ntsc);
        dpcm.write(0, 0xCF);
        dpcm.set_enabled(true);
        dpcm.process(dpcm.period_cycles() * 100, &memory, &mut mixer);
        assert!(dpcm.is_active());
        assert!(!dpcm.irq_pending());
    }

    #[test]
    fn delta_counter_saturates() {
        let mut mixer = Mixer::new(&EngineConfig::default()).unwrap();
        let mut memory = SampleMemory::new();
        memory.load(&[0x00; 4]);
        let mut dpcm = Dpcm::new(TimingMode::Ntsc);
        dpcm.write(0, 0x0F);
        dpcm.write(1, 0x03);
        dpcm.write(3, 0x00);
        dpcm.set_enabled(true);
        dpcm.process(dpcm.period_cycles() * 10, &memory, &mut mixer);
        assert_eq!(dpcm.delta_counter(), 1);
    }
}
