//! Packing of DPCM samples into the 16 KB window at $C000.

use crate::error::DriverError;
use fami_core::chips::{SAMPLE_MEMORY_BASE, SAMPLE_MEMORY_SIZE};
use fami_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Samples start on 64-byte boundaries
const SAMPLE_ALIGN: usize = 64;

/// Longest sample the length register can describe
pub const MAX_SAMPLE_LENGTH: usize = 0xFF * 16 + 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpcmSample {
    pub name: String,
    pub data: Vec<u8>,
}

impl DpcmSample {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }
}

/// Register values that play a packed sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePlacement {
    /// $4012 value
    pub address: u8,
    /// $4013 value
    pub length: u8,
}

impl SamplePlacement {
    pub fn cpu_address(&self) -> u16 {
        SAMPLE_MEMORY_BASE + self.address as u16 * SAMPLE_ALIGN as u16
    }

    pub fn byte_length(&self) -> usize {
        self.length as usize * 16 + 1
    }
}

/// Sample memory image and where every sample ended up
#[derive(Debug, Clone, Default)]
pub struct SampleMap {
    image: Vec<u8>,
    placements: Vec<Option<SamplePlacement>>,
    sizes: Vec<usize>,
}

impl SampleMap {
    /// Lay samples out in order. A sample that does not fit is left out whole.
    pub fn pack(samples: &[DpcmSample]) -> Self {
        let mut map = Self::default();
        let mut offset = 0usize;
        for (index, sample) in samples.iter().enumerate() {
            let len = sample.data.len().min(MAX_SAMPLE_LENGTH);
            map.sizes.push(len);
            if len == 0 {
                map.placements.push(None);
                continue;
            }
            if offset + len > SAMPLE_MEMORY_SIZE {
                log(LogCategory::Driver, LogLevel::Warn, || {
                    format!(
                        "DPCM sample {} \"{}\" ({} bytes) does not fit, skipped",
                        index, sample.name, len
                    )
                });
                map.placements.push(None);
                continue;
            }
            map.image.resize(offset, 0);
            map.image.extend_from_slice(&sample.data[..len]);
            map.placements.push(Some(SamplePlacement {
                address: (offset / SAMPLE_ALIGN) as u8,
                length: ((len - 1) / 16) as u8,
            }));
            offset = (offset + len).div_ceil(SAMPLE_ALIGN) * SAMPLE_ALIGN;
        }
        map
    }

    /// Bytes to load at $C000
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn placement(&self, index: usize) -> Result<SamplePlacement, DriverError> {
        match self.placements.get(index) {
            Some(Some(placement)) => Ok(*placement),
            Some(None) => Err(DriverError::SampleMemoryFull {
                index,
                len: self.sizes[index],
            }),
            None => Err(DriverError::Document(format!("no DPCM sample {index}"))),
        }
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> DpcmSample {
        DpcmSample::new("s", vec![0xAA; len])
    }

    #[test]
    fn samples_are_aligned() {
        let map = SampleMap::pack(&[sample(17), sample(65), sample(1)]);
        let a = map.placement(0).unwrap();
        let b = map.placement(1).unwrap();
        let c = map.placement(2).unwrap();
        assert_eq!((a.address, a.length), (0, 1));
        assert_eq!((b.address, b.length), (1, 4));
        assert_eq!((c.address, c.length), (3, 0));
        assert_eq!(b.cpu_address(), 0xC040);
        assert_eq!(map.image().len(), 3 * 64 + 1);
    }

    #[test]
    fn oversized_sample_is_skipped_not_truncated() {
        let big = MAX_SAMPLE_LENGTH;
        let samples: Vec<DpcmSample> = (0..5).map(|_| sample(big)).collect();
        let map = SampleMap::pack(&samples);
        // 4081 bytes round up to 4096, four fit in 16 KB
        for i in 0..4 {
            assert!(map.placement(i).is_ok());
        }
        assert!(matches!(
            map.placement(4),
            Err(DriverError::SampleMemoryFull { index: 4, len }) if len == big
        ));
        assert!(map.image().len() <= SAMPLE_MEMORY_SIZE);
    }

    #[test]
    fn later_small_sample_still_fits() {
        let map = SampleMap::pack(&[sample(0x3FC1), sample(0x100), sample(0x10)]);
        assert!(map.placement(1).is_err());
        assert_eq!(map.placement(2).unwrap().address, 0xFF);
    }
}
