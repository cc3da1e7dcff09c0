//! Stride plan: per-level stride metadata and the base-index mapping.

use crate::constants::{MAX_ADDR_BITS, MAX_STRIDE};
use crate::errors::Error;
use crate::helpers::extract_bits;

/// Per-level stride information.
#[derive(Debug, Clone, Copy)]
pub struct StrideInfo {
    /// Stride length in bits.
    pub sl: u8,
    /// Total stride length up to and including this level.
    pub tl: u8,
}

/// Immutable stride plan fixed at table creation.
#[derive(Debug, Clone)]
pub struct StridePlan {
    levels: Box<[StrideInfo]>,
    alen: u8,
    len: u8,
}

impl StridePlan {
    /// Validate `strides` against the address length and build the plan.
    pub fn new(strides: &[u8], alen: u8) -> Result<Self, Error> {
        if strides.is_empty() {
            return Err(Error::EmptyStridePlan);
        }
        if alen == 0 || alen > MAX_ADDR_BITS {
            return Err(Error::AddrTooLong);
        }
        let mut sum = 0u16;
        let mut levels = Vec::with_capacity(strides.len());
        for &sl in strides {
            if sl == 0 {
                return Err(Error::ZeroStride);
            }
            if sl > MAX_STRIDE {
                return Err(Error::StrideTooLong);
            }
            sum += sl as u16;
            if sum > alen as u16 {
                return Err(Error::StrideSumMismatch);
            }
            levels.push(StrideInfo { sl, tl: sum as u8 });
        }
        if sum != alen as u16 {
            return Err(Error::StrideSumMismatch);
        }
        Ok(Self {
            levels: levels.into_boxed_slice(),
            alen,
            len: alen.div_ceil(8),
        })
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Address length in bits.
    pub fn addr_bits(&self) -> u8 {
        self.alen
    }

    /// Address length in bytes.
    pub fn addr_bytes(&self) -> usize {
        self.len as usize
    }

    /// Stride length of `level`.
    pub fn stride(&self, level: usize) -> u8 {
        self.levels[level].sl
    }

    /// Cumulative bits through `level`.
    pub fn total_len(&self, level: usize) -> u8 {
        self.levels[level].tl
    }

    /// Absolute bit position where `level`'s stride begins.
    pub fn start_bit(&self, level: usize) -> u16 {
        if level == 0 {
            0
        } else {
            self.levels[level - 1].tl as u16
        }
    }

    /// Smallest level whose cumulative stride covers `plen`.
    /// A zero-length prefix maps to level 0.
    pub fn plen_to_level(&self, plen: u8) -> usize {
        let mut l = 0;
        while self.levels[l].tl < plen {
            l += 1;
        }
        l
    }

    /// Level whose stride contains the absolute bit position `bit`.
    pub fn bit_to_level(&self, bit: u16) -> usize {
        let mut l = 0;
        while (self.levels[l].tl as u16) <= bit {
            l += 1;
        }
        l
    }

    /// Fringe index of `dest`'s stride value at `level`.
    pub fn fringe_index(&self, dest: &[u8], level: usize) -> usize {
        let sl = self.levels[level].sl;
        extract_bits(dest, self.start_bit(level), sl) as usize + (1usize << sl)
    }

    /// Locate the level holding prefix `(dest, plen)` and its base index
    /// within that level's heap. `plen` must be nonzero; the zero-length
    /// prefix lives in the root's default slot.
    pub fn base_index(&self, dest: &[u8], plen: u8) -> (usize, usize) {
        debug_assert!(plen > 0 && plen <= self.alen);
        let level = self.plen_to_level(plen);
        let sl = self.levels[level].sl;
        let len = self.start_bit(level);
        let p = plen as u32 - len as u32;
        let st = extract_bits(dest, len, sl);
        (level, (st >> (sl as u32 - p)) as usize + (1usize << p))
    }

    /// Prefix length represented by `index` within a heap at `level`.
    pub fn index_plen(&self, level: usize, index: usize) -> u8 {
        (self.start_bit(level) + index.ilog2() as u16) as u8
    }
}
