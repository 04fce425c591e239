use tracing::debug;

use crate::error::{Error, Result};
use crate::timing::{BitPattern, TimingModel};

/// Encoded form of every byte value, built once and shared read only.
///
/// Entry `b` is the eight bits of `b`, most significant first, with each bit
/// replaced by its pattern and the result packed into bytes. All entries
/// have the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    zero: BitPattern,
    one: BitPattern,
    stride: usize,
    entries: Box<[u8]>,
}

impl LookupTable {
    pub fn build(zero: BitPattern, one: BitPattern) -> Result<Self> {
        if zero.len() != one.len() {
            return Err(Error::invalid_config(format!(
                "zero pattern is {} bits, one pattern is {} bits",
                zero.len(),
                one.len()
            )));
        }
        if zero == one {
            return Err(Error::invalid_config("zero and one patterns are identical"));
        }

        // 8 protocol bits of `len` output bits each is exactly `len` bytes
        let stride = zero.len();
        let mut entries = Vec::with_capacity(256 * stride);

        for value in 0..=255u8 {
            let mut acc: u64 = 0;
            let mut pending = 0;

            for bit in (0..8).rev() {
                let pattern = if value >> bit & 1 == 1 { one } else { zero };
                acc = acc << pattern.len() | u64::from(pattern.bits());
                pending += pattern.len();

                while pending >= 8 {
                    pending -= 8;
                    entries.push((acc >> pending) as u8);
                }
                acc &= (1 << pending) - 1;
            }
        }

        debug!(stride, %zero, %one, "lookup table built");

        Ok(LookupTable {
            zero,
            one,
            stride,
            entries: entries.into_boxed_slice(),
        })
    }

    pub fn from_model(model: &TimingModel) -> Result<Self> {
        Self::build(model.zero(), model.one())
    }

    #[inline]
    pub fn entry(&self, value: u8) -> &[u8] {
        let start = usize::from(value) * self.stride;
        &self.entries[start..start + self.stride]
    }

    /// Output bytes per input byte
    pub fn bytes_per_entry(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.entries.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recover the byte an encoded entry stands for.
    ///
    /// Returns `None` if the length is wrong or any group of bits matches
    /// neither pattern.
    pub fn decode(&self, encoded: &[u8]) -> Option<u8> {
        if encoded.len() != self.stride {
            return None;
        }

        let width = self.zero.len();
        let mut value = 0u8;
        let mut acc: u64 = 0;
        let mut pending = 0;
        let mut bits_seen = 0;

        for &byte in encoded {
            acc = acc << 8 | u64::from(byte);
            pending += 8;

            while pending >= width {
                pending -= width;
                let group = (acc >> pending) as u32 & mask(width);
                acc &= (1 << pending) - 1;

                value = value.wrapping_shl(1);
                if group == self.one.bits() {
                    value |= 1;
                } else if group != self.zero.bits() {
                    return None;
                }
                bits_seen += 1;
            }
        }

        (bits_seen == 8).then_some(value)
    }
}

fn mask(width: usize) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}
