//! Candidate offsets for content recovery when no usable index exists.
//!
//! A [ContentLocator] only reports where to look. Interpreting what is found there is left to
//! the caller, usually through [text_at].

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::ndb::{NdbError, NdbResult};

pub trait ContentLocator {
    /// Lazily yield candidate offsets into `data`. Calling this again restarts the scan.
    fn locate<'a>(&'a self, data: &'a [u8]) -> Box<dyn Iterator<Item = u64> + 'a>;
}

/// Repeated-byte signatures that commonly start blocks and B-tree pages in OST files.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSignature {
    DataBlock = 0x0101_0101,
    BTreeBlock = 0x0202_0202,
    IntermediatePage = 0x8080_8080,
    LeafPage = 0x8181_8181,
}

impl TryFrom<u32> for BlockSignature {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x0101_0101 => Ok(BlockSignature::DataBlock),
            0x0202_0202 => Ok(BlockSignature::BTreeBlock),
            0x8080_8080 => Ok(BlockSignature::IntermediatePage),
            0x8181_8181 => Ok(BlockSignature::LeafPage),
            _ => Err(value),
        }
    }
}

/// Byte-by-byte search for [BlockSignature] words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureScan {
    pub max_matches: usize,
}

impl Default for SignatureScan {
    fn default() -> Self {
        Self { max_matches: 50 }
    }
}

impl SignatureScan {
    /// Every signature match with the kind of structure it suggests.
    pub fn matches<'a>(
        &self,
        data: &'a [u8],
    ) -> impl Iterator<Item = (u64, BlockSignature)> + 'a {
        data.windows(4)
            .enumerate()
            .filter_map(|(offset, word)| {
                BlockSignature::try_from(LittleEndian::read_u32(word))
                    .ok()
                    .map(|signature| (offset as u64, signature))
            })
            .take(self.max_matches)
    }
}

impl ContentLocator for SignatureScan {
    fn locate<'a>(&'a self, data: &'a [u8]) -> Box<dyn Iterator<Item = u64> + 'a> {
        Box::new(self.matches(data).map(|(offset, _)| offset))
    }
}

/// Evenly spaced samples across the file, skipping `margin` bytes at each end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrideScan {
    pub samples: u64,
    pub margin: u64,
}

impl Default for StrideScan {
    fn default() -> Self {
        Self {
            samples: 1000,
            margin: 4096,
        }
    }
}

impl ContentLocator for StrideScan {
    fn locate<'a>(&'a self, data: &'a [u8]) -> Box<dyn Iterator<Item = u64> + 'a> {
        let len = data.len() as u64;
        let step = (len / self.samples.max(1)).max(1);
        let end = len.saturating_sub(self.margin);
        debug!(name: "PstStrideScan", len, step, start = self.margin, end);

        Box::new(
            (self.margin..end)
                .step_by(usize::try_from(step).unwrap_or(usize::MAX)),
        )
    }
}

/// Decode `len` bytes at `offset` as text. Ranges that look like UTF-16LE are decoded as
/// such, anything else as UTF-8. Invalid sequences are replaced and trailing NULs dropped.
pub fn text_at(data: &[u8], offset: u64, len: usize) -> NdbResult<String> {
    let out_of_bounds = || NdbError::OutOfBounds {
        offset: offset as usize,
        size: len,
        len: data.len(),
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(out_of_bounds)?;

    let text = if looks_like_utf16(bytes) {
        let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    Ok(text.trim_end_matches('\0').to_string())
}

// Mostly-ASCII UTF-16LE has a zero high byte in most code units.
fn looks_like_utf16(bytes: &[u8]) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }
    let units = bytes.len() / 2;
    let zero_high = bytes.chunks_exact(2).filter(|unit| unit[1] == 0).count();
    zero_high * 2 > units
}
