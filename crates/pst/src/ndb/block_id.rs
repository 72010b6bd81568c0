//! [BID (Block ID)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/d3155aa1-ccdd-4dee-a0a9-5363ccca5352)

use super::*;

pub const MAX_BLOCK_INDEX: u64 = 1_u64.rotate_right(2) - 1;

/// Allocation starts at this index, so the first block id is `0x100`.
pub const FIRST_BLOCK_INDEX: u64 = 0x40;

/// The low bit is reserved, bit 1 marks an internal (index) block and the remaining bits hold
/// the index.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u64);

impl BlockId {
    pub fn new(is_internal: bool, index: u64) -> NdbResult<Self> {
        let is_internal = if is_internal { 0x2 } else { 0x0 };

        let shifted_index = index.rotate_left(2);
        if shifted_index & 0x3 != 0 {
            return Err(NdbError::InvalidBlockIndex(index));
        };

        Ok(Self(shifted_index | is_internal))
    }

    pub fn is_internal(&self) -> bool {
        self.0 & 0x2 == 0x2
    }

    pub fn index(&self) -> u64 {
        self.0 >> 2
    }

    /// The block frame only has room for 32 bits of block id.
    pub fn frame_id(&self) -> NdbResult<u32> {
        u32::try_from(self.0).map_err(|_| NdbError::BlockIdOutOfRange(*self))
    }
}

impl From<u64> for BlockId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<BlockId> for u64 {
    fn from(value: BlockId) -> Self {
        value.0
    }
}
