//! [Blocks](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/a9c1981d-d1ea-457c-b39e-dc7fb0eb95d4)
//!
//! Every block is a 16-byte frame header followed by its payload, padded to a multiple of
//! [BLOCK_SIZE]. Blocks are appended to an arena after the file header and never moved.

use tracing::debug;

use super::{block_id::*, block_ref::BlockLocator, byte_index::IndexWidth, read_write::*, *};

pub const BLOCK_SIZE: u64 = 512;
pub const BLOCK_HEADER_SIZE: usize = 16;

/// Framed size of a block holding `payload_size` bytes.
pub const fn block_size(payload_size: u64) -> u64 {
    let size = payload_size + BLOCK_HEADER_SIZE as u64;
    size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BlockType {
    /// B-tree page
    Internal = 1,
    /// Serialized property set
    Data = 2,
    SubNode = 3,
}

impl TryFrom<u32> for BlockType {
    type Error = NdbError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BlockType::Internal),
            2 => Ok(BlockType::Data),
            3 => Ok(BlockType::SubNode),
            _ => Err(NdbError::InvalidBlockType(value)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockFrame {
    block: BlockId,
    block_type: BlockType,
    payload: Vec<u8>,
}

impl BlockFrame {
    pub fn new(block: BlockId, block_type: BlockType, payload: Vec<u8>) -> Self {
        Self {
            block,
            block_type,
            payload,
        }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Frame and pad the payload.
    pub fn encode(&self) -> NdbResult<Vec<u8>> {
        let payload_size = IndexWidth::Narrow.check(self.payload.len() as u64)?;
        let mut data = vec![0_u8; block_size(payload_size) as usize];

        // bid
        write_u32_at(&mut data, 0, self.block.frame_id()?)?;
        // cb
        write_u32_at(&mut data, 4, payload_size as u32)?;
        // type
        write_u32_at(&mut data, 8, self.block_type as u32)?;

        data[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + self.payload.len()]
            .copy_from_slice(&self.payload);
        Ok(data)
    }

    /// Read the frame at `locator`, taking the block id from the frame itself.
    pub fn read_at(file: &[u8], locator: BlockLocator) -> NdbResult<Self> {
        let offset = locator.offset();
        let available = (file.len() as u64).saturating_sub(offset);
        if available < BLOCK_HEADER_SIZE as u64 {
            return Err(NdbError::TruncatedBlock {
                offset,
                expected: BLOCK_HEADER_SIZE as u64,
                actual: available,
            });
        }

        let frame = &file[offset as usize..];

        // bid
        let block = BlockId::from(u64::from(read_u32_at(frame, 0)?));

        // cb
        let size = read_u32_at(frame, 4)?;

        // type
        let block_type = BlockType::try_from(read_u32_at(frame, 8)?)?;

        let expected = BLOCK_HEADER_SIZE as u64 + u64::from(size);
        if available < expected || locator.size() < expected {
            return Err(NdbError::TruncatedBlock {
                offset,
                expected,
                actual: available.min(locator.size()),
            });
        }

        let payload = frame[BLOCK_HEADER_SIZE..expected as usize].to_vec();
        Ok(Self::new(block, block_type, payload))
    }

    /// Read the block a BBT entry describes and check that the frame agrees with the index.
    pub fn read_block(file: &[u8], block: BlockId, locator: BlockLocator) -> NdbResult<Self> {
        let frame = Self::read_at(file, locator)?;
        if frame.block != block {
            return Err(NdbError::BlockIdMismatch {
                offset: locator.offset(),
                expected: block,
                actual: frame.block,
            });
        }
        Ok(frame)
    }
}

/// One block known to the allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatedBlock {
    pub block: BlockId,
    pub block_type: BlockType,
    pub locator: BlockLocator,
    pub payload_size: u64,
    pub ref_count: u16,
}

/// Append-only arena of framed blocks with a parallel index from block id to location.
///
/// Block ids grow monotonically from `0x100`, so the index stays sorted by id.
#[derive(Clone, Debug)]
pub struct BlockAllocator {
    header_size: u64,
    arena: Vec<u8>,
    index: Vec<AllocatedBlock>,
    next_index: u64,
}

impl BlockAllocator {
    pub fn new(header_size: u64) -> Self {
        Self {
            header_size,
            arena: Vec::new(),
            index: Vec::new(),
            next_index: FIRST_BLOCK_INDEX,
        }
    }

    /// File offset the next block will be written to.
    pub fn end_offset(&self) -> u64 {
        self.header_size + self.arena.len() as u64
    }

    /// Id and location the next call to [Self::allocate] would assign.
    pub fn peek(
        &self,
        block_type: BlockType,
        payload_size: u64,
    ) -> NdbResult<(BlockId, BlockLocator)> {
        let block = BlockId::new(block_type == BlockType::Internal, self.next_index)?;
        block.frame_id()?;
        Ok((
            block,
            BlockLocator::new(self.end_offset(), block_size(payload_size)),
        ))
    }

    pub fn allocate(&mut self, block_type: BlockType, payload: Vec<u8>) -> NdbResult<BlockId> {
        let payload_size = payload.len() as u64;
        let (block, locator) = self.peek(block_type, payload_size)?;

        let data = BlockFrame::new(block, block_type, payload).encode()?;
        debug!(
            name: "PstBlockAllocated",
            ?block,
            ?block_type,
            offset = locator.offset(),
            size = locator.size(),
        );

        self.arena.extend_from_slice(&data);
        self.index.push(AllocatedBlock {
            block,
            block_type,
            locator,
            payload_size,
            ref_count: 1,
        });
        self.next_index += 1;
        Ok(block)
    }

    /// Mark a block as no longer referenced. It stays in the arena and the index.
    pub fn release(&mut self, block: BlockId) {
        if let Some(entry) = self.entry_mut(block) {
            entry.ref_count = 0;
        }
    }

    pub fn locate(&self, block: BlockId) -> Option<BlockLocator> {
        self.entry(block).map(|entry| entry.locator)
    }

    pub fn blocks(&self) -> &[AllocatedBlock] {
        &self.index
    }

    /// Payload bytes of every live block.
    pub fn live_payload_size(&self) -> u64 {
        self.index
            .iter()
            .filter(|entry| entry.ref_count > 0)
            .map(|entry| entry.payload_size)
            .sum()
    }

    /// A zeroed header placeholder followed by every block in allocation order.
    pub fn render(&self) -> Vec<u8> {
        let mut data = vec![0_u8; self.header_size as usize];
        data.extend_from_slice(&self.arena);
        data
    }

    fn entry(&self, block: BlockId) -> Option<&AllocatedBlock> {
        self.index
            .binary_search_by_key(&block, |entry| entry.block)
            .ok()
            .map(|index| &self.index[index])
    }

    fn entry_mut(&mut self, block: BlockId) -> Option<&mut AllocatedBlock> {
        self.index
            .binary_search_by_key(&block, |entry| entry.block)
            .ok()
            .map(|index| &mut self.index[index])
    }
}
