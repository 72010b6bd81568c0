//! ## Node Database (NDB) Layer
//!
//! Header, B-tree pages and framed blocks: everything needed to lay out and
//! locate the nodes of a PST image without interpreting their contents.

use std::io;
use thiserror::Error;

pub mod block;
pub mod block_id;
pub mod block_ref;
pub mod byte_index;
pub mod header;
pub mod node_id;
pub mod page;
pub mod read_write;

use block::BlockType;
use block_id::BlockId;
use block_ref::BlockLocator;
use node_id::NodeId;

#[derive(Error, Debug)]
pub enum NdbError {
    #[error("Invalid nidType: 0x{0:02X}")]
    InvalidNodeIdType(u8),
    #[error("Invalid nidIndex: 0x{0:08X}")]
    InvalidNodeIndex(u32),
    #[error("Invalid bidIndex: 0x{0:016X}")]
    InvalidBlockIndex(u64),
    #[error("Block id does not fit the block frame: {0:?}")]
    BlockIdOutOfRange(BlockId),
    #[error("Invalid HEADER dwMagic: 0x{0:08X}")]
    InvalidHeaderMagic(u32),
    #[error("Invalid HEADER wVer: 0x{0:04X}")]
    InvalidVersion(u16),
    #[error("Invalid HEADER dwCRC: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    InvalidHeaderCrc { stored: u32, computed: u32 },
    #[error("Invalid HEADER checksum: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    InvalidHeaderChecksum { stored: u32, computed: u32 },
    #[error("Truncated HEADER: expected {expected} bytes, found {actual}")]
    TruncatedHeader { expected: usize, actual: usize },
    #[error("Value does not fit a 32-bit ANSI field: 0x{0:X}")]
    IndexOutOfRange(u64),
    #[error("Read of {size} bytes at offset 0x{offset:X} exceeds buffer of {len} bytes")]
    OutOfBounds { offset: usize, size: usize, len: usize },
    #[error("Invalid BTPAGE ptype: 0x{0:02X}")]
    InvalidPageType(u8),
    #[error("Unsupported intermediate BTPAGE at level {0}")]
    UnsupportedIntermediatePage(u8),
    #[error("Truncated BTPAGE at 0x{offset:X}: expected {expected} bytes, found {actual}")]
    TruncatedPage {
        offset: u64,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid BTPAGE cEnt: {0}")]
    TooManyBTreeEntries(usize),
    #[error("BTPAGE entries out of order: 0x{previous:X} before 0x{next:X}")]
    UnsortedBTreeEntries { previous: u64, next: u64 },
    #[error("Invalid block type: 0x{0:08X}")]
    InvalidBlockType(u32),
    #[error("Unexpected block type at 0x{offset:X}: {actual:?}")]
    UnexpectedBlockType { offset: u64, actual: BlockType },
    #[error("Truncated block at 0x{offset:X}: expected {expected} bytes, found {actual}")]
    TruncatedBlock {
        offset: u64,
        expected: u64,
        actual: u64,
    },
    #[error("Block at 0x{offset:X} is framed as {actual:?}, expected {expected:?}")]
    BlockIdMismatch {
        offset: u64,
        expected: BlockId,
        actual: BlockId,
    },
    #[error("{block:?} at 0x{offset:X} overlaps the header")]
    BlockOverlapsHeader { block: BlockId, offset: u64 },
    #[error("{block:?} at 0x{offset:X} (0x{size:X} bytes) ends past the file size 0x{file_size:X}")]
    BlockOutOfBounds {
        block: BlockId,
        offset: u64,
        size: u64,
        file_size: u64,
    },
    #[error("{0:?} not found")]
    NodeNotFound(NodeId),
    #[error("{0:?} not found")]
    BlockNotFound(BlockId),
    #[error("HEADER {block:?} locator {header:?} disagrees with the BBT entry {index:?}")]
    IndexLocatorMismatch {
        block: BlockId,
        header: BlockLocator,
        index: BlockLocator,
    },
    #[error("HEADER file size 0x{header:X} does not match the image size 0x{actual:X}")]
    FileSizeMismatch { header: u64, actual: u64 },
    #[error("{node:?} references {block:?}, which is missing from the BBT")]
    DanglingReference { node: NodeId, block: BlockId },
    #[error("{node:?} references unknown parent {parent:?}")]
    UnknownParent { node: NodeId, parent: NodeId },
}

impl From<NdbError> for io::Error {
    fn from(err: NdbError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type NdbResult<T> = Result<T, NdbError>;
