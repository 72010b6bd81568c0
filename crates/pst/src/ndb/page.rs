//! [Pages](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5774b4f2-cdc4-453e-996a-8c8230116930)
//!
//! Single-level B-tree pages shared by the node and block indexes. A page is a 16-byte header
//! followed by fixed-size entries sorted by key, padded to at least one block.

use super::{
    block_id::BlockId, block_ref::BlockLocator, byte_index::IndexWidth, header::NdbVersion,
    node_id::NodeId, read_write::*, *,
};

pub const PAGE_HEADER_SIZE: usize = 16;
pub const MIN_PAGE_SIZE: usize = 512;

/// `ptype`
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PageType {
    /// Page of child page references, not produced or accepted here
    Intermediate = 0x80,
    /// Page of index entries
    Leaf = 0x81,
}

impl TryFrom<u8> for PageType {
    type Error = NdbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x80 => Ok(PageType::Intermediate),
            0x81 => Ok(PageType::Leaf),
            _ => Err(NdbError::InvalidPageType(value)),
        }
    }
}

pub trait BTreeEntry: Sized + Copy {
    fn entry_size(version: NdbVersion) -> usize;
    fn key(&self) -> u64;
    fn read_at(data: &[u8], offset: usize, version: NdbVersion) -> NdbResult<Self>;
    fn write_at(&self, data: &mut [u8], offset: usize, version: NdbVersion) -> NdbResult<()>;
}

/// [NBTENTRY](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/53a4b926-8ac4-45c9-9c6d-8358d951dbcd)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeBTreeEntry {
    node: NodeId,
    data: BlockId,
    sub_node: Option<BlockId>,
    parent: Option<NodeId>,
}

impl NodeBTreeEntry {
    pub fn new(
        node: NodeId,
        data: BlockId,
        sub_node: Option<BlockId>,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            node,
            data,
            sub_node,
            parent,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn data(&self) -> BlockId {
        self.data
    }

    pub fn sub_node(&self) -> Option<BlockId> {
        self.sub_node
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

impl BTreeEntry for NodeBTreeEntry {
    fn entry_size(version: NdbVersion) -> usize {
        match version {
            NdbVersion::Ansi => 16,
            NdbVersion::Unicode => 32,
        }
    }

    fn key(&self) -> u64 {
        u64::from(u32::from(self.node))
    }

    fn read_at(data: &[u8], offset: usize, version: NdbVersion) -> NdbResult<Self> {
        let (width, block_offset, parent_offset) = match version {
            NdbVersion::Ansi => (IndexWidth::Narrow, 4, 12),
            NdbVersion::Unicode => (IndexWidth::Wide, 8, 24),
        };

        // nid
        let node = NodeId::from(read_u32_at(data, offset)?);

        // bidData
        let block = BlockId::from(width.read_at(data, offset + block_offset)?);

        // bidSub
        let sub_node = width.read_at(data, offset + block_offset + width.size())?;
        let sub_node = (sub_node != 0).then(|| BlockId::from(sub_node));

        // nidParent
        let parent = read_u32_at(data, offset + parent_offset)?;
        let parent = (parent != 0).then(|| NodeId::from(parent));

        Ok(Self::new(node, block, sub_node, parent))
    }

    fn write_at(&self, data: &mut [u8], offset: usize, version: NdbVersion) -> NdbResult<()> {
        let (width, block_offset, parent_offset) = match version {
            NdbVersion::Ansi => (IndexWidth::Narrow, 4, 12),
            NdbVersion::Unicode => (IndexWidth::Wide, 8, 24),
        };

        // nid
        write_u32_at(data, offset, u32::from(self.node))?;

        // bidData
        width.write_at(data, offset + block_offset, u64::from(self.data))?;

        // bidSub
        width.write_at(
            data,
            offset + block_offset + width.size(),
            self.sub_node.map(u64::from).unwrap_or_default(),
        )?;

        // nidParent
        write_u32_at(
            data,
            offset + parent_offset,
            self.parent.map(u32::from).unwrap_or_default(),
        )
    }
}

/// [BBTENTRY](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/53a4b926-8ac4-45c9-9c6d-8358d951dbcd)
///
/// The locator size is the framed size of the block on disk, including its frame header and
/// alignment padding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockBTreeEntry {
    block: BlockId,
    locator: BlockLocator,
    ref_count: u16,
}

impl BlockBTreeEntry {
    pub fn new(block: BlockId, locator: BlockLocator, ref_count: u16) -> Self {
        Self {
            block,
            locator,
            ref_count,
        }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn locator(&self) -> BlockLocator {
        self.locator
    }

    pub fn ref_count(&self) -> u16 {
        self.ref_count
    }
}

impl BTreeEntry for BlockBTreeEntry {
    fn entry_size(version: NdbVersion) -> usize {
        match version {
            NdbVersion::Ansi => 16,
            NdbVersion::Unicode => 24,
        }
    }

    fn key(&self) -> u64 {
        u64::from(self.block)
    }

    fn read_at(data: &[u8], offset: usize, version: NdbVersion) -> NdbResult<Self> {
        let width = version.layout().width;
        let ref_count_offset = offset + 2 * width.size();

        // bref
        let block = BlockId::from(width.read_at(data, offset)?);
        let ib = width.read_at(data, offset + width.size())?;

        // cRef
        let ref_count = read_u16_at(data, ref_count_offset)?;

        // cb
        let cb = read_u32_at(data, ref_count_offset + 4)?;

        Ok(Self::new(block, BlockLocator::new(ib, u64::from(cb)), ref_count))
    }

    fn write_at(&self, data: &mut [u8], offset: usize, version: NdbVersion) -> NdbResult<()> {
        let width = version.layout().width;
        let ref_count_offset = offset + 2 * width.size();

        // bref
        width.write_at(data, offset, u64::from(self.block))?;
        width.write_at(data, offset + width.size(), self.locator.offset())?;

        // cRef
        write_u16_at(data, ref_count_offset, self.ref_count)?;

        // cb
        let cb = IndexWidth::Narrow.check(self.locator.size())?;
        write_u32_at(data, ref_count_offset + 4, cb as u32)
    }
}

/// [BTPAGE](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/4f0cd8e7-c2d0-4975-90a4-d417cfca77f8)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BTreePage<Entry: BTreeEntry> {
    level: u8,
    entries: Vec<Entry>,
}

pub type NodeBTreePage = BTreePage<NodeBTreeEntry>;
pub type BlockBTreePage = BTreePage<BlockBTreeEntry>;

impl<Entry: BTreeEntry> BTreePage<Entry> {
    /// Build a leaf page. Callers sort the entries first; out of order or duplicate keys are
    /// rejected.
    pub fn new(entries: Vec<Entry>) -> NdbResult<Self> {
        if entries.len() > usize::from(u16::MAX) {
            return Err(NdbError::TooManyBTreeEntries(entries.len()));
        }

        check_sorted(&entries)?;
        Ok(Self { level: 0, entries })
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn find(&self, key: u64) -> Option<&Entry> {
        self.entries
            .binary_search_by_key(&key, Entry::key)
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn encoded_size(entry_count: usize, version: NdbVersion) -> usize {
        (PAGE_HEADER_SIZE + entry_count * Entry::entry_size(version)).max(MIN_PAGE_SIZE)
    }

    pub fn encode(&self, version: NdbVersion) -> NdbResult<Vec<u8>> {
        let entry_size = Entry::entry_size(version);
        let mut data = vec![0_u8; Self::encoded_size(self.entries.len(), version)];

        // ptype
        write_u8_at(&mut data, 0, PageType::Leaf as u8)?;
        // cLevel
        write_u8_at(&mut data, 1, self.level)?;
        // cEnt
        write_u16_at(&mut data, 2, self.entries.len() as u16)?;

        // rgentries
        for (index, entry) in self.entries.iter().enumerate() {
            entry.write_at(&mut data, PAGE_HEADER_SIZE + index * entry_size, version)?;
        }

        Ok(data)
    }

    /// Parse a page read from `offset` in the file. The offset is only used for error
    /// reporting.
    pub fn decode(data: &[u8], version: NdbVersion, offset: u64) -> NdbResult<Self> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(NdbError::TruncatedPage {
                offset,
                expected: PAGE_HEADER_SIZE,
                actual: data.len(),
            });
        }

        // ptype
        let page_type = PageType::try_from(read_u8_at(data, 0)?)?;

        // cLevel
        let level = read_u8_at(data, 1)?;
        if page_type == PageType::Intermediate || level != 0 {
            return Err(NdbError::UnsupportedIntermediatePage(level));
        }

        // cEnt
        let entry_count = usize::from(read_u16_at(data, 2)?);

        let entry_size = Entry::entry_size(version);
        let expected = PAGE_HEADER_SIZE + entry_count * entry_size;
        if data.len() < expected {
            return Err(NdbError::TruncatedPage {
                offset,
                expected,
                actual: data.len(),
            });
        }

        // rgentries
        let entries = (0..entry_count)
            .map(|index| Entry::read_at(data, PAGE_HEADER_SIZE + index * entry_size, version))
            .collect::<NdbResult<Vec<_>>>()?;
        check_sorted(&entries)?;

        Ok(Self { level, entries })
    }
}

fn check_sorted<Entry: BTreeEntry>(entries: &[Entry]) -> NdbResult<()> {
    match entries
        .windows(2)
        .find(|pair| pair[0].key() >= pair[1].key())
    {
        Some(pair) => Err(NdbError::UnsortedBTreeEntries {
            previous: pair[0].key(),
            next: pair[1].key(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndb::node_id::*;

    fn node_entries() -> Vec<NodeBTreeEntry> {
        vec![
            NodeBTreeEntry::new(NID_MESSAGE_STORE, BlockId::from(0x100), None, None),
            NodeBTreeEntry::new(
                NID_ROOT_FOLDER,
                BlockId::from(0x108),
                None,
                Some(NID_ROOT_FOLDER),
            ),
            NodeBTreeEntry::new(
                NID_INBOX,
                BlockId::from(0x10C),
                Some(BlockId::from(0x1F0)),
                Some(NID_ROOT_FOLDER),
            ),
        ]
    }

    fn block_entries() -> Vec<BlockBTreeEntry> {
        vec![
            BlockBTreeEntry::new(BlockId::from(0x100), BlockLocator::new(564, 512), 1),
            BlockBTreeEntry::new(BlockId::from(0x106), BlockLocator::new(1076, 1024), 0),
            BlockBTreeEntry::new(
                BlockId::from(0x10A),
                BlockLocator::new((1 << 53) + 1, 512),
                1,
            ),
        ]
    }

    #[test]
    fn test_unicode_node_page() {
        let page = NodeBTreePage::new(node_entries()).unwrap();
        let data = page.encode(NdbVersion::Unicode).unwrap();
        assert_eq!(data.len(), MIN_PAGE_SIZE);
        assert_eq!(data[0], 0x81);
        assert_eq!(read_u16_at(&data, 2).unwrap(), 3);
        assert_eq!(read_u64_at(&data, PAGE_HEADER_SIZE + 32 + 8).unwrap(), 0x108);

        let decoded = NodeBTreePage::decode(&data, NdbVersion::Unicode, 0).unwrap();
        assert_eq!(decoded, page);

        let inbox = decoded.find(u64::from(u32::from(NID_INBOX))).unwrap();
        assert_eq!(inbox.sub_node(), Some(BlockId::from(0x1F0)));
        assert_eq!(inbox.parent(), Some(NID_ROOT_FOLDER));
        assert!(decoded.find(u64::from(u32::from(NID_OUTBOX))).is_none());
    }

    #[test]
    fn test_block_page_layouts() {
        let page = BlockBTreePage::new(block_entries()).unwrap();

        let data = page.encode(NdbVersion::Unicode).unwrap();
        assert_eq!(read_u32_at(&data, PAGE_HEADER_SIZE + 24 + 20).unwrap(), 1024);
        let decoded = BlockBTreePage::decode(&data, NdbVersion::Unicode, 0).unwrap();
        assert_eq!(decoded, page);
        assert_eq!(decoded.entries()[2].locator().offset(), (1 << 53) + 1);

        let Err(NdbError::IndexOutOfRange(_)) = page.encode(NdbVersion::Ansi) else {
            panic!("ANSI page should not hold a 64-bit offset");
        };

        let page = BlockBTreePage::new(block_entries()[..2].to_vec()).unwrap();
        let data = page.encode(NdbVersion::Ansi).unwrap();
        assert_eq!(read_u32_at(&data, PAGE_HEADER_SIZE + 16 + 4).unwrap(), 1076);
        let decoded = BlockBTreePage::decode(&data, NdbVersion::Ansi, 0).unwrap();
        assert_eq!(decoded.entries()[1].ref_count(), 0);
        assert_eq!(decoded.entries()[1].locator().size(), 1024);
    }

    #[test]
    fn test_large_page_grows() {
        let entries = (0..40_u64)
            .map(|index| {
                BlockBTreeEntry::new(
                    BlockId::new(false, 0x40 + index).unwrap(),
                    BlockLocator::new(564 + index * 512, 512),
                    1,
                )
            })
            .collect();
        let page = BlockBTreePage::new(entries).unwrap();
        let data = page.encode(NdbVersion::Unicode).unwrap();
        assert_eq!(data.len(), PAGE_HEADER_SIZE + 40 * 24);
        assert_eq!(
            BlockBTreePage::decode(&data, NdbVersion::Unicode, 0)
                .unwrap()
                .entries()
                .len(),
            40
        );
    }

    #[test]
    fn test_unsorted_entries() {
        let mut entries = node_entries();
        entries.swap(0, 2);
        let Err(NdbError::UnsortedBTreeEntries { previous, next }) = NodeBTreePage::new(entries)
        else {
            panic!("Entries should be out of order");
        };
        assert!(previous > next);
    }

    #[test]
    fn test_truncated_page() {
        let page = NodeBTreePage::new(node_entries()).unwrap();
        let data = page.encode(NdbVersion::Unicode).unwrap();
        let Err(NdbError::TruncatedPage {
            offset,
            expected,
            actual,
        }) = NodeBTreePage::decode(&data[..64], NdbVersion::Unicode, 0x2000)
        else {
            panic!("Page should be truncated");
        };
        assert_eq!((offset, expected, actual), (0x2000, 16 + 3 * 32, 64));
    }

    #[test]
    fn test_intermediate_page() {
        let mut data = NodeBTreePage::new(node_entries())
            .unwrap()
            .encode(NdbVersion::Unicode)
            .unwrap();
        data[0] = PageType::Intermediate as u8;
        data[1] = 1;
        let Err(NdbError::UnsupportedIntermediatePage(1)) =
            NodeBTreePage::decode(&data, NdbVersion::Unicode, 0)
        else {
            panic!("Intermediate pages should be rejected");
        };

        data[0] = 0x7F;
        let Err(NdbError::InvalidPageType(0x7F)) =
            NodeBTreePage::decode(&data, NdbVersion::Unicode, 0)
        else {
            panic!("Page type should be invalid");
        };
    }
}
