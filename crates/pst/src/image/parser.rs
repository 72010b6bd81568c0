//! Read side of an image: decode the header, load both B-tree pages and resolve nodes to the
//! blocks holding them.

use std::{fs::File, io::Read, path::Path};
use tracing::info;

use crate::{
    ltp::{prop_context::PropertySet, LtpResult},
    messaging::{
        store::{LogicalNode, NodeKind, NodeStore},
        MessagingResult,
    },
    ndb::{
        block::{BlockFrame, BlockType},
        block_id::BlockId,
        block_ref::BlockLocator,
        header::FileHeader,
        node_id::NodeId,
        page::{BlockBTreePage, NodeBTreeEntry, NodeBTreePage},
        NdbError, NdbResult,
    },
    PstResult,
};

/// An image loaded into memory with its node and block indexes decoded.
#[derive(Clone, Debug)]
pub struct PstImage {
    data: Vec<u8>,
    header: FileHeader,
    nbt: NodeBTreePage,
    bbt: BlockBTreePage,
}

impl PstImage {
    /// Strict open: the header must decode cleanly.
    pub fn open(data: Vec<u8>) -> NdbResult<Self> {
        let header = FileHeader::decode(&data)?;
        Self::load(data, header)
    }

    /// Lenient open for analysis tools. Header signature and digest problems are returned
    /// with the image instead of failing.
    pub fn inspect(data: Vec<u8>) -> NdbResult<(Self, Vec<NdbError>)> {
        let (header, findings) = FileHeader::inspect(&data)?;
        Ok((Self::load(data, header)?, findings))
    }

    pub fn read(path: impl AsRef<Path>) -> PstResult<Self> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        Ok(Self::open(data)?)
    }

    fn load(data: Vec<u8>, header: FileHeader) -> NdbResult<Self> {
        let version = header.version();

        let nbt = read_page(&data, header.nbt())?;
        let nbt = NodeBTreePage::decode(nbt.payload(), version, header.nbt().offset())?;

        let bbt = read_page(&data, header.bbt())?;
        let bbt = BlockBTreePage::decode(bbt.payload(), version, header.bbt().offset())?;

        info!(
            name: "PstImageOpened",
            ?version,
            file_size = header.file_size(),
            nodes = nbt.entries().len(),
            blocks = bbt.entries().len(),
        );

        Ok(Self {
            data,
            header,
            nbt,
            bbt,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn nbt(&self) -> &NodeBTreePage {
        &self.nbt
    }

    pub fn bbt(&self) -> &BlockBTreePage {
        &self.bbt
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn node_entry(&self, node: NodeId) -> NdbResult<&NodeBTreeEntry> {
        self.nbt
            .find(u64::from(u32::from(node)))
            .ok_or(NdbError::NodeNotFound(node))
    }

    /// Location of the block holding a node's data.
    pub fn resolve(&self, node: NodeId) -> NdbResult<BlockLocator> {
        let block = self.node_entry(node)?.data();
        self.bbt
            .find(u64::from(block))
            .map(|entry| entry.locator())
            .ok_or(NdbError::DanglingReference { node, block })
    }

    pub fn resolve_block(&self, block: BlockId) -> NdbResult<BlockLocator> {
        self.bbt
            .find(u64::from(block))
            .map(|entry| entry.locator())
            .ok_or(NdbError::BlockNotFound(block))
    }

    pub fn read_block(&self, block: BlockId) -> NdbResult<BlockFrame> {
        BlockFrame::read_block(&self.data, block, self.resolve_block(block)?)
    }

    /// Decode the property set stored for `node`.
    pub fn properties(&self, node: NodeId) -> LtpResult<PropertySet> {
        let block = self.node_entry(node)?.data();
        let locator = self.resolve(node)?;
        let frame = BlockFrame::read_block(&self.data, block, locator)?;
        if frame.block_type() != BlockType::Data {
            return Err(NdbError::UnexpectedBlockType {
                offset: locator.offset(),
                actual: frame.block_type(),
            }
            .into());
        }
        PropertySet::deserialize(frame.payload())
    }

    /// Rebuild the logical hierarchy from the node index.
    pub fn node_store(&self) -> MessagingResult<NodeStore> {
        let nodes = self
            .nbt
            .entries()
            .iter()
            .map(|entry| -> MessagingResult<LogicalNode> {
                let node = entry.node();
                Ok(LogicalNode::new(
                    node,
                    NodeKind::infer(node)?,
                    self.properties(node)?,
                    entry.parent(),
                ))
            })
            .collect::<MessagingResult<Vec<_>>>()?;
        NodeStore::from_nodes(nodes)
    }

    /// Every structural problem found in the image.
    pub fn issues(&self) -> Vec<NdbError> {
        let mut issues = Vec::new();
        let header_size = self.header.layout().header_size as u64;
        let file_size = self.header.file_size();
        let actual = self.data.len() as u64;

        if file_size != actual {
            issues.push(NdbError::FileSizeMismatch {
                header: file_size,
                actual,
            });
        }

        for header in [self.header.nbt(), self.header.bbt()] {
            let Ok(frame) = BlockFrame::read_at(&self.data, header) else {
                continue;
            };
            match self.bbt.find(u64::from(frame.block())) {
                Some(entry) if entry.locator() == header => {}
                Some(entry) => issues.push(NdbError::IndexLocatorMismatch {
                    block: frame.block(),
                    header,
                    index: entry.locator(),
                }),
                None => issues.push(NdbError::BlockNotFound(frame.block())),
            }
        }

        for entry in self.bbt.entries() {
            let block = entry.block();
            let locator = entry.locator();
            if locator.offset() < header_size {
                issues.push(NdbError::BlockOverlapsHeader {
                    block,
                    offset: locator.offset(),
                });
            } else if locator.end() > file_size.min(actual) {
                issues.push(NdbError::BlockOutOfBounds {
                    block,
                    offset: locator.offset(),
                    size: locator.size(),
                    file_size,
                });
            } else if let Err(err) = BlockFrame::read_block(&self.data, block, locator) {
                issues.push(err);
            }
        }

        for entry in self.nbt.entries() {
            let node = entry.node();
            if self.bbt.find(u64::from(entry.data())).is_none() {
                issues.push(NdbError::DanglingReference {
                    node,
                    block: entry.data(),
                });
            }
            if let Some(parent) = entry.parent() {
                if self.nbt.find(u64::from(u32::from(parent))).is_none() {
                    issues.push(NdbError::UnknownParent { node, parent });
                }
            }
        }

        issues
    }

    pub fn validate(&self) -> NdbResult<()> {
        match self.issues().into_iter().next() {
            Some(issue) => Err(issue),
            None => Ok(()),
        }
    }
}

/// Read the B-tree page block a header locator points to.
fn read_page(data: &[u8], locator: BlockLocator) -> NdbResult<BlockFrame> {
    let frame = BlockFrame::read_at(data, locator)?;
    if frame.block_type() != BlockType::Internal {
        return Err(NdbError::UnexpectedBlockType {
            offset: locator.offset(),
            actual: frame.block_type(),
        });
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::builder::PstImageBuilder,
        ltp::prop_type::PR_DISPLAY_NAME,
        messaging::message::MessageContent,
        ndb::{node_id::*, page::BlockBTreeEntry},
    };

    fn sample_image() -> Vec<u8> {
        let mut builder = PstImageBuilder::default();
        builder.create_system_nodes().unwrap();
        builder
            .add_message(NID_INBOX, &MessageContent::new("Hello", "a@b.com", "body text"))
            .unwrap();
        builder.build_indexes().unwrap();
        builder.finalize().unwrap()
    }

    // Index pages keep their size when entries are edited, so they can be patched in place.
    fn rewrite_page(data: &mut [u8], locator: BlockLocator, page: &[u8]) {
        let offset = locator.offset() as usize + 16;
        data[offset..offset + page.len()].copy_from_slice(page);
    }

    fn relocate_block(mut data: Vec<u8>, block: BlockId, locator: BlockLocator) -> PstImage {
        let image = PstImage::open(data.clone()).unwrap();
        let entries: Vec<BlockBTreeEntry> = image
            .bbt()
            .entries()
            .iter()
            .map(|entry| {
                if entry.block() == block {
                    BlockBTreeEntry::new(block, locator, entry.ref_count())
                } else {
                    *entry
                }
            })
            .collect();
        let page = BlockBTreePage::new(entries)
            .unwrap()
            .encode(image.header().version())
            .unwrap();
        rewrite_page(&mut data, image.header().bbt(), &page);
        PstImage::open(data).unwrap()
    }

    #[test]
    fn test_dangling_reference() {
        let mut data = sample_image();
        let image = PstImage::open(data.clone()).unwrap();
        let inbox_block = image.node_entry(NID_INBOX).unwrap().data();

        let entries: Vec<BlockBTreeEntry> = image
            .bbt()
            .entries()
            .iter()
            .filter(|entry| entry.block() != inbox_block)
            .copied()
            .collect();
        let page = BlockBTreePage::new(entries)
            .unwrap()
            .encode(image.header().version())
            .unwrap();
        rewrite_page(&mut data, image.header().bbt(), &page);

        let image = PstImage::open(data).unwrap();
        let Err(NdbError::DanglingReference { node, block }) = image.resolve(NID_INBOX) else {
            panic!("Inbox block should be missing from the BBT");
        };
        assert_eq!((node, block), (NID_INBOX, inbox_block));
        assert!(image.issues().iter().any(|issue| matches!(
            issue,
            NdbError::DanglingReference { node, .. } if *node == NID_INBOX
        )));
        assert!(image.validate().is_err());
    }

    #[test]
    fn test_inspect_bad_magic() {
        let mut data = sample_image();
        data[0] = b'X';

        let Err(NdbError::InvalidHeaderMagic(_)) = PstImage::open(data.clone()) else {
            panic!("Strict open should reject the magic");
        };

        let (image, findings) = PstImage::inspect(data).unwrap();
        assert!(matches!(findings[0], NdbError::InvalidHeaderMagic(_)));
        assert_eq!(
            image.properties(NID_OUTBOX).unwrap().unicode(PR_DISPLAY_NAME),
            Some("Outbox")
        );
    }

    #[test]
    fn test_node_store() {
        let image = PstImage::open(sample_image()).unwrap();
        let store = image.node_store().unwrap();
        assert_eq!(store.len(), 8);

        let root = store.get(NID_ROOT_FOLDER).unwrap();
        assert_eq!(root.kind(), NodeKind::Folder);
        assert_eq!(root.children().len(), 4);

        let inbox = store.get(NID_INBOX).unwrap();
        assert_eq!(inbox.display_name(), Some("Inbox"));
        let message = store.get(inbox.children()[0]).unwrap();
        assert_eq!(
            MessageContent::from_properties(message.properties()).subject,
            "Hello"
        );
    }

    #[test]
    fn test_truncated_image() {
        let data = sample_image();

        let Err(NdbError::TruncatedHeader { expected, actual }) =
            PstImage::open(data[..300].to_vec())
        else {
            panic!("Header should be truncated");
        };
        assert_eq!((expected, actual), (512, 300));

        let nbt = PstImage::open(data.clone()).unwrap().header().nbt();
        let end = nbt.offset() as usize + 100;
        let Err(NdbError::TruncatedBlock { offset, .. }) = PstImage::open(data[..end].to_vec())
        else {
            panic!("NBT page should be truncated");
        };
        assert_eq!(offset, nbt.offset());
    }

    #[test]
    fn test_file_size_mismatch() {
        let mut data = sample_image();
        let expected = data.len() as u64;
        data.extend_from_slice(&[0; 512]);

        let image = PstImage::open(data).unwrap();
        let Err(NdbError::FileSizeMismatch { header, actual }) = image.validate() else {
            panic!("Trailing bytes should be reported");
        };
        assert_eq!((header, actual), (expected, expected + 512));
    }

    #[test]
    fn test_unknown_node() {
        let image = PstImage::open(sample_image()).unwrap();
        let missing = NodeId::new(NodeIdType::NormalFolder, 0x400).unwrap();
        let Err(NdbError::NodeNotFound(node)) = image.resolve(missing) else {
            panic!("Node should not exist");
        };
        assert_eq!(node, missing);
    }

    #[test]
    fn test_block_overlaps_header() {
        let data = sample_image();
        let image = PstImage::open(data.clone()).unwrap();
        let block = image.node_entry(NID_INBOX).unwrap().data();
        let size = image.resolve(NID_INBOX).unwrap().size();

        let image = relocate_block(data, block, BlockLocator::new(100, size));
        let issues = image.issues();
        assert!(issues.iter().any(|issue| matches!(
            issue,
            NdbError::BlockOverlapsHeader { block: found, offset: 100 } if *found == block
        )));
        let Err(NdbError::BlockOverlapsHeader { .. }) = image.validate() else {
            panic!("Block inside the header should fail validation");
        };
    }

    #[test]
    fn test_block_out_of_bounds() {
        let data = sample_image();
        let file_size = data.len() as u64;
        let image = PstImage::open(data.clone()).unwrap();
        let block = image.node_entry(NID_INBOX).unwrap().data();
        let size = image.resolve(NID_INBOX).unwrap().size();

        let image = relocate_block(data, block, BlockLocator::new(file_size, size));
        let issues = image.issues();
        let Some(NdbError::BlockOutOfBounds {
            block: found,
            offset,
            size: found_size,
            file_size: found_file_size,
        }) = issues
            .iter()
            .find(|issue| matches!(issue, NdbError::BlockOutOfBounds { .. }))
        else {
            panic!("Block past the end of the file should be reported");
        };
        assert_eq!(*found, block);
        assert_eq!(
            (*offset, *found_size, *found_file_size),
            (file_size, size, file_size)
        );
    }

    #[test]
    fn test_index_locator_mismatch() {
        let data = sample_image();
        let image = PstImage::open(data.clone()).unwrap();
        let nbt = image.header().nbt();
        let nbt_block = BlockFrame::read_at(&data, nbt).unwrap().block();
        let elsewhere = image.resolve(NID_INBOX).unwrap();

        let image = relocate_block(data, nbt_block, elsewhere);
        let Some(NdbError::IndexLocatorMismatch {
            block,
            header,
            index,
        }) = image
            .issues()
            .into_iter()
            .find(|issue| matches!(issue, NdbError::IndexLocatorMismatch { .. }))
        else {
            panic!("BBT entry for the NBT should disagree with the header");
        };
        assert_eq!((block, header, index), (nbt_block, nbt, elsewhere));
    }

    #[test]
    fn test_unknown_parent() {
        let mut data = sample_image();
        let image = PstImage::open(data.clone()).unwrap();
        let missing = NodeId::new(NodeIdType::NormalFolder, 0x400).unwrap();

        let entries: Vec<NodeBTreeEntry> = image
            .nbt()
            .entries()
            .iter()
            .map(|entry| {
                if entry.node() == NID_INBOX {
                    NodeBTreeEntry::new(entry.node(), entry.data(), entry.sub_node(), Some(missing))
                } else {
                    *entry
                }
            })
            .collect();
        let page = NodeBTreePage::new(entries)
            .unwrap()
            .encode(image.header().version())
            .unwrap();
        rewrite_page(&mut data, image.header().nbt(), &page);

        let image = PstImage::open(data).unwrap();
        let Err(NdbError::UnknownParent { node, parent }) = image.validate() else {
            panic!("Inbox parent should be missing from the NBT");
        };
        assert_eq!((node, parent), (NID_INBOX, missing));
    }
}
