//! Write side of an image: serialize every node into a data block, index the nodes and blocks
//! in single-page B-trees, then seal the header.

use std::{collections::BTreeMap, fs::File, io::Write, path::Path};
use tracing::{debug, info};

use super::parser::PstImage;
use crate::{
    ltp::prop_context::{FileTime, PropertyLimits, PropertySet},
    messaging::{
        message::{MessageContent, MessageSource},
        store::{NodeKind, NodeStore, DEFAULT_STORE_NAME},
        MessagingError, MessagingResult,
    },
    ndb::{
        block::{BlockAllocator, BlockType},
        block_id::BlockId,
        header::{FileHeader, NdbVersion},
        node_id::{NodeId, NID_ROOT_FOLDER},
        page::{BlockBTreeEntry, BlockBTreePage, NodeBTreeEntry, NodeBTreePage},
        NdbError,
    },
    PstResult,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageOptions {
    pub version: NdbVersion,
    /// `PidTagDisplayName` of the message store.
    pub store_name: String,
    pub limits: PropertyLimits,
    /// Re-open the finished image and run [PstImage::validate] before returning it.
    pub verify_on_finalize: bool,
    /// Most messages taken from one [MessageSource].
    pub max_messages: usize,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            version: NdbVersion::Unicode,
            store_name: DEFAULT_STORE_NAME.to_string(),
            limits: Default::default(),
            verify_on_finalize: true,
            max_messages: 50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageState {
    Empty,
    SystemNodesCreated,
    MessagesAdded,
    IndexesBuilt,
    Finalized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct IndexBlocks {
    nbt: BlockId,
    bbt: BlockId,
}

pub struct PstImageBuilder {
    options: ImageOptions,
    state: ImageState,
    nodes: NodeStore,
    allocator: BlockAllocator,
    node_blocks: BTreeMap<NodeId, BlockId>,
    indexes: Option<IndexBlocks>,
}

impl Default for PstImageBuilder {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl PstImageBuilder {
    pub fn new(options: ImageOptions) -> Self {
        let header_size = options.version.layout().header_size as u64;
        Self {
            options,
            state: ImageState::Empty,
            nodes: NodeStore::new(),
            allocator: BlockAllocator::new(header_size),
            node_blocks: Default::default(),
            indexes: None,
        }
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    pub fn state(&self) -> ImageState {
        self.state
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    pub fn allocator(&self) -> &BlockAllocator {
        &self.allocator
    }

    /// Create the message store, name-to-id map, root folder and standard folders.
    pub fn create_system_nodes(&mut self) -> MessagingResult<()> {
        let store_name = self.options.store_name.clone();
        self.nodes.create_system_nodes(&store_name)?;
        self.state = ImageState::SystemNodesCreated;
        Ok(())
    }

    pub fn create_node(
        &mut self,
        node: NodeId,
        kind: NodeKind,
        properties: PropertySet,
        parent: Option<NodeId>,
    ) -> MessagingResult<()> {
        self.nodes.create_node(node, kind, properties, parent)?;
        self.state = ImageState::MessagesAdded;
        Ok(())
    }

    pub fn add_message(
        &mut self,
        folder: NodeId,
        content: &MessageContent,
    ) -> MessagingResult<NodeId> {
        self.add_message_at(folder, content, FileTime::now())
    }

    /// Same as [Self::add_message] with an explicit creation time.
    pub fn add_message_at(
        &mut self,
        folder: NodeId,
        content: &MessageContent,
        time: FileTime,
    ) -> MessagingResult<NodeId> {
        let node = self.nodes.add_message(folder, content, time)?;
        debug!(name: "PstMessageAdded", ?node, ?folder, subject = content.subject.as_str());
        self.state = ImageState::MessagesAdded;
        Ok(node)
    }

    /// Drain `source` into `folder`, stopping after [ImageOptions::max_messages].
    pub fn add_messages(
        &mut self,
        folder: NodeId,
        source: &mut dyn MessageSource,
    ) -> MessagingResult<Vec<NodeId>> {
        let mut added = Vec::new();
        while added.len() < self.options.max_messages {
            let Some(content) = source.next_message() else {
                break;
            };
            added.push(self.add_message(folder, &content)?);
        }
        Ok(added)
    }

    /// Serialize nodes that have no block yet, then append a fresh NBT and BBT. Index blocks
    /// from a previous build stay in the file with a reference count of 0.
    pub fn build_indexes(&mut self) -> MessagingResult<()> {
        let version = self.options.version;

        for node in self.nodes.iter() {
            if self.node_blocks.contains_key(&node.node()) {
                continue;
            }
            let payload = node.properties().serialize(&self.options.limits)?;
            let block = self.allocator.allocate(BlockType::Data, payload)?;
            self.node_blocks.insert(node.node(), block);
        }

        if let Some(previous) = self.indexes.take() {
            self.allocator.release(previous.nbt);
            self.allocator.release(previous.bbt);
        }

        let mut node_entries = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.iter() {
            let block = self
                .node_blocks
                .get(&node.node())
                .copied()
                .ok_or(NdbError::NodeNotFound(node.node()))?;
            node_entries.push(NodeBTreeEntry::new(node.node(), block, None, node.parent()));
        }
        let nbt = NodeBTreePage::new(node_entries)?.encode(version)?;
        let nbt = self.allocator.allocate(BlockType::Internal, nbt)?;

        // The BBT lists itself, so its id and location are predicted before it is allocated.
        let entry_count = self.allocator.blocks().len() + 1;
        let payload_size = BlockBTreePage::encoded_size(entry_count, version) as u64;
        let (bbt, bbt_locator) = self.allocator.peek(BlockType::Internal, payload_size)?;

        let mut block_entries: Vec<_> = self
            .allocator
            .blocks()
            .iter()
            .map(|entry| BlockBTreeEntry::new(entry.block, entry.locator, entry.ref_count))
            .collect();
        block_entries.push(BlockBTreeEntry::new(bbt, bbt_locator, 1));
        let page = BlockBTreePage::new(block_entries)?.encode(version)?;

        let allocated = self.allocator.allocate(BlockType::Internal, page)?;
        if allocated != bbt || self.allocator.locate(allocated) != Some(bbt_locator) {
            return Err(NdbError::BlockIdMismatch {
                offset: bbt_locator.offset(),
                expected: bbt,
                actual: allocated,
            }
            .into());
        }

        debug!(
            name: "PstIndexesBuilt",
            nodes = self.nodes.len(),
            blocks = entry_count,
            ?nbt,
            ?bbt,
        );

        self.indexes = Some(IndexBlocks { nbt, bbt });
        self.state = ImageState::IndexesBuilt;
        Ok(())
    }

    /// Point the header at the current indexes, seal it and render the whole image.
    pub fn finalize(&mut self) -> MessagingResult<Vec<u8>> {
        let indexes = match (self.state, self.indexes) {
            (ImageState::IndexesBuilt | ImageState::Finalized, Some(indexes)) => indexes,
            _ => return Err(MessagingError::IncompleteImage),
        };

        let nbt = self
            .allocator
            .locate(indexes.nbt)
            .ok_or(NdbError::BlockNotFound(indexes.nbt))?;
        let bbt = self
            .allocator
            .locate(indexes.bbt)
            .ok_or(NdbError::BlockNotFound(indexes.bbt))?;

        let file_size = self.allocator.end_offset();
        let mut header = FileHeader::new(self.options.version, NID_ROOT_FOLDER);
        header.set_file_size(file_size);
        header.set_locators(nbt, bbt);
        header.set_density((self.allocator.live_payload_size() * 100 / file_size) as u8);
        let header = header.encode()?;

        let mut data = self.allocator.render();
        data[..header.len()].copy_from_slice(&header);

        if self.options.verify_on_finalize {
            let image = PstImage::open(data)?;
            image.validate()?;
            data = image.into_bytes();
        }

        info!(
            name: "PstImageFinalized",
            version = ?self.options.version,
            file_size,
            nodes = self.nodes.len(),
            blocks = self.allocator.blocks().len(),
        );

        self.state = ImageState::Finalized;
        Ok(data)
    }

    /// Build indexes if anything changed, finalize and write the image to `path`.
    pub fn write_to(&mut self, path: impl AsRef<Path>) -> PstResult<()> {
        if self.state != ImageState::IndexesBuilt && self.state != ImageState::Finalized {
            self.build_indexes()?;
        }
        let data = self.finalize()?;

        let mut file = File::create(path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ltp::prop_type::*,
        ndb::{node_id::*, page::BTreeEntry},
    };

    fn minimal_builder(version: NdbVersion) -> PstImageBuilder {
        let mut builder = PstImageBuilder::new(ImageOptions {
            version,
            ..Default::default()
        });
        builder.create_system_nodes().unwrap();
        builder
    }

    fn assert_strictly_ascending<Entry: BTreeEntry>(entries: &[Entry]) {
        for pair in entries.windows(2) {
            assert!(pair[0].key() < pair[1].key());
        }
    }

    #[test]
    fn test_minimal_image() {
        let mut builder = minimal_builder(NdbVersion::Unicode);
        assert_eq!(builder.state(), ImageState::SystemNodesCreated);
        builder.build_indexes().unwrap();
        let data = builder.finalize().unwrap();
        assert_eq!(builder.state(), ImageState::Finalized);

        let image = PstImage::open(data).unwrap();
        let header = image.header();
        assert!(header.is_unicode());
        assert_eq!(header.file_size(), image.as_bytes().len() as u64);
        assert_eq!(header.root_folder(), NID_ROOT_FOLDER);
        assert!(!header.nbt().overlaps(&header.bbt()));
        assert!(header.nbt().offset() >= 564);
        assert!(header.density() > 0);

        // 7 property blocks, the NBT and the BBT
        assert_eq!(image.nbt().entries().len(), 7);
        assert_eq!(image.bbt().entries().len(), 9);
        let nbt = image.bbt().find(u64::from(builder.indexes.unwrap().nbt)).unwrap();
        assert_eq!(nbt.locator(), header.nbt());
        let bbt = image.bbt().find(u64::from(builder.indexes.unwrap().bbt)).unwrap();
        assert_eq!(bbt.locator(), header.bbt());
        assert!(image.bbt().entries().iter().all(|entry| entry.ref_count() == 1));

        let root = image.resolve(NID_ROOT_FOLDER).unwrap();
        assert!(root.end() <= header.file_size());
        let properties = image.properties(NID_ROOT_FOLDER).unwrap();
        assert_eq!(properties.unicode(PR_DISPLAY_NAME), Some("Root"));
        assert_eq!(
            image.properties(NID_MESSAGE_STORE).unwrap().unicode(PR_DISPLAY_NAME),
            Some(DEFAULT_STORE_NAME)
        );
    }

    #[test]
    fn test_ansi_image() {
        let mut builder = minimal_builder(NdbVersion::Ansi);
        builder.build_indexes().unwrap();
        let image = PstImage::open(builder.finalize().unwrap()).unwrap();
        assert!(!image.header().is_unicode());
        assert!(image.header().nbt().offset() >= 512);
        assert_eq!(
            image.properties(NID_INBOX).unwrap().unicode(PR_DISPLAY_NAME),
            Some("Inbox")
        );
        image.validate().unwrap();
    }

    #[test]
    fn test_message_addition() {
        let mut builder = minimal_builder(NdbVersion::Unicode);
        builder.build_indexes().unwrap();
        builder.finalize().unwrap();

        let content = MessageContent::new("Hello", "a@b.com", "body text");
        let message = builder.add_message(NID_INBOX, &content).unwrap();
        assert_eq!(builder.state(), ImageState::MessagesAdded);
        builder.build_indexes().unwrap();
        let image = PstImage::open(builder.finalize().unwrap()).unwrap();

        let properties = image.properties(message).unwrap();
        assert_eq!(properties.unicode(PR_SUBJECT), Some("Hello"));
        assert_eq!(properties.unicode(PR_SENDER_NAME), Some("a@b.com"));
        assert!(properties.unicode(PR_BODY).unwrap().contains("body text"));
        assert_eq!(
            image.node_entry(message).unwrap().parent(),
            Some(NID_INBOX)
        );

        // the first NBT and BBT are kept but no longer referenced
        let released = image
            .bbt()
            .entries()
            .iter()
            .filter(|entry| entry.ref_count() == 0)
            .count();
        assert_eq!(released, 2);
        assert_eq!(image.bbt().entries().len(), 12);
        image.validate().unwrap();
    }

    #[test]
    fn test_referential_integrity() {
        let mut builder = minimal_builder(NdbVersion::Unicode);
        for index in 0..20 {
            let content = MessageContent::new(
                format!("Message {index}"),
                "sender@example.com",
                "x".repeat(index * 100),
            );
            builder.add_message(NID_INBOX, &content).unwrap();
        }
        builder.build_indexes().unwrap();
        let image = PstImage::open(builder.finalize().unwrap()).unwrap();

        let file_size = image.header().file_size();
        for entry in image.nbt().entries() {
            let block = image.bbt().find(u64::from(entry.data())).unwrap();
            assert!(block.locator().end() <= file_size);
        }
        for entry in image.bbt().entries() {
            assert!(entry.locator().offset() >= 564);
            assert!(entry.locator().end() <= file_size);
        }
        assert!(image.issues().is_empty());
    }

    #[test]
    fn test_sort_invariant() {
        let mut builder = minimal_builder(NdbVersion::Unicode);
        for folder in [NID_DELETED_ITEMS, NID_INBOX, NID_SENT_ITEMS] {
            let content = MessageContent::new("Sorted", "a@b.com", "body");
            builder.add_message(folder, &content).unwrap();
        }
        builder.build_indexes().unwrap();
        let image = PstImage::open(builder.finalize().unwrap()).unwrap();

        assert_strictly_ascending(image.nbt().entries());
        assert_strictly_ascending(image.bbt().entries());
    }

    #[test]
    fn test_finalize_before_indexes() {
        let mut builder = minimal_builder(NdbVersion::Unicode);
        let Err(MessagingError::IncompleteImage) = builder.finalize() else {
            panic!("Finalize should require built indexes");
        };

        builder.build_indexes().unwrap();
        builder
            .add_message(NID_INBOX, &MessageContent::new("Late", "a@b.com", "body"))
            .unwrap();
        let Err(MessagingError::IncompleteImage) = builder.finalize() else {
            panic!("Finalize should require rebuilt indexes");
        };
    }

    #[test]
    fn test_add_messages_limit() {
        let mut builder = PstImageBuilder::new(ImageOptions {
            max_messages: 3,
            ..Default::default()
        });
        builder.create_system_nodes().unwrap();

        let mut source = (0..10).map(|index| {
            MessageContent::new(format!("Message {index}"), "a@b.com", "body")
        });
        let added = builder.add_messages(NID_INBOX, &mut source).unwrap();
        assert_eq!(added.len(), 3);
        assert_eq!(source.next_message().unwrap().subject, "Message 3");
    }

    #[test]
    fn test_write_to_file() {
        let mut builder = minimal_builder(NdbVersion::Unicode);
        builder
            .add_message(NID_SENT_ITEMS, &MessageContent::new("Sent", "me@example.com", "hi"))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.pst");
        builder.write_to(&path).unwrap();

        let image = PstImage::read(&path).unwrap();
        let store = image.node_store().unwrap();
        let sent = store.get(NID_SENT_ITEMS).unwrap();
        assert_eq!(sent.children().len(), 1);
        let message = store.get(sent.children()[0]).unwrap();
        assert_eq!(message.kind(), NodeKind::Message);
        assert_eq!(
            MessageContent::from_properties(message.properties()),
            MessageContent::new("Sent", "me@example.com", "hi")
        );
    }
}
