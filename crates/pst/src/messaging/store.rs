//! ## [Message Store](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/aa0539bd-e7bf-4cec-8bde-0b87c2a86baf)
//!
//! [NodeStore] owns every logical node of an image and hands out message node ids.

use std::collections::BTreeMap;
use tracing::debug;

use super::{folder::*, message::MessageContent, *};
use crate::{
    ltp::{
        prop_context::{FileTime, PropertySet},
        prop_type::{PR_CONTAINER_CLASS, PR_DISPLAY_NAME},
    },
    ndb::node_id::*,
};

/// Display name of the message store unless configured otherwise.
pub const DEFAULT_STORE_NAME: &str = "Personal Folders";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    MessageStore,
    NameToIdMap,
    Folder,
    Message,
}

impl NodeKind {
    /// Kind implied by a node id: the reserved store and name map ids, then the `nidType` bits.
    pub fn infer(node: NodeId) -> MessagingResult<Self> {
        match node {
            NID_MESSAGE_STORE => return Ok(NodeKind::MessageStore),
            NID_NAME_TO_ID_MAP => return Ok(NodeKind::NameToIdMap),
            _ => {}
        }

        match node.id_type()? {
            NodeIdType::NormalFolder => Ok(NodeKind::Folder),
            NodeIdType::NormalMessage => Ok(NodeKind::Message),
            _ => Err(MessagingError::UnsupportedNodeType(node)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalNode {
    node: NodeId,
    kind: NodeKind,
    properties: PropertySet,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl LogicalNode {
    pub fn new(
        node: NodeId,
        kind: NodeKind,
        properties: PropertySet,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            node,
            kind,
            properties,
            parent,
            children: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child folders and messages, in the order they were added.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn display_name(&self) -> Option<&str> {
        self.properties.unicode(PR_DISPLAY_NAME)
    }
}

#[derive(Clone, Debug)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, LogicalNode>,
    next_message: u32,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self {
            nodes: Default::default(),
            next_message: FIRST_MESSAGE_INDEX,
        }
    }
}

impl NodeStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a node. Its parent, if any, must already exist.
    pub fn create_node(
        &mut self,
        node: NodeId,
        kind: NodeKind,
        properties: PropertySet,
        parent: Option<NodeId>,
    ) -> MessagingResult<&LogicalNode> {
        if self.nodes.contains_key(&node) {
            return Err(MessagingError::DuplicateNode(node));
        }

        if let Some(parent) = parent {
            let Some(parent_node) = self.nodes.get_mut(&parent) else {
                return Err(MessagingError::UnknownParent { node, parent });
            };
            parent_node.children.push(node);
        }

        debug!(name: "PstNodeCreated", ?node, ?kind, ?parent);
        Ok(self
            .nodes
            .entry(node)
            .or_insert(LogicalNode::new(node, kind, properties, parent)))
    }

    /// Create the message store, the name-to-id map, the root folder and the standard folders.
    pub fn create_system_nodes(&mut self, store_name: &str) -> MessagingResult<()> {
        let mut store_properties = PropertySet::new();
        store_properties.insert(PR_DISPLAY_NAME, store_name)?;
        store_properties.insert(PR_CONTAINER_CLASS, CONTAINER_CLASS_NOTE)?;
        self.create_node(
            NID_MESSAGE_STORE,
            NodeKind::MessageStore,
            store_properties,
            None,
        )?;

        self.create_node(
            NID_NAME_TO_ID_MAP,
            NodeKind::NameToIdMap,
            PropertySet::new(),
            None,
        )?;

        self.create_node(
            NID_ROOT_FOLDER,
            NodeKind::Folder,
            folder_properties(ROOT_FOLDER_NAME)?,
            None,
        )?;

        for folder in STANDARD_FOLDERS {
            self.create_node(
                folder.node,
                NodeKind::Folder,
                folder_properties(folder.display_name)?,
                Some(NID_ROOT_FOLDER),
            )?;
        }

        Ok(())
    }

    /// File a new message under `folder` with the next free message node id.
    pub fn add_message(
        &mut self,
        folder: NodeId,
        content: &MessageContent,
        time: FileTime,
    ) -> MessagingResult<NodeId> {
        if self.get(folder).map(LogicalNode::kind) != Some(NodeKind::Folder) {
            return Err(MessagingError::UnknownFolder(folder));
        }

        let node = loop {
            let node = NodeId::new(NodeIdType::NormalMessage, self.next_message)?;
            self.next_message += 1;
            if !self.nodes.contains_key(&node) {
                break node;
            }
        };

        self.create_node(
            node,
            NodeKind::Message,
            content.properties(time)?,
            Some(folder),
        )?;
        Ok(node)
    }

    /// Rebuild a store from nodes listed in any order, linking children to their parents.
    pub fn from_nodes(nodes: impl IntoIterator<Item = LogicalNode>) -> MessagingResult<Self> {
        let mut store = Self::new();
        for node in nodes {
            let (id, kind) = (node.node, node.kind);
            if store.nodes.insert(id, node).is_some() {
                return Err(MessagingError::DuplicateNode(id));
            }
            if kind == NodeKind::Message {
                store.next_message = store.next_message.max(id.index() + 1);
            }
        }

        let links: Vec<_> = store
            .nodes
            .values()
            .filter_map(|node| node.parent.map(|parent| (node.node, parent)))
            .collect();
        for (node, parent) in links {
            let Some(parent_node) = store.nodes.get_mut(&parent) else {
                return Err(MessagingError::UnknownParent { node, parent });
            };
            parent_node.children.push(node);
        }

        Ok(store)
    }

    pub fn get(&self, node: NodeId) -> Option<&LogicalNode> {
        self.nodes.get(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Nodes in ascending node id order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogicalNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
