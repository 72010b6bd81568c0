//! [NID (Node ID)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/18d7644e-cb33-4e11-95c0-34d8a84fbff6)

use std::fmt::Debug;

use super::*;

/// `nidType`
///
/// ### See also
/// [NodeId]
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeIdType {
    /// `NID_TYPE_HID`: Heap node
    HeapNode = 0x00,
    /// `NID_TYPE_INTERNAL`: Internal node
    Internal = 0x01,
    /// `NID_TYPE_NORMAL_FOLDER`: Normal Folder object
    NormalFolder = 0x02,
    /// `NID_TYPE_SEARCH_FOLDER`: Search Folder object
    SearchFolder = 0x03,
    /// `NID_TYPE_NORMAL_MESSAGE`: Normal Message object
    NormalMessage = 0x04,
    /// `NID_TYPE_ATTACHMENT`: Attachment object
    Attachment = 0x05,
    /// `NID_TYPE_ASSOC_MESSAGE`: Folder associated information (FAI) Message object
    AssociatedMessage = 0x08,
    /// `NID_TYPE_HIERARCHY_TABLE`: Hierarchy table
    HierarchyTable = 0x0D,
    /// `NID_TYPE_CONTENTS_TABLE`: Contents table
    ContentsTable = 0x0E,
    /// `NID_TYPE_LTP`: Lists, tables and properties
    ListsTablesProperties = 0x1F,
}

impl TryFrom<u8> for NodeIdType {
    type Error = NdbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(NodeIdType::HeapNode),
            0x01 => Ok(NodeIdType::Internal),
            0x02 => Ok(NodeIdType::NormalFolder),
            0x03 => Ok(NodeIdType::SearchFolder),
            0x04 => Ok(NodeIdType::NormalMessage),
            0x05 => Ok(NodeIdType::Attachment),
            0x08 => Ok(NodeIdType::AssociatedMessage),
            0x0D => Ok(NodeIdType::HierarchyTable),
            0x0E => Ok(NodeIdType::ContentsTable),
            0x1F => Ok(NodeIdType::ListsTablesProperties),
            _ => Err(NdbError::InvalidNodeIdType(value)),
        }
    }
}

pub const MAX_NODE_INDEX: u32 = 1_u32.rotate_right(5) - 1;

/// The low 5 bits hold the [NodeIdType], the remaining 27 bits the index.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id_type: NodeIdType, index: u32) -> NdbResult<Self> {
        let id_type = id_type as u8;
        if id_type >> 5 != 0 {
            return Err(NdbError::InvalidNodeIdType(id_type));
        }

        let shifted_index = index.rotate_left(5);
        if shifted_index & 0x1F != 0 {
            return Err(NdbError::InvalidNodeIndex(index));
        };

        Ok(Self(shifted_index | (u32::from(id_type))))
    }

    pub fn id_type(&self) -> NdbResult<NodeIdType> {
        let nid_type = self.0 & 0x1F;
        NodeIdType::try_from(nid_type as u8)
    }

    pub fn index(&self) -> u32 {
        self.0 >> 5
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Ok(id_type) = self.id_type() else {
            return write!(f, "NodeId {{ invalid: 0x{:08X} }}", u32::from(*self));
        };

        write!(f, "NodeId {{ {:?}: 0x{:X} }}", id_type, self.index())
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u32 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

/// `NID_MESSAGE_STORE`: Message store node.
pub const NID_MESSAGE_STORE: NodeId = NodeId(0x21);

/// `NID_NAME_TO_ID_MAP`: Named Properties Map.
pub const NID_NAME_TO_ID_MAP: NodeId = NodeId(0x61);

/// `NID_ROOT_FOLDER`: Root Mailbox Folder object of PST.
pub const NID_ROOT_FOLDER: NodeId = NodeId(0x122);

/// Inbox folder.
pub const NID_INBOX: NodeId = NodeId(0x142);

/// Outbox folder.
pub const NID_OUTBOX: NodeId = NodeId(0x162);

/// Sent Items folder.
pub const NID_SENT_ITEMS: NodeId = NodeId(0x182);

/// Deleted Items folder.
pub const NID_DELETED_ITEMS: NodeId = NodeId(0x1A2);

/// Messages are numbered from here, above every reserved node index.
pub const FIRST_MESSAGE_INDEX: u32 = 0x10000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nid_index_overflow() {
        let Err(NdbError::InvalidNodeIndex(value)) =
            NodeId::new(NodeIdType::HeapNode, MAX_NODE_INDEX + 1)
        else {
            panic!("NodeId should be out of range");
        };
        assert_eq!(value, MAX_NODE_INDEX + 1);
    }

    #[test]
    fn test_reserved_nid_types() {
        assert_eq!(NID_MESSAGE_STORE.id_type().unwrap(), NodeIdType::Internal);
        assert_eq!(NID_NAME_TO_ID_MAP.id_type().unwrap(), NodeIdType::Internal);
        for nid in [
            NID_ROOT_FOLDER,
            NID_INBOX,
            NID_OUTBOX,
            NID_SENT_ITEMS,
            NID_DELETED_ITEMS,
        ] {
            assert_eq!(nid.id_type().unwrap(), NodeIdType::NormalFolder);
        }
    }

    #[test]
    fn test_first_message_above_reserved() {
        let first = NodeId::new(NodeIdType::NormalMessage, FIRST_MESSAGE_INDEX).unwrap();
        assert_eq!(first.id_type().unwrap(), NodeIdType::NormalMessage);
        assert_eq!(first.index(), FIRST_MESSAGE_INDEX);
        assert!(first > NID_DELETED_ITEMS);
    }

    #[test]
    fn test_nid_type_codes() {
        let types = [
            (0x00, NodeIdType::HeapNode),
            (0x01, NodeIdType::Internal),
            (0x02, NodeIdType::NormalFolder),
            (0x03, NodeIdType::SearchFolder),
            (0x04, NodeIdType::NormalMessage),
            (0x05, NodeIdType::Attachment),
            (0x08, NodeIdType::AssociatedMessage),
            (0x0D, NodeIdType::HierarchyTable),
            (0x0E, NodeIdType::ContentsTable),
            (0x1F, NodeIdType::ListsTablesProperties),
        ];
        for (code, id_type) in types {
            assert_eq!(NodeIdType::try_from(code).unwrap(), id_type);

            let nid = NodeId::new(id_type, 0x42).unwrap();
            assert_eq!(u32::from(nid), (0x42 << 5) | u32::from(code));
            assert_eq!(nid.id_type().unwrap(), id_type);
        }

        let Err(NdbError::InvalidNodeIdType(0x06)) = NodeIdType::try_from(0x06) else {
            panic!("0x06 is not a nidType");
        };
    }

    #[test]
    fn test_root_folder_tables() {
        // The root folder's tables share its index.
        let tables = [
            (0x12D, NodeIdType::HierarchyTable),
            (0x12E, NodeIdType::ContentsTable),
        ];
        for (value, id_type) in tables {
            let nid = NodeId::from(value);
            assert_eq!(nid.id_type().unwrap(), id_type);
            assert_eq!(nid.index(), NID_ROOT_FOLDER.index());
        }
        assert_eq!(
            format!("{:?}", NodeId::from(0x12E)),
            "NodeId { ContentsTable: 0x9 }"
        );
    }
}
