//! ## [Messaging Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/3f1bc553-d15d-4dcf-9b80-fbf1dd6c7e79)
//!
//! The logical view of an image: a message store, a folder hierarchy and the messages filed in
//! it, each node carrying its own property set.

use std::io;
use thiserror::Error;

use crate::ndb::node_id::NodeId;

pub mod folder;
pub mod message;
pub mod store;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Node Database error: {0}")]
    NodeDatabaseError(#[from] crate::ndb::NdbError),
    #[error("Lists, Tables, and Properties error: {0}")]
    ListsTablesPropertiesError(#[from] crate::ltp::LtpError),
    #[error("Duplicate node: {0:?}")]
    DuplicateNode(NodeId),
    #[error("Unknown folder: {0:?}")]
    UnknownFolder(NodeId),
    #[error("{node:?} references unknown parent {parent:?}")]
    UnknownParent { node: NodeId, parent: NodeId },
    #[error("Unsupported node type: {0:?}")]
    UnsupportedNodeType(NodeId),
    #[error("Image is not ready to finalize: indexes have not been built since the last change")]
    IncompleteImage,
}

impl From<MessagingError> for io::Error {
    fn from(err: MessagingError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
