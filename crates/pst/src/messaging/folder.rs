//! ## [Folders](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/dee5b9d0-5513-4c5e-94aa-8bd28a9350b2)

use crate::{
    ltp::{
        prop_context::PropertySet,
        prop_type::{PR_CONTAINER_CLASS, PR_DISPLAY_NAME},
        LtpResult,
    },
    ndb::node_id::*,
};

/// `PidTagContainerClass` of mail folders.
pub const CONTAINER_CLASS_NOTE: &str = "IPF.Note";

pub const ROOT_FOLDER_NAME: &str = "Root";

/// A folder every image is created with, filed directly under the root folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardFolder {
    pub node: NodeId,
    pub display_name: &'static str,
}

pub const STANDARD_FOLDERS: [StandardFolder; 4] = [
    StandardFolder {
        node: NID_INBOX,
        display_name: "Inbox",
    },
    StandardFolder {
        node: NID_OUTBOX,
        display_name: "Outbox",
    },
    StandardFolder {
        node: NID_SENT_ITEMS,
        display_name: "Sent Items",
    },
    StandardFolder {
        node: NID_DELETED_ITEMS,
        display_name: "Deleted Items",
    },
];

/// Display name and container class of a mail folder.
pub fn folder_properties(display_name: &str) -> LtpResult<PropertySet> {
    let mut properties = PropertySet::new();
    properties.insert(PR_DISPLAY_NAME, display_name)?;
    properties.insert(PR_CONTAINER_CLASS, CONTAINER_CLASS_NOTE)?;
    Ok(properties)
}
