//! ## [Data Types](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/1d61ee78-4466-4141-8276-f45153484619)

use std::fmt::Debug;

use super::*;

/// [Property Data Types](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/MS-OXCDATA/0c77892e-288e-435a-9c49-be1c20c7afdb)
///
/// Values of any other type are stored as bounded UTF-8 strings.
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PropertyType {
    /// `PtypInteger32`: 4 bytes; a 32-bit integer
    Integer32 = 0x0003,
    /// `PtypString`: Variable size; a string of Unicode characters in UTF-16LE format encoding
    Unicode = 0x001F,
    /// `PtypTime`: 8 bytes; a 64-bit integer representing the number of 100-nanosecond intervals
    /// since January 1, 1601
    Time = 0x0040,
}

impl TryFrom<u16> for PropertyType {
    type Error = LtpError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0003 => Ok(Self::Integer32),
            0x001F => Ok(Self::Unicode),
            0x0040 => Ok(Self::Time),
            invalid => Err(LtpError::InvalidPropertyType(invalid)),
        }
    }
}

impl From<PropertyType> for u16 {
    fn from(value: PropertyType) -> Self {
        value as u16
    }
}

/// Property id in the high 16 bits, type code in the low 16 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyTag(u32);

impl PropertyTag {
    pub const fn new(id: u16, prop_type: u16) -> Self {
        Self(((id as u32) << 16) | prop_type as u32)
    }

    pub fn id(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn type_code(&self) -> u16 {
        self.0 as u16
    }

    /// `None` for type codes stored with the UTF-8 fallback.
    pub fn property_type(&self) -> Option<PropertyType> {
        PropertyType::try_from(self.type_code()).ok()
    }
}

impl Debug for PropertyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PropertyTag(0x{:08X})", self.0)
    }
}

impl From<u32> for PropertyTag {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<PropertyTag> for u32 {
    fn from(value: PropertyTag) -> Self {
        value.0
    }
}

/// `PidTagMessageClass`
pub const PR_MESSAGE_CLASS: PropertyTag = PropertyTag(0x001A001F);
/// `PidTagSubject`
pub const PR_SUBJECT: PropertyTag = PropertyTag(0x0037001F);
/// `PidTagSenderName`
pub const PR_SENDER_NAME: PropertyTag = PropertyTag(0x0C1A001F);
/// `PidTagSenderEmailAddress`
pub const PR_SENDER_EMAIL_ADDRESS: PropertyTag = PropertyTag(0x0C1F001F);
/// `PidTagMessageSize`
pub const PR_MESSAGE_SIZE: PropertyTag = PropertyTag(0x0E080003);
/// `PidTagBody`
pub const PR_BODY: PropertyTag = PropertyTag(0x1000001F);
/// `PidTagBodyHtml`
pub const PR_BODY_HTML: PropertyTag = PropertyTag(0x1013001F);
/// `PidTagDisplayName`
pub const PR_DISPLAY_NAME: PropertyTag = PropertyTag(0x3001001F);
/// `PidTagCreationTime`
pub const PR_CREATION_TIME: PropertyTag = PropertyTag(0x30070040);
/// `PidTagLastModificationTime`
pub const PR_LAST_MODIFICATION_TIME: PropertyTag = PropertyTag(0x30080040);
/// `PidTagContainerClass`
pub const PR_CONTAINER_CLASS: PropertyTag = PropertyTag(0x3613001F);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parts() {
        assert_eq!(PR_SUBJECT, PropertyTag::new(0x0037, PropertyType::Unicode as u16));
        assert_eq!(PR_MESSAGE_SIZE.id(), 0x0E08);
        assert_eq!(PR_MESSAGE_SIZE.property_type(), Some(PropertyType::Integer32));
        assert_eq!(PR_CREATION_TIME.property_type(), Some(PropertyType::Time));
        assert_eq!(PropertyTag::new(0x8000, 0x001E).property_type(), None);
    }

    #[test]
    fn test_invalid_prop_type() {
        let Err(LtpError::InvalidPropertyType(value)) = PropertyType::try_from(0x0102) else {
            panic!("Binary properties are not supported");
        };
        assert_eq!(value, 0x0102);
    }
}
