//! ## [Lists, Tables, and Properties (LTP) Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/4c24c7d2-5c5a-4b99-88b2-f4b84cc293ae)
//!
//! Only flat property sets are supported: each node's block holds a count-prefixed list of
//! `(tag, value)` records.

use std::io;
use thiserror::Error;

pub mod prop_context;
pub mod prop_type;

use prop_type::{PropertyTag, PropertyType};

#[derive(Error, Debug)]
pub enum LtpError {
    #[error("Node Database error: {0}")]
    NodeDatabaseError(#[from] crate::ndb::NdbError),
    #[error("Invalid property type: 0x{0:04X}")]
    InvalidPropertyType(u16),
    #[error("Property {tag:?} expects a {expected:?} value")]
    PropertyTypeMismatch {
        tag: PropertyTag,
        expected: PropertyType,
    },
    #[error("Truncated property record at offset 0x{offset:X}: expected {expected} bytes, found {actual}")]
    TruncatedPropertyRecord {
        offset: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid UTF-16 string in property {0:?}")]
    InvalidUnicodeString(PropertyTag),
    #[error("Invalid UTF-8 string in property {0:?}")]
    InvalidUtf8String(PropertyTag),
    #[error("FILETIME out of range: 0x{0:016X}")]
    FileTimeOutOfRange(i64),
}

impl From<LtpError> for io::Error {
    fn from(err: LtpError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type LtpResult<T> = Result<T, LtpError>;
