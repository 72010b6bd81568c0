#![doc = include_str!("../README.md")]

use std::io;
use thiserror::Error;

pub mod image;
pub mod ltp;
pub mod messaging;
pub mod ndb;
pub mod scan;

mod crc;

pub use image::{
    builder::{ImageOptions, ImageState, PstImageBuilder},
    parser::PstImage,
};
pub use messaging::message::{MessageContent, MessageSource};
pub use ndb::header::NdbVersion;

#[derive(Error, Debug)]
pub enum PstError {
    #[error("Node Database error: {0}")]
    NodeDatabaseError(#[from] ndb::NdbError),
    #[error("Lists, Tables, and Properties error: {0}")]
    ListsTablesPropertiesError(#[from] ltp::LtpError),
    #[error("Messaging error: {0}")]
    MessagingError(#[from] messaging::MessagingError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type PstResult<T> = Result<T, PstError>;
