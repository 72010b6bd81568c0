//! In-memory OST/PST images.
//!
//! [builder::PstImageBuilder] assembles a complete image from a logical node hierarchy and
//! [parser::PstImage] reads one back, resolving nodes through the node and block B-trees.

pub mod builder;
pub mod parser;
