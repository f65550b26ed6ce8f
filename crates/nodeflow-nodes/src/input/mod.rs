//! Input nodes
//!
//! Nodes that emit a configured constant.

mod number;
mod text;

pub use number::NumberNode;
pub use text::TextNode;
