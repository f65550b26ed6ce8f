//! Math nodes

mod add;

pub use add::AddNode;
