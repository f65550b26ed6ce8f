//! Testing nodes

mod assert;

pub use assert::AssertNode;
