//! Output nodes
//!
//! Nodes that report results to the observer.

mod display;

pub use display::DisplayNode;
