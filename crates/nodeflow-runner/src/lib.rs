//! Command-line host for nodeflow graphs
//!
//! - `run`: execute one graph file from a start node, printing observer events
//! - `test`: run a directory of `test_*.json` graph test cases
//! - `listen`: arm a graph's event nodes and feed them events from stdin
//! - `nodes`: print the blueprints of every registered node type

pub mod cases;
pub mod error;
pub mod host;
pub mod sink;

pub use cases::{CaseReport, CaseRunner, GraphTestCase};
pub use error::{Result, RunnerError};
pub use sink::JsonLinesSink;
