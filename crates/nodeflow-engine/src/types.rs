//! Core types shared by descriptors, graphs and the scheduler
//!
//! Sockets are addressed by logical name. Array sockets span several
//! physical slots whose names follow the `base_index` convention;
//! [`split_array_key`] recovers the logical name.

use serde::{Deserialize, Serialize};

/// Unique identifier for a node instance within a graph
pub type NodeId = String;

/// The data type tag of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocketType {
    /// Accepts any value
    Any,
    /// Text string
    Text,
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// Image data (base64 encoded)
    Image,
    /// JSON object
    Dictionary,
}

/// Editor widget kind for a configuration parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetType {
    Text,
    Number,
    Boolean,
    Combo,
}

/// Category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Constant sources
    Input,
    /// Display and logging sinks
    Output,
    /// Arithmetic
    Math,
    /// Branching, loops and delays
    Control,
    /// Array shaping
    Array,
    /// Key/value lookups and updates
    Dictionary,
    /// Assertions used by graph test cases
    Testing,
    /// Cross-run event exchange
    Events,
}

/// Split a physical socket name of the form `base_index`.
///
/// Returns `None` when the name has no `_` or the suffix is not a
/// non-negative integer.
pub fn split_array_key(key: &str) -> Option<(&str, usize)> {
    let (base, index) = key.rsplit_once('_')?;
    if base.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok().map(|index| (base, index))
}
