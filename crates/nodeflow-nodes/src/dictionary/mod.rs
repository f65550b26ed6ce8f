//! Dictionary nodes
//!
//! Flat JSON objects whose values are strings or numbers.

mod get_element;
mod input;
mod set_element;

pub use get_element::DictionaryGetElementNode;
pub use input::DictionaryInputNode;
pub use set_element::DictionarySetElementNode;

use serde_json::{Map, Value};

/// Accepts an object whose values are all strings or numbers.
pub(crate) fn validate_dictionary(value: Value) -> Result<Map<String, Value>, String> {
    let Value::Object(map) = value else {
        return Err("Input must be a dictionary".to_string());
    };
    for (key, item) in &map {
        if !(item.is_string() || item.is_number()) {
            return Err(format!("Value for key '{}' must be string or number", key));
        }
    }
    Ok(map)
}
