//! Input assembly: cached per-slot values to grouped node inputs
//!
//! Keys of the form `base_index` whose `base` is a declared array socket are
//! collected into one sequence ordered by index. A key that exactly names a
//! declared socket is always taken as-is.

use std::collections::HashMap;

use serde_json::Value;

use crate::descriptor::{NodeDescriptor, SocketRef};
use crate::node::NodeInputs;
use crate::run_context::CachedInput;

pub(crate) fn group_inputs(descriptor: &NodeDescriptor, cache: &HashMap<String, CachedInput>) -> NodeInputs {
    let mut inputs = NodeInputs::new();
    let mut arrays: HashMap<&str, Vec<(usize, &Value)>> = HashMap::new();

    for (key, cached) in cache {
        match descriptor.resolve_input(key) {
            Some(SocketRef::Element { socket, index }) => {
                arrays
                    .entry(socket.name.as_str())
                    .or_default()
                    .push((index, &cached.value));
            }
            Some(SocketRef::Plain(socket)) if socket.array && !cached.value.is_array() => {
                inputs.insert(key.clone(), Value::Array(vec![cached.value.clone()]));
            }
            _ => inputs.insert(key.clone(), cached.value.clone()),
        }
    }

    for (base, mut elements) in arrays {
        elements.sort_by_key(|(index, _)| *index);
        if inputs.contains(base) {
            log::debug!("Elements of array socket '{}' replace the value pushed to it directly", base);
        }
        let values = elements.into_iter().map(|(_, value)| value.clone()).collect();
        inputs.insert(base, Value::Array(values));
    }

    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SocketDescriptor;
    use crate::types::{NodeCategory, SocketType};
    use serde_json::json;

    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("ArrayTest", NodeCategory::Array, "Array Test")
            .input(SocketDescriptor::new("arr", SocketType::Any).array())
            .input(SocketDescriptor::new("input_value", SocketType::Number))
    }

    fn cache(entries: &[(&str, Value)]) -> HashMap<String, CachedInput> {
        entries
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    CachedInput {
                        value: v.clone(),
                        run_id: "run".into(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_array_elements_sorted_by_index() {
        let cache = cache(&[
            ("arr_3", json!("d")),
            ("arr_0", json!("a")),
            ("arr_10", json!("k")),
            ("arr_2", json!("c")),
            ("arr_1", json!("b")),
        ]);
        let inputs = group_inputs(&descriptor(), &cache);
        assert_eq!(inputs.get("arr"), Some(&json!(["a", "b", "c", "d", "k"])));
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn test_underscored_plain_name_is_not_an_array() {
        let cache = cache(&[("input_value", json!(4))]);
        let inputs = group_inputs(&descriptor(), &cache);
        assert_eq!(inputs.get("input_value"), Some(&json!(4)));
        assert!(inputs.get("input").is_none());
    }

    #[test]
    fn test_undeclared_keys_pass_through() {
        let cache = cache(&[("extra_1", json!(true)), ("other", json!(null))]);
        let inputs = group_inputs(&descriptor(), &cache);
        assert_eq!(inputs.get("extra_1"), Some(&json!(true)));
        assert_eq!(inputs.get("other"), Some(&json!(null)));
    }

    #[test]
    fn test_scalar_on_array_socket_becomes_single_element() {
        let cache = cache(&[("arr", json!("solo"))]);
        let inputs = group_inputs(&descriptor(), &cache);
        assert_eq!(inputs.get("arr"), Some(&json!(["solo"])));
    }
}
