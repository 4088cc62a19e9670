use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::hash::hash_value;

/// Key of the placeholder object left where a dependency's result goes.
pub const PLACEHOLDER_KEY: &str = "_$dv";

/// A compiled, atomic operation invocation ("block").
///
/// The argument template may contain placeholders (`{ "_$dv": index }`)
/// at the exact positions where the results of earlier sequence entries
/// are spliced in at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
  pub operation_name: String,
  pub argument_template: Value,
  #[serde(default, rename = "async", skip_serializing_if = "std::ops::Not::not")]
  pub is_async: bool,
}

impl Instruction {
  pub fn new(operation_name: impl Into<String>, argument_template: Value) -> Self {
    Self {
      operation_name: operation_name.into(),
      argument_template,
      is_async: false,
    }
  }

  /// Content hash of this instruction, used as its id.
  pub fn hash(&self) -> String {
    let mut body = json!({
      "operationName": self.operation_name,
      "argumentTemplate": self.argument_template,
    });
    if self.is_async {
      body["async"] = Value::Bool(true);
    }
    hash_value(&body)
  }
}

/// Build the placeholder for the result of sequence entry `index`.
pub fn placeholder(index: usize) -> Value {
  json!({ PLACEHOLDER_KEY: index })
}

/// Return the entry index if `value` is a placeholder.
pub fn placeholder_index(value: &Value) -> Option<usize> {
  let map = value.as_object()?;
  if map.len() != 1 {
    return None;
  }
  map
    .get(PLACEHOLDER_KEY)?
    .as_u64()
    .and_then(|i| usize::try_from(i).ok())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_placeholder_roundtrip() {
    assert_eq!(placeholder_index(&placeholder(3)), Some(3));
    assert_eq!(placeholder_index(&json!({ "_$dv": 1, "x": 2 })), None);
    assert_eq!(placeholder_index(&json!({ "_$dv": "1" })), None);
    assert_eq!(placeholder_index(&json!(1)), None);
  }

  #[test]
  fn test_identical_instructions_share_hash() {
    let a = Instruction::new("get/eventValue", json!("name"));
    let b = Instruction::new("get/eventValue", json!("name"));
    assert_eq!(a.hash(), b.hash());

    let mut c = b.clone();
    c.is_async = true;
    assert_ne!(a.hash(), c.hash());
  }

  #[test]
  fn test_serialized_shape() {
    let value = serde_json::to_value(Instruction::new("set/dataValue", json!({ "name": "x" }))).unwrap();
    assert_eq!(
      value,
      json!({ "operationName": "set/dataValue", "argumentTemplate": { "name": "x" } })
    );
  }
}
