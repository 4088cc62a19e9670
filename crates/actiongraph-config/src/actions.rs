//! Action definition files.
//!
//! An actions file declares the external operations a catalog may use and
//! the action templates to compile, keyed by action id. Each action id maps
//! to a list of templates; every template becomes one sequence.
//!
//! ```json
//! {
//!   "operations": [{ "name": "string/concat" }],
//!   "actions": {
//!     "greet": [
//!       {
//!         "set/dataValue": {
//!           "name": "greeting",
//!           "value": { "string/concat": ["hello, ", { "get/eventValue": "name" }] }
//!         }
//!       }
//!     ]
//!   },
//!   "runtime": { "missing": "strict" }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::operation::OperationDef;
use crate::options::RuntimeOptions;

/// An author-facing action template: a nested JSON tree whose operation
/// nodes are objects keyed by a recognised operation name.
pub type ActionTemplate = serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionsFile {
  #[serde(default)]
  pub operations: Vec<OperationDef>,
  #[serde(default)]
  pub actions: BTreeMap<String, Vec<ActionTemplate>>,
  #[serde(default)]
  pub runtime: RuntimeOptions,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{KeysMode, MissingPolicy};
  use serde_json::json;

  #[test]
  fn test_parse_actions_file() {
    let file: ActionsFile = serde_json::from_value(json!({
      "operations": [
        { "name": "string/concat" },
        { "name": "net/send", "async": true }
      ],
      "actions": {
        "greet": [{ "get/eventValue": "name" }]
      },
      "runtime": { "missing": "strict", "keys_mode": "last_segment" }
    }))
    .unwrap();

    assert_eq!(file.operations[0], OperationDef::sync("string/concat"));
    assert!(file.operations[1].is_async);
    assert_eq!(file.actions["greet"].len(), 1);
    assert_eq!(file.runtime.missing, MissingPolicy::Strict);
    assert_eq!(file.runtime.keys_mode, KeysMode::LastSegment);
  }

  #[test]
  fn test_defaults() {
    let file: ActionsFile = serde_json::from_value(json!({})).unwrap();

    assert!(file.operations.is_empty());
    assert!(file.actions.is_empty());
    assert_eq!(file.runtime.missing, MissingPolicy::Permissive);
    assert_eq!(file.runtime.keys_mode, KeysMode::OutputKey);
  }

  #[test]
  fn test_sync_operation_omits_async_flag() {
    let value = serde_json::to_value(OperationDef::sync("a/b")).unwrap();
    assert_eq!(value, json!({ "name": "a/b" }));
  }
}
