use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IrError;
use crate::hash::hash_value;
use crate::instruction::Instruction;

/// One step of a compiled sequence.
///
/// `path` is the location of the operation in the original template: the
/// keys leading to it, ending with the operation name itself. A child's
/// result is spliced into its parent's arguments at the segments of the
/// child path that lie strictly between the parent path and the child's
/// operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
  /// Instruction hash.
  pub id: String,
  pub path: Vec<String>,
  /// Entries nested directly inside this operation's arguments.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<usize>,
  /// Entries referenced by label (`$ref`) from this operation's arguments.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub references: Vec<usize>,
}

impl SequenceEntry {
  /// The operation name recorded at the end of the path.
  pub fn operation(&self) -> Option<&str> {
    self.path.last().map(String::as_str)
  }
}

/// Output of compiling one action template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
  pub instructions: BTreeMap<String, Instruction>,
  pub sequence: Vec<SequenceEntry>,
  pub sequence_id: String,
}

/// Content hash of a sequence.
pub fn sequence_id(entries: &[SequenceEntry]) -> String {
  let value = Value::Array(
    entries
      .iter()
      .map(|entry| {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), Value::String(entry.id.clone()));
        map.insert(
          "path".to_string(),
          Value::Array(entry.path.iter().cloned().map(Value::String).collect()),
        );
        if !entry.children.is_empty() {
          map.insert("children".to_string(), index_array(&entry.children));
        }
        if !entry.references.is_empty() {
          map.insert("references".to_string(), index_array(&entry.references));
        }
        Value::Object(map)
      })
      .collect(),
  );
  hash_value(&value)
}

fn index_array(indexes: &[usize]) -> Value {
  Value::Array(indexes.iter().map(|&i| Value::from(i)).collect())
}

/// Check that every link of every entry points to an earlier entry.
pub fn validate_sequence(entries: &[SequenceEntry]) -> Result<(), IrError> {
  for (index, entry) in entries.iter().enumerate() {
    for &link in entry.children.iter().chain(entry.references.iter()) {
      if link >= index {
        return Err(IrError::InvalidLink { index, link });
      }
    }
  }
  Ok(())
}
