use std::collections::HashMap;

use actiongraph_config::OperationDef;
use actiongraph_ir::BuiltinOperation;
use tracing::warn;

/// The operation names a compiler recognises, with their sync/async flag.
///
/// Always contains the built-in operations; external operations are added
/// with [`OperationSet::register`].
#[derive(Debug, Clone)]
pub struct OperationSet {
  operations: HashMap<String, bool>,
}

impl OperationSet {
  /// A set with only the built-in operations.
  pub fn builtin() -> Self {
    let operations = BuiltinOperation::ALL
      .into_iter()
      .map(|op| (op.name().to_string(), false))
      .collect();
    Self { operations }
  }

  /// Built-in operations plus the given external ones.
  pub fn with_operations(defs: impl IntoIterator<Item = OperationDef>) -> Self {
    let mut set = Self::builtin();
    for def in defs {
      set.register(def);
    }
    set
  }

  /// Add an external operation. Built-in names cannot be redefined.
  pub fn register(&mut self, def: OperationDef) {
    if BuiltinOperation::from_name(&def.name).is_some() {
      warn!(operation = %def.name, "ignoring redefinition of built-in operation");
      return;
    }
    self.operations.insert(def.name, def.is_async);
  }

  pub fn contains(&self, name: &str) -> bool {
    self.operations.contains_key(name)
  }

  pub fn is_async(&self, name: &str) -> bool {
    self.operations.get(name).copied().unwrap_or(false)
  }
}

impl Default for OperationSet {
  fn default() -> Self {
    Self::builtin()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builtins_are_known() {
    let set = OperationSet::builtin();
    assert!(set.contains("get/eventValue"));
    assert!(set.contains("action/ifElse"));
    assert!(!set.contains("string/concat"));
  }

  #[test]
  fn test_register_external() {
    let set = OperationSet::with_operations([
      OperationDef::sync("string/concat"),
      OperationDef::asynchronous("net/send"),
    ]);
    assert!(set.contains("string/concat"));
    assert!(!set.is_async("string/concat"));
    assert!(set.is_async("net/send"));
  }

  #[test]
  fn test_builtins_cannot_become_async() {
    let set = OperationSet::with_operations([OperationDef::asynchronous("set/dataValue")]);
    assert!(!set.is_async("set/dataValue"));
  }
}
