use serde::{Deserialize, Serialize};

/// An externally provided operation the compiler should recognise.
///
/// Built-in operations (`get/eventValue`, `set/dataValue`, ...) are always
/// known and never need to be declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDef {
  /// Operation name, e.g. `"string/concat"`.
  pub name: String,

  /// Whether the operation completes asynchronously. Asynchronous operations
  /// may only appear as the terminal instruction of a sequence.
  #[serde(default, rename = "async", skip_serializing_if = "std::ops::Not::not")]
  pub is_async: bool,
}

impl OperationDef {
  pub fn sync(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      is_async: false,
    }
  }

  pub fn asynchronous(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      is_async: true,
    }
  }
}
