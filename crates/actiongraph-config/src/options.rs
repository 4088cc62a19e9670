use serde::{Deserialize, Serialize};

use crate::enums::{KeysMode, MissingPolicy};

/// Options that tune how the interpreter dispatches actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOptions {
  #[serde(default)]
  pub missing: MissingPolicy,
  #[serde(default)]
  pub keys_mode: KeysMode,
}
