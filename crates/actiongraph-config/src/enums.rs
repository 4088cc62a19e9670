use serde::{Deserialize, Serialize};

/// What a dispatch does when an action id or one of its sequences is unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
  /// Fail the dispatch with an error.
  Strict,
  /// Log a warning and return no results.
  #[default]
  Permissive,
}

/// How `$keys` queries name the entries of the object they build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeysMode {
  /// Use the output key written by the caller.
  #[default]
  OutputKey,
  /// Use the last path segment that matched. Kept for older templates.
  LastSegment,
}
