use thiserror::Error;

/// Errors raised while compiling action templates.
#[derive(Debug, Error)]
pub enum CompileError {
  #[error("node at '{path}' has more than one operation key: {operations:?}")]
  AmbiguousNode {
    path: String,
    operations: Vec<String>,
  },

  #[error("operation node at '{path}' has unexpected key '{key}'")]
  UnexpectedKey { path: String, key: String },

  #[error("key '{key}' at '{path}' is reserved")]
  ReservedKey { path: String, key: String },

  #[error("invalid label at '{path}': {message}")]
  InvalidLabel { path: String, message: String },

  #[error("label '{label}' is defined more than once")]
  DuplicateLabel { label: String },

  #[error("'$id' at '{path}' does not label an operation")]
  LabelWithoutOperation { path: String },

  #[error("'$ref' at '{path}' refers to unknown or later label '{label}'")]
  UnresolvedReference { label: String, path: String },

  #[error("'$ref' at '{path}' refers to '{label}' inside a branch or condition term that may not run")]
  BranchReference { label: String, path: String },

  #[error("'$sequenceRef' at '{path}' refers to unknown or later sequence '{label}'")]
  UnresolvedSequenceReference { label: String, path: String },

  #[error("'$sequenceRef' at '{path}' refers to '{label}', which ends in an asynchronous operation")]
  AsyncSequenceReference { label: String, path: String },

  #[error("template root is not an operation but contains operations")]
  DetachedOperation,

  #[error("asynchronous operation '{operation}' at '{path}' is not the terminal operation")]
  AsyncNotTerminal { operation: String, path: String },

  #[error("invalid arguments for '{operation}' at '{path}': {message}")]
  InvalidArguments {
    operation: String,
    path: String,
    message: String,
  },

  #[error("action '{id}' is already registered")]
  DuplicateAction { id: String },

  #[error("template {position}: {source}")]
  InTemplate {
    position: usize,
    #[source]
    source: Box<CompileError>,
  },
}
