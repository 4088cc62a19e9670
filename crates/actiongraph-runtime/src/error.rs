use actiongraph_resolver::ResolveError;
use thiserror::Error;

/// Errors raised while executing a sequence or dispatching an action.
#[derive(Debug, Error)]
pub enum RuntimeError {
  #[error("No action found: {id}")]
  MissingInstruction { id: String },

  #[error("action '{id}' is not registered")]
  MissingAction { id: String },

  #[error("sequence '{id}' is not stored")]
  MissingSequence { id: String },

  #[error("cannot run an empty sequence")]
  EmptySequence,

  #[error("operation '{operation}' failed: {source}")]
  Operation {
    operation: String,
    #[source]
    source: HostError,
  },

  #[error("invalid arguments for '{operation}': {message}")]
  InvalidArguments { operation: String, message: String },

  #[error("entry {index} depends on entry {dependency}, which has no result")]
  UnresolvedDependency { index: usize, dependency: usize },

  #[error("sequence {sequence} has no result in this dispatch")]
  UnresolvedSequence { sequence: usize },

  #[error("corrupt sequence at entry {index}: {message}")]
  CorruptSequence { index: usize, message: String },

  #[error("asynchronous instruction '{id}' is not the terminal entry")]
  AsyncNotTerminal { id: String },

  #[error("condition evaluation failed: {source}")]
  Condition {
    #[from]
    source: HostError,
  },

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error("dispatch cancelled")]
  Cancelled,
}

/// Errors reported by an [`OperationHost`](crate::OperationHost), a
/// [`DataStore`](crate::DataStore) or an
/// [`OperatorEvaluator`](crate::OperatorEvaluator).
#[derive(Debug, Error)]
pub enum HostError {
  #[error("unknown operation '{name}'")]
  UnknownOperation { name: String },

  #[error("unknown operator '{name}'")]
  UnknownOperator { name: String },

  #[error("invalid arguments: {message}")]
  InvalidArguments { message: String },

  #[error("{message}")]
  Failed { message: String },
}

impl HostError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  pub fn invalid_arguments(message: impl Into<String>) -> Self {
    Self::InvalidArguments {
      message: message.into(),
    }
  }
}
