//! Contracts the interpreter delegates to.

use std::collections::BTreeMap;
use std::sync::RwLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::HostError;

/// Executes operations that are not built into the interpreter.
pub trait OperationHost: Send + Sync {
  /// Run a synchronous operation.
  fn invoke(&self, operation: &str, args: Value) -> Result<Value, HostError>;

  /// Start an asynchronous operation.
  ///
  /// Called once, when the terminal entry of a sequence is reached. The
  /// returned future is awaited by the dispatch caller; `cancel` fires when
  /// the dispatch is cancelled. The default runs [`invoke`](Self::invoke)
  /// immediately.
  fn invoke_async(
    &self,
    operation: &str,
    args: Value,
    _cancel: CancellationToken,
  ) -> BoxFuture<'static, Result<Value, HostError>> {
    futures::future::ready(self.invoke(operation, args)).boxed()
  }
}

/// Named values read by `get/dataValue` and written by `set/dataValue`.
pub trait DataStore: Send + Sync {
  fn get(&self, name: &str) -> Option<Value>;

  fn set(&self, name: &str, value: Value) -> Result<(), HostError>;
}

/// In-memory [`DataStore`].
#[derive(Debug, Default)]
pub struct MemoryDataStore {
  values: RwLock<BTreeMap<String, Value>>,
}

impl MemoryDataStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// All stored values as one JSON object.
  pub fn snapshot(&self) -> Value {
    let values = self.values.read().unwrap_or_else(|e| e.into_inner());
    Value::Object(
      values
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect(),
    )
  }
}

impl DataStore for MemoryDataStore {
  fn get(&self, name: &str) -> Option<Value> {
    let values = self.values.read().unwrap_or_else(|e| e.into_inner());
    values.get(name).cloned()
  }

  fn set(&self, name: &str, value: Value) -> Result<(), HostError> {
    let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
    values.insert(name.to_string(), value);
    Ok(())
  }
}
