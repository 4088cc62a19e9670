//! Action dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use actiongraph_config::MissingPolicy;
use actiongraph_ir::SequenceEntry;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::RuntimeError;
use crate::events::{DispatchEvent, DispatchNotifier};
use crate::interpreter::{PendingResult, Runtime, SequenceContext, SequenceOutcome};

/// A request to run every sequence of an action.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
  pub id: String,
  pub payload: Value,
  /// Values read by `map/actionValue`.
  pub action_values: Value,
}

impl DispatchRequest {
  pub fn new(id: impl Into<String>, payload: Value) -> Self {
    Self {
      id: id.into(),
      payload,
      action_values: Value::Null,
    }
  }

  pub fn with_action_values(mut self, action_values: Value) -> Self {
    self.action_values = action_values;
    self
  }
}

/// A dispatched action: results of the sequences that completed and the
/// asynchronous terminals still running, keyed by sequence index.
///
/// Pending terminals only make progress while [`wait`](Self::wait) or
/// [`settle`](Self::settle) is polled. Dropping a `Dispatch` drops their
/// futures, so the asynchronous operations never finish.
#[must_use = "pending asynchronous terminals only run while the dispatch is awaited"]
#[derive(Debug)]
pub struct Dispatch {
  dispatch_id: String,
  action_id: String,
  results: BTreeMap<usize, Value>,
  pending: BTreeMap<usize, PendingResult>,
  cancel: CancellationToken,
}

impl Dispatch {
  pub fn dispatch_id(&self) -> &str {
    &self.dispatch_id
  }

  pub fn action_id(&self) -> &str {
    &self.action_id
  }

  /// Results of the sequences that completed synchronously.
  pub fn results(&self) -> &BTreeMap<usize, Value> {
    &self.results
  }

  /// Indexes of the sequences waiting on an asynchronous terminal.
  pub fn pending(&self) -> Vec<usize> {
    self.pending.keys().copied().collect()
  }

  pub fn is_pending(&self) -> bool {
    !self.pending.is_empty()
  }

  /// Cancel every pending terminal. Their results become
  /// [`RuntimeError::Cancelled`].
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Wait for all pending terminals and return every sequence result.
  /// Fails with the first error in sequence order.
  pub async fn wait(self) -> Result<BTreeMap<usize, Value>, RuntimeError> {
    let mut results = BTreeMap::new();
    for (index, result) in self.settle().await {
      results.insert(index, result?);
    }
    Ok(results)
  }

  /// Wait for all pending terminals, keeping each sequence's outcome.
  pub async fn settle(self) -> BTreeMap<usize, Result<Value, RuntimeError>> {
    let Dispatch {
      results, pending, ..
    } = self;

    let (indexes, waits): (Vec<usize>, Vec<_>) = pending
      .into_iter()
      .map(|(index, pending)| (index, pending.wait()))
      .unzip();
    let settled = futures::future::join_all(waits).await;

    let mut outcomes: BTreeMap<usize, Result<Value, RuntimeError>> =
      results.into_iter().map(|(index, value)| (index, Ok(value))).collect();
    outcomes.extend(indexes.into_iter().zip(settled));
    outcomes
  }
}

impl<N: DispatchNotifier> Runtime<N> {
  /// Run every sequence of the requested action, in order.
  ///
  /// Returns as soon as each sequence has completed or suspended on its
  /// asynchronous terminal. An unknown action, or an action whose sequences
  /// are not all stored, runs nothing: the result is `Ok(None)` with
  /// [`MissingPolicy::Permissive`] and an error with
  /// [`MissingPolicy::Strict`]. A failing sequence aborts the dispatch.
  #[instrument(name = "dispatch", skip(self, request), fields(action_id = %request.id))]
  pub fn dispatch(&self, request: &DispatchRequest) -> Result<Option<Dispatch>, RuntimeError> {
    let Some(sequence_ids) = self.catalog.action(&request.id) else {
      return self.missing(RuntimeError::MissingAction {
        id: request.id.clone(),
      });
    };

    let mut sequences: Vec<Arc<[SequenceEntry]>> = Vec::with_capacity(sequence_ids.len());
    for sequence_id in sequence_ids.iter() {
      match self.catalog.sequence(sequence_id) {
        Some(entries) => sequences.push(entries),
        None => {
          return self.missing(RuntimeError::MissingSequence {
            id: sequence_id.clone(),
          });
        }
      }
    }

    let dispatch_id = uuid::Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    self.notifier.notify(DispatchEvent::DispatchStarted {
      dispatch_id: dispatch_id.clone(),
      action_id: request.id.clone(),
      sequences: sequences.len(),
    });

    let mut results = BTreeMap::new();
    let mut pending = BTreeMap::new();

    for (index, entries) in sequences.iter().enumerate() {
      let ctx = SequenceContext {
        payload: &request.payload,
        results: &results,
        action_values: &request.action_values,
        cancel: &cancel,
      };

      match self.run_sequence(entries, &ctx) {
        Ok(SequenceOutcome::Completed(value)) => {
          self.notifier.notify(DispatchEvent::SequenceCompleted {
            dispatch_id: dispatch_id.clone(),
            index,
            data: value.clone(),
          });
          results.insert(index, value);
        }
        Ok(SequenceOutcome::Suspended(result)) => {
          self.notifier.notify(DispatchEvent::SequenceSuspended {
            dispatch_id: dispatch_id.clone(),
            index,
            operation: result.operation().to_string(),
          });
          pending.insert(index, result);
        }
        Err(e) => {
          error!(dispatch_id = %dispatch_id, sequence = index, error = %e, "sequence failed");
          cancel.cancel();
          self.notifier.notify(DispatchEvent::DispatchFailed {
            dispatch_id,
            error: e.to_string(),
          });
          return Err(e);
        }
      }
    }

    info!(
      dispatch_id = %dispatch_id,
      completed = results.len(),
      pending = pending.len(),
      "dispatched"
    );
    self.notifier.notify(DispatchEvent::DispatchReturned {
      dispatch_id: dispatch_id.clone(),
      pending: pending.len(),
    });

    Ok(Some(Dispatch {
      dispatch_id,
      action_id: request.id.clone(),
      results,
      pending,
      cancel,
    }))
  }

  fn missing(&self, error: RuntimeError) -> Result<Option<Dispatch>, RuntimeError> {
    match self.options.missing {
      MissingPolicy::Strict => Err(error),
      MissingPolicy::Permissive => {
        warn!(error = %error, "nothing dispatched");
        Ok(None)
      }
    }
  }
}
