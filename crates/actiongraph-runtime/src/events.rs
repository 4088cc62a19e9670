//! Dispatch events for observability.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while an action is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
  /// A dispatch has started.
  DispatchStarted {
    dispatch_id: String,
    action_id: String,
    sequences: usize,
  },

  /// A sequence finished synchronously.
  SequenceCompleted {
    dispatch_id: String,
    index: usize,
    data: serde_json::Value,
  },

  /// A sequence is waiting on its asynchronous terminal operation.
  SequenceSuspended {
    dispatch_id: String,
    index: usize,
    operation: String,
  },

  /// Every sequence has either completed or suspended.
  DispatchReturned { dispatch_id: String, pending: usize },

  /// A sequence failed and the dispatch was aborted.
  DispatchFailed { dispatch_id: String, error: String },
}

/// Receives dispatch events.
pub trait DispatchNotifier: Send + Sync {
  fn notify(&self, event: DispatchEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl DispatchNotifier for NoopNotifier {
  fn notify(&self, _event: DispatchEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<DispatchEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
    Self { sender }
  }
}

impl DispatchNotifier for ChannelNotifier {
  fn notify(&self, event: DispatchEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
