//! Actiongraph Runtime
//!
//! Executes compiled sequences and dispatches actions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Runtime::dispatch(request)                 │
//! │  - looks up the action's sequences in the Catalog           │
//! │  - runs them in order, sharing one results map              │
//! │  - returns Dispatch { results, pending }                    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Runtime::run_sequence(entries)             │
//! │  - materializes arguments from earlier results              │
//! │  - built-ins, action/ifElse, or OperationHost::invoke       │
//! │  - asynchronous terminal → OperationHost::invoke_async      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let runtime = Runtime::new(catalog, host, Arc::new(MemoryDataStore::new()), options);
//! if let Some(dispatch) = runtime.dispatch(&DispatchRequest::new("greet", payload))? {
//!     let results = dispatch.wait().await?;
//! }
//! ```

mod condition;
mod dispatch;
mod error;
mod events;
mod host;
mod interpreter;
mod operators;

pub use condition::{ConditionTerm, evaluate, evaluate_with};
pub use dispatch::{Dispatch, DispatchRequest};
pub use error::{HostError, RuntimeError};
pub use events::{ChannelNotifier, DispatchEvent, DispatchNotifier, NoopNotifier};
pub use host::{DataStore, MemoryDataStore, OperationHost};
pub use interpreter::{PendingResult, Runtime, SequenceContext, SequenceOutcome};
pub use operators::{CompareTerm, OperatorEvaluator, StandardOperators, truthy};
