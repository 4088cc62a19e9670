//! Actiongraph Config
//!
//! This crate contains the serializable configuration types for actiongraph.
//! These types describe actions before they are compiled into instructions
//! and sequences, plus the options that tune the interpreter.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `actiongraph run actions.json`)
//! - Database storage (compiled catalogs, see `actiongraph-store`)

mod actions;
mod enums;
mod operation;
mod options;

pub use actions::{ActionTemplate, ActionsFile};
pub use enums::{KeysMode, MissingPolicy};
pub use operation::OperationDef;
pub use options::RuntimeOptions;
