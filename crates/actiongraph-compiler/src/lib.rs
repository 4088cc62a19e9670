//! Actiongraph Compiler
//!
//! Compiles action templates into the content-addressed representation of
//! `actiongraph-ir`. Every operation node found in a template becomes one
//! [`Instruction`](actiongraph_ir::Instruction); the nodes are emitted
//! dependency-first so that each sequence entry only depends on entries
//! before it, and the root operation is always the terminal entry.
//!
//! ```text
//! { "set/dataValue": {                            0: get/eventValue "name"
//!     "name": "greeting",                 ==>     1: string/concat ["hello, ", {_$dv: 0}]
//!     "value": { "string/concat": [               2: set/dataValue {name, value: {_$dv: 1}}
//!       "hello, ", { "get/eventValue": "name" }
//!     ] } } }
//! ```
//!
//! Compilation is a pure transform: the input template is never modified.

mod compiler;
mod error;
mod operations;

pub use compiler::{Compiler, ID_KEY, REF_KEY, SEQUENCE_REF_KEY};
pub use error::CompileError;
pub use operations::OperationSet;
