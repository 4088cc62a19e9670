//! Actiongraph IR
//!
//! This crate provides the compiled representation of actions. Action
//! templates are compiled (see `actiongraph-compiler`) into:
//!
//! - [`Instruction`]s: atomic, content-addressed operation invocations
//! - [`SequenceEntry`] lists: ordered, dependency-first execution plans
//! - action entries: action id -> sequence ids
//!
//! Identical instructions hash to the same id and are stored once in the
//! [`InstructionStore`], shared by every sequence that uses them. The
//! [`Catalog`] bundles the store with sequences and actions, and
//! [`CatalogSnapshot`] is its serializable form.

mod builtin;
mod catalog;
mod error;
mod hash;
mod instruction;
mod sequence;

pub use builtin::BuiltinOperation;
pub use catalog::{Catalog, CatalogSnapshot, InstructionStore};
pub use error::IrError;
pub use hash::{HASH_PREFIX, hash_value};
pub use instruction::{Instruction, PLACEHOLDER_KEY, placeholder, placeholder_index};
pub use sequence::{CompileResult, SequenceEntry, sequence_id, validate_sequence};
