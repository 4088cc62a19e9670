//! Actiongraph Store
//!
//! Persists compiled catalogs. The schema mirrors the catalog's relations:
//!
//! - `blocks`: instruction hash -> instruction
//! - `sequences` / `sequence_items`: sequence id -> ordered entries, each
//!   referencing a block
//! - `actions` / `action_sequences`: action id -> ordered sequence ids
//!
//! Blocks and sequences are content-addressed and written once. Saving an
//! action again replaces its sequence list.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{BlockRow, SequenceItemRow};

use actiongraph_ir::{CatalogSnapshot, Instruction, IrError, SequenceEntry};
use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration failed: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// Stored rows do not form a consistent catalog.
  #[error("corrupt catalog: {0}")]
  Corrupt(#[from] IrError),
}

/// Storage trait for compiled catalogs.
#[async_trait]
pub trait Store: Send + Sync {
  /// Persist every block, sequence and action of a catalog.
  async fn save_catalog(&self, catalog: &CatalogSnapshot) -> Result<(), StoreError>;

  /// Load the whole catalog, checking its references.
  async fn load_catalog(&self) -> Result<CatalogSnapshot, StoreError>;

  /// Get a block by hash.
  async fn get_block(&self, id: &str) -> Result<Instruction, StoreError>;

  /// Get the entries of a sequence.
  async fn get_sequence(&self, id: &str) -> Result<Vec<SequenceEntry>, StoreError>;

  /// Get the sequence ids of an action, in dispatch order.
  async fn get_action(&self, id: &str) -> Result<Vec<String>, StoreError>;
}
