use std::collections::BTreeMap;
use std::path::Path;

use actiongraph_ir::{CatalogSnapshot, Instruction, SequenceEntry};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use tracing::info;

use crate::types::{BlockRow, SequenceItemRow};
use crate::{Store, StoreError};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file and run migrations.
  pub async fn open(path: &Path) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn save_catalog(&self, catalog: &CatalogSnapshot) -> Result<(), StoreError> {
    let now = Utc::now();
    let mut tx = self.pool.begin().await?;

    for (id, block) in &catalog.blocks {
      sqlx::query(
        r#"
        INSERT OR IGNORE INTO blocks (id, operation_name, argument_template, is_async, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
      )
      .bind(id)
      .bind(&block.operation_name)
      .bind(Json(&block.argument_template))
      .bind(block.is_async)
      .bind(now)
      .execute(&mut *tx)
      .await?;
    }

    for (id, entries) in &catalog.sequences {
      let inserted = sqlx::query("INSERT OR IGNORE INTO sequences (id, created_at) VALUES (?, ?)")
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
      if inserted == 0 {
        continue;
      }

      for (position, entry) in entries.iter().enumerate() {
        sqlx::query(
          r#"
          INSERT INTO sequence_items (sequence_id, position, block_id, path, children, refs)
          VALUES (?, ?, ?, ?, ?, ?)
          "#,
        )
        .bind(id)
        .bind(position as i64)
        .bind(&entry.id)
        .bind(Json(&entry.path))
        .bind(Json(&entry.children))
        .bind(Json(&entry.references))
        .execute(&mut *tx)
        .await?;
      }
    }

    for (id, sequence_ids) in &catalog.actions {
      sqlx::query(
        r#"
        INSERT INTO actions (id, updated_at) VALUES (?, ?)
        ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
        "#,
      )
      .bind(id)
      .bind(now)
      .execute(&mut *tx)
      .await?;

      sqlx::query("DELETE FROM action_sequences WHERE action_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

      for (position, sequence_id) in sequence_ids.iter().enumerate() {
        sqlx::query(
          "INSERT INTO action_sequences (action_id, position, sequence_id) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(position as i64)
        .bind(sequence_id)
        .execute(&mut *tx)
        .await?;
      }
    }

    tx.commit().await?;

    info!(
      blocks = catalog.blocks.len(),
      sequences = catalog.sequences.len(),
      actions = catalog.actions.len(),
      "saved catalog"
    );
    Ok(())
  }

  async fn load_catalog(&self) -> Result<CatalogSnapshot, StoreError> {
    let blocks: Vec<BlockRow> =
      sqlx::query_as("SELECT id, operation_name, argument_template, is_async FROM blocks")
        .fetch_all(&self.pool)
        .await?;

    let items: Vec<SequenceItemRow> = sqlx::query_as(
      r#"
      SELECT sequence_id, position, block_id, path, children, refs
      FROM sequence_items
      ORDER BY sequence_id, position
      "#,
    )
    .fetch_all(&self.pool)
    .await?;

    let action_ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM actions")
      .fetch_all(&self.pool)
      .await?;

    let links: Vec<(String, String)> = sqlx::query_as(
      "SELECT action_id, sequence_id FROM action_sequences ORDER BY action_id, position",
    )
    .fetch_all(&self.pool)
    .await?;

    let mut snapshot = CatalogSnapshot {
      blocks: blocks
        .into_iter()
        .map(|row| (row.id.clone(), Instruction::from(row)))
        .collect(),
      ..CatalogSnapshot::default()
    };

    for item in items {
      snapshot
        .sequences
        .entry(item.sequence_id.clone())
        .or_default()
        .push(SequenceEntry::from(item));
    }

    let mut actions: BTreeMap<String, Vec<String>> = action_ids
      .into_iter()
      .map(|(id,)| (id, Vec::new()))
      .collect();
    for (action_id, sequence_id) in links {
      actions.entry(action_id).or_default().push(sequence_id);
    }
    snapshot.actions = actions;

    snapshot.validate()?;
    Ok(snapshot)
  }

  async fn get_block(&self, id: &str) -> Result<Instruction, StoreError> {
    let row: Option<BlockRow> = sqlx::query_as(
      "SELECT id, operation_name, argument_template, is_async FROM blocks WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .map(Instruction::from)
      .ok_or_else(|| StoreError::NotFound(format!("block '{}'", id)))
  }

  async fn get_sequence(&self, id: &str) -> Result<Vec<SequenceEntry>, StoreError> {
    let items: Vec<SequenceItemRow> = sqlx::query_as(
      r#"
      SELECT sequence_id, position, block_id, path, children, refs
      FROM sequence_items
      WHERE sequence_id = ?
      ORDER BY position
      "#,
    )
    .bind(id)
    .fetch_all(&self.pool)
    .await?;

    if items.is_empty() {
      return Err(StoreError::NotFound(format!("sequence '{}'", id)));
    }
    Ok(items.into_iter().map(SequenceEntry::from).collect())
  }

  async fn get_action(&self, id: &str) -> Result<Vec<String>, StoreError> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM actions WHERE id = ?")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    if exists.is_none() {
      return Err(StoreError::NotFound(format!("action '{}'", id)));
    }

    let rows: Vec<(String,)> = sqlx::query_as(
      "SELECT sequence_id FROM action_sequences WHERE action_id = ? ORDER BY position",
    )
    .bind(id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(|(sequence_id,)| sequence_id).collect())
  }
}
