use actiongraph_ir::{Instruction, SequenceEntry};
use sqlx::FromRow;
use sqlx::types::Json;

/// A block as stored in the database.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BlockRow {
  pub id: String,
  pub operation_name: String,
  pub argument_template: Json<serde_json::Value>,
  pub is_async: bool,
}

impl From<BlockRow> for Instruction {
  fn from(row: BlockRow) -> Self {
    Instruction {
      operation_name: row.operation_name,
      argument_template: row.argument_template.0,
      is_async: row.is_async,
    }
  }
}

/// One entry of a stored sequence.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SequenceItemRow {
  pub sequence_id: String,
  pub position: i64,
  pub block_id: String,
  pub path: Json<Vec<String>>,
  pub children: Json<Vec<usize>>,
  pub refs: Json<Vec<usize>>,
}

impl From<SequenceItemRow> for SequenceEntry {
  fn from(row: SequenceItemRow) -> Self {
    SequenceEntry {
      id: row.block_id,
      path: row.path.0,
      children: row.children.0,
      references: row.refs.0,
    }
  }
}
