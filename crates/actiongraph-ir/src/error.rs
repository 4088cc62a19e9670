use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
  #[error("sequence '{sequence_id}' references unknown instruction: {instruction_id}")]
  DanglingInstruction {
    sequence_id: String,
    instruction_id: String,
  },

  #[error("action '{action_id}' references unknown sequence: {sequence_id}")]
  DanglingSequence {
    action_id: String,
    sequence_id: String,
  },

  #[error("entry {index} links to entry {link}, which does not precede it")]
  InvalidLink { index: usize, link: usize },

  #[error("sequence '{sequence_id}' is empty")]
  EmptySequence { sequence_id: String },
}
