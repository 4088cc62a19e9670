//! Instruction store and catalog.
//!
//! Everything stored here is write-once: the first writer for a given id
//! wins and entries are never mutated afterwards. Readers get `Arc`s, so a
//! catalog can be shared by concurrent dispatches without further locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::instruction::Instruction;
use crate::sequence::{CompileResult, SequenceEntry, validate_sequence};

/// Content-addressed instruction storage, keyed by instruction hash.
#[derive(Debug, Default)]
pub struct InstructionStore {
  blocks: RwLock<HashMap<String, Arc<Instruction>>>,
}

impl InstructionStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store an instruction. Returns `false` if the id was already present,
  /// in which case the stored instruction is kept.
  pub fn insert(&self, id: impl Into<String>, instruction: Instruction) -> bool {
    let mut blocks = self.blocks.write().unwrap_or_else(|e| e.into_inner());
    match blocks.entry(id.into()) {
      std::collections::hash_map::Entry::Occupied(_) => false,
      std::collections::hash_map::Entry::Vacant(slot) => {
        slot.insert(Arc::new(instruction));
        true
      }
    }
  }

  pub fn get(&self, id: &str) -> Option<Arc<Instruction>> {
    let blocks = self.blocks.read().unwrap_or_else(|e| e.into_inner());
    blocks.get(id).cloned()
  }

  pub fn contains(&self, id: &str) -> bool {
    let blocks = self.blocks.read().unwrap_or_else(|e| e.into_inner());
    blocks.contains_key(id)
  }

  pub fn len(&self) -> usize {
    let blocks = self.blocks.read().unwrap_or_else(|e| e.into_inner());
    blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn snapshot(&self) -> BTreeMap<String, Instruction> {
    let blocks = self.blocks.read().unwrap_or_else(|e| e.into_inner());
    blocks
      .iter()
      .map(|(id, instruction)| (id.clone(), instruction.as_ref().clone()))
      .collect()
  }
}

/// Instructions, sequences and actions of a compiled action set.
#[derive(Debug, Default)]
pub struct Catalog {
  instructions: InstructionStore,
  sequences: RwLock<HashMap<String, Arc<[SequenceEntry]>>>,
  actions: RwLock<HashMap<String, Arc<[String]>>>,
}

impl Catalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn instructions(&self) -> &InstructionStore {
    &self.instructions
  }

  pub fn instruction(&self, id: &str) -> Option<Arc<Instruction>> {
    self.instructions.get(id)
  }

  pub fn insert_instruction(&self, id: impl Into<String>, instruction: Instruction) -> bool {
    self.instructions.insert(id, instruction)
  }

  /// Store a sequence. Returns `false` if the id was already present.
  pub fn insert_sequence(&self, id: impl Into<String>, entries: Vec<SequenceEntry>) -> bool {
    let mut sequences = self.sequences.write().unwrap_or_else(|e| e.into_inner());
    match sequences.entry(id.into()) {
      std::collections::hash_map::Entry::Occupied(_) => false,
      std::collections::hash_map::Entry::Vacant(slot) => {
        slot.insert(entries.into());
        true
      }
    }
  }

  pub fn sequence(&self, id: &str) -> Option<Arc<[SequenceEntry]>> {
    let sequences = self.sequences.read().unwrap_or_else(|e| e.into_inner());
    sequences.get(id).cloned()
  }

  /// Register the sequences of an action. Returns `false` if the action id
  /// was already registered.
  pub fn insert_action(&self, id: impl Into<String>, sequence_ids: Vec<String>) -> bool {
    let mut actions = self.actions.write().unwrap_or_else(|e| e.into_inner());
    match actions.entry(id.into()) {
      std::collections::hash_map::Entry::Occupied(_) => false,
      std::collections::hash_map::Entry::Vacant(slot) => {
        slot.insert(sequence_ids.into());
        true
      }
    }
  }

  pub fn action(&self, id: &str) -> Option<Arc<[String]>> {
    let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
    actions.get(id).cloned()
  }

  pub fn action_ids(&self) -> Vec<String> {
    let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
    let mut ids: Vec<String> = actions.keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Store the instructions and sequence of a compile result and return
  /// the sequence id.
  pub fn absorb(&self, result: CompileResult) -> String {
    for (id, instruction) in result.instructions {
      self.instructions.insert(id, instruction);
    }
    self.insert_sequence(result.sequence_id.clone(), result.sequence);
    result.sequence_id
  }

  pub fn snapshot(&self) -> CatalogSnapshot {
    let sequences = self.sequences.read().unwrap_or_else(|e| e.into_inner());
    let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
    CatalogSnapshot {
      blocks: self.instructions.snapshot(),
      sequences: sequences
        .iter()
        .map(|(id, entries)| (id.clone(), entries.to_vec()))
        .collect(),
      actions: actions
        .iter()
        .map(|(id, sequence_ids)| (id.clone(), sequence_ids.to_vec()))
        .collect(),
    }
  }

  /// Rebuild a catalog from a snapshot, checking its references first.
  pub fn from_snapshot(snapshot: CatalogSnapshot) -> Result<Self, IrError> {
    snapshot.validate()?;

    let catalog = Catalog::new();
    for (id, instruction) in snapshot.blocks {
      catalog.insert_instruction(id, instruction);
    }
    for (id, entries) in snapshot.sequences {
      catalog.insert_sequence(id, entries);
    }
    for (id, sequence_ids) in snapshot.actions {
      catalog.insert_action(id, sequence_ids);
    }
    Ok(catalog)
  }
}

/// Serializable form of a [`Catalog`], mirroring the persisted collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
  pub blocks: BTreeMap<String, Instruction>,
  pub sequences: BTreeMap<String, Vec<SequenceEntry>>,
  pub actions: BTreeMap<String, Vec<String>>,
}

impl CatalogSnapshot {
  /// Check the `sequences[].id -> blocks` and `actions[] -> sequences`
  /// relations and the ordering of every sequence.
  pub fn validate(&self) -> Result<(), IrError> {
    for (sequence_id, entries) in &self.sequences {
      if entries.is_empty() {
        return Err(IrError::EmptySequence {
          sequence_id: sequence_id.clone(),
        });
      }
      if let Some(entry) = entries.iter().find(|e| !self.blocks.contains_key(&e.id)) {
        return Err(IrError::DanglingInstruction {
          sequence_id: sequence_id.clone(),
          instruction_id: entry.id.clone(),
        });
      }
      validate_sequence(entries)?;
    }

    for (action_id, sequence_ids) in &self.actions {
      if let Some(missing) = sequence_ids.iter().find(|id| !self.sequences.contains_key(*id)) {
        return Err(IrError::DanglingSequence {
          action_id: action_id.clone(),
          sequence_id: missing.clone(),
        });
      }
    }

    Ok(())
  }
}
