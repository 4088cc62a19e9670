//! Template compilation.
//!
//! The compiler walks a template depth-first. Each operation node's
//! arguments are compiled before the node itself, so nested operations are
//! emitted ahead of the operations that consume them. In the compiled
//! argument template every nested operation is replaced by a placeholder
//! for its entry index, and the nested entry is recorded as a child of the
//! enclosing operation.

use std::collections::{BTreeMap, HashMap};

use actiongraph_config::ActionTemplate;
use actiongraph_ir::{
  BuiltinOperation, Catalog, CompileResult, Instruction, PLACEHOLDER_KEY, SequenceEntry,
  placeholder, placeholder_index, sequence_id,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::CompileError;
use crate::operations::OperationSet;

/// Labels an operation node for later `$ref`/`$sequenceRef` lookups.
pub const ID_KEY: &str = "$id";
/// Refers to the result of a labelled operation in the same template.
pub const REF_KEY: &str = "$ref";
/// Refers to the result of a labelled earlier sequence of the same action.
pub const SEQUENCE_REF_KEY: &str = "$sequenceRef";

/// Compiles action templates against a set of known operations.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
  operations: OperationSet,
}

impl Compiler {
  pub fn new(operations: OperationSet) -> Self {
    Self { operations }
  }

  pub fn operations(&self) -> &OperationSet {
    &self.operations
  }

  /// Compile a single template.
  ///
  /// Returns `Ok(None)` when the template contains no operation nodes.
  pub fn compile(&self, template: &ActionTemplate) -> Result<Option<CompileResult>, CompileError> {
    Ok(self
      .compile_with(template, &HashMap::new())?
      .map(|(result, _)| result))
  }

  /// Compile the templates of one action, in order.
  ///
  /// Templates without operations produce no sequence. A template whose
  /// root operation carries `$id` can be referenced by later templates with
  /// `$sequenceRef`, which resolves to that sequence's result index. A
  /// sequence ending in an asynchronous operation has no result while the
  /// later sequences run, so it cannot be referenced.
  pub fn compile_action(
    &self,
    templates: &[ActionTemplate],
  ) -> Result<Vec<CompileResult>, CompileError> {
    let mut sequence_labels: HashMap<String, SequenceLabel> = HashMap::new();
    let mut results = Vec::with_capacity(templates.len());

    for (position, template) in templates.iter().enumerate() {
      let compiled = self
        .compile_with(template, &sequence_labels)
        .map_err(|e| CompileError::InTemplate {
          position,
          source: Box::new(e),
        })?;

      let Some((result, label)) = compiled else {
        debug!(position, "template has no operations, skipping");
        continue;
      };

      if let Some(label) = label {
        if sequence_labels.contains_key(&label) {
          return Err(CompileError::DuplicateLabel { label });
        }
        let is_async = result
          .sequence
          .last()
          .and_then(|entry| result.instructions.get(&entry.id))
          .is_some_and(|instruction| instruction.is_async);
        sequence_labels.insert(
          label,
          SequenceLabel {
            index: results.len(),
            is_async,
          },
        );
      }
      results.push(result);
    }

    Ok(results)
  }

  /// Compile an action and store it in the catalog under `action_id`.
  ///
  /// Returns the ids of the action's sequences, in dispatch order.
  pub fn register_action(
    &self,
    catalog: &Catalog,
    action_id: &str,
    templates: &[ActionTemplate],
  ) -> Result<Vec<String>, CompileError> {
    if catalog.action(action_id).is_some() {
      return Err(CompileError::DuplicateAction {
        id: action_id.to_string(),
      });
    }

    let sequence_ids: Vec<String> = self
      .compile_action(templates)?
      .into_iter()
      .map(|result| catalog.absorb(result))
      .collect();

    if !catalog.insert_action(action_id, sequence_ids.clone()) {
      return Err(CompileError::DuplicateAction {
        id: action_id.to_string(),
      });
    }

    info!(
      action_id = %action_id,
      sequences = sequence_ids.len(),
      "registered action"
    );
    Ok(sequence_ids)
  }

  /// Compile every action of a definition map into a fresh catalog.
  pub fn build_catalog(
    &self,
    actions: &BTreeMap<String, Vec<ActionTemplate>>,
  ) -> Result<Catalog, CompileError> {
    let catalog = Catalog::new();
    for (action_id, templates) in actions {
      self.register_action(&catalog, action_id, templates)?;
    }
    Ok(catalog)
  }

  fn compile_with(
    &self,
    template: &ActionTemplate,
    sequence_labels: &HashMap<String, SequenceLabel>,
  ) -> Result<Option<(CompileResult, Option<String>)>, CompileError> {
    let mut emitter = Emitter::new(&self.operations, sequence_labels);
    let mut path = Vec::new();
    let mut links = Links::default();
    let root = emitter.walk(template, &mut path, &mut links)?;

    if emitter.nodes.is_empty() {
      return Ok(None);
    }

    let terminal = emitter.nodes.len() - 1;
    if placeholder_index(&root) != Some(terminal) {
      return Err(CompileError::DetachedOperation);
    }

    let root_label = emitter
      .labels
      .iter()
      .find(|(_, label)| label.index == terminal)
      .map(|(name, _)| name.clone());

    let mut instructions = BTreeMap::new();
    let mut sequence = Vec::with_capacity(emitter.nodes.len());
    for node in emitter.nodes {
      let id = node.instruction.hash();
      instructions
        .entry(id.clone())
        .or_insert(node.instruction);
      sequence.push(SequenceEntry {
        id,
        path: node.path,
        children: node.children,
        references: node.references,
      });
    }

    let sequence_id = sequence_id(&sequence);
    debug!(
      sequence_id = %sequence_id,
      entries = sequence.len(),
      instructions = instructions.len(),
      "compiled template"
    );

    Ok(Some((
      CompileResult {
        instructions,
        sequence,
        sequence_id,
      },
      root_label,
    )))
  }
}

/// An operation node extracted from the template.
struct Emitted {
  instruction: Instruction,
  path: Vec<String>,
  children: Vec<usize>,
  references: Vec<usize>,
}

/// Entries linked from the arguments of the operation being compiled.
#[derive(Default)]
struct Links {
  children: Vec<usize>,
  references: Vec<usize>,
}

struct Label {
  index: usize,
  /// Branch scopes enclosing the labelled node.
  scope: Vec<usize>,
}

/// A labelled sequence of the action being compiled.
struct SequenceLabel {
  index: usize,
  is_async: bool,
}

struct Emitter<'a> {
  operations: &'a OperationSet,
  sequence_labels: &'a HashMap<String, SequenceLabel>,
  nodes: Vec<Emitted>,
  labels: HashMap<String, Label>,
  scope: Vec<usize>,
  next_scope: usize,
  depth: usize,
}

impl<'a> Emitter<'a> {
  fn new(operations: &'a OperationSet, sequence_labels: &'a HashMap<String, SequenceLabel>) -> Self {
    Self {
      operations,
      sequence_labels,
      nodes: Vec::new(),
      labels: HashMap::new(),
      scope: Vec::new(),
      next_scope: 0,
      depth: 0,
    }
  }

  fn walk(
    &mut self,
    value: &Value,
    path: &mut Vec<String>,
    links: &mut Links,
  ) -> Result<Value, CompileError> {
    match value {
      Value::Array(items) => {
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
          path.push(i.to_string());
          out.push(self.walk(item, path, links)?);
          path.pop();
        }
        Ok(Value::Array(out))
      }
      Value::Object(map) => self.walk_object(map, path, links),
      scalar => Ok(scalar.clone()),
    }
  }

  fn walk_object(
    &mut self,
    map: &Map<String, Value>,
    path: &mut Vec<String>,
    links: &mut Links,
  ) -> Result<Value, CompileError> {
    if map.contains_key(PLACEHOLDER_KEY) {
      return Err(CompileError::ReservedKey {
        path: display_path(path),
        key: PLACEHOLDER_KEY.to_string(),
      });
    }

    if let Some(label) = single_key(map, REF_KEY) {
      let label = label_str(label, path)?;
      let target = self
        .labels
        .get(label)
        .ok_or_else(|| CompileError::UnresolvedReference {
          label: label.to_string(),
          path: display_path(path),
        })?;
      if !self.scope.starts_with(&target.scope) {
        return Err(CompileError::BranchReference {
          label: label.to_string(),
          path: display_path(path),
        });
      }
      links.references.push(target.index);
      return Ok(placeholder(target.index));
    }

    if let Some(label) = single_key(map, SEQUENCE_REF_KEY) {
      let label = label_str(label, path)?;
      let target = self.sequence_labels.get(label).ok_or_else(|| {
        CompileError::UnresolvedSequenceReference {
          label: label.to_string(),
          path: display_path(path),
        }
      })?;
      if target.is_async {
        return Err(CompileError::AsyncSequenceReference {
          label: label.to_string(),
          path: display_path(path),
        });
      }
      let mut node = Map::new();
      node.insert(
        BuiltinOperation::SequenceValue.name().to_string(),
        Value::from(target.index),
      );
      return self.walk_object(&node, path, links);
    }

    let operations: Vec<&String> = map
      .keys()
      .filter(|key| self.operations.contains(key))
      .collect();

    match operations.as_slice() {
      [] => {
        if map.contains_key(ID_KEY) {
          return Err(CompileError::LabelWithoutOperation {
            path: display_path(path),
          });
        }
        let mut out = Map::with_capacity(map.len());
        for (key, item) in map {
          path.push(key.clone());
          out.insert(key.clone(), self.walk(item, path, links)?);
          path.pop();
        }
        Ok(Value::Object(out))
      }
      [name] => {
        if let Some(key) = map
          .keys()
          .find(|key| key != name && key.as_str() != ID_KEY)
        {
          return Err(CompileError::UnexpectedKey {
            path: display_path(path),
            key: key.to_string(),
          });
        }
        let label = match map.get(ID_KEY) {
          None => None,
          Some(Value::String(label)) => Some(label.clone()),
          Some(_) => {
            return Err(CompileError::InvalidLabel {
              path: display_path(path),
              message: "'$id' must be a string".to_string(),
            });
          }
        };
        let name = name.as_str();
        let index = self.emit(name, &map[name], label, path)?;
        links.children.push(index);
        Ok(placeholder(index))
      }
      _ => Err(CompileError::AmbiguousNode {
        path: display_path(path),
        operations: operations.into_iter().cloned().collect(),
      }),
    }
  }

  /// Compile one operation node and return its entry index.
  fn emit(
    &mut self,
    name: &str,
    args: &Value,
    label: Option<String>,
    path: &mut Vec<String>,
  ) -> Result<usize, CompileError> {
    let is_async = self.operations.is_async(name);
    if is_async && self.depth > 0 {
      return Err(CompileError::AsyncNotTerminal {
        operation: name.to_string(),
        path: display_path(path),
      });
    }

    path.push(name.to_string());
    self.depth += 1;

    let mut links = Links::default();
    let argument_template = if BuiltinOperation::from_name(name) == Some(BuiltinOperation::IfElse) {
      self.walk_branches(args, path, &mut links)?
    } else {
      self.walk(args, path, &mut links)?
    };

    self.depth -= 1;

    let index = self.nodes.len();
    self.nodes.push(Emitted {
      instruction: Instruction {
        operation_name: name.to_string(),
        argument_template,
        is_async,
      },
      path: path.clone(),
      children: links.children,
      references: links.references,
    });
    path.pop();

    if let Some(label) = label {
      if self.labels.contains_key(&label) {
        return Err(CompileError::DuplicateLabel { label });
      }
      self.labels.insert(
        label,
        Label {
          index,
          scope: self.scope.clone(),
        },
      );
    }

    Ok(index)
  }

  /// Compile the arguments of `action/ifElse`. Operations inside `then`,
  /// `else` and each condition term get their own scope, since only one
  /// branch runs and condition terms may be skipped.
  fn walk_branches(
    &mut self,
    args: &Value,
    path: &mut Vec<String>,
    links: &mut Links,
  ) -> Result<Value, CompileError> {
    let invalid = |message: &str| CompileError::InvalidArguments {
      operation: BuiltinOperation::IfElse.name().to_string(),
      path: display_path(path),
      message: message.to_string(),
    };

    let Some(map) = args.as_object() else {
      return Err(invalid("expected an object with 'if' and 'then'"));
    };
    if !map.get("if").is_some_and(Value::is_array) {
      return Err(invalid("'if' must be a list of conditions"));
    }
    if !map.contains_key("then") {
      return Err(invalid("missing 'then'"));
    }

    let mut out = Map::with_capacity(map.len());
    for (key, item) in map {
      path.push(key.clone());
      let compiled = match (key.as_str(), item) {
        ("if", Value::Array(terms)) => {
          let mut compiled = Vec::with_capacity(terms.len());
          for (i, term) in terms.iter().enumerate() {
            path.push(i.to_string());
            compiled.push(self.walk_scoped(term, path, links)?);
            path.pop();
          }
          Value::Array(compiled)
        }
        ("then" | "else", item) => self.walk_scoped(item, path, links)?,
        (_, item) => self.walk(item, path, links)?,
      };
      path.pop();
      out.insert(key.clone(), compiled);
    }
    Ok(Value::Object(out))
  }

  fn walk_scoped(
    &mut self,
    value: &Value,
    path: &mut Vec<String>,
    links: &mut Links,
  ) -> Result<Value, CompileError> {
    self.scope.push(self.next_scope);
    self.next_scope += 1;
    let compiled = self.walk(value, path, links);
    self.scope.pop();
    compiled
  }
}

fn single_key<'v>(map: &'v Map<String, Value>, key: &str) -> Option<&'v Value> {
  if map.len() == 1 { map.get(key) } else { None }
}

fn label_str<'v>(value: &'v Value, path: &[String]) -> Result<&'v str, CompileError> {
  value.as_str().ok_or_else(|| CompileError::InvalidLabel {
    path: display_path(path),
    message: "label must be a string".to_string(),
  })
}

fn display_path(path: &[String]) -> String {
  if path.is_empty() {
    "<root>".to_string()
  } else {
    path.join(".")
  }
}
