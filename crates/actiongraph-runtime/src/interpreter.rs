//! Sequence execution.
//!
//! Entries run in order. Before an entry runs, the results of its children
//! are spliced into a copy of its argument template at the position
//! recorded in each child's path, and `$ref` placeholders are replaced by
//! the referenced results. Only the terminal entry may be asynchronous.
//!
//! Entries nested in the `if`, `then` or `else` arguments of `action/ifElse`
//! are owned by that entry: the main loop skips them. The branch runs the
//! entries of each condition term just before that term is checked, then
//! the selected side once the condition has been decided.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use actiongraph_config::RuntimeOptions;
use actiongraph_ir::{BuiltinOperation, Catalog, Instruction, SequenceEntry, placeholder_index};
use actiongraph_resolver::{Query, Resolver};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::condition;
use crate::error::RuntimeError;
use crate::events::{DispatchNotifier, NoopNotifier};
use crate::host::{DataStore, OperationHost};
use crate::operators::{OperatorEvaluator, StandardOperators};

/// Per-dispatch inputs visible to the built-in operations.
#[derive(Debug, Clone, Copy)]
pub struct SequenceContext<'a> {
  /// Read by `get/eventValue`.
  pub payload: &'a Value,
  /// Results of the earlier sequences of the dispatch, read by
  /// `get/sequenceValue`.
  pub results: &'a BTreeMap<usize, Value>,
  /// Read by `map/actionValue`.
  pub action_values: &'a Value,
  pub cancel: &'a CancellationToken,
}

/// How a sequence ended.
#[derive(Debug)]
pub enum SequenceOutcome {
  Completed(Value),
  /// The terminal operation is asynchronous and still running.
  Suspended(PendingResult),
}

impl SequenceOutcome {
  pub fn is_suspended(&self) -> bool {
    matches!(self, SequenceOutcome::Suspended(_))
  }

  pub async fn into_value(self) -> Result<Value, RuntimeError> {
    match self {
      SequenceOutcome::Completed(value) => Ok(value),
      SequenceOutcome::Suspended(pending) => pending.wait().await,
    }
  }
}

/// The result of an asynchronous terminal operation. Nothing runs until it
/// is awaited through [`wait`](Self::wait).
#[must_use = "the asynchronous operation only runs while the result is awaited"]
pub struct PendingResult {
  operation: String,
  future: BoxFuture<'static, Result<Value, RuntimeError>>,
}

impl PendingResult {
  pub fn operation(&self) -> &str {
    &self.operation
  }

  pub async fn wait(self) -> Result<Value, RuntimeError> {
    self.future.await
  }
}

impl fmt::Debug for PendingResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PendingResult")
      .field("operation", &self.operation)
      .finish_non_exhaustive()
  }
}

/// Executes compiled sequences against a catalog.
///
/// Generic over `N: DispatchNotifier`. Use `Runtime::new()` to discard
/// events or `Runtime::with_notifier()` to observe them.
pub struct Runtime<N: DispatchNotifier = NoopNotifier> {
  pub(crate) catalog: Arc<Catalog>,
  host: Arc<dyn OperationHost>,
  data: Arc<dyn DataStore>,
  operators: Arc<dyn OperatorEvaluator>,
  pub(crate) options: RuntimeOptions,
  resolver: Resolver,
  pub(crate) notifier: N,
}

impl Runtime<NoopNotifier> {
  pub fn new(
    catalog: Arc<Catalog>,
    host: Arc<dyn OperationHost>,
    data: Arc<dyn DataStore>,
    options: RuntimeOptions,
  ) -> Self {
    Self::with_notifier(catalog, host, data, options, NoopNotifier)
  }
}

impl<N: DispatchNotifier> Runtime<N> {
  pub fn with_notifier(
    catalog: Arc<Catalog>,
    host: Arc<dyn OperationHost>,
    data: Arc<dyn DataStore>,
    options: RuntimeOptions,
    notifier: N,
  ) -> Self {
    Self {
      catalog,
      host,
      data,
      operators: Arc::new(StandardOperators),
      options,
      resolver: Resolver::new(options.keys_mode),
      notifier,
    }
  }

  /// Replace the operator set used by branch conditions.
  pub fn with_operators(mut self, operators: Arc<dyn OperatorEvaluator>) -> Self {
    self.operators = operators;
    self
  }

  pub fn catalog(&self) -> &Arc<Catalog> {
    &self.catalog
  }

  pub fn options(&self) -> RuntimeOptions {
    self.options
  }

  /// Run one sequence.
  ///
  /// Returns once every synchronous entry has run. If the terminal entry
  /// is asynchronous the outcome is [`SequenceOutcome::Suspended`].
  #[instrument(level = "debug", name = "run_sequence", skip_all, fields(entries = entries.len()))]
  pub fn run_sequence(
    &self,
    entries: &[SequenceEntry],
    ctx: &SequenceContext<'_>,
  ) -> Result<SequenceOutcome, RuntimeError> {
    let Some(terminal) = entries.len().checked_sub(1) else {
      return Err(RuntimeError::EmptySequence);
    };

    let mut execution = Execution::new(entries);
    if execution.owner(terminal).is_some() {
      return Err(RuntimeError::CorruptSequence {
        index: terminal,
        message: "terminal entry is inside a branch".to_string(),
      });
    }

    for index in 0..terminal {
      if execution.owner(index).is_some() {
        continue;
      }
      if ctx.cancel.is_cancelled() {
        return Err(RuntimeError::Cancelled);
      }
      let value = self.step(&mut execution, index, ctx)?;
      execution.results[index] = Some(value);
    }

    let instruction = self.instruction(&entries[terminal])?;
    if instruction.is_async {
      let template = &instruction.argument_template;
      let mut args = template.clone();
      self.materialize(&execution, terminal, template, &mut args, |_| true)?;
      debug!(operation = %instruction.operation_name, "suspending on asynchronous terminal");
      return Ok(SequenceOutcome::Suspended(self.start_async(
        &instruction.operation_name,
        args,
        ctx.cancel,
      )));
    }

    self
      .execute(&mut execution, terminal, &instruction, ctx)
      .map(SequenceOutcome::Completed)
  }

  fn instruction(&self, entry: &SequenceEntry) -> Result<Arc<Instruction>, RuntimeError> {
    self
      .catalog
      .instruction(&entry.id)
      .ok_or_else(|| RuntimeError::MissingInstruction {
        id: entry.id.clone(),
      })
  }

  /// Run a non-terminal entry.
  fn step(
    &self,
    execution: &mut Execution<'_>,
    index: usize,
    ctx: &SequenceContext<'_>,
  ) -> Result<Value, RuntimeError> {
    let entries = execution.entries;
    let instruction = self.instruction(&entries[index])?;
    if instruction.is_async {
      return Err(RuntimeError::AsyncNotTerminal {
        id: entries[index].id.clone(),
      });
    }
    self.execute(execution, index, &instruction, ctx)
  }

  fn execute(
    &self,
    execution: &mut Execution<'_>,
    index: usize,
    instruction: &Instruction,
    ctx: &SequenceContext<'_>,
  ) -> Result<Value, RuntimeError> {
    let operation = instruction.operation_name.as_str();
    debug!(index, operation = %operation, "executing entry");

    let builtin = BuiltinOperation::from_name(operation);
    if builtin == Some(BuiltinOperation::IfElse) {
      return self.branch(execution, index, instruction, ctx);
    }

    let template = &instruction.argument_template;
    let mut args = template.clone();
    self.materialize(execution, index, template, &mut args, |_| true)?;

    match builtin {
      Some(op) => self.builtin(op, args, ctx),
      None => self
        .host
        .invoke(operation, args)
        .map_err(|source| RuntimeError::Operation {
          operation: operation.to_string(),
          source,
        }),
    }
  }

  /// Run `action/ifElse`: evaluate the condition term by term, then only
  /// the entries of the selected branch.
  fn branch(
    &self,
    execution: &mut Execution<'_>,
    index: usize,
    instruction: &Instruction,
    ctx: &SequenceContext<'_>,
  ) -> Result<Value, RuntimeError> {
    let template = &instruction.argument_template;
    let mut args = template.clone();
    self.materialize(execution, index, template, &mut args, |link| {
      execution.owner(link).map(|(owner, _)| owner) != Some(index)
    })?;

    let conditions = args
      .get("if")
      .and_then(Value::as_array)
      .cloned()
      .ok_or_else(|| RuntimeError::InvalidArguments {
        operation: instruction.operation_name.clone(),
        message: "'if' must be a list of conditions".to_string(),
      })?;

    let passed = condition::evaluate_with(
      &conditions,
      |term, _| {
        let scope = Scope::Condition(term);
        self.run_scope(execution, index, scope, ctx)?;
        self.materialize(execution, index, template, &mut args, |link| {
          execution.owner(link) == Some((index, scope))
        })?;
        Ok::<_, RuntimeError>(
          args
            .get("if")
            .and_then(|terms| terms.get(term))
            .cloned()
            .unwrap_or(Value::Null),
        )
      },
      self.operators.as_ref(),
    )?;

    let branch = if passed { Scope::Then } else { Scope::Else };
    debug!(index, branch = branch.key(), "condition evaluated");
    if args.get(branch.key()).is_none() {
      return Ok(Value::Null);
    }

    self.run_scope(execution, index, branch, ctx)?;
    self.materialize(execution, index, template, &mut args, |link| {
      execution.owner(link) == Some((index, branch))
    })?;

    Ok(
      args
        .as_object_mut()
        .and_then(|map| map.remove(branch.key()))
        .unwrap_or(Value::Null),
    )
  }

  /// Run the entries `index` owns in `scope`, in sequence order.
  fn run_scope(
    &self,
    execution: &mut Execution<'_>,
    index: usize,
    scope: Scope,
    ctx: &SequenceContext<'_>,
  ) -> Result<(), RuntimeError> {
    for owned in 0..index {
      if execution.owner(owned) != Some((index, scope)) {
        continue;
      }
      if ctx.cancel.is_cancelled() {
        return Err(RuntimeError::Cancelled);
      }
      let value = self.step(execution, owned, ctx)?;
      execution.results[owned] = Some(value);
    }
    Ok(())
  }

  fn builtin(
    &self,
    op: BuiltinOperation,
    args: Value,
    ctx: &SequenceContext<'_>,
  ) -> Result<Value, RuntimeError> {
    let invalid = |message: &str| RuntimeError::InvalidArguments {
      operation: op.name().to_string(),
      message: message.to_string(),
    };

    match op {
      BuiltinOperation::EventValue => Ok(self.resolver.resolve_value(ctx.payload, &args)?),
      BuiltinOperation::SequenceValue => {
        if let Some(sequence) = referenced_sequence(&args) {
          if !ctx.results.contains_key(&sequence) {
            return Err(RuntimeError::UnresolvedSequence { sequence });
          }
        }
        let results = Value::Object(
          ctx
            .results
            .iter()
            .map(|(index, value)| (index.to_string(), value.clone()))
            .collect(),
        );
        Ok(self.resolver.resolve_value(&results, &args)?)
      }
      BuiltinOperation::ActionValue => Ok(self.resolver.resolve_value(ctx.action_values, &args)?),
      BuiltinOperation::GetDataValue => {
        let null = Value::Null;
        let (name, query) = match &args {
          Value::String(name) => (name.as_str(), &null),
          Value::Object(map) => (
            map
              .get("name")
              .and_then(Value::as_str)
              .ok_or_else(|| invalid("missing 'name'"))?,
            map.get("query").unwrap_or(&null),
          ),
          _ => return Err(invalid("expected a name or { name, query }")),
        };
        let value = self.data.get(name).unwrap_or(Value::Null);
        Ok(self.resolver.resolve_value(&value, query)?)
      }
      BuiltinOperation::SetDataValue => {
        let Value::Object(mut map) = args else {
          return Err(invalid("expected { name, value }"));
        };
        let Some(Value::String(name)) = map.remove("name") else {
          return Err(invalid("missing 'name'"));
        };
        let value = map.remove("value").unwrap_or(Value::Null);
        self
          .data
          .set(&name, value.clone())
          .map_err(|source| RuntimeError::Operation {
            operation: op.name().to_string(),
            source,
          })?;
        Ok(value)
      }
      BuiltinOperation::IfElse => Err(invalid("branches are run by the interpreter")),
    }
  }

  /// Substitute the results of `index`'s children and references into
  /// `args`, for the links accepted by `include`.
  fn materialize(
    &self,
    execution: &Execution<'_>,
    index: usize,
    template: &Value,
    args: &mut Value,
    include: impl Fn(usize) -> bool,
  ) -> Result<(), RuntimeError> {
    let entries = execution.entries;
    let entry = &entries[index];

    for &child in entry.children.iter().filter(|&&child| include(child)) {
      let value = execution.value(index, child)?;
      splice(args, index, entry, child, &entries[child], value)?;
    }

    for &reference in entry.references.iter().filter(|&&reference| include(reference)) {
      let value = execution.value(index, reference)?;
      replace_reference(template, args, reference, &value);
    }

    Ok(())
  }

  fn start_async(&self, operation: &str, args: Value, cancel: &CancellationToken) -> PendingResult {
    let invocation = self.host.invoke_async(operation, args, cancel.clone());
    let cancel = cancel.clone();
    let name = operation.to_string();

    let future = async move {
      tokio::select! {
        result = invocation => result.map_err(|source| {
          error!(operation = %name, error = %source, "asynchronous operation failed");
          RuntimeError::Operation { operation: name, source }
        }),
        _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
      }
    }
    .boxed();

    PendingResult {
      operation: operation.to_string(),
      future,
    }
  }
}

/// Where an entry sits inside the arguments of its owning `action/ifElse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
  /// Under the condition term at this position.
  Condition(usize),
  Then,
  Else,
}

impl Scope {
  fn key(self) -> &'static str {
    match self {
      Scope::Condition(_) => "if",
      Scope::Then => "then",
      Scope::Else => "else",
    }
  }

  fn from_path(segments: &[String]) -> Option<Self> {
    match segments.first()?.as_str() {
      "then" => Some(Scope::Then),
      "else" => Some(Scope::Else),
      "if" => segments.get(1)?.parse().ok().map(Scope::Condition),
      _ => None,
    }
  }
}

/// Scratch state of one sequence run.
struct Execution<'s> {
  entries: &'s [SequenceEntry],
  owners: Vec<Option<(usize, Scope)>>,
  results: Vec<Option<Value>>,
}

impl<'s> Execution<'s> {
  fn new(entries: &'s [SequenceEntry]) -> Self {
    Self {
      entries,
      owners: branch_owners(entries),
      results: vec![None; entries.len()],
    }
  }

  fn owner(&self, index: usize) -> Option<(usize, Scope)> {
    self.owners.get(index).copied().flatten()
  }

  fn value(&self, index: usize, dependency: usize) -> Result<Value, RuntimeError> {
    self
      .results
      .get(dependency)
      .cloned()
      .flatten()
      .ok_or(RuntimeError::UnresolvedDependency { index, dependency })
  }
}

/// For every entry, the innermost `action/ifElse` entry whose condition
/// terms or branches contain it.
fn branch_owners(entries: &[SequenceEntry]) -> Vec<Option<(usize, Scope)>> {
  let mut owners: Vec<Option<(usize, Scope)>> = vec![None; entries.len()];

  for (owner, entry) in entries.iter().enumerate() {
    if entry.operation() != Some(BuiltinOperation::IfElse.name()) {
      continue;
    }
    let depth = entry.path.len();
    for (index, candidate) in entries[..owner].iter().enumerate() {
      if !candidate.path.starts_with(&entry.path) {
        continue;
      }
      let Some(scope) = Scope::from_path(&candidate.path[depth..]) else {
        continue;
      };
      let innermost = match owners[index] {
        Some((current, _)) => entries[current].path.len() < depth,
        None => true,
      };
      if innermost {
        owners[index] = Some((owner, scope));
      }
    }
  }

  owners
}

/// The sequence index a `get/sequenceValue` query starts from, if any.
fn referenced_sequence(query: &Value) -> Option<usize> {
  match Query::parse(query).ok()? {
    Query::Key(key) => key.parse().ok(),
    Query::Path(segments) => segments.first()?.parse().ok(),
    _ => None,
  }
}

/// Put a child's result in place of its placeholder. The placeholder sits
/// at the child's path relative to the parent, minus the child's own
/// operation segment.
fn splice(
  args: &mut Value,
  index: usize,
  parent: &SequenceEntry,
  child_index: usize,
  child: &SequenceEntry,
  value: Value,
) -> Result<(), RuntimeError> {
  if child.path.len() <= parent.path.len() || !child.path.starts_with(&parent.path) {
    return Err(RuntimeError::CorruptSequence {
      index,
      message: format!("entry {} is not nested under this entry", child_index),
    });
  }

  let relative = &child.path[parent.path.len()..child.path.len() - 1];
  let missing = || RuntimeError::CorruptSequence {
    index,
    message: format!(
      "no placeholder for entry {} at '{}'",
      child_index,
      relative.join(".")
    ),
  };

  let mut slot = args;
  for segment in relative {
    slot = match slot {
      Value::Object(map) => map.get_mut(segment),
      Value::Array(items) => segment
        .parse::<usize>()
        .ok()
        .and_then(|i| items.get_mut(i)),
      _ => None,
    }
    .ok_or_else(missing)?;
  }

  if placeholder_index(slot) != Some(child_index) {
    return Err(missing());
  }
  *slot = value;
  Ok(())
}

/// Replace every placeholder for `target` in `args`. `template` is the
/// unmaterialized argument template, walked in step with `args` so that
/// results already spliced in are never inspected.
fn replace_reference(template: &Value, args: &mut Value, target: usize, value: &Value) {
  if placeholder_index(template) == Some(target) {
    *args = value.clone();
    return;
  }
  match (template, args) {
    (Value::Object(template), Value::Object(args)) => {
      for (key, nested) in template {
        if let Some(slot) = args.get_mut(key) {
          replace_reference(nested, slot, target, value);
        }
      }
    }
    (Value::Array(template), Value::Array(args)) => {
      for (nested, slot) in template.iter().zip(args.iter_mut()) {
        replace_reference(nested, slot, target, value);
      }
    }
    _ => {}
  }
}
