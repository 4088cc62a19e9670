use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use actiongraph_compiler::{Compiler, OperationSet};
use actiongraph_config::{KeysMode, MissingPolicy, OperationDef, RuntimeOptions};
use actiongraph_ir::{Catalog, Instruction, SequenceEntry, placeholder};
use actiongraph_runtime::{
  ChannelNotifier, DataStore, DispatchEvent, DispatchRequest, HostError, MemoryDataStore,
  OperationHost, Runtime, RuntimeError,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Host with a few scripted operations. Every invocation is recorded.
#[derive(Default)]
struct ScriptHost {
  calls: Mutex<Vec<(String, Value)>>,
  waiting: Mutex<Option<oneshot::Receiver<Value>>>,
}

impl ScriptHost {
  fn with_waiter() -> (Arc<Self>, oneshot::Sender<Value>) {
    let (tx, rx) = oneshot::channel();
    let host = ScriptHost {
      waiting: Mutex::new(Some(rx)),
      ..Default::default()
    };
    (Arc::new(host), tx)
  }

  fn calls(&self) -> Vec<(String, Value)> {
    self.calls.lock().unwrap().clone()
  }

  fn operations(&self) -> Vec<String> {
    self.calls().into_iter().map(|(name, _)| name).collect()
  }
}

impl OperationHost for ScriptHost {
  fn invoke(&self, operation: &str, args: Value) -> Result<Value, HostError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((operation.to_string(), args.clone()));
    match operation {
      "string/concat" => {
        let parts = args
          .as_array()
          .ok_or_else(|| HostError::invalid_arguments("expected a list"))?;
        let joined: String = parts
          .iter()
          .map(|part| match part {
            Value::String(s) => s.clone(),
            other => other.to_string(),
          })
          .collect();
        Ok(Value::String(joined))
      }
      "test/record" => Ok(args),
      "test/fail" => Err(HostError::failed("boom")),
      _ => Err(HostError::UnknownOperation {
        name: operation.to_string(),
      }),
    }
  }

  fn invoke_async(
    &self,
    operation: &str,
    args: Value,
    _cancel: CancellationToken,
  ) -> BoxFuture<'static, Result<Value, HostError>> {
    self
      .calls
      .lock()
      .unwrap()
      .push((operation.to_string(), args));
    let waiting = self.waiting.lock().unwrap().take();
    async move {
      match waiting {
        Some(rx) => rx.await.map_err(|_| HostError::failed("sender dropped")),
        None => Err(HostError::failed("nothing to wait on")),
      }
    }
    .boxed()
  }
}

fn compiler() -> Compiler {
  Compiler::new(OperationSet::with_operations([
    OperationDef::sync("string/concat"),
    OperationDef::sync("test/record"),
    OperationDef::sync("test/fail"),
    OperationDef::asynchronous("test/wait"),
  ]))
}

fn setup(
  actions: Value,
  host: Arc<ScriptHost>,
  options: RuntimeOptions,
) -> (Runtime, Arc<MemoryDataStore>) {
  let actions: BTreeMap<String, Vec<Value>> = serde_json::from_value(actions).unwrap();
  let catalog = compiler().build_catalog(&actions).unwrap();
  let data = Arc::new(MemoryDataStore::new());
  let runtime = Runtime::new(Arc::new(catalog), host, data.clone(), options);
  (runtime, data)
}

#[tokio::test]
async fn test_greet_writes_data_store() {
  let host = Arc::new(ScriptHost::default());
  let (runtime, data) = setup(
    json!({
      "greet": [{
        "set/dataValue": {
          "name": "greeting",
          "value": { "string/concat": ["hello, ", { "get/eventValue": "name" }] }
        }
      }]
    }),
    host.clone(),
    RuntimeOptions::default(),
  );

  let dispatch = runtime
    .dispatch(&DispatchRequest::new("greet", json!({ "name": "Ada" })))
    .unwrap()
    .unwrap();

  assert!(!dispatch.is_pending());
  assert_eq!(dispatch.results()[&0], json!("hello, Ada"));
  assert_eq!(data.get("greeting"), Some(json!("hello, Ada")));
  assert_eq!(host.calls(), [("string/concat".to_string(), json!(["hello, ", "Ada"]))]);
}

#[tokio::test]
async fn test_missing_instruction_is_fatal() {
  let before = Instruction::new("set/dataValue", json!({ "name": "before", "value": 1 }));
  let after = Instruction::new("set/dataValue", json!({ "name": "after", "value": 2 }));
  let terminal = Instruction::new("test/record", json!([placeholder(0), placeholder(1), placeholder(2)]));

  let entry = |id: String, path: &[&str], children: Vec<usize>| SequenceEntry {
    id,
    path: path.iter().map(|s| s.to_string()).collect(),
    children,
    references: Vec::new(),
  };
  let sequence = vec![
    entry(before.hash(), &["test/record", "0", "set/dataValue"], vec![]),
    entry("sha256:missing".to_string(), &["test/record", "1", "get/eventValue"], vec![]),
    entry(after.hash(), &["test/record", "2", "set/dataValue"], vec![]),
    entry(terminal.hash(), &["test/record"], vec![0, 1, 2]),
  ];

  let catalog = Catalog::new();
  for instruction in [before, after, terminal] {
    catalog.insert_instruction(instruction.hash(), instruction);
  }
  catalog.insert_sequence("sequence", sequence);
  catalog.insert_action("broken", vec!["sequence".to_string()]);

  let host = Arc::new(ScriptHost::default());
  let data = Arc::new(MemoryDataStore::new());
  let runtime = Runtime::new(Arc::new(catalog), host.clone(), data.clone(), RuntimeOptions::default());

  let err = runtime
    .dispatch(&DispatchRequest::new("broken", json!({})))
    .unwrap_err();

  assert_eq!(err.to_string(), "No action found: sha256:missing");
  assert_eq!(data.get("before"), Some(json!(1)));
  assert_eq!(data.get("after"), None);
  assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_fan_out_returns_sync_results_before_async_ones() {
  let (host, tx) = ScriptHost::with_waiter();
  let (runtime, _) = setup(
    json!({
      "fanout": [
        { "test/record": { "get/eventValue": "n" } },
        { "test/wait": { "get/eventValue": "n" } }
      ]
    }),
    host.clone(),
    RuntimeOptions::default(),
  );

  let dispatch = runtime
    .dispatch(&DispatchRequest::new("fanout", json!({ "n": 5 })))
    .unwrap()
    .unwrap();

  assert_eq!(dispatch.results()[&0], json!(5));
  assert_eq!(dispatch.pending(), [1]);

  tx.send(json!(42)).unwrap();
  let results = dispatch.wait().await.unwrap();
  assert_eq!(results, BTreeMap::from([(0, json!(5)), (1, json!(42))]));
}

#[tokio::test]
async fn test_only_terminal_entry_suspends() {
  let (host, tx) = ScriptHost::with_waiter();
  let (runtime, _) = setup(
    json!({
      "steps": [{
        "test/wait": [{ "test/record": 1 }, { "test/record": 2 }, { "test/record": 3 }]
      }]
    }),
    host.clone(),
    RuntimeOptions::default(),
  );

  let dispatch = runtime
    .dispatch(&DispatchRequest::new("steps", json!({})))
    .unwrap()
    .unwrap();

  // All three synchronous entries ran before dispatch returned.
  assert!(dispatch.is_pending());
  assert!(dispatch.results().is_empty());
  assert_eq!(
    host.operations(),
    ["test/record", "test/record", "test/record", "test/wait"]
  );
  assert_eq!(host.calls()[3].1, json!([1, 2, 3]));

  tx.send(json!("done")).unwrap();
  assert_eq!(dispatch.wait().await.unwrap()[&0], json!("done"));
}

fn access_actions() -> Value {
  json!({
    "access": [{
      "action/ifElse": {
        "if": [{ "operator": "==", "operands": [{ "get/eventValue": "role" }, "admin"] }],
        "then": { "set/dataValue": { "name": "granted", "value": true } },
        "else": { "set/dataValue": { "name": "denied", "value": true } }
      }
    }],
    "optional": [{
      "action/ifElse": {
        "if": [{ "get/eventValue": "enabled" }],
        "then": { "test/record": "on" }
      }
    }]
  })
}

#[tokio::test]
async fn test_if_else_runs_selected_branch_only() {
  let host = Arc::new(ScriptHost::default());
  let (runtime, data) = setup(access_actions(), host.clone(), RuntimeOptions::default());
  let dispatch = runtime
    .dispatch(&DispatchRequest::new("access", json!({ "role": "admin" })))
    .unwrap()
    .unwrap();
  assert_eq!(dispatch.results()[&0], json!(true));
  assert_eq!(data.get("granted"), Some(json!(true)));
  assert_eq!(data.get("denied"), None);

  let (runtime, data) = setup(access_actions(), host.clone(), RuntimeOptions::default());
  runtime
    .dispatch(&DispatchRequest::new("access", json!({ "role": "guest" })))
    .unwrap()
    .unwrap();
  assert_eq!(data.get("granted"), None);
  assert_eq!(data.get("denied"), Some(json!(true)));
}

#[tokio::test]
async fn test_if_without_else_yields_null() {
  let host = Arc::new(ScriptHost::default());
  let (runtime, _) = setup(access_actions(), host.clone(), RuntimeOptions::default());

  let off = runtime
    .dispatch(&DispatchRequest::new("optional", json!({ "enabled": false })))
    .unwrap()
    .unwrap();
  assert_eq!(off.results()[&0], Value::Null);
  assert!(host.calls().is_empty());

  let on = runtime
    .dispatch(&DispatchRequest::new("optional", json!({ "enabled": true })))
    .unwrap()
    .unwrap();
  assert_eq!(on.results()[&0], json!("on"));
}

#[tokio::test]
async fn test_condition_operands_run_only_when_reached() {
  let actions = || {
    json!({
      "check": [{
        "action/ifElse": {
          "if": [
            { "operator": "==", "operands": [{ "get/eventValue": "level" }, 2] },
            { "operator": "==", "operands": [{ "test/record": "side-effect" }, "side-effect"] }
          ],
          "then": "yes",
          "else": "no"
        }
      }]
    })
  };

  let host = Arc::new(ScriptHost::default());
  let (runtime, _) = setup(actions(), host.clone(), RuntimeOptions::default());
  let dispatch = runtime
    .dispatch(&DispatchRequest::new("check", json!({ "level": 1 })))
    .unwrap()
    .unwrap();
  assert_eq!(dispatch.results()[&0], json!("no"));
  assert!(host.calls().is_empty());

  let host = Arc::new(ScriptHost::default());
  let (runtime, _) = setup(actions(), host.clone(), RuntimeOptions::default());
  let dispatch = runtime
    .dispatch(&DispatchRequest::new("check", json!({ "level": 2 })))
    .unwrap()
    .unwrap();
  assert_eq!(dispatch.results()[&0], json!("yes"));
  assert_eq!(host.operations(), ["test/record"]);
}

#[tokio::test]
async fn test_sequence_value_of_pending_sequence_fails() {
  let host = Arc::new(ScriptHost::default());
  let (runtime, _) = setup(
    json!({
      "chain": [
        { "test/wait": 1 },
        { "test/record": { "get/sequenceValue": 0 } }
      ]
    }),
    host.clone(),
    RuntimeOptions::default(),
  );

  let err = runtime
    .dispatch(&DispatchRequest::new("chain", json!({})))
    .unwrap_err();
  assert!(matches!(err, RuntimeError::UnresolvedSequence { sequence: 0 }));
  assert_eq!(host.operations(), ["test/wait"]);
}

#[test]
fn test_sequence_ref_to_async_sequence_does_not_compile() {
  let actions: BTreeMap<String, Vec<Value>> = serde_json::from_value(json!({
    "chain": [
      { "$id": "slow", "test/wait": 1 },
      { "test/record": { "$sequenceRef": "slow" } }
    ]
  }))
  .unwrap();
  assert!(compiler().build_catalog(&actions).is_err());
}

#[tokio::test]
async fn test_missing_action_policy() {
  let host = Arc::new(ScriptHost::default());
  let (permissive, _) = setup(json!({}), host.clone(), RuntimeOptions::default());
  assert!(
    permissive
      .dispatch(&DispatchRequest::new("nope", json!({})))
      .unwrap()
      .is_none()
  );

  let strict_options = RuntimeOptions {
    missing: MissingPolicy::Strict,
    ..RuntimeOptions::default()
  };
  let (strict, _) = setup(json!({}), host, strict_options);
  let err = strict
    .dispatch(&DispatchRequest::new("nope", json!({})))
    .unwrap_err();
  assert!(matches!(err, RuntimeError::MissingAction { ref id } if id == "nope"));
}

#[tokio::test]
async fn test_references_between_nodes_and_sequences() {
  let host = Arc::new(ScriptHost::default());
  let (runtime, _) = setup(
    json!({
      "chain": [
        { "$id": "first", "string/concat": [{ "$id": "name", "get/eventValue": "name" }, "-", { "$ref": "name" }] },
        { "string/concat": [{ "$sequenceRef": "first" }, "!"] }
      ]
    }),
    host,
    RuntimeOptions::default(),
  );

  let results = runtime
    .dispatch(&DispatchRequest::new("chain", json!({ "name": "Ada" })))
    .unwrap()
    .unwrap()
    .wait()
    .await
    .unwrap();

  assert_eq!(results[&0], json!("Ada-Ada"));
  assert_eq!(results[&1], json!("Ada-Ada!"));
}

#[tokio::test]
async fn test_action_values_and_legacy_keys() {
  let host = Arc::new(ScriptHost::default());
  let options = RuntimeOptions {
    keys_mode: KeysMode::LastSegment,
    ..RuntimeOptions::default()
  };
  let (runtime, _) = setup(
    json!({
      "shape": [
        { "map/actionValue": "greeting" },
        { "get/eventValue": { "$keys": { "who": "user.name" } } }
      ]
    }),
    host,
    options,
  );

  let request = DispatchRequest::new("shape", json!({ "user": { "name": "Ada" } }))
    .with_action_values(json!({ "greeting": "hi" }));
  let dispatch = runtime.dispatch(&request).unwrap().unwrap();

  assert_eq!(dispatch.results()[&0], json!("hi"));
  assert_eq!(dispatch.results()[&1], json!({ "name": "Ada" }));
}

#[tokio::test]
async fn test_operation_failure_aborts_dispatch() {
  let host = Arc::new(ScriptHost::default());
  let (runtime, _) = setup(
    json!({ "fails": [{ "test/fail": {} }, { "test/record": 1 }] }),
    host.clone(),
    RuntimeOptions::default(),
  );

  let err = runtime
    .dispatch(&DispatchRequest::new("fails", json!({})))
    .unwrap_err();
  assert!(matches!(err, RuntimeError::Operation { ref operation, .. } if operation == "test/fail"));
  assert_eq!(host.operations(), ["test/fail"]);
}

#[tokio::test]
async fn test_cancel_resolves_pending_terminal() {
  let (host, _tx) = ScriptHost::with_waiter();
  let (runtime, _) = setup(
    json!({ "slow": [{ "test/wait": 1 }] }),
    host,
    RuntimeOptions::default(),
  );

  let dispatch = runtime
    .dispatch(&DispatchRequest::new("slow", json!({})))
    .unwrap()
    .unwrap();
  dispatch.cancel();

  let outcomes = dispatch.settle().await;
  assert!(matches!(outcomes[&0], Err(RuntimeError::Cancelled)));
}

#[tokio::test]
async fn test_dropped_dispatch_abandons_pending_terminal() {
  let (host, tx) = ScriptHost::with_waiter();
  let (runtime, _) = setup(
    json!({ "slow": [{ "test/wait": 1 }] }),
    host,
    RuntimeOptions::default(),
  );

  let dispatch = runtime
    .dispatch(&DispatchRequest::new("slow", json!({})))
    .unwrap()
    .unwrap();
  assert!(dispatch.is_pending());
  drop(dispatch);

  assert!(tx.send(json!("late")).is_err());
}

#[tokio::test]
async fn test_notifier_receives_events() {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let actions: BTreeMap<String, Vec<Value>> =
    serde_json::from_value(json!({ "one": [{ "get/eventValue": "x" }] })).unwrap();
  let catalog = compiler().build_catalog(&actions).unwrap();
  let runtime = Runtime::with_notifier(
    Arc::new(catalog),
    Arc::new(ScriptHost::default()),
    Arc::new(MemoryDataStore::new()),
    RuntimeOptions::default(),
    ChannelNotifier::new(tx),
  );

  let dispatch = runtime
    .dispatch(&DispatchRequest::new("one", json!({ "x": 1 })))
    .unwrap()
    .unwrap();

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }

  assert_eq!(events.len(), 3);
  assert!(matches!(
    &events[0],
    DispatchEvent::DispatchStarted { dispatch_id, sequences: 1, .. } if dispatch_id == dispatch.dispatch_id()
  ));
  assert!(matches!(
    &events[1],
    DispatchEvent::SequenceCompleted { index: 0, data, .. } if *data == json!(1)
  ));
  assert!(matches!(&events[2], DispatchEvent::DispatchReturned { pending: 0, .. }));
}
