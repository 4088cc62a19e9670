//! Compilation properties checked across whole templates.

use actiongraph_compiler::{Compiler, OperationSet};
use actiongraph_config::OperationDef;
use actiongraph_ir::{Catalog, validate_sequence};
use serde_json::{Value, json};

fn compiler() -> Compiler {
  Compiler::new(OperationSet::with_operations([
    OperationDef::sync("string/concat"),
    OperationDef::sync("json/merge"),
  ]))
}

fn profile_template() -> Value {
  json!({
    "set/dataValue": {
      "name": "profile",
      "value": {
        "json/merge": [
          { "name": { "get/eventValue": { "$key": "user.name" } } },
          {
            "greeting": {
              "string/concat": ["hi ", { "get/eventValue": { "$key": "user.name" } }]
            }
          },
          { "previous": { "get/dataValue": "profile" } }
        ]
      }
    }
  })
}

#[test]
fn test_compilation_is_idempotent() {
  let first = compiler().compile(&profile_template()).unwrap().unwrap();
  let second = compiler().compile(&profile_template()).unwrap().unwrap();

  assert_eq!(first.sequence_id, second.sequence_id);
  assert_eq!(first.sequence, second.sequence);
  assert_eq!(
    first.instructions.keys().collect::<Vec<_>>(),
    second.instructions.keys().collect::<Vec<_>>()
  );
}

#[test]
fn test_identical_invocations_are_stored_once() {
  let result = compiler().compile(&profile_template()).unwrap().unwrap();

  // Both `get/eventValue` lookups of user.name collapse into one instruction.
  assert_eq!(result.sequence.len(), 6);
  assert_eq!(result.instructions.len(), 5);
  assert_eq!(result.sequence[0].id, result.sequence[1].id);
}

#[test]
fn test_shared_invocation_across_templates() {
  let compiler = compiler();
  let catalog = Catalog::new();

  let greet = json!({
    "set/dataValue": { "name": "greeting", "value": { "get/eventValue": "name" } }
  });
  let shout = json!({
    "string/concat": [{ "get/eventValue": "name" }, "!"]
  });

  let greet_ids = compiler.register_action(&catalog, "greet", &[greet]).unwrap();
  let shout_ids = compiler.register_action(&catalog, "shout", &[shout]).unwrap();

  let greet_seq = catalog.sequence(&greet_ids[0]).unwrap();
  let shout_seq = catalog.sequence(&shout_ids[0]).unwrap();
  assert_eq!(greet_seq[0].id, shout_seq[0].id);

  // get/eventValue, set/dataValue, string/concat
  assert_eq!(catalog.instructions().len(), 3);
}

#[test]
fn test_children_always_precede_their_parent() {
  let template = json!({
    "action/ifElse": {
      "if": [
        { "operator": ">", "operands": [{ "get/dataValue": "count" }, 3] },
        "&&",
        { "operator": "!=", "operands": [{ "get/eventValue": "kind" }, "bot"] }
      ],
      "then": {
        "set/dataValue": {
          "name": "summary",
          "value": { "string/concat": [{ "get/dataValue": "count" }, " items"] }
        }
      },
      "else": { "get/sequenceValue": 0 }
    }
  });
  let result = compiler().compile(&template).unwrap().unwrap();

  for (index, entry) in result.sequence.iter().enumerate() {
    for child in &entry.children {
      assert!(*child < index, "entry {index} has child {child}");
    }
  }
  assert!(validate_sequence(&result.sequence).is_ok());

  let terminal = result.sequence.last().unwrap();
  assert_eq!(terminal.path, ["action/ifElse"]);
  assert_eq!(terminal.children.len(), 4);
}

#[test]
fn test_different_templates_have_different_sequence_ids() {
  let a = compiler()
    .compile(&json!({ "get/eventValue": "a" }))
    .unwrap()
    .unwrap();
  let b = compiler()
    .compile(&json!({ "get/eventValue": "b" }))
    .unwrap()
    .unwrap();
  assert_ne!(a.sequence_id, b.sequence_id);
}
