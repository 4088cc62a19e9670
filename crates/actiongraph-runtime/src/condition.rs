//! Branch condition evaluation.
//!
//! A condition is a list of terms. Each term is `"&&"`, `"||"`, a
//! comparison `{ "operator": "==", "operands": [a, b] }` (also accepted as
//! `{ "name", "values" }`), or any other value, which is tested for
//! truthiness. Without connectives the terms are AND-ed, stopping at the
//! first false one.

use serde_json::Value;

use crate::error::HostError;
use crate::operators::{CompareTerm, OperatorEvaluator, truthy};

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTerm<'a> {
  And,
  Or,
  Comparison {
    operator: &'a str,
    operands: &'a [Value],
  },
  Truthy(&'a Value),
}

impl<'a> ConditionTerm<'a> {
  pub fn parse(value: &'a Value) -> Self {
    match value {
      Value::String(s) if s == "&&" => ConditionTerm::And,
      Value::String(s) if s == "||" => ConditionTerm::Or,
      Value::Object(map) => {
        let operator = map.get("operator").or_else(|| map.get("name")).and_then(Value::as_str);
        let operands = map
          .get("operands")
          .or_else(|| map.get("values"))
          .and_then(Value::as_array);
        match (operator, operands) {
          (Some(operator), Some(operands)) => ConditionTerm::Comparison { operator, operands },
          _ => ConditionTerm::Truthy(value),
        }
      }
      other => ConditionTerm::Truthy(other),
    }
  }

  fn is_connective(&self) -> bool {
    matches!(self, ConditionTerm::And | ConditionTerm::Or)
  }
}

/// Evaluate a list of materialized condition terms.
pub fn evaluate(terms: &[Value], operators: &dyn OperatorEvaluator) -> Result<bool, HostError> {
  evaluate_with(terms, |_, term| Ok(term.clone()), operators)
}

/// Evaluate condition terms whose operands are produced on demand.
///
/// `terms` may still hold placeholders for nested invocations; `materialize`
/// is called with each non-connective term's position just before that term
/// is checked. Without connectives no term after the first false one is
/// materialized.
pub fn evaluate_with<E: From<HostError>>(
  terms: &[Value],
  mut materialize: impl FnMut(usize, &Value) -> Result<Value, E>,
  operators: &dyn OperatorEvaluator,
) -> Result<bool, E> {
  let connectives = terms
    .iter()
    .any(|term| ConditionTerm::parse(term).is_connective());

  let mut reduced = Vec::with_capacity(terms.len());
  for (position, raw) in terms.iter().enumerate() {
    let passed = match ConditionTerm::parse(raw) {
      ConditionTerm::And => {
        reduced.push(CompareTerm::And);
        continue;
      }
      ConditionTerm::Or => {
        reduced.push(CompareTerm::Or);
        continue;
      }
      _ => {
        let value = materialize(position, raw)?;
        check(&ConditionTerm::parse(&value), operators)?
      }
    };
    if !connectives && !passed {
      return Ok(false);
    }
    reduced.push(CompareTerm::Value(passed));
  }

  if !connectives {
    return Ok(true);
  }
  Ok(operators.compare_terms(&reduced)?)
}

fn check(term: &ConditionTerm<'_>, operators: &dyn OperatorEvaluator) -> Result<bool, HostError> {
  match term {
    ConditionTerm::Comparison { operator, operands } => {
      Ok(truthy(&operators.eval_operator(operator, operands)?))
    }
    ConditionTerm::Truthy(value) => Ok(truthy(value)),
    ConditionTerm::And | ConditionTerm::Or => Ok(true),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::operators::StandardOperators;
  use serde_json::json;
  use std::sync::Mutex;

  /// Records every operator call before delegating.
  #[derive(Default)]
  struct Recording {
    calls: Mutex<Vec<String>>,
  }

  impl OperatorEvaluator for Recording {
    fn eval_operator(&self, name: &str, values: &[Value]) -> Result<Value, HostError> {
      self.calls.lock().unwrap().push(name.to_string());
      StandardOperators.eval_operator(name, values)
    }

    fn compare_terms(&self, terms: &[CompareTerm]) -> Result<bool, HostError> {
      StandardOperators.compare_terms(terms)
    }
  }

  fn terms(value: Value) -> Vec<Value> {
    value.as_array().cloned().unwrap()
  }

  #[test]
  fn test_parse_terms() {
    assert_eq!(ConditionTerm::parse(&json!("&&")), ConditionTerm::And);
    assert_eq!(ConditionTerm::parse(&json!("||")), ConditionTerm::Or);
    let value = json!({ "name": "==", "values": [1, 1] });
    assert!(matches!(
      ConditionTerm::parse(&value),
      ConditionTerm::Comparison { operator: "==", .. }
    ));
    let plain = json!("yes");
    assert_eq!(ConditionTerm::parse(&plain), ConditionTerm::Truthy(&plain));
  }

  #[test]
  fn test_empty_condition_is_true() {
    assert!(evaluate(&[], &StandardOperators).unwrap());
  }

  #[test]
  fn test_and_short_circuits_on_first_false() {
    let ops = Recording::default();
    let conditions = terms(json!([
      { "operator": "==", "operands": [1, 1] },
      { "operator": "!=", "operands": [1, 1] },
      { "operator": ">", "operands": [2, 1] }
    ]));

    assert!(!evaluate(&conditions, &ops).unwrap());
    assert_eq!(*ops.calls.lock().unwrap(), ["==", "!="]);
  }

  #[test]
  fn test_connectives_use_reducer() {
    let conditions = terms(json!([
      { "operator": "==", "operands": [1, 2] },
      "||",
      { "operator": "==", "operands": [2, 2] }
    ]));
    assert!(evaluate(&conditions, &StandardOperators).unwrap());
  }

  #[test]
  fn test_terms_after_first_false_are_not_materialized() {
    let conditions = terms(json!([
      { "operator": "==", "operands": [1, 2] },
      { "operator": "==", "operands": [{ "_$dv": 0 }, 1] }
    ]));
    let mut seen = Vec::new();

    let passed = evaluate_with(
      &conditions,
      |position, term| {
        seen.push(position);
        Ok::<_, HostError>(term.clone())
      },
      &StandardOperators,
    )
    .unwrap();

    assert!(!passed);
    assert_eq!(seen, [0]);
  }

  #[test]
  fn test_connectives_materialize_every_term() {
    let conditions = terms(json!([
      { "operator": "==", "operands": [1, 2] },
      "||",
      { "operator": "==", "operands": [2, 2] }
    ]));
    let mut seen = Vec::new();

    let passed = evaluate_with(
      &conditions,
      |position, term| {
        seen.push(position);
        Ok::<_, HostError>(term.clone())
      },
      &StandardOperators,
    )
    .unwrap();

    assert!(passed);
    assert_eq!(seen, [0, 2]);
  }

  #[test]
  fn test_unknown_operator_propagates() {
    let conditions = terms(json!([{ "operator": "===", "operands": [1, 1] }]));
    assert!(matches!(
      evaluate(&conditions, &StandardOperators),
      Err(HostError::UnknownOperator { .. })
    ));
  }
}
