//! Operator evaluation for branch conditions.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::HostError;

/// One element of a reduced condition: a comparison outcome or a
/// connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareTerm {
  Value(bool),
  And,
  Or,
}

/// Evaluates operators and reduces comparison chains.
pub trait OperatorEvaluator: Send + Sync {
  fn eval_operator(&self, name: &str, values: &[Value]) -> Result<Value, HostError>;

  fn compare_terms(&self, terms: &[CompareTerm]) -> Result<bool, HostError>;
}

/// The default operator set.
///
/// `&&`/`||` chains are applied strictly left to right:
/// `a || b && c` is `(a || b) && c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOperators;

impl OperatorEvaluator for StandardOperators {
  fn eval_operator(&self, name: &str, values: &[Value]) -> Result<Value, HostError> {
    match name {
      "==" => binary(name, values, |a, b| Ok(Value::Bool(loose_eq(a, b)))),
      "!=" => binary(name, values, |a, b| Ok(Value::Bool(!loose_eq(a, b)))),
      ">" => ordered(name, values, Ordering::is_gt),
      ">=" => ordered(name, values, Ordering::is_ge),
      "<" => ordered(name, values, Ordering::is_lt),
      "<=" => ordered(name, values, Ordering::is_le),
      "!" => unary(name, values, |v| Value::Bool(!truthy(v))),
      "!!" => unary(name, values, |v| Value::Bool(truthy(v))),
      "~" => binary(name, values, |a, b| Ok(Value::Bool(contains(a, b)))),
      "%" => binary(name, values, |a, b| {
        let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
          return Err(HostError::invalid_arguments("'%' expects two numbers"));
        };
        if b == 0.0 {
          return Err(HostError::invalid_arguments("'%' by zero"));
        }
        Ok(number(a % b))
      }),
      _ => Err(HostError::UnknownOperator {
        name: name.to_string(),
      }),
    }
  }

  fn compare_terms(&self, terms: &[CompareTerm]) -> Result<bool, HostError> {
    let mut iter = terms.iter();
    let mut acc = match iter.next() {
      Some(CompareTerm::Value(value)) => *value,
      _ => return Err(HostError::invalid_arguments("condition must start with a comparison")),
    };

    while let Some(connective) = iter.next() {
      let Some(CompareTerm::Value(rhs)) = iter.next() else {
        return Err(HostError::invalid_arguments("connective without a right-hand comparison"));
      };
      acc = match connective {
        CompareTerm::And => acc && *rhs,
        CompareTerm::Or => acc || *rhs,
        CompareTerm::Value(_) => {
          return Err(HostError::invalid_arguments("comparisons must be joined by '&&' or '||'"));
        }
      };
    }

    Ok(acc)
  }
}

/// JavaScript-style truthiness.
pub fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

fn unary(
  name: &str,
  values: &[Value],
  op: impl FnOnce(&Value) -> Value,
) -> Result<Value, HostError> {
  match values {
    [value] => Ok(op(value)),
    _ => Err(HostError::invalid_arguments(format!("'{}' expects one operand", name))),
  }
}

fn binary(
  name: &str,
  values: &[Value],
  op: impl FnOnce(&Value, &Value) -> Result<Value, HostError>,
) -> Result<Value, HostError> {
  match values {
    [a, b] => op(a, b),
    _ => Err(HostError::invalid_arguments(format!("'{}' expects two operands", name))),
  }
}

fn ordered(
  name: &str,
  values: &[Value],
  test: impl FnOnce(Ordering) -> bool,
) -> Result<Value, HostError> {
  binary(name, values, |a, b| {
    let ordering = match (a, b) {
      (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
      (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
      _ => None,
    }
    .ok_or_else(|| {
      HostError::invalid_arguments(format!("'{}' compares two numbers or two strings", name))
    })?;
    Ok(Value::Bool(test(ordering)))
  })
}

fn loose_eq(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
    _ => a == b,
  }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
  match haystack {
    Value::String(s) => needle.as_str().is_some_and(|needle| s.contains(needle)),
    Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
    Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
    _ => false,
  }
}

fn number(value: f64) -> Value {
  if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
    Value::from(value as i64)
  } else {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
  }
}
