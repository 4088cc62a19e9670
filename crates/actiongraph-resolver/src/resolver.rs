use actiongraph_config::KeysMode;
use serde_json::{Map, Value};

use crate::error::ResolveError;
use crate::query::{Projection, Query};

/// Applies queries to values.
///
/// Resolution never fails once a query is parsed: absent keys yield `null`
/// and `$key` paths stop at the deepest segment that exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
  keys_mode: KeysMode,
}

impl Resolver {
  pub fn new(keys_mode: KeysMode) -> Self {
    Self { keys_mode }
  }

  pub fn keys_mode(&self) -> KeysMode {
    self.keys_mode
  }

  /// Parse `query` and resolve it against `value`.
  pub fn resolve_value(&self, value: &Value, query: &Value) -> Result<Value, ResolveError> {
    let query = Query::parse(query)?;
    Ok(self.resolve(value, &query))
  }

  pub fn resolve(&self, value: &Value, query: &Query) -> Value {
    match query {
      Query::Whole => value.clone(),
      Query::Key(key) => child(value, key).cloned().unwrap_or(Value::Null),
      Query::Path(path) => traverse(value, path).0.clone(),
      Query::Keys(pairs) => {
        let mut out = Map::new();
        for (output_key, path) in pairs {
          let (found, last) = traverse(value, path);
          let key = match self.keys_mode {
            KeysMode::OutputKey => output_key.clone(),
            KeysMode::LastSegment => match last {
              Some(segment) => segment.to_string(),
              None => continue,
            },
          };
          out.insert(key, found.clone());
        }
        Value::Object(out)
      }
      Query::Index { index, projection } => project(element(value, *index), projection.as_ref()),
      Query::Indexes(pairs) => Value::Array(
        pairs
          .iter()
          .map(|(index, projection)| project(element(value, *index), projection.as_ref()))
          .collect(),
      ),
      Query::KeyList(keys) => Value::Object(
        keys
          .iter()
          .map(|key| (key.clone(), child(value, key).cloned().unwrap_or(Value::Null)))
          .collect(),
      ),
    }
  }
}

fn child<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
  match value {
    Value::Object(map) => map.get(key),
    Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  }
}

fn element(value: &Value, index: usize) -> Option<&Value> {
  match value {
    Value::Array(items) => items.get(index),
    Value::Object(map) => map.get(&index.to_string()),
    _ => None,
  }
}

/// Walk `path` as far as it goes. Returns the deepest value reached and the
/// last segment that matched, if any.
fn traverse<'v, 'p>(value: &'v Value, path: &'p [String]) -> (&'v Value, Option<&'p str>) {
  let mut current = value;
  let mut last = None;
  for segment in path {
    match child(current, segment) {
      Some(next) => {
        current = next;
        last = Some(segment.as_str());
      }
      None => break,
    }
  }
  (current, last)
}

// Projections are strict: a key the element lacks projects to null.
fn lookup(value: &Value, path: &[String]) -> Value {
  path
    .iter()
    .try_fold(value, |current, segment| child(current, segment))
    .cloned()
    .unwrap_or(Value::Null)
}

fn project(element: Option<&Value>, projection: Option<&Projection>) -> Value {
  let Some(element) = element else {
    return Value::Null;
  };
  match projection {
    None => element.clone(),
    Some(Projection::Path(path)) => lookup(element, path),
    Some(Projection::Keys(keys)) => Value::Object(
      keys
        .iter()
        .map(|(written, path)| (written.clone(), lookup(element, path)))
        .collect(),
    ),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn resolve(value: Value, query: Value) -> Value {
    Resolver::default().resolve_value(&value, &query).unwrap()
  }

  #[test]
  fn test_null_query_returns_value() {
    let value = json!({ "a": 1 });
    assert_eq!(resolve(value.clone(), json!(null)), value);
  }

  #[test]
  fn test_plain_key() {
    assert_eq!(resolve(json!({ "name": "Ada" }), json!("name")), json!("Ada"));
    assert_eq!(resolve(json!(["x", "y"]), json!(1)), json!("y"));
    assert_eq!(resolve(json!({ "name": "Ada" }), json!("age")), Value::Null);
  }

  #[test]
  fn test_key_path_is_best_effort() {
    let value = json!({ "a": { "b": { "c": 3 } } });
    assert_eq!(resolve(value.clone(), json!({ "$key": "a.b.c" })), json!(3));
    assert_eq!(resolve(value.clone(), json!({ "$key": ["a", "b"] })), json!({ "c": 3 }));
    // Stops at `a.b` when `x` is absent.
    assert_eq!(resolve(value, json!({ "$key": "a.b.x.y" })), json!({ "c": 3 }));
  }

  #[test]
  fn test_keys_uses_output_key_by_default() {
    let value = json!({ "user": { "name": "Ada", "age": 36 } });
    let resolved = resolve(value, json!({ "$keys": { "who": "user.name", "years": "user.age" } }));
    assert_eq!(resolved, json!({ "who": "Ada", "years": 36 }));
  }

  #[test]
  fn test_keys_last_segment_mode() {
    let resolver = Resolver::new(KeysMode::LastSegment);
    let value = json!({ "user": { "name": "Ada", "age": 36 } });
    let query = json!({ "$keys": { "who": "user.name", "years": "user.age", "none": "missing" } });
    let resolved = resolver.resolve_value(&value, &query).unwrap();
    assert_eq!(resolved, json!({ "name": "Ada", "age": 36 }));
  }

  #[test]
  fn test_index_and_projection() {
    let value = json!([{ "id": 1, "tags": { "a": true } }, { "id": 2 }]);
    assert_eq!(resolve(value.clone(), json!({ "$index": [1] })), json!({ "id": 2 }));
    assert_eq!(resolve(value.clone(), json!({ "$index": [0, "tags.a"] })), json!(true));
    assert_eq!(
      resolve(value.clone(), json!({ "$index": [0, ["id", "tags.a"]] })),
      json!({ "id": 1, "tags.a": true })
    );
    assert_eq!(resolve(value.clone(), json!({ "$index": [1, "tags"] })), Value::Null);
    assert_eq!(resolve(value, json!({ "$index": [5] })), Value::Null);
  }

  #[test]
  fn test_indexes() {
    let value = json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]);
    assert_eq!(
      resolve(value, json!({ "$indexes": [[2, "id"], [0, "id"], [1]] })),
      json!([3, 1, { "id": 2 }])
    );
  }

  #[test]
  fn test_index_against_results_object() {
    let results = json!({ "0": "first", "1": "second" });
    assert_eq!(resolve(results, json!({ "$index": [1] })), json!("second"));
  }

  #[test]
  fn test_fallback_key_list() {
    let value = json!({ "a": 1, "b": 2, "c": 3 });
    assert_eq!(resolve(value, json!(["a", "c", "z"])), json!({ "a": 1, "c": 3, "z": null }));
  }
}
