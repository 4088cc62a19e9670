use serde_json::Value;

use crate::error::ResolveError;

/// A parsed query descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
  /// `null`: the whole value.
  Whole,
  /// A plain key or array index.
  Key(String),
  /// `$key`: a dotted path, traversed best-effort.
  Path(Vec<String>),
  /// `$keys`: `(output key, path)` pairs.
  Keys(Vec<(String, Vec<String>)>),
  /// `$index`: one element, optionally projected.
  Index {
    index: usize,
    projection: Option<Projection>,
  },
  /// `$indexes`: several elements, each optionally projected.
  Indexes(Vec<(usize, Option<Projection>)>),
  /// Fallback for unrecognised shapes: build an object of these keys.
  KeyList(Vec<String>),
}

/// The part of an element selected by `$index`/`$indexes`.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
  /// A single (dotted) key: the element's value at that path.
  Path(Vec<String>),
  /// Several keys: an object keyed by each key as written.
  Keys(Vec<(String, Vec<String>)>),
}

impl Query {
  pub fn parse(query: &Value) -> Result<Self, ResolveError> {
    match query {
      Value::Null => Ok(Query::Whole),
      Value::String(key) => Ok(Query::Key(key.clone())),
      Value::Number(n) => Ok(Query::Key(n.to_string())),
      Value::Bool(b) => Ok(Query::Key(b.to_string())),
      Value::Array(items) => Ok(Query::KeyList(items.iter().filter_map(key_string).collect())),
      Value::Object(map) => {
        if let Some(path) = map.get("$key") {
          return Ok(Query::Path(parse_path("$key", path)?));
        }

        if let Some(keys) = map.get("$keys") {
          let keys = keys
            .as_object()
            .ok_or_else(|| ResolveError::malformed("$keys", "expected an object"))?;
          let pairs = keys
            .iter()
            .map(|(out, path)| Ok((out.clone(), parse_path("$keys", path)?)))
            .collect::<Result<Vec<_>, ResolveError>>()?;
          return Ok(Query::Keys(pairs));
        }

        if let Some(index) = map.get("$index") {
          let (index, projection) = parse_index("$index", index)?;
          return Ok(Query::Index { index, projection });
        }

        if let Some(pairs) = map.get("$indexes") {
          let pairs = pairs
            .as_array()
            .ok_or_else(|| ResolveError::malformed("$indexes", "expected a list of [index, key]"))?
            .iter()
            .map(|pair| parse_index("$indexes", pair))
            .collect::<Result<Vec<_>, ResolveError>>()?;
          return Ok(Query::Indexes(pairs));
        }

        Ok(Query::KeyList(map.keys().cloned().collect()))
      }
    }
  }
}

fn key_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn parse_path(marker: &'static str, value: &Value) -> Result<Vec<String>, ResolveError> {
  match value {
    Value::String(path) => Ok(path.split('.').map(str::to_string).collect()),
    Value::Number(n) => Ok(vec![n.to_string()]),
    Value::Array(segments) => segments
      .iter()
      .map(|segment| {
        key_string(segment)
          .ok_or_else(|| ResolveError::malformed(marker, "path segments must be strings or numbers"))
      })
      .collect(),
    _ => Err(ResolveError::malformed(marker, "expected a dotted path or a list of keys")),
  }
}

fn parse_index(
  marker: &'static str,
  value: &Value,
) -> Result<(usize, Option<Projection>), ResolveError> {
  let (index, keys) = match value {
    Value::Array(items) => match items.as_slice() {
      [index] => (index, None),
      [index, keys] => (index, Some(keys)),
      _ => return Err(ResolveError::malformed(marker, "expected [index] or [index, keys]")),
    },
    index => (index, None),
  };

  let index = match index {
    Value::Number(n) => n.as_u64().and_then(|i| usize::try_from(i).ok()),
    Value::String(s) => s.parse::<usize>().ok(),
    _ => None,
  }
  .ok_or_else(|| ResolveError::malformed(marker, "index must be a non-negative integer"))?;

  let projection = match keys {
    None | Some(Value::Null) => None,
    Some(Value::Array(keys)) => Some(Projection::Keys(
      keys
        .iter()
        .map(|key| {
          let written = key_string(key)
            .ok_or_else(|| ResolveError::malformed(marker, "keys must be strings or numbers"))?;
          let path = parse_path(marker, key)?;
          Ok((written, path))
        })
        .collect::<Result<Vec<_>, ResolveError>>()?,
    )),
    Some(key) => Some(Projection::Path(parse_path(marker, key)?)),
  };

  Ok((index, projection))
}
