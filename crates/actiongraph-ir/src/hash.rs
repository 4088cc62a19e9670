//! Content hashing for instructions and sequences.
//!
//! Values are canonicalized (object keys sorted recursively) and hashed with
//! SHA-256. The hash is the identity of an instruction: two instructions with
//! the same hash are treated as the same instruction. SHA-256 keeps
//! accidental collisions out of reach, so deduplication stays sound even when
//! templates come from several authors.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix carried by every content hash.
pub const HASH_PREFIX: &str = "sha256:";

/// Hash an arbitrary JSON value.
///
/// Object key order does not affect the result.
pub fn hash_value(value: &Value) -> String {
  let mut hasher = Sha256::new();
  write_canonical(value, &mut hasher);
  format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize()))
}

fn write_canonical(value: &Value, hasher: &mut Sha256) {
  match value {
    Value::Object(map) => {
      let sorted: BTreeMap<&String, &Value> = map.iter().collect();
      hasher.update(b"{");
      for (i, (key, item)) in sorted.into_iter().enumerate() {
        if i > 0 {
          hasher.update(b",");
        }
        hasher.update(Value::String(key.clone()).to_string().as_bytes());
        hasher.update(b":");
        write_canonical(item, hasher);
      }
      hasher.update(b"}");
    }
    Value::Array(items) => {
      hasher.update(b"[");
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          hasher.update(b",");
        }
        write_canonical(item, hasher);
      }
      hasher.update(b"]");
    }
    scalar => hasher.update(scalar.to_string().as_bytes()),
  }
}
