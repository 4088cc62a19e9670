//! Actiongraph Resolver
//!
//! Extracts sub-values from a JSON value according to a query descriptor.
//! Used by the interpreter to read from the dispatch payload, from earlier
//! sequence results and from the data store.
//!
//! # Queries
//!
//! | Query | Result |
//! |---|---|
//! | `null` | the value itself |
//! | `"key"` / `3` | `value[key]` |
//! | `{ "$key": "a.b.c" }` | best-effort path traversal |
//! | `{ "$keys": { "out": "a.b" } }` | object of several traversals |
//! | `{ "$index": [2, "name"] }` | element 2, optionally projected |
//! | `{ "$indexes": [[0, "a"], [1, "b"]] }` | list of element projections |
//! | `["a", "b"]` | `{ "a": value.a, "b": value.b }` |

mod error;
mod query;
mod resolver;

pub use error::ResolveError;
pub use query::{Projection, Query};
pub use resolver::Resolver;
