//! Heap object types.

pub(crate) mod class;
pub(crate) mod dict;
pub(crate) mod function;
pub(crate) mod generator;
pub(crate) mod host;
pub(crate) mod iter;
pub(crate) mod set;
pub(crate) mod str_bytes;

use indexmap::IndexMap;

use crate::value::Value;

/// Insertion-ordered `name -> value` storage for namespaces and instance attributes.
pub type AttrMap = IndexMap<String, Value, ahash::RandomState>;
