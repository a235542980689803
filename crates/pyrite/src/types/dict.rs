//! Insertion-ordered dictionaries keyed by structural hash keys.

use std::hash::{DefaultHasher, Hash, Hasher};

use indexmap::IndexMap;

use crate::value::Value;

/// The structural form of a hashable value.
///
/// Dict keys and set members are stored under their `HashKey` so lookups do not need
/// the heap. Numbers are normalized so that `1`, `1.0` and `True` are the same key, as
/// in Python.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum HashKey {
    None,
    Int(i64),
    /// A non-integral float, stored by bit pattern.
    Float(u64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<HashKey>),
    /// Members sorted, so that equal frozensets produce equal keys.
    FrozenSet(Vec<HashKey>),
}

impl HashKey {
    pub fn from_float(f: f64) -> Self {
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Self::Int(f as i64)
        } else {
            Self::Float(f.to_bits())
        }
    }

    pub fn frozenset(mut members: Vec<Self>) -> Self {
        members.sort();
        members.dedup();
        Self::FrozenSet(members)
    }

    /// Python-style `hash()` result.
    ///
    /// Integers hash to themselves (`-1` is reserved, as in CPython); everything else goes
    /// through `DefaultHasher`, which is deterministic within a process.
    pub fn hash_i64(&self) -> i64 {
        match self {
            Self::Int(-1) => -2,
            Self::Int(i) => *i,
            other => {
                let mut hasher = DefaultHasher::new();
                other.hash(&mut hasher);
                match hasher.finish() as i64 {
                    -1 => -2,
                    h => h,
                }
            }
        }
    }
}

/// A guest `dict`.
///
/// Entries keep the original key value next to the value so iteration returns the
/// object that was inserted (e.g. `True` rather than `1`).
#[derive(Debug, Clone, Default)]
pub(crate) struct Dict {
    entries: IndexMap<HashKey, (Value, Value), ahash::RandomState>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &HashKey) -> Option<Value> {
        self.entries.get(key).map(|(_, v)| *v)
    }

    pub fn contains(&self, key: &HashKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces, returning the previous value. An existing key keeps its
    /// original key object and position.
    pub fn insert(&mut self, hash_key: HashKey, key: Value, value: Value) -> Option<Value> {
        if let Some(entry) = self.entries.get_mut(&hash_key) {
            return Some(std::mem::replace(&mut entry.1, value));
        }
        self.entries.insert(hash_key, (key, value));
        None
    }

    /// Removes a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &HashKey) -> Option<(Value, Value)> {
        self.entries.shift_remove(key)
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        self.entries.pop().map(|(_, pair)| pair)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries.values().copied()
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| *k).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| *v).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.iter().collect()
    }

    pub fn hash_keys(&self) -> impl Iterator<Item = &HashKey> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_collapse() {
        assert_eq!(HashKey::from_float(1.0), HashKey::Int(1));
        assert_ne!(HashKey::from_float(1.5), HashKey::Int(1));
        assert_eq!(HashKey::Int(1).hash_i64(), HashKey::from_float(1.0).hash_i64());
        assert_eq!(HashKey::Int(-1).hash_i64(), -2);
    }

    #[test]
    fn frozenset_keys_ignore_order() {
        let a = HashKey::frozenset(vec![HashKey::Int(2), HashKey::Int(1)]);
        let b = HashKey::frozenset(vec![HashKey::Int(1), HashKey::Int(2), HashKey::Int(1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn insert_keeps_first_key_and_position() {
        let mut dict = Dict::new();
        dict.insert(HashKey::Int(1), Value::Bool(true), Value::Int(10));
        dict.insert(HashKey::Str("b".to_owned()), Value::None, Value::Int(20));
        let previous = dict.insert(HashKey::Int(1), Value::Int(1), Value::Int(30));
        assert!(matches!(previous, Some(Value::Int(10))));
        let items = dict.items();
        assert!(matches!(items[0], (Value::Bool(true), Value::Int(30))));
        assert_eq!(dict.len(), 2);
    }
}
