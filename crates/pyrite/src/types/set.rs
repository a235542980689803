use indexmap::IndexMap;

use super::dict::HashKey;
use crate::value::Value;

/// Storage shared by `set` and `frozenset`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Set {
    members: IndexMap<HashKey, Value, ahash::RandomState>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, key: &HashKey) -> bool {
        self.members.contains_key(key)
    }

    /// Adds a member; returns false when it was already present.
    pub fn add(&mut self, key: HashKey, value: Value) -> bool {
        if self.members.contains_key(&key) {
            return false;
        }
        self.members.insert(key, value);
        true
    }

    pub fn remove(&mut self, key: &HashKey) -> Option<Value> {
        self.members.shift_remove(key)
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.members.shift_remove_index(0).map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn values(&self) -> Vec<Value> {
        self.members.values().copied().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&HashKey, &Value)> {
        self.members.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &HashKey> {
        self.members.keys()
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.keys().all(|k| other.contains(k))
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (k, v) in other.entries() {
            result.add(k.clone(), *v);
        }
        result
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for (k, v) in self.entries() {
            if other.contains(k) {
                result.add(k.clone(), *v);
            }
        }
        result
    }

    pub fn difference(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for (k, v) in self.entries() {
            if !other.contains(k) {
                result.add(k.clone(), *v);
            }
        }
        result
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let mut result = self.difference(other);
        for (k, v) in other.entries() {
            if !self.contains(k) {
                result.add(k.clone(), *v);
            }
        }
        result
    }

    /// The frozenset hash key of this set's members.
    pub fn hash_key(&self) -> HashKey {
        HashKey::frozenset(self.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(items: &[i64]) -> Set {
        let mut set = Set::new();
        for &i in items {
            set.add(HashKey::Int(i), Value::Int(i));
        }
        set
    }

    #[test]
    fn algebra() {
        let a = set_of(&[1, 2, 3]);
        let b = set_of(&[2, 3, 4]);
        assert_eq!(a.union(&b).len(), 4);
        assert_eq!(a.intersection(&b).len(), 2);
        assert_eq!(a.difference(&b).len(), 1);
        assert_eq!(a.symmetric_difference(&b).len(), 2);
        assert!(set_of(&[2]).is_subset(&a));
        assert!(!a.is_subset(&b));
    }
}
