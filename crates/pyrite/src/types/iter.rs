//! Builtin iterator state and `range`.

use super::function::push_values;
use crate::{heap::HeapId, value::Value};

/// `range(start, stop, step)`; `step` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (lo, hi, step) = if self.step > 0 {
            (self.start, self.stop, self.step)
        } else {
            (self.stop, self.start, -self.step)
        };
        if lo >= hi {
            0
        } else {
            ((hi - lo - 1) / step + 1) as usize
        }
    }

    pub fn get(&self, index: usize) -> i64 {
        self.start + self.step * index as i64
    }

    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= value && value < self.stop
        } else {
            self.stop < value && value <= self.start
        };
        in_bounds && (value - self.start) % self.step == 0
    }
}

/// State of a builtin iterator object.
#[derive(Debug, Clone)]
pub(crate) enum IterState {
    /// Live iteration over a list or tuple; a list growing during iteration is observed.
    Sequence { source: HeapId, index: usize },
    /// Characters of an immutable string, tracked by byte offset.
    Chars { source: HeapId, offset: usize },
    Bytes { source: HeapId, index: usize },
    /// Values copied when iteration started (dict keys, set members).
    Snapshot { items: Vec<Value>, index: usize },
    Range { next: i64, remaining: usize, step: i64 },
    Enumerate { inner: Value, count: i64 },
    Zip { inners: Vec<Value> },
}

impl IterState {
    pub fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        match self {
            Self::Sequence { source, .. } | Self::Chars { source, .. } | Self::Bytes { source, .. } => {
                out.push(*source);
            }
            Self::Snapshot { items, .. } => push_values(out, items.iter().copied()),
            Self::Range { .. } => {}
            Self::Enumerate { inner, .. } => push_values(out, [*inner]),
            Self::Zip { inners } => push_values(out, inners.iter().copied()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_length_and_membership() {
        let r = Range { start: 0, stop: 10, step: 3 };
        assert_eq!(r.len(), 4);
        assert!(r.contains(9));
        assert!(!r.contains(10));
        let down = Range { start: 5, stop: 0, step: -2 };
        assert_eq!(down.len(), 3);
        assert_eq!(down.get(2), 1);
        assert!(down.contains(3));
        assert_eq!(Range { start: 3, stop: 3, step: 1 }.len(), 0);
    }
}
