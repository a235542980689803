//! Containers: hashing, truthiness, length, subscripts, membership and iteration.
//!
//! Builtin containers are handled natively. Instances of guest classes (and classes
//! whose metaclass is not `type`) go through their dunder methods.

use super::Vm;
use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    types::{dict::HashKey, generator::Flavor, iter::IterState, str_bytes::normalize_index},
    value::Value,
};

impl Vm {
    /// The structural hash key of a hashable value.
    ///
    /// Only `None`, numbers, `str`, `bytes`, tuples of hashables and frozensets are
    /// hashable.
    pub(crate) fn hash_key(&self, value: Value) -> RunResult<HashKey> {
        match value {
            Value::None => Ok(HashKey::None),
            Value::Bool(b) => Ok(HashKey::Int(i64::from(b))),
            Value::Int(i) => Ok(HashKey::Int(i)),
            Value::Float(f) => Ok(HashKey::from_float(f)),
            Value::Complex(c) if c.im == 0.0 => Ok(HashKey::from_float(c.re)),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => Ok(HashKey::Str(s.clone())),
                HeapData::Bytes(b) => Ok(HashKey::Bytes(b.clone())),
                HeapData::Tuple(items) => {
                    let keys = items.iter().map(|item| self.hash_key(*item)).collect::<RunResult<_>>()?;
                    Ok(HashKey::Tuple(keys))
                }
                HeapData::FrozenSet(set) => Ok(set.hash_key()),
                _ => Err(ExcType::unhashable(self.type_name(value))),
            },
            _ => Err(ExcType::unhashable(self.type_name(value))),
        }
    }

    /// `hash(value)`.
    pub fn hash_value(&self, value: Value) -> RunResult<i64> {
        Ok(self.hash_key(value)?.hash_i64())
    }

    /// `bool(value)`.
    pub fn truthy(&mut self, value: Value) -> RunResult<bool> {
        let id = match value {
            Value::Undefined | Value::None => return Ok(false),
            Value::NotImplemented => return Ok(true),
            Value::Bool(b) => return Ok(b),
            Value::Int(i) => return Ok(i != 0),
            Value::Float(f) => return Ok(f != 0.0),
            Value::Complex(c) => return Ok(c.re != 0.0 || c.im != 0.0),
            Value::Ref(id) => id,
        };
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(!s.is_empty()),
            HeapData::Bytes(b) => Ok(!b.is_empty()),
            HeapData::List(items) | HeapData::Tuple(items) => Ok(!items.is_empty()),
            HeapData::Dict(dict) => Ok(!dict.is_empty()),
            HeapData::Set(set) | HeapData::FrozenSet(set) => Ok(!set.is_empty()),
            HeapData::Range(range) => Ok(range.len() > 0),
            _ if self.uses_dunders(value) => {
                if let Some(result) = self.dispatch_dunder(value, "__bool__", &[])? {
                    return match result {
                        Value::Bool(b) => Ok(b),
                        other => Err(ExcType::type_error(format!(
                            "__bool__ should return bool, returned {}",
                            self.type_name(other)
                        ))),
                    };
                }
                if self.lookup_mro(self.type_of(value), "__len__").is_some() {
                    return Ok(self.len_of(value)? > 0);
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// `len(value)`.
    pub fn len_of(&mut self, value: Value) -> RunResult<usize> {
        if let Value::Ref(id) = value {
            match self.heap.get(id) {
                HeapData::Str(s) => return Ok(s.chars().count()),
                HeapData::Bytes(b) => return Ok(b.len()),
                HeapData::List(items) | HeapData::Tuple(items) => return Ok(items.len()),
                HeapData::Dict(dict) => return Ok(dict.len()),
                HeapData::Set(set) | HeapData::FrozenSet(set) => return Ok(set.len()),
                HeapData::Range(range) => return Ok(range.len()),
                _ if self.uses_dunders(value) => {
                    if let Some(result) = self.dispatch_dunder(value, "__len__", &[])? {
                        return match result.as_int() {
                            Some(n) if n >= 0 => Ok(n as usize),
                            Some(_) => Err(ExcType::value_error("__len__() should return >= 0")),
                            None => Err(ExcType::type_error(format!(
                                "'{}' object cannot be interpreted as an integer",
                                self.type_name(result)
                            ))),
                        };
                    }
                }
                _ => {}
            }
        }
        Err(ExcType::type_error(format!(
            "object of type '{}' has no len()",
            self.type_name(value)
        )))
    }

    /// `container[key]`.
    pub fn get_item(&mut self, container: Value, key: Value) -> RunResult<Value> {
        let Value::Ref(id) = container else {
            return Err(not_subscriptable(&self.type_name(container)));
        };
        match self.heap.get(id) {
            HeapData::List(items) | HeapData::Tuple(items) => {
                let index = self.sequence_index(container, key)?;
                let type_name = self.type_name(container);
                match normalize_index(index, items.len()) {
                    Some(i) => Ok(items[i]),
                    None => Err(ExcType::index_error(format!("{type_name} index out of range"))),
                }
            }
            HeapData::Str(s) => {
                let index = self.sequence_index(container, key)?;
                let len = s.chars().count();
                match normalize_index(index, len).and_then(|i| s.chars().nth(i)) {
                    Some(c) => self.new_str(c.to_string()),
                    None => Err(ExcType::index_error("string index out of range")),
                }
            }
            HeapData::Bytes(b) => {
                let index = self.sequence_index(container, key)?;
                match normalize_index(index, b.len()) {
                    Some(i) => Ok(Value::Int(i64::from(b[i]))),
                    None => Err(ExcType::index_error("index out of range")),
                }
            }
            HeapData::Range(range) => {
                let range = *range;
                let index = self.sequence_index(container, key)?;
                match normalize_index(index, range.len()) {
                    Some(i) => Ok(Value::Int(range.get(i))),
                    None => Err(ExcType::index_error("range object index out of range")),
                }
            }
            HeapData::Dict(dict) => {
                let hk = self.hash_key(key)?;
                match dict.get(&hk) {
                    Some(v) => Ok(v),
                    None => Err(ExcType::key_error(self.repr_of(key)?)),
                }
            }
            HeapData::Class(_) => self.class_get_item(id, key),
            _ if self.uses_dunders(container) => match self.dispatch_dunder(container, "__getitem__", &[key])? {
                Some(v) => Ok(v),
                None => Err(not_subscriptable(&self.type_name(container))),
            },
            _ => Err(not_subscriptable(&self.type_name(container))),
        }
    }

    /// `cls[key]`: the metaclass's `__getitem__`, then `__class_getitem__`.
    fn class_get_item(&mut self, cls: HeapId, key: Value) -> RunResult<Value> {
        let class = Value::Ref(cls);
        if self.uses_dunders(class)
            && let Some(v) = self.dispatch_dunder(class, "__getitem__", &[key])?
        {
            return Ok(v);
        }
        if let Some((hook, _)) = self.lookup_mro(cls, "__class_getitem__") {
            let hook = self.bind_for_class(hook, cls)?;
            return self.call(hook, ArgValues::one(key));
        }
        Err(ExcType::type_error(format!(
            "type '{}' is not subscriptable",
            self.class_display_name(cls)
        )))
    }

    fn sequence_index(&self, container: Value, key: Value) -> RunResult<i64> {
        key.as_int().ok_or_else(|| {
            ExcType::type_error(format!(
                "{} indices must be integers, not {}",
                self.type_name(container),
                self.type_name(key)
            ))
        })
    }

    /// `container[key] = value`.
    pub fn set_item(&mut self, container: Value, key: Value, value: Value) -> RunResult<()> {
        let Value::Ref(id) = container else {
            return Err(no_item_assignment(&self.type_name(container)));
        };
        match self.heap.get(id) {
            HeapData::List(items) => {
                let len = items.len();
                let index = self.sequence_index(container, key)?;
                let Some(i) = normalize_index(index, len) else {
                    return Err(ExcType::index_error("list assignment index out of range"));
                };
                if let HeapData::List(items) = self.heap.get_mut(id) {
                    items[i] = value;
                }
                Ok(())
            }
            HeapData::Dict(_) => {
                let hk = self.hash_key(key)?;
                if let HeapData::Dict(dict) = self.heap.get_mut(id) {
                    dict.insert(hk, key, value);
                }
                Ok(())
            }
            _ if self.uses_dunders(container) => match self.dispatch_dunder(container, "__setitem__", &[key, value])? {
                Some(_) => Ok(()),
                None => Err(no_item_assignment(&self.type_name(container))),
            },
            _ => Err(no_item_assignment(&self.type_name(container))),
        }
    }

    /// `del container[key]`.
    pub fn del_item(&mut self, container: Value, key: Value) -> RunResult<()> {
        let Value::Ref(id) = container else {
            return Err(no_item_deletion(&self.type_name(container)));
        };
        match self.heap.get(id) {
            HeapData::List(items) => {
                let len = items.len();
                let index = self.sequence_index(container, key)?;
                let Some(i) = normalize_index(index, len) else {
                    return Err(ExcType::index_error("list assignment index out of range"));
                };
                if let HeapData::List(items) = self.heap.get_mut(id) {
                    items.remove(i);
                }
                Ok(())
            }
            HeapData::Dict(_) => {
                let hk = self.hash_key(key)?;
                let removed = match self.heap.get_mut(id) {
                    HeapData::Dict(dict) => dict.remove(&hk).is_some(),
                    _ => false,
                };
                if removed {
                    Ok(())
                } else {
                    Err(ExcType::key_error(self.repr_of(key)?))
                }
            }
            _ if self.uses_dunders(container) => match self.dispatch_dunder(container, "__delitem__", &[key])? {
                Some(_) => Ok(()),
                None => Err(no_item_deletion(&self.type_name(container))),
            },
            _ => Err(no_item_deletion(&self.type_name(container))),
        }
    }

    /// `item in container`.
    pub fn contains(&mut self, container: Value, item: Value) -> RunResult<bool> {
        if let Value::Ref(id) = container {
            match self.heap.get(id) {
                HeapData::Str(haystack) => {
                    return match self.str_value(item) {
                        Some(needle) => Ok(haystack.contains(needle)),
                        None => Err(ExcType::type_error(format!(
                            "'in <string>' requires string as left operand, not {}",
                            self.type_name(item)
                        ))),
                    };
                }
                HeapData::Bytes(haystack) => {
                    if let Some(byte) = item.as_int() {
                        return Ok(u8::try_from(byte).is_ok_and(|b| haystack.contains(&b)));
                    }
                    if let Value::Ref(needle_id) = item
                        && let HeapData::Bytes(needle) = self.heap.get(needle_id)
                    {
                        return Ok(needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle.as_slice()));
                    }
                    return Err(ExcType::type_error("a bytes-like object is required"));
                }
                HeapData::List(items) | HeapData::Tuple(items) => {
                    let items = items.clone();
                    for candidate in items {
                        if candidate.is(item) || self.values_equal(candidate, item)? {
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }
                HeapData::Dict(dict) => {
                    let hk = self.hash_key(item)?;
                    return Ok(dict.contains(&hk));
                }
                HeapData::Set(set) | HeapData::FrozenSet(set) => {
                    let hk = self.hash_key(item)?;
                    return Ok(set.contains(&hk));
                }
                HeapData::Range(range) => {
                    let range = *range;
                    return Ok(item.as_int().is_some_and(|i| range.contains(i)));
                }
                _ if self.uses_dunders(container) => {
                    if let Some(result) = self.dispatch_dunder(container, "__contains__", &[item])? {
                        return self.truthy(result);
                    }
                }
                _ => {}
            }
        }
        let iterator = self.get_iter(container).map_err(|_| {
            ExcType::type_error(format!(
                "argument of type '{}' is not iterable",
                self.type_name(container)
            ))
        })?;
        while let Some(candidate) = self.next_value(iterator)? {
            if candidate.is(item) || self.values_equal(candidate, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn new_iterator(&mut self, state: IterState) -> RunResult<Value> {
        Ok(Value::Ref(self.alloc(HeapData::Iterator(state))?))
    }

    /// `iter(value)`.
    pub fn get_iter(&mut self, value: Value) -> RunResult<Value> {
        let Value::Ref(id) = value else {
            return Err(ExcType::not_iterable(self.type_name(value)));
        };
        let state = match self.heap.get(id) {
            HeapData::List(_) | HeapData::Tuple(_) => IterState::Sequence { source: id, index: 0 },
            HeapData::Str(_) => IterState::Chars { source: id, offset: 0 },
            HeapData::Bytes(_) => IterState::Bytes { source: id, index: 0 },
            HeapData::Dict(dict) => IterState::Snapshot {
                items: dict.keys(),
                index: 0,
            },
            HeapData::Set(set) | HeapData::FrozenSet(set) => IterState::Snapshot {
                items: set.values(),
                index: 0,
            },
            HeapData::Range(range) => IterState::Range {
                next: range.start,
                remaining: range.len(),
                step: range.step,
            },
            HeapData::Iterator(_) => return Ok(value),
            HeapData::Generator(g) if g.flavor == Flavor::Generator => return Ok(value),
            _ if self.uses_dunders(value) => {
                return match self.dispatch_dunder(value, "__iter__", &[])? {
                    Some(iterator) => Ok(iterator),
                    None => Err(ExcType::not_iterable(self.type_name(value))),
                };
            }
            _ => return Err(ExcType::not_iterable(self.type_name(value))),
        };
        self.new_iterator(state)
    }

    /// Wraps an iterator as `enumerate(iterator, start)`.
    pub(crate) fn new_enumerate(&mut self, inner: Value, start: i64) -> RunResult<Value> {
        self.new_iterator(IterState::Enumerate { inner, count: start })
    }

    pub(crate) fn new_zip(&mut self, inners: Vec<Value>) -> RunResult<Value> {
        self.new_iterator(IterState::Zip { inners })
    }

    pub(crate) fn new_snapshot_iter(&mut self, items: Vec<Value>) -> RunResult<Value> {
        self.new_iterator(IterState::Snapshot { items, index: 0 })
    }

    /// `next(iterator)`, with exhaustion reported as `None`.
    pub fn next_value(&mut self, iterator: Value) -> RunResult<Option<Value>> {
        let Value::Ref(id) = iterator else {
            return Err(not_an_iterator(&self.type_name(iterator)));
        };
        match self.heap.get(id) {
            HeapData::Iterator(state) => {
                let state = state.clone_shallow();
                self.advance_builtin(id, state)
            }
            HeapData::Generator(_) => self.generator_next(id),
            _ if self.uses_dunders(iterator) => {
                let cls = self.type_of(iterator);
                let Some((method, _)) = self.lookup_mro(cls, "__next__") else {
                    return Err(not_an_iterator(&self.type_name(iterator)));
                };
                let method = self.bind(method, iterator, cls)?;
                match self.call(method, ArgValues::empty()) {
                    Ok(v) => Ok(Some(v)),
                    Err(err) if self.error_matches(&err, ExcType::StopIteration) => Ok(None),
                    Err(err) => Err(err),
                }
            }
            _ => Err(not_an_iterator(&self.type_name(iterator))),
        }
    }

    fn advance_builtin(&mut self, id: HeapId, state: ShallowIter) -> RunResult<Option<Value>> {
        let next = match state {
            ShallowIter::Sequence { source, index } => {
                let item = match self.heap.get(source) {
                    HeapData::List(items) | HeapData::Tuple(items) => items.get(index).copied(),
                    _ => None,
                };
                if item.is_some() {
                    self.update_iter(id, |s| {
                        if let IterState::Sequence { index, .. } = s {
                            *index += 1;
                        }
                    });
                }
                item
            }
            ShallowIter::Chars { source, offset } => {
                let c = match self.heap.get(source) {
                    HeapData::Str(s) => s.get(offset..).and_then(|rest| rest.chars().next()),
                    _ => None,
                };
                match c {
                    Some(c) => {
                        self.update_iter(id, |s| {
                            if let IterState::Chars { offset, .. } = s {
                                *offset += c.len_utf8();
                            }
                        });
                        Some(self.new_str(c.to_string())?)
                    }
                    None => None,
                }
            }
            ShallowIter::Bytes { source, index } => {
                let byte = match self.heap.get(source) {
                    HeapData::Bytes(b) => b.get(index).copied(),
                    _ => None,
                };
                if byte.is_some() {
                    self.update_iter(id, |s| {
                        if let IterState::Bytes { index, .. } = s {
                            *index += 1;
                        }
                    });
                }
                byte.map(|b| Value::Int(i64::from(b)))
            }
            ShallowIter::Snapshot => {
                let mut next = None;
                self.update_iter(id, |s| {
                    if let IterState::Snapshot { items, index } = s
                        && let Some(item) = items.get(*index)
                    {
                        next = Some(*item);
                        *index += 1;
                    }
                });
                next
            }
            ShallowIter::Range => {
                let mut next = None;
                self.update_iter(id, |s| {
                    if let IterState::Range { next: n, remaining, step } = s
                        && *remaining > 0
                    {
                        next = Some(Value::Int(*n));
                        *n += *step;
                        *remaining -= 1;
                    }
                });
                next
            }
            ShallowIter::Enumerate { inner, count } => match self.next_value(inner)? {
                Some(item) => {
                    self.update_iter(id, |s| {
                        if let IterState::Enumerate { count, .. } = s {
                            *count += 1;
                        }
                    });
                    Some(self.new_tuple(vec![Value::Int(count), item])?)
                }
                None => None,
            },
            ShallowIter::Zip { inners } => {
                let mut items = Vec::with_capacity(inners.len());
                for inner in inners {
                    match self.next_value(inner)? {
                        Some(item) => items.push(item),
                        None => return Ok(None),
                    }
                }
                if items.is_empty() { None } else { Some(self.new_tuple(items)?) }
            }
        };
        Ok(next)
    }

    fn update_iter(&mut self, id: HeapId, f: impl FnOnce(&mut IterState)) {
        if let HeapData::Iterator(state) = self.heap.get_mut(id) {
            f(state);
        }
    }

    /// Drains an iterable into a vector.
    pub fn collect_iter(&mut self, iterable: Value) -> RunResult<Vec<Value>> {
        if let Value::Ref(id) = iterable
            && let HeapData::List(items) | HeapData::Tuple(items) = self.heap.get(id)
        {
            return Ok(items.clone());
        }
        let iterator = self.get_iter(iterable)?;
        let mut items = Vec::new();
        while let Some(item) = self.next_value(iterator)? {
            items.push(item);
        }
        Ok(items)
    }
}

/// Iterator state without the snapshot payload, so advancing does not copy it.
enum ShallowIter {
    Sequence { source: HeapId, index: usize },
    Chars { source: HeapId, offset: usize },
    Bytes { source: HeapId, index: usize },
    Snapshot,
    Range,
    Enumerate { inner: Value, count: i64 },
    Zip { inners: Vec<Value> },
}

impl IterState {
    fn clone_shallow(&self) -> ShallowIter {
        match self {
            Self::Sequence { source, index } => ShallowIter::Sequence {
                source: *source,
                index: *index,
            },
            Self::Chars { source, offset } => ShallowIter::Chars {
                source: *source,
                offset: *offset,
            },
            Self::Bytes { source, index } => ShallowIter::Bytes {
                source: *source,
                index: *index,
            },
            Self::Snapshot { .. } => ShallowIter::Snapshot,
            Self::Range { .. } => ShallowIter::Range,
            Self::Enumerate { inner, count } => ShallowIter::Enumerate {
                inner: *inner,
                count: *count,
            },
            Self::Zip { inners } => ShallowIter::Zip { inners: inners.clone() },
        }
    }
}

fn not_subscriptable(type_name: &str) -> crate::exception::RunError {
    ExcType::type_error(format!("'{type_name}' object is not subscriptable"))
}

fn no_item_assignment(type_name: &str) -> crate::exception::RunError {
    ExcType::type_error(format!("'{type_name}' object does not support item assignment"))
}

fn no_item_deletion(type_name: &str) -> crate::exception::RunError {
    ExcType::type_error(format!("'{type_name}' object doesn't support item deletion"))
}

fn not_an_iterator(type_name: &str) -> crate::exception::RunError {
    ExcType::type_error(format!("'{type_name}' object is not an iterator"))
}
