//! The heap arena.
//!
//! Every non-immediate value lives in a slot of [`Heap`] and is addressed by a
//! [`HeapId`]. Freed slots go onto a free list and are reused by later allocations.
//! Values never count references: the VM runs a mark-sweep collection
//! ([`Heap::collect_garbage`]) from an explicit root set, at points where no frame is
//! executing on the Rust stack.

use std::{collections::BTreeMap, fmt};

use crate::{
    types::{
        class::{ClassObject, Instance, Module},
        dict::Dict,
        function::{BoundMethod, Function, NativeFunction, Property, SuperProxy, push_values},
        generator::Generator,
        host::HostData,
        iter::{IterState, Range},
        set::Set,
    },
    value::Value,
};

/// Index of a heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(usize);

impl HeapId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw slot index, stable for the lifetime of the object. Exposed as `id()` to guest code.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Contents of a heap slot.
#[derive(Debug)]
pub(crate) enum HeapData {
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Dict),
    Set(Set),
    FrozenSet(Set),
    Function(Function),
    NativeFunction(NativeFunction),
    BoundMethod(BoundMethod),
    Class(ClassObject),
    Instance(Instance),
    Module(Module),
    HostExtension(Box<dyn HostData>),
    Cell(Value),
    Property(Property),
    ClassMethod(Value),
    StaticMethod(Value),
    Generator(Generator),
    Range(Range),
    Iterator(IterState),
    Super(SuperProxy),
}

impl HeapData {
    /// Variant name used in heap statistics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::FrozenSet(_) => "frozenset",
            Self::Function(_) => "function",
            Self::NativeFunction(_) => "builtin_function",
            Self::BoundMethod(_) => "method",
            Self::Class(_) => "type",
            Self::Instance(_) => "instance",
            Self::Module(_) => "module",
            Self::HostExtension(_) => "host_extension",
            Self::Cell(_) => "cell",
            Self::Property(_) => "property",
            Self::ClassMethod(_) => "classmethod",
            Self::StaticMethod(_) => "staticmethod",
            Self::Generator(_) => "generator",
            Self::Range(_) => "range",
            Self::Iterator(_) => "iterator",
            Self::Super(_) => "super",
        }
    }

    /// Pushes every heap id directly referenced by this object.
    pub fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        match self {
            Self::Str(_) | Self::Bytes(_) | Self::NativeFunction(_) | Self::Range(_) => {}
            Self::List(items) | Self::Tuple(items) => push_values(out, items.iter().copied()),
            Self::Dict(dict) => {
                for (k, v) in dict.iter() {
                    push_values(out, [k, v]);
                }
            }
            Self::Set(set) | Self::FrozenSet(set) => push_values(out, set.values()),
            Self::Function(func) => func.collect_child_ids(out),
            Self::BoundMethod(bm) => push_values(out, [bm.receiver, bm.function]),
            Self::Class(cls) => cls.collect_child_ids(out),
            Self::Instance(inst) => {
                out.push(inst.class_id);
                push_values(out, inst.attrs.values().copied());
            }
            Self::Module(module) => push_values(out, module.attrs.values().copied()),
            Self::HostExtension(data) => push_values(out, data.child_values()),
            Self::Cell(v) | Self::ClassMethod(v) | Self::StaticMethod(v) => push_values(out, [*v]),
            Self::Property(prop) => push_values(out, [prop.fget, prop.fset, prop.fdel]),
            Self::Generator(generator) => generator.collect_child_ids(out),
            Self::Iterator(state) => state.collect_child_ids(out),
            Self::Super(proxy) => {
                out.push(proxy.this_class);
                push_values(out, [proxy.object]);
            }
        }
    }
}

/// Live object counts, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub live_objects: usize,
    pub free_slots: usize,
    pub by_kind: BTreeMap<&'static str, usize>,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} live objects, {} free slots", self.live_objects, self.free_slots)?;
        for (kind, count) in &self.by_kind {
            write!(f, "\n  {kind}: {count}")?;
        }
        Ok(())
    }
}

/// Slot arena holding all heap objects of one VM.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    entries: Vec<Option<HeapData>>,
    free_list: Vec<HeapId>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        if let Some(id) = self.free_list.pop() {
            self.entries[id.0] = Some(data);
            id
        } else {
            self.entries.push(Some(data));
            HeapId(self.entries.len() - 1)
        }
    }

    /// Returns the object in slot `id`.
    ///
    /// # Panics
    /// When the slot was freed; live values never refer to freed slots.
    #[inline]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.0)
            .and_then(Option::as_ref)
            .expect("Heap::get: slot already freed")
    }

    #[inline]
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .expect("Heap::get_mut: slot already freed")
    }

    pub fn is_live(&self, id: HeapId) -> bool {
        matches!(self.entries.get(id.0), Some(Some(_)))
    }

    pub fn live_count(&self) -> usize {
        self.entries.len() - self.free_list.len()
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            free_slots: self.free_list.len(),
            ..HeapStats::default()
        };
        for data in self.entries.iter().flatten() {
            stats.live_objects += 1;
            *stats.by_kind.entry(data.kind_name()).or_default() += 1;
        }
        stats
    }

    /// Marks everything reachable from `roots` and frees the rest. Returns the number of
    /// freed objects.
    pub fn collect_garbage(&mut self, roots: impl IntoIterator<Item = HeapId>) -> usize {
        let mut marked = vec![false; self.entries.len()];
        let mut pending: Vec<HeapId> = roots.into_iter().collect();
        let mut children = Vec::new();
        while let Some(id) = pending.pop() {
            let Some(mark) = marked.get_mut(id.0) else { continue };
            if *mark {
                continue;
            }
            *mark = true;
            if let Some(Some(data)) = self.entries.get(id.0) {
                data.collect_child_ids(&mut children);
                pending.append(&mut children);
            }
        }

        let mut freed = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.is_some() && !marked[index] {
                *entry = None;
                self.free_list.push(HeapId(index));
                freed += 1;
            }
        }
        for entry in self.entries.iter_mut().flatten() {
            if let HeapData::Class(class) = entry {
                class.subclasses.retain(|sub| marked[sub.0]);
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_objects_are_freed_and_slots_reused() {
        let mut heap = Heap::new();
        let inner = heap.allocate(HeapData::Str("kept".to_owned()));
        let outer = heap.allocate(HeapData::List(vec![Value::Ref(inner)]));
        let garbage = heap.allocate(HeapData::Str("lost".to_owned()));

        assert_eq!(heap.collect_garbage([outer]), 1);
        assert!(heap.is_live(inner));
        assert!(!heap.is_live(garbage));

        let reused = heap.allocate(HeapData::Tuple(Vec::new()));
        assert_eq!(reused, garbage);
    }

    #[test]
    fn cycles_without_roots_are_collected() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapData::List(Vec::new()));
        let b = heap.allocate(HeapData::List(vec![Value::Ref(a)]));
        if let HeapData::List(items) = heap.get_mut(a) {
            items.push(Value::Ref(b));
        }
        assert_eq!(heap.collect_garbage([]), 2);
        assert_eq!(heap.live_count(), 0);
    }
}
