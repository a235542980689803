//! `set` and `frozenset` methods.

use super::receiver;
use crate::{
    Vm,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeMember},
    types::set::Set,
    value::Value,
};

pub(super) const SET_MEMBERS: &[NativeMember] = &[
    NativeMember::method("add", Arity::exact(2), set_add),
    NativeMember::method("discard", Arity::exact(2), set_discard),
    NativeMember::method("remove", Arity::exact(2), set_remove),
    NativeMember::method("pop", Arity::exact(1), set_pop),
    NativeMember::method("clear", Arity::exact(1), set_clear),
    NativeMember::method("copy", Arity::exact(1), set_copy),
    NativeMember::method("union", Arity::at_least(1), set_union),
    NativeMember::method("intersection", Arity::at_least(1), set_intersection),
    NativeMember::method("difference", Arity::at_least(1), set_difference),
    NativeMember::method("issubset", Arity::exact(2), set_issubset),
];

pub(super) const FROZENSET_MEMBERS: &[NativeMember] = &[
    NativeMember::method("copy", Arity::exact(1), set_copy),
    NativeMember::method("union", Arity::at_least(1), set_union),
    NativeMember::method("intersection", Arity::at_least(1), set_intersection),
    NativeMember::method("difference", Arity::at_least(1), set_difference),
    NativeMember::method("issubset", Arity::exact(2), set_issubset),
];

fn this_set(ctx: &CallContext<'_>) -> RunResult<HeapId> {
    receiver(ctx, "set", |data| matches!(data, HeapData::Set(_)))
}

fn this_any_set(ctx: &CallContext<'_>) -> RunResult<(HeapId, Set, bool)> {
    let id = receiver(ctx, "set", |data| matches!(data, HeapData::Set(_) | HeapData::FrozenSet(_)))?;
    match ctx.vm_ref().heap.get(id) {
        HeapData::Set(set) => Ok((id, set.clone(), false)),
        HeapData::FrozenSet(set) => Ok((id, set.clone(), true)),
        _ => Err(ExcType::type_error("expected a set")),
    }
}

fn set_mut(vm: &mut Vm, id: HeapId) -> Option<&mut Set> {
    match vm.heap.get_mut(id) {
        HeapData::Set(set) => Some(set),
        _ => None,
    }
}

/// Builds a set from any iterable argument.
fn other_set(vm: &mut Vm, other: Value) -> RunResult<Set> {
    if let Value::Ref(id) = other
        && let HeapData::Set(set) | HeapData::FrozenSet(set) = vm.heap.get(id)
    {
        return Ok(set.clone());
    }
    let items = vm.collect_iter(other)?;
    vm.build_set(items)
}

/// Wraps a result in the receiver's own kind.
fn new_like(vm: &mut Vm, set: Set, frozen: bool) -> RunResult<Value> {
    let data = if frozen { HeapData::FrozenSet(set) } else { HeapData::Set(set) };
    Ok(Value::Ref(vm.alloc(data)?))
}

fn set_add(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_set(ctx)?;
    let item = ctx.arg(1)?;
    let vm = ctx.vm();
    let hk = vm.hash_key(item)?;
    if let Some(set) = set_mut(vm, id) {
        set.add(hk, item);
    }
    Ok(0)
}

fn set_discard(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_set(ctx)?;
    let item = ctx.arg(1)?;
    let vm = ctx.vm();
    let hk = vm.hash_key(item)?;
    if let Some(set) = set_mut(vm, id) {
        set.remove(&hk);
    }
    Ok(0)
}

fn set_remove(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_set(ctx)?;
    let item = ctx.arg(1)?;
    let vm = ctx.vm();
    let hk = vm.hash_key(item)?;
    match set_mut(vm, id).and_then(|set| set.remove(&hk)) {
        Some(_) => Ok(0),
        None => Err(ExcType::key_error(vm.repr_of(item)?)),
    }
}

fn set_pop(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_set(ctx)?;
    match set_mut(ctx.vm(), id).and_then(Set::pop) {
        Some(item) => ctx.ret(item),
        None => Err(ExcType::key_error("'pop from an empty set'")),
    }
}

fn set_clear(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_set(ctx)?;
    if let Some(set) = set_mut(ctx.vm(), id) {
        set.clear();
    }
    Ok(0)
}

fn set_copy(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (_, set, frozen) = this_any_set(ctx)?;
    let copy = new_like(ctx.vm(), set, frozen)?;
    ctx.ret(copy)
}

/// Folds every argument into the receiver with `combine`.
fn set_fold(ctx: &mut CallContext<'_>, combine: fn(&Set, &Set) -> Set) -> RunResult<usize> {
    let (_, mut acc, frozen) = this_any_set(ctx)?;
    let others = ctx.args()[1..].to_vec();
    let vm = ctx.vm();
    for other in others {
        let other = other_set(vm, other)?;
        acc = combine(&acc, &other);
    }
    let result = new_like(vm, acc, frozen)?;
    ctx.ret(result)
}

fn set_union(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    set_fold(ctx, Set::union)
}

fn set_intersection(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    set_fold(ctx, Set::intersection)
}

fn set_difference(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    set_fold(ctx, Set::difference)
}

fn set_issubset(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (_, set, _) = this_any_set(ctx)?;
    let other = ctx.arg(1)?;
    let other = other_set(ctx.vm(), other)?;
    ctx.ret(Value::Bool(set.is_subset(&other)))
}
