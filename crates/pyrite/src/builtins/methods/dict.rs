//! `dict` methods.
//!
//! `keys`, `values` and `items` return list snapshots rather than live views.

use super::receiver;
use crate::{
    Vm,
    builtins::conversions::mapping_pairs,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeMember},
    types::dict::Dict,
    value::Value,
};

pub(super) const MEMBERS: &[NativeMember] = &[
    NativeMember::method("get", Arity::range(2, 3), dict_get),
    NativeMember::method("keys", Arity::exact(1), dict_keys),
    NativeMember::method("values", Arity::exact(1), dict_values),
    NativeMember::method("items", Arity::exact(1), dict_items),
    NativeMember::method("pop", Arity::range(2, 3), dict_pop),
    NativeMember::method("popitem", Arity::exact(1), dict_popitem),
    NativeMember::method("setdefault", Arity::range(2, 3), dict_setdefault),
    NativeMember::method("update", Arity::range(1, 2), dict_update),
    NativeMember::method("clear", Arity::exact(1), dict_clear),
    NativeMember::method("copy", Arity::exact(1), dict_copy),
];

fn this_dict(ctx: &CallContext<'_>) -> RunResult<HeapId> {
    receiver(ctx, "dict", |data| matches!(data, HeapData::Dict(_)))
}

fn dict_ref(vm: &Vm, id: HeapId) -> Option<&Dict> {
    match vm.heap.get(id) {
        HeapData::Dict(dict) => Some(dict),
        _ => None,
    }
}

fn dict_mut(vm: &mut Vm, id: HeapId) -> Option<&mut Dict> {
    match vm.heap.get_mut(id) {
        HeapData::Dict(dict) => Some(dict),
        _ => None,
    }
}

fn dict_get(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let key = ctx.arg(1)?;
    let default = ctx.arg_opt(2).unwrap_or(Value::None);
    let vm = ctx.vm();
    let hk = vm.hash_key(key)?;
    let value = dict_ref(vm, id).and_then(|d| d.get(&hk)).unwrap_or(default);
    ctx.ret(value)
}

fn dict_keys(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let vm = ctx.vm();
    let keys = dict_ref(vm, id).map(Dict::keys).unwrap_or_default();
    let list = vm.new_list(keys)?;
    ctx.ret(list)
}

fn dict_values(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let vm = ctx.vm();
    let values = dict_ref(vm, id).map(Dict::values).unwrap_or_default();
    let list = vm.new_list(values)?;
    ctx.ret(list)
}

fn dict_items(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let vm = ctx.vm();
    let pairs = dict_ref(vm, id).map(Dict::items).unwrap_or_default();
    let mut items = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        items.push(vm.new_tuple(vec![key, value])?);
    }
    let list = vm.new_list(items)?;
    ctx.ret(list)
}

fn dict_pop(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let key = ctx.arg(1)?;
    let default = ctx.arg_opt(2);
    let vm = ctx.vm();
    let hk = vm.hash_key(key)?;
    let removed = dict_mut(vm, id).and_then(|d| d.remove(&hk));
    match (removed, default) {
        (Some((_, value)), _) | (None, Some(value)) => ctx.ret(value),
        (None, None) => Err(ExcType::key_error(vm.repr_of(key)?)),
    }
}

fn dict_popitem(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let vm = ctx.vm();
    let Some((key, value)) = dict_mut(vm, id).and_then(Dict::pop_last) else {
        return Err(ExcType::key_error("'popitem(): dictionary is empty'"));
    };
    let pair = vm.new_tuple(vec![key, value])?;
    ctx.ret(pair)
}

fn dict_setdefault(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let key = ctx.arg(1)?;
    let default = ctx.arg_opt(2).unwrap_or(Value::None);
    let vm = ctx.vm();
    let hk = vm.hash_key(key)?;
    if let Some(existing) = dict_ref(vm, id).and_then(|d| d.get(&hk)) {
        return ctx.ret(existing);
    }
    if let Some(dict) = dict_mut(vm, id) {
        dict.insert(hk, key, default);
    }
    ctx.ret(default)
}

/// `dict.update(other=(), **kwargs)`.
fn dict_update(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let other = ctx.arg_opt(1);
    let kwargs = ctx.kwargs().to_vec();
    let vm = ctx.vm();
    let mut pairs = match other {
        Some(other) => mapping_pairs(vm, other)?,
        None => Vec::new(),
    };
    for (name, value) in kwargs {
        pairs.push((vm.new_str(name)?, value));
    }
    for (key, value) in pairs {
        let hk = vm.hash_key(key)?;
        if let Some(dict) = dict_mut(vm, id) {
            dict.insert(hk, key, value);
        }
    }
    Ok(0)
}

fn dict_clear(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    if let Some(dict) = dict_mut(ctx.vm(), id) {
        dict.clear();
    }
    Ok(0)
}

fn dict_copy(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_dict(ctx)?;
    let vm = ctx.vm();
    let pairs = dict_ref(vm, id).map(Dict::items).unwrap_or_default();
    let copy = vm.new_dict(pairs)?;
    ctx.ret(copy)
}
