//! `list` methods.

use super::{count_of, index_of, receiver};
use crate::{
    Vm,
    builtins::sort_values,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeMember},
    types::str_bytes::normalize_index,
    value::Value,
};

pub(super) const MEMBERS: &[NativeMember] = &[
    NativeMember::method("append", Arity::exact(2), list_append),
    NativeMember::method("extend", Arity::exact(2), list_extend),
    NativeMember::method("insert", Arity::exact(3), list_insert),
    NativeMember::method("pop", Arity::range(1, 2), list_pop),
    NativeMember::method("remove", Arity::exact(2), list_remove),
    NativeMember::method("index", Arity::exact(2), list_index),
    NativeMember::method("count", Arity::exact(2), list_count),
    NativeMember::method("reverse", Arity::exact(1), list_reverse),
    NativeMember::method("sort", Arity::exact(1), list_sort),
    NativeMember::method("clear", Arity::exact(1), list_clear),
    NativeMember::method("copy", Arity::exact(1), list_copy),
];

fn this_list(ctx: &CallContext<'_>) -> RunResult<HeapId> {
    receiver(ctx, "list", |data| matches!(data, HeapData::List(_)))
}

fn items(vm: &Vm, id: HeapId) -> Vec<Value> {
    match vm.heap.get(id) {
        HeapData::List(items) => items.clone(),
        _ => Vec::new(),
    }
}

fn with_items<R>(vm: &mut Vm, id: HeapId, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
    match vm.heap.get_mut(id) {
        HeapData::List(items) => Some(f(items)),
        _ => None,
    }
}

fn grow(vm: &mut Vm, id: HeapId, extra: usize) -> RunResult<()> {
    let len = items_len(vm, id);
    vm.tracker.check_sequence_size(len + extra)?;
    Ok(())
}

fn items_len(vm: &Vm, id: HeapId) -> usize {
    match vm.heap.get(id) {
        HeapData::List(items) => items.len(),
        _ => 0,
    }
}

fn list_append(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let item = ctx.arg(1)?;
    let vm = ctx.vm();
    grow(vm, id, 1)?;
    with_items(vm, id, |items| items.push(item));
    Ok(0)
}

fn list_extend(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let iterable = ctx.arg(1)?;
    let vm = ctx.vm();
    // Collected first, so `xs.extend(xs)` doubles once.
    let new_items = vm.collect_iter(iterable)?;
    grow(vm, id, new_items.len())?;
    with_items(vm, id, |items| items.extend(new_items));
    Ok(0)
}

fn list_insert(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let index = ctx.arg_int(1)?;
    let item = ctx.arg(2)?;
    let vm = ctx.vm();
    grow(vm, id, 1)?;
    with_items(vm, id, |items| {
        let len = items.len() as i64;
        let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
        items.insert(at as usize, item);
    });
    Ok(0)
}

fn list_pop(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let index = match ctx.arg_opt(1) {
        Some(_) => ctx.arg_int(1)?,
        None => -1,
    };
    let vm = ctx.vm();
    let len = items_len(vm, id);
    if len == 0 {
        return Err(ExcType::index_error("pop from empty list"));
    }
    let Some(i) = normalize_index(index, len) else {
        return Err(ExcType::index_error("pop index out of range"));
    };
    let item = with_items(vm, id, |items| items.remove(i)).unwrap_or(Value::None);
    ctx.ret(item)
}

fn list_remove(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let needle = ctx.arg(1)?;
    let vm = ctx.vm();
    let snapshot = items(vm, id);
    match index_of(vm, &snapshot, needle)? {
        Some(i) => {
            with_items(vm, id, |items| {
                if i < items.len() {
                    items.remove(i);
                }
            });
            Ok(0)
        }
        None => Err(ExcType::value_error("list.remove(x): x not in list")),
    }
}

fn list_index(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let needle = ctx.arg(1)?;
    let vm = ctx.vm();
    let snapshot = items(vm, id);
    match index_of(vm, &snapshot, needle)? {
        Some(i) => ctx.ret(Value::Int(i as i64)),
        None => {
            let repr = vm.repr_of(needle)?;
            Err(ExcType::value_error(format!("{repr} is not in list")))
        }
    }
}

fn list_count(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let needle = ctx.arg(1)?;
    let vm = ctx.vm();
    let snapshot = items(vm, id);
    let count = count_of(vm, &snapshot, needle)?;
    ctx.ret(Value::Int(count))
}

fn list_reverse(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    with_items(ctx.vm(), id, |items| items.reverse());
    Ok(0)
}

/// `list.sort(*, key=None, reverse=False)`, in place and stable.
fn list_sort(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    ctx.check_kwargs(&["key", "reverse"])?;
    let id = this_list(ctx)?;
    let key = ctx.kwarg("key").filter(|k| !k.is_none());
    let reverse = ctx.kwarg("reverse");
    let vm = ctx.vm();
    let reverse = match reverse {
        Some(flag) => vm.truthy(flag)?,
        None => false,
    };
    let snapshot = items(vm, id);
    let sorted = sort_values(vm, snapshot, key, reverse)?;
    with_items(vm, id, |items| *items = sorted);
    Ok(0)
}

fn list_clear(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    with_items(ctx.vm(), id, Vec::clear);
    Ok(0)
}

fn list_copy(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let id = this_list(ctx)?;
    let vm = ctx.vm();
    let copy = items(vm, id);
    let list = vm.new_list(copy)?;
    ctx.ret(list)
}
