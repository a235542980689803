//! Implementation of the sorted() builtin function.

use crate::{
    Vm,
    args::ArgValues,
    exception::RunResult,
    native::CallContext,
    value::Value,
};

/// Implementation of the sorted() builtin function.
///
/// `sorted(iterable, *, key=None, reverse=False)` returns a new list.
pub(super) fn builtin_sorted(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    ctx.check_kwargs(&["key", "reverse"])?;
    let iterable = ctx.arg(0)?;
    let key = ctx.kwarg("key").filter(|k| !k.is_none());
    let reverse = ctx.kwarg("reverse");
    let vm = ctx.vm();
    let reverse = match reverse {
        Some(flag) => vm.truthy(flag)?,
        None => false,
    };
    let items = vm.collect_iter(iterable)?;
    let items = sort_values(vm, items, key, reverse)?;
    let list = vm.new_list(items)?;
    ctx.ret(list)
}

/// Stable sort through guest comparisons, shared with `list.sort`.
///
/// Keys are computed once per item. `reverse` keeps equal elements in their original
/// order, as a reversed stable sort does.
pub(crate) fn sort_values(vm: &mut Vm, items: Vec<Value>, key: Option<Value>, reverse: bool) -> RunResult<Vec<Value>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let sort_key = match key {
            Some(key) => vm.call(key, ArgValues::one(item))?,
            None => item,
        };
        keyed.push((sort_key, item));
    }
    let sorted = merge_sort(vm, keyed, reverse)?;
    Ok(sorted.into_iter().map(|(_, item)| item).collect())
}

/// Top-down merge sort; the comparator can fail, which rules out `slice::sort_by`.
fn merge_sort(vm: &mut Vm, mut items: Vec<(Value, Value)>, reverse: bool) -> RunResult<Vec<(Value, Value)>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(vm, items, reverse)?;
    let right = merge_sort(vm, right, reverse)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        // Take from the right only when strictly before the left element.
        let take_right = if reverse {
            vm.less_than(l.0, r.0)?
        } else {
            vm.less_than(r.0, l.0)?
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}
