//! Methods of the builtin value types.
//!
//! Each submodule installs its natives into the namespace of one builtin class. The
//! receiver arrives as argument 0, bound by attribute lookup like any guest method.

mod dict;
mod generator;
mod list;
mod set;
mod str;
mod tuple;

use crate::{
    Vm,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::CallContext,
    value::Value,
};

pub(super) fn register(vm: &mut Vm) {
    let t = vm.types.clone();
    vm.install_members(t.list, list::MEMBERS);
    vm.install_members(t.dict, dict::MEMBERS);
    vm.install_members(t.set, set::SET_MEMBERS);
    vm.install_members(t.frozenset, set::FROZENSET_MEMBERS);
    vm.install_members(t.str, str::MEMBERS);
    vm.install_members(t.tuple, tuple::MEMBERS);
    vm.install_members(t.generator, generator::GENERATOR_MEMBERS);
    vm.install_members(t.coroutine, generator::COROUTINE_MEMBERS);
    vm.install_members(t.iterator, generator::ITERATOR_MEMBERS);
}

/// The receiver's heap id, checked against `matches`.
fn receiver(ctx: &CallContext<'_>, expected: &str, matches: fn(&HeapData) -> bool) -> RunResult<HeapId> {
    let this = ctx.arg(0)?;
    match this {
        Value::Ref(id) if matches(ctx.vm_ref().heap.get(id)) => Ok(id),
        _ => Err(ExcType::type_error(format!(
            "descriptor '{}' requires a '{expected}' object but received a '{}'",
            ctx.name(),
            ctx.vm_ref().type_name(this)
        ))),
    }
}

/// Position of `needle` in `items` by `==`, for `list.index`/`tuple.index`.
fn index_of(vm: &mut Vm, items: &[Value], needle: Value) -> RunResult<Option<usize>> {
    for (i, item) in items.iter().enumerate() {
        if item.is(needle) || vm.values_equal(*item, needle)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn count_of(vm: &mut Vm, items: &[Value], needle: Value) -> RunResult<i64> {
    let mut count = 0;
    for item in items {
        if item.is(needle) || vm.values_equal(*item, needle)? {
            count += 1;
        }
    }
    Ok(count)
}
