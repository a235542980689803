//! `tuple` methods.

use super::{count_of, index_of, receiver};
use crate::{
    exception::{ExcType, RunResult},
    heap::HeapData,
    native::{Arity, CallContext, NativeMember},
    value::Value,
};

pub(super) const MEMBERS: &[NativeMember] = &[
    NativeMember::method("index", Arity::exact(2), tuple_index),
    NativeMember::method("count", Arity::exact(2), tuple_count),
];

fn tuple_items(ctx: &CallContext<'_>) -> RunResult<Vec<Value>> {
    let id = receiver(ctx, "tuple", |data| matches!(data, HeapData::Tuple(_)))?;
    Ok(match ctx.vm_ref().heap.get(id) {
        HeapData::Tuple(items) => items.clone(),
        _ => Vec::new(),
    })
}

fn tuple_index(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let items = tuple_items(ctx)?;
    let needle = ctx.arg(1)?;
    match index_of(ctx.vm(), &items, needle)? {
        Some(i) => ctx.ret(Value::Int(i as i64)),
        None => Err(ExcType::value_error("tuple.index(x): x not in tuple")),
    }
}

fn tuple_count(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let items = tuple_items(ctx)?;
    let needle = ctx.arg(1)?;
    let count = count_of(ctx.vm(), &items, needle)?;
    ctx.ret(Value::Int(count))
}
