//! Implementation of the sum() builtin function.

use crate::{
    bytecode::op::BinaryOp,
    exception::{ExcType, RunResult},
    native::CallContext,
    value::Value,
};

/// Implementation of the sum() builtin function.
///
/// `sum(iterable, start=0)` folds with `+`, so guest `__add__`/`__radd__` take part.
/// Strings are rejected as a start value, matching the usual advice to use `str.join`.
pub(super) fn builtin_sum(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(2))?;
    ctx.check_kwargs(&["start"])?;
    let iterable = ctx.arg(0)?;
    let start = ctx.arg_opt(1).or_else(|| ctx.kwarg("start")).unwrap_or(Value::Int(0));
    let vm = ctx.vm();
    if vm.str_value(start).is_some() {
        return Err(ExcType::type_error("sum() can't sum strings [use ''.join(seq) instead]"));
    }
    let iterator = vm.get_iter(iterable)?;
    let mut total = start;
    while let Some(item) = vm.next_value(iterator)? {
        total = vm.binary_op(total, item, BinaryOp::Add)?;
    }
    ctx.ret(total)
}
