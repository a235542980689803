//! Implementation of the hash() builtin function.

use crate::{exception::RunResult, native::CallContext, value::Value};

/// Implementation of the hash() builtin function.
///
/// Only structurally hashable values have a hash; everything else is a `TypeError`.
/// Numbers that compare equal hash equally across `bool`, `int` and `float`.
pub(super) fn builtin_hash(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    let value = ctx.arg(0)?;
    let hash = ctx.vm_ref().hash_value(value)?;
    ctx.ret(Value::Int(hash))
}
