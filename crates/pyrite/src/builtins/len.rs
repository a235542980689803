//! Implementation of the len() builtin function.

use crate::{
    exception::{ExcType, RunResult},
    native::CallContext,
    value::Value,
};

/// Implementation of the len() builtin function.
pub(super) fn builtin_len(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    let value = ctx.arg(0)?;
    let len = ctx.vm().len_of(value)?;
    let len = i64::try_from(len).map_err(|_| ExcType::overflow_error("length does not fit in an int"))?;
    ctx.ret(Value::Int(len))
}
