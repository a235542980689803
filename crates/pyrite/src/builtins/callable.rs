//! Implementation of the callable() builtin function.

use crate::{exception::RunResult, native::CallContext, value::Value};

/// Implementation of the callable() builtin function.
pub(super) fn builtin_callable(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    let value = ctx.arg(0)?;
    let result = ctx.vm_ref().is_callable(value);
    ctx.ret(Value::Bool(result))
}
