//! Implementation of the repr() builtin function.

use crate::{exception::RunResult, native::CallContext};

/// Implementation of the repr() builtin function.
pub(super) fn builtin_repr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    let value = ctx.arg(0)?;
    let vm = ctx.vm();
    let text = vm.repr_of(value)?;
    let text = vm.new_str(text)?;
    ctx.ret(text)
}
