//! Implementation of the iter() and next() builtin functions.

use crate::{
    exception::{ExcType, RunResult},
    native::CallContext,
};

/// Implementation of the iter() builtin function.
pub(super) fn builtin_iter(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    ctx.check_no_kwargs()?;
    let value = ctx.arg(0)?;
    let iterator = ctx.vm().get_iter(value)?;
    ctx.ret(iterator)
}

/// Implementation of the next() builtin function.
///
/// An exhausted iterator returns the default when one is given and raises
/// `StopIteration` otherwise.
pub(super) fn builtin_next(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(2))?;
    ctx.check_no_kwargs()?;
    let iterator = ctx.arg(0)?;
    let default = ctx.arg_opt(1);
    let vm = ctx.vm();
    match (vm.next_value(iterator)?, default) {
        (Some(value), _) | (None, Some(value)) => ctx.ret(value),
        (None, None) => Err(ExcType::stop_iteration()),
    }
}
