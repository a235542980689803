//! Implementation of the enumerate() and zip() builtin functions.

use crate::{
    exception::{ExcType, RunResult},
    native::CallContext,
};

/// Implementation of the enumerate() builtin function.
///
/// `enumerate(iterable, start=0)` yields `(index, item)` tuples lazily.
pub(super) fn builtin_enumerate(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(2))?;
    ctx.check_kwargs(&["start"])?;
    let iterable = ctx.arg(0)?;
    let start = match ctx.arg_opt(1).or_else(|| ctx.kwarg("start")) {
        Some(start) => start.as_int().ok_or_else(|| {
            ExcType::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                ctx.vm_ref().type_name(start)
            ))
        })?,
        None => 0,
    };
    let vm = ctx.vm();
    let inner = vm.get_iter(iterable)?;
    let iterator = vm.new_enumerate(inner, start)?;
    ctx.ret(iterator)
}

/// Implementation of the zip() builtin function.
///
/// Stops at the shortest input; `zip()` with no arguments is an empty iterator.
pub(super) fn builtin_zip(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let iterables = ctx.args().to_vec();
    let vm = ctx.vm();
    let mut inners = Vec::with_capacity(iterables.len());
    for iterable in iterables {
        inners.push(vm.get_iter(iterable)?);
    }
    let iterator = vm.new_zip(inners)?;
    ctx.ret(iterator)
}
