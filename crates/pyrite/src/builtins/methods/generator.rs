//! Generator, coroutine and builtin iterator methods.

use crate::{
    exception::{ExcType, RunResult},
    native::{Arity, CallContext, NativeMember},
};

pub(super) const GENERATOR_MEMBERS: &[NativeMember] = &[
    NativeMember::method("send", Arity::exact(2), gen_send),
    NativeMember::method("throw", Arity::exact(2), gen_throw),
    NativeMember::method("close", Arity::exact(1), gen_close),
    NativeMember::method("__next__", Arity::exact(1), iter_next),
    NativeMember::method("__iter__", Arity::exact(1), iter_self),
];

pub(super) const COROUTINE_MEMBERS: &[NativeMember] = &[
    NativeMember::method("send", Arity::exact(2), gen_send),
    NativeMember::method("throw", Arity::exact(2), gen_throw),
    NativeMember::method("close", Arity::exact(1), gen_close),
    NativeMember::method("__await__", Arity::exact(1), iter_self),
];

pub(super) const ITERATOR_MEMBERS: &[NativeMember] = &[
    NativeMember::method("__next__", Arity::exact(1), iter_next),
    NativeMember::method("__iter__", Arity::exact(1), iter_self),
];

/// `gen.send(value)`: the next yielded value, or `StopIteration(return value)`.
fn gen_send(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, value) = (ctx.arg(0)?, ctx.arg(1)?);
    let result = ctx.vm().generator_send_method(this, value)?;
    ctx.ret(result)
}

/// `gen.throw(exc)`: raises at the suspension point; returns the next yielded value when
/// the generator handles it.
fn gen_throw(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, exc) = (ctx.arg(0)?, ctx.arg(1)?);
    let vm = ctx.vm();
    let is_exception = vm.is_exception_instance(exc) || exc.ref_id().is_some_and(|id| vm.is_exception_class(id));
    if !is_exception {
        return Err(ExcType::type_error("exceptions must derive from BaseException"));
    }
    let result = vm.generator_throw_method(this, exc)?;
    ctx.ret(result)
}

fn gen_close(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    ctx.vm().close(this)?;
    Ok(0)
}

fn iter_next(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    match ctx.vm().next_value(this)? {
        Some(value) => ctx.ret(value),
        None => Err(ExcType::stop_iteration()),
    }
}

fn iter_self(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    ctx.ret(this)
}
