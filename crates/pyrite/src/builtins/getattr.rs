//! Implementation of the getattr(), hasattr(), setattr() and delattr() builtin functions.

use crate::{
    exception::{ExcType, RunResult},
    native::CallContext,
    value::Value,
};

/// Implementation of the getattr() builtin function.
///
/// With a default, only `AttributeError` is swallowed; other errors raised by
/// properties or `__getattr__` propagate.
pub(super) fn builtin_getattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(3))?;
    ctx.check_no_kwargs()?;
    let obj = ctx.arg(0)?;
    let name = attr_name(ctx, "getattr")?;
    let default = ctx.arg_opt(2);
    let vm = ctx.vm();
    let value = match vm.get_attr(obj, &name) {
        Ok(value) => value,
        Err(err) => match default {
            Some(default) if vm.error_matches(&err, ExcType::AttributeError) => default,
            _ => return Err(err),
        },
    };
    ctx.ret(value)
}

/// Implementation of the hasattr() builtin function.
pub(super) fn builtin_hasattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let obj = ctx.arg(0)?;
    let name = attr_name(ctx, "hasattr")?;
    let found = ctx.vm().has_attr(obj, &name)?;
    ctx.ret(Value::Bool(found))
}

/// Implementation of the setattr() builtin function.
pub(super) fn builtin_setattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(3, Some(3))?;
    let (obj, value) = (ctx.arg(0)?, ctx.arg(2)?);
    let name = attr_name(ctx, "setattr")?;
    ctx.vm().set_attr(obj, &name, value)?;
    Ok(0)
}

/// Implementation of the delattr() builtin function.
pub(super) fn builtin_delattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let obj = ctx.arg(0)?;
    let name = attr_name(ctx, "delattr")?;
    ctx.vm().del_attr(obj, &name)?;
    Ok(0)
}

fn attr_name(ctx: &CallContext<'_>, func: &str) -> RunResult<String> {
    let name = ctx.arg(1)?;
    match ctx.vm_ref().str_value(name) {
        Some(s) => Ok(s.to_owned()),
        None => Err(ExcType::type_error(format!(
            "{func}(): attribute name must be string, not '{}'",
            ctx.vm_ref().type_name(name)
        ))),
    }
}
