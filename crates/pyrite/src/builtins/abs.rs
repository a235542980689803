//! Implementation of the abs() builtin function.

use crate::{
    exception::{ExcType, RunResult},
    native::CallContext,
    value::Value,
};

/// Implementation of the abs() builtin function.
///
/// Integers overflow at `i64::MIN`, complex numbers return their magnitude and guest
/// objects dispatch to `__abs__`.
pub(super) fn builtin_abs(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    let value = ctx.arg(0)?;
    let result = match value {
        Value::Int(n) => Value::Int(
            n.checked_abs()
                .ok_or_else(|| ExcType::overflow_error("integer overflow in abs()"))?,
        ),
        Value::Bool(b) => Value::Int(i64::from(b)),
        Value::Float(f) => Value::Float(f.abs()),
        Value::Complex(c) => Value::Float(c.re.hypot(c.im)),
        _ => {
            let vm = ctx.vm();
            let result = if vm.uses_dunders(value) {
                vm.dispatch_dunder(value, "__abs__", &[])?
            } else {
                None
            };
            match result {
                Some(result) => result,
                None => {
                    return Err(ExcType::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        vm.type_name(value)
                    )));
                }
            }
        }
    };
    ctx.ret(result)
}
