//! Implementation of the print() builtin function.

use std::borrow::Cow;

use crate::{
    Vm,
    exception::{ExcType, RunResult},
    native::CallContext,
    value::Value,
};

/// Implementation of the print() builtin function.
///
/// Supports the `sep` and `end` keyword arguments; `None` selects the default. Output
/// goes to the VM's [`PrintWriter`](crate::io::PrintWriter).
pub(super) fn builtin_print(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_kwargs(&["sep", "end", "flush"])?;
    let args = ctx.args().to_vec();
    let sep = ctx.kwarg("sep");
    let end = ctx.kwarg("end");
    let vm = ctx.vm();
    let sep = separator(vm, sep, "sep", " ")?;
    let end = separator(vm, end, "end", "\n")?;

    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            vm.print.stdout_write(Cow::Borrowed(sep.as_str()))?;
        }
        let text = vm.str_of(arg)?;
        vm.print.stdout_write(Cow::Owned(text))?;
    }
    match end.as_str() {
        "" => {}
        "\n" => vm.print.stdout_push('\n')?,
        other => vm.print.stdout_write(Cow::Borrowed(other))?,
    }
    Ok(0)
}

fn separator(vm: &Vm, value: Option<Value>, name: &str, default: &str) -> RunResult<String> {
    match value {
        None | Some(Value::None) => Ok(default.to_owned()),
        Some(value) => match vm.str_value(value) {
            Some(s) => Ok(s.to_owned()),
            None => Err(ExcType::type_error(format!(
                "{name} must be None or a string, not {}",
                vm.type_name(value)
            ))),
        },
    }
}
