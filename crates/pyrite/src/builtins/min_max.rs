//! Implementation of the min() and max() builtin functions.

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    native::CallContext,
    value::Value,
};

/// Implementation of the min() builtin function.
pub(super) fn builtin_min(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    builtin_min_max(ctx, false)
}

/// Implementation of the max() builtin function.
pub(super) fn builtin_max(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    builtin_min_max(ctx, true)
}

/// Shared body of min() and max().
///
/// Accepts a single iterable or several positional values, plus `key=` and, for the
/// iterable form only, `default=`. Ties keep the first item seen.
fn builtin_min_max(ctx: &mut CallContext<'_>, is_max: bool) -> RunResult<usize> {
    let name = if is_max { "max" } else { "min" };
    ctx.check_arity(1, None)?;
    ctx.check_kwargs(&["key", "default"])?;
    let key = ctx.kwarg("key").filter(|k| !k.is_none());
    let default = ctx.kwarg("default");
    let args = ctx.args().to_vec();
    let vm = ctx.vm();

    let items = if let [iterable] = args.as_slice() {
        vm.collect_iter(*iterable)?
    } else {
        if default.is_some() {
            return Err(ExcType::type_error(format!(
                "Cannot specify a default for {name}() with multiple positional arguments"
            )));
        }
        args
    };

    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let item_key = match key {
            Some(key) => vm.call(key, ArgValues::one(item))?,
            None => item,
        };
        let replace = match best {
            None => true,
            Some((best_key, _)) if is_max => vm.less_than(best_key, item_key)?,
            Some((best_key, _)) => vm.less_than(item_key, best_key)?,
        };
        if replace {
            best = Some((item_key, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) | (None, Some(item)) => ctx.ret(item),
        (None, None) => Err(ExcType::value_error(format!("{name}() iterable argument is empty"))),
    }
}
