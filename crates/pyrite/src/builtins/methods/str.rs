//! `str` methods.

use super::receiver;
use crate::{
    exception::{ExcType, RunResult},
    heap::HeapData,
    native::{Arity, CallContext, NativeMember},
    value::Value,
};

pub(super) const MEMBERS: &[NativeMember] = &[
    NativeMember::method("join", Arity::exact(2), str_join),
    NativeMember::method("upper", Arity::exact(1), str_upper),
    NativeMember::method("lower", Arity::exact(1), str_lower),
    NativeMember::method("startswith", Arity::exact(2), str_startswith),
    NativeMember::method("endswith", Arity::exact(2), str_endswith),
    NativeMember::method("split", Arity::range(1, 3), str_split),
    NativeMember::method("strip", Arity::range(1, 2), str_strip),
    NativeMember::method("replace", Arity::exact(3), str_replace),
];

fn this_str(ctx: &CallContext<'_>) -> RunResult<String> {
    let id = receiver(ctx, "str", |data| matches!(data, HeapData::Str(_)))?;
    Ok(ctx.vm_ref().str_value(Value::Ref(id)).unwrap_or_default().to_owned())
}

/// A string argument, or `None` when the argument is `None` or absent.
fn opt_str_arg(ctx: &CallContext<'_>, index: usize) -> RunResult<Option<String>> {
    match ctx.arg_opt(index) {
        None | Some(Value::None) => Ok(None),
        Some(_) => ctx.arg_str(index).map(Some),
    }
}

fn ret_str(ctx: &mut CallContext<'_>, text: String) -> RunResult<usize> {
    let value = ctx.vm().new_str(text)?;
    ctx.ret(value)
}

fn str_join(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let sep = this_str(ctx)?;
    let iterable = ctx.arg(1)?;
    let vm = ctx.vm();
    let items = vm.collect_iter(iterable)?;
    let mut parts = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match vm.str_value(item) {
            Some(s) => parts.push(s.to_owned()),
            None => {
                return Err(ExcType::type_error(format!(
                    "sequence item {i}: expected str instance, {} found",
                    vm.type_name(item)
                )));
            }
        }
    }
    ret_str(ctx, parts.join(&sep))
}

fn str_upper(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let s = this_str(ctx)?;
    ret_str(ctx, s.to_uppercase())
}

fn str_lower(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let s = this_str(ctx)?;
    ret_str(ctx, s.to_lowercase())
}

/// Prefix/suffix test; the argument may be a tuple of candidates.
fn affix_test(ctx: &mut CallContext<'_>, test: fn(&str, &str) -> bool) -> RunResult<usize> {
    let s = this_str(ctx)?;
    let arg = ctx.arg(1)?;
    let vm = ctx.vm_ref();
    let candidates = match vm.str_value(arg) {
        Some(single) => vec![single.to_owned()],
        None => {
            let items = vm.sequence_items(arg).ok_or_else(|| {
                ExcType::type_error(format!(
                    "{} arg must be str or a tuple of str, not {}",
                    ctx.name(),
                    vm.type_name(arg)
                ))
            })?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match vm.str_value(item) {
                    Some(c) => out.push(c.to_owned()),
                    None => {
                        return Err(ExcType::type_error(format!(
                            "tuple for {} must only contain str, not {}",
                            ctx.name(),
                            vm.type_name(item)
                        )));
                    }
                }
            }
            out
        }
    };
    let found = candidates.iter().any(|c| test(&s, c));
    ctx.ret(Value::Bool(found))
}

fn str_startswith(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    affix_test(ctx, |s, prefix| s.starts_with(prefix))
}

fn str_endswith(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    affix_test(ctx, |s, suffix| s.ends_with(suffix))
}

/// `str.split(sep=None, maxsplit=-1)`; without a separator, runs of whitespace split and
/// leading/trailing whitespace is dropped.
fn str_split(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_kwargs(&["sep", "maxsplit"])?;
    let s = this_str(ctx)?;
    let sep = match ctx.kwarg("sep") {
        Some(Value::None) => None,
        Some(sep) => Some(
            ctx.vm_ref()
                .str_value(sep)
                .ok_or_else(|| ExcType::type_error("must be str or None"))?
                .to_owned(),
        ),
        None => opt_str_arg(ctx, 1)?,
    };
    let maxsplit = match ctx.kwarg("maxsplit").or_else(|| ctx.arg_opt(2)) {
        Some(v) => v
            .as_int()
            .ok_or_else(|| ExcType::type_error("'maxsplit' must be an integer"))?,
        None => -1,
    };
    let limit = usize::try_from(maxsplit).ok();

    let parts: Vec<String> = match sep.as_deref() {
        Some("") => return Err(ExcType::value_error("empty separator")),
        Some(sep) => match limit {
            Some(n) => s.splitn(n + 1, sep).map(str::to_owned).collect(),
            None => s.split(sep).map(str::to_owned).collect(),
        },
        None => split_whitespace(&s, limit),
    };
    let vm = ctx.vm();
    let mut items = Vec::with_capacity(parts.len());
    for part in parts {
        items.push(vm.new_str(part)?);
    }
    let list = vm.new_list(items)?;
    ctx.ret(list)
}

fn split_whitespace(s: &str, limit: Option<usize>) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if limit.is_some_and(|n| parts.len() == n) {
            parts.push(rest.trim_end().to_owned());
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(rest[..end].to_owned());
        rest = rest[end..].trim_start();
    }
    parts
}

fn str_strip(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let s = this_str(ctx)?;
    let stripped = match opt_str_arg(ctx, 1)? {
        Some(chars) => s.trim_matches(|c| chars.contains(c)).to_owned(),
        None => s.trim().to_owned(),
    };
    ret_str(ctx, stripped)
}

fn str_replace(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let s = this_str(ctx)?;
    let old = ctx.arg_str(1)?;
    let new = ctx.arg_str(2)?;
    ret_str(ctx, s.replace(&old, &new))
}
