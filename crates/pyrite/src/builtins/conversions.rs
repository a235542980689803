//! Constructors of the builtin value types: `int()`, `float()`, `str()`, `list()`, ...
//!
//! Each is the `__new__` static method of its class, so `int("3")` goes through the
//! regular class call path.

use crate::{
    Vm,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeFn, NativeMember},
    types::iter::Range,
    value::{Complex, Value},
};

pub(super) fn register(vm: &mut Vm) {
    let t = vm.types.clone();
    let constructors: [(HeapId, NativeFn, Arity); 13] = [
        (t.int, int_new, Arity::range(1, 3)),
        (t.float, float_new, Arity::range(1, 2)),
        (t.bool, bool_new, Arity::range(1, 2)),
        (t.complex, complex_new, Arity::range(1, 3)),
        (t.str, str_new, Arity::range(1, 2)),
        (t.bytes, bytes_new, Arity::range(1, 2)),
        (t.list, list_new, Arity::range(1, 2)),
        (t.tuple, tuple_new, Arity::range(1, 2)),
        (t.dict, dict_new, Arity::range(1, 2)),
        (t.set, set_new, Arity::range(1, 2)),
        (t.frozenset, frozenset_new, Arity::range(1, 2)),
        (t.range, range_new, Arity::range(2, 4)),
        (t.none, none_new, Arity::exact(1)),
    ];
    for (class, handler, arity) in constructors {
        vm.install_members(class, &[NativeMember::static_method("__new__", arity, handler)]);
    }
}

/// Parses an integer literal the way `int(text, base)` does: surrounding whitespace,
/// an optional sign, underscores between digits and a prefix matching the base.
pub(crate) fn parse_int(text: &str, base: u32) -> Option<i64> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = digits.to_ascii_lowercase();
    let (base, digits) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &lower[2..]),
        (0 | 8, Some("0o")) => (8, &lower[2..]),
        (0 | 2, Some("0b")) => (2, &lower[2..]),
        (0, _) => (10, lower.as_str()),
        (base, _) => (base, lower.as_str()),
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = i128::from_str_radix(&cleaned, base).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).ok()
}

fn float_to_int(f: f64) -> RunResult<i64> {
    if f.is_nan() {
        return Err(ExcType::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(ExcType::overflow_error("cannot convert float infinity to integer"));
    }
    let truncated = f.trunc();
    if truncated < -9.223_372_036_854_775_808e18 || truncated >= 9.223_372_036_854_775_808e18 {
        return Err(ExcType::overflow_error("int too large to convert"));
    }
    Ok(truncated as i64)
}

/// `int(x=0)` / `int(text, base)`.
fn int_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_kwargs(&["base"])?;
    let value = ctx.arg_opt(1);
    let base = match (ctx.arg_opt(2), ctx.kwarg("base")) {
        (Some(base), _) | (None, Some(base)) => Some(base),
        (None, None) => None,
    };
    let vm = ctx.vm();
    let result = match (value, base) {
        (None, None) => 0,
        (None, Some(_)) => return Err(ExcType::type_error("int() missing string argument")),
        (Some(value), Some(base)) => {
            let Some(text) = vm.str_value(value) else {
                return Err(ExcType::type_error("int() can't convert non-string with explicit base"));
            };
            let base = match base.as_int() {
                Some(b @ (0 | 2..=36)) => b as u32,
                _ => return Err(ExcType::value_error("int() base must be >= 2 and <= 36, or 0")),
            };
            parse_int(text, base).ok_or_else(|| {
                ExcType::value_error(format!("invalid literal for int() with base {base}: '{text}'"))
            })?
        }
        (Some(value), None) => int_from_value(vm, value)?,
    };
    ctx.ret(Value::Int(result))
}

fn int_from_value(vm: &mut Vm, value: Value) -> RunResult<i64> {
    match value {
        Value::Bool(b) => Ok(i64::from(b)),
        Value::Int(i) => Ok(i),
        Value::Float(f) => float_to_int(f),
        _ => {
            if let Some(text) = vm.str_value(value) {
                return parse_int(text, 10)
                    .ok_or_else(|| ExcType::value_error(format!("invalid literal for int() with base 10: '{text}'")));
            }
            if vm.uses_dunders(value) {
                for dunder in ["__int__", "__index__"] {
                    if let Some(result) = vm.dispatch_dunder(value, dunder, &[])? {
                        return result.as_int().ok_or_else(|| {
                            ExcType::type_error(format!(
                                "{dunder} returned non-int (type {})",
                                vm.type_name(result)
                            ))
                        });
                    }
                }
            }
            Err(ExcType::type_error(format!(
                "int() argument must be a string or a real number, not '{}'",
                vm.type_name(value)
            )))
        }
    }
}

fn parse_float(text: &str) -> Option<f64> {
    text.trim().replace('_', "").parse().ok()
}

fn float_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let value = ctx.arg_opt(1);
    let vm = ctx.vm();
    let result = match value {
        None => 0.0,
        Some(value) => match value {
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => value.as_float().unwrap_or_default(),
            _ => {
                if let Some(text) = vm.str_value(value) {
                    parse_float(text)
                        .ok_or_else(|| ExcType::value_error(format!("could not convert string to float: '{text}'")))?
                } else if vm.uses_dunders(value)
                    && let Some(result) = vm.dispatch_dunder(value, "__float__", &[])?
                {
                    result.as_float().ok_or_else(|| {
                        ExcType::type_error(format!("__float__ returned non-float (type {})", vm.type_name(result)))
                    })?
                } else {
                    return Err(ExcType::type_error(format!(
                        "float() argument must be a string or a real number, not '{}'",
                        vm.type_name(value)
                    )));
                }
            }
        },
    };
    ctx.ret(Value::Float(result))
}

fn bool_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let value = ctx.arg_opt(1);
    let result = match value {
        Some(value) => ctx.vm().truthy(value)?,
        None => false,
    };
    ctx.ret(Value::Bool(result))
}

fn complex_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_kwargs(&["real", "imag"])?;
    let real = ctx.arg_opt(1).or_else(|| ctx.kwarg("real")).unwrap_or(Value::Int(0));
    let imag = ctx.arg_opt(2).or_else(|| ctx.kwarg("imag")).unwrap_or(Value::Int(0));
    let part = |value: Value| match value {
        Value::Complex(c) => Some(c),
        other => other.as_float().map(|re| Complex::new(re, 0.0)),
    };
    let (Some(re), Some(im)) = (part(real), part(imag)) else {
        return Err(ExcType::type_error("complex() arguments must be numbers"));
    };
    // (a + bj) + (c + dj)j
    let result = Complex::new(re.re - im.im, re.im + im.re);
    ctx.ret(Value::Complex(result))
}

fn str_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let value = ctx.arg_opt(1);
    let vm = ctx.vm();
    let text = match value {
        Some(value) => vm.str_of(value)?,
        None => String::new(),
    };
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

/// `bytes()`, `bytes(n)`, `bytes(iterable_of_ints)`.
fn bytes_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let value = ctx.arg_opt(1);
    let vm = ctx.vm();
    let bytes = match value {
        None => Vec::new(),
        Some(Value::Int(n)) => {
            let n = usize::try_from(n).map_err(|_| ExcType::value_error("negative count"))?;
            vm.tracker.check_sequence_size(n)?;
            vec![0; n]
        }
        Some(value) if vm.str_value(value).is_some() => {
            return Err(ExcType::type_error("string argument without an encoding"));
        }
        Some(value) => {
            let items = vm.collect_iter(value)?;
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                match item.as_int() {
                    Some(b @ 0..=255) => bytes.push(b as u8),
                    Some(_) => return Err(ExcType::value_error("bytes must be in range(0, 256)")),
                    None => {
                        return Err(ExcType::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            vm.type_name(item)
                        )));
                    }
                }
            }
            bytes
        }
    };
    let bytes = vm.new_bytes(bytes)?;
    ctx.ret(bytes)
}

fn items_of(ctx: &mut CallContext<'_>) -> RunResult<Vec<Value>> {
    ctx.check_no_kwargs()?;
    match ctx.arg_opt(1) {
        Some(iterable) => ctx.vm().collect_iter(iterable),
        None => Ok(Vec::new()),
    }
}

fn list_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let items = items_of(ctx)?;
    let list = ctx.vm().new_list(items)?;
    ctx.ret(list)
}

fn tuple_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    if let Some(value) = ctx.arg_opt(1)
        && matches!(value, Value::Ref(id) if matches!(ctx.vm_ref().heap.get(id), HeapData::Tuple(_)))
    {
        return ctx.ret(value);
    }
    let items = items_of(ctx)?;
    let tuple = ctx.vm().new_tuple(items)?;
    ctx.ret(tuple)
}

fn set_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let items = items_of(ctx)?;
    let set = ctx.vm().new_set(items)?;
    ctx.ret(set)
}

fn frozenset_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let items = items_of(ctx)?;
    let set = ctx.vm().new_frozenset(items)?;
    ctx.ret(set)
}

/// `dict()`, `dict(mapping)`, `dict(pairs)`, each plus keyword entries.
fn dict_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let source = ctx.arg_opt(1);
    let kwargs = ctx.kwargs().to_vec();
    let vm = ctx.vm();
    let mut pairs = match source {
        Some(source) => mapping_pairs(vm, source)?,
        None => Vec::new(),
    };
    for (key, value) in kwargs {
        pairs.push((vm.new_str(key)?, value));
    }
    let dict = vm.new_dict(pairs)?;
    ctx.ret(dict)
}

/// Key/value pairs of a dict, or of an iterable of two-item sequences.
pub(crate) fn mapping_pairs(vm: &mut Vm, source: Value) -> RunResult<Vec<(Value, Value)>> {
    if let Some(items) = vm.dict_items(source) {
        return Ok(items);
    }
    let entries = vm.collect_iter(source)?;
    let mut pairs = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let items = vm.collect_iter(entry)?;
        let &[key, value] = items.as_slice() else {
            return Err(ExcType::value_error(format!(
                "dictionary update sequence element #{index} has length {}; 2 is required",
                items.len()
            )));
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}

/// `range(stop)`, `range(start, stop[, step])`.
fn range_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    ctx.check_arity(2, Some(4))?;
    let (start, stop, step) = match ctx.arg_count() {
        2 => (0, ctx.arg_int(1)?, 1),
        3 => (ctx.arg_int(1)?, ctx.arg_int(2)?, 1),
        _ => (ctx.arg_int(1)?, ctx.arg_int(2)?, ctx.arg_int(3)?),
    };
    if step == 0 {
        return Err(ExcType::value_error("range() arg 3 must not be zero"));
    }
    let id = ctx.vm().alloc(HeapData::Range(Range { start, stop, step }))?;
    ctx.ret(Value::Ref(id))
}

fn none_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.ret(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_literals() {
        assert_eq!(parse_int(" 42 ", 10), Some(42));
        assert_eq!(parse_int("-1_000", 10), Some(-1000));
        assert_eq!(parse_int("0x1F", 0), Some(31));
        assert_eq!(parse_int("ff", 16), Some(255));
        assert_eq!(parse_int("0b101", 2), Some(5));
        assert_eq!(parse_int("1__0", 10), None);
        assert_eq!(parse_int("12a", 10), None);
        assert_eq!(parse_int("99999999999999999999", 10), None);
    }

    #[test]
    fn float_literals() {
        assert_eq!(parse_float("1.5"), Some(1.5));
        assert_eq!(parse_float(" -2e3 "), Some(-2000.0));
        assert!(parse_float("nan").is_some_and(f64::is_nan));
        assert_eq!(parse_float("-inf"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_float("abc"), None);
    }
}
