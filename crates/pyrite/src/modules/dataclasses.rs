//! Implementation of the `dataclasses` module.
//!
//! `dataclass` reads the class's `__annotations__` and installs shared native
//! `__init__`, `__repr__` and `__eq__` methods. Those natives find the field list
//! through the `__dataclass_fields__` class attribute, so one set of handlers
//! serves every dataclass. Defaults are the class attributes of the same name.

use crate::{
    Vm,
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeFn},
    value::Value,
};

/// Tuple of field names in `__init__` order, base class fields first.
const FIELDS_ATTR: &str = "__dataclass_fields__";
const FROZEN_ATTR: &str = "__dataclass_frozen__";

/// Keyword options of `dataclass(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Options {
    init: bool,
    repr: bool,
    eq: bool,
    frozen: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            init: true,
            repr: true,
            eq: true,
            frozen: false,
        }
    }
}

impl Options {
    fn from_ctx(ctx: &mut CallContext<'_>) -> RunResult<Self> {
        ctx.check_kwargs(&["init", "repr", "eq", "frozen"])?;
        let defaults = Self::default();
        let mut flag = |name: &str, default: bool| -> RunResult<bool> {
            match ctx.kwarg(name) {
                Some(value) => ctx.vm().truthy(value),
                None => Ok(default),
            }
        };
        Ok(Self {
            init: flag("init", defaults.init)?,
            repr: flag("repr", defaults.repr)?,
            eq: flag("eq", defaults.eq)?,
            frozen: flag("frozen", defaults.frozen)?,
        })
    }

    fn to_value(self, vm: &mut Vm) -> RunResult<Value> {
        vm.new_tuple(vec![
            Value::Bool(self.init),
            Value::Bool(self.repr),
            Value::Bool(self.eq),
            Value::Bool(self.frozen),
        ])
    }

    fn from_value(vm: &Vm, value: Value) -> RunResult<Self> {
        match vm.sequence_items(value).as_deref() {
            Some(&[Value::Bool(init), Value::Bool(repr), Value::Bool(eq), Value::Bool(frozen)]) => Ok(Self {
                init,
                repr,
                eq,
                frozen,
            }),
            _ => Err(ExcType::type_error("invalid dataclass options")),
        }
    }
}

pub(super) fn create_module(vm: &mut Vm) -> RunResult<()> {
    let frozen_error = vm.exception_class(ExcType::FrozenInstanceError);
    let mut builder = vm.module_builder("dataclasses");
    builder
        .function("dataclass", Arity::range(0, 1), dataclass)
        .function("fields", Arity::exact(1), fields)
        .function("is_dataclass", Arity::exact(1), is_dataclass)
        .function("asdict", Arity::exact(1), asdict)
        .class("FrozenInstanceError", frozen_error);
    builder.build();
    Ok(())
}

/// `dataclass(cls=None, /, *, init=True, repr=True, eq=True, frozen=False)`.
///
/// Without a class, returns a decorator carrying the options.
fn dataclass(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let options = Options::from_ctx(ctx)?;
    match ctx.arg_opt(0) {
        Some(cls) if !cls.is_none() => {
            let cls = ctx.vm_ref().expect_class(cls)?;
            process_class(ctx.vm(), cls, options)?;
            ctx.ret(Value::Ref(cls))
        }
        _ => {
            let vm = ctx.vm();
            let receiver = options.to_value(vm)?;
            let apply = vm.new_native_function("dataclass", Arity::exact(2), apply_options);
            let decorator = vm.new_bound_method(receiver, apply)?;
            ctx.ret(decorator)
        }
    }
}

/// The decorator returned by `dataclass(...)`: `(options, cls)`.
fn apply_options(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let options = Options::from_value(ctx.vm_ref(), ctx.arg(0)?)?;
    let cls = ctx.arg_class(1)?;
    process_class(ctx.vm(), cls, options)?;
    ctx.ret(Value::Ref(cls))
}

fn own_attr(vm: &Vm, cls: HeapId, name: &str) -> Option<Value> {
    vm.class_obj(cls).and_then(|c| c.namespace.get(name).copied())
}

/// Field names declared in the class body, in annotation order.
fn annotated_names(vm: &Vm, cls: HeapId) -> Vec<String> {
    own_attr(vm, cls, "__annotations__")
        .and_then(|annotations| vm.dict_items(annotations))
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, _)| vm.str_value(key).map(str::to_owned))
        .collect()
}

fn is_mutable_default(vm: &Vm, value: Value) -> bool {
    matches!(
        value,
        Value::Ref(id) if matches!(vm.heap.get(id), HeapData::List(_) | HeapData::Dict(_) | HeapData::Set(_))
    )
}

fn process_class(vm: &mut Vm, cls: HeapId, options: Options) -> RunResult<()> {
    let class_name = vm.class_display_name(cls);

    // Inherited fields come first, collected from the most distant base.
    let mut names: Vec<String> = Vec::new();
    let mro = vm.mro_of(cls);
    for &base in mro.iter().skip(1).rev() {
        let Some(base_fields) = own_attr(vm, base, FIELDS_ATTR) else { continue };
        if let Some(Value::Bool(base_frozen)) = own_attr(vm, base, FROZEN_ATTR)
            && base_frozen != options.frozen
        {
            return Err(ExcType::type_error(if options.frozen {
                "cannot inherit frozen dataclass from a non-frozen one"
            } else {
                "cannot inherit non-frozen dataclass from a frozen one"
            }));
        }
        for field in vm.sequence_items(base_fields).unwrap_or_default() {
            if let Some(field) = vm.str_value(field)
                && !names.iter().any(|n| n == field)
            {
                names.push(field.to_owned());
            }
        }
    }
    for field in annotated_names(vm, cls) {
        if !names.contains(&field) {
            names.push(field);
        }
    }

    let mut first_default: Option<&str> = None;
    for name in &names {
        match vm.lookup_mro(cls, name) {
            Some((default, _)) => {
                if is_mutable_default(vm, default) {
                    return Err(ExcType::value_error(format!(
                        "mutable default {} for field {name} is not allowed: use default_factory",
                        vm.repr_of(Value::Ref(vm.type_of(default)))?
                    )));
                }
                first_default.get_or_insert(name);
            }
            None => {
                if options.init
                    && let Some(previous) = first_default
                {
                    return Err(ExcType::type_error(format!(
                        "non-default argument '{name}' follows default argument '{previous}'"
                    )));
                }
            }
        }
    }

    let field_values = names
        .iter()
        .map(|name| vm.new_str(name.as_str()))
        .collect::<RunResult<Vec<_>>>()?;
    let field_tuple = vm.new_tuple(field_values)?;
    vm.class_set_attr(cls, FIELDS_ATTR, field_tuple)?;
    vm.class_set_attr(cls, FROZEN_ATTR, Value::Bool(options.frozen))?;

    if options.init {
        install(vm, cls, "__init__", Arity::at_least(1), dataclass_init)?;
    }
    if options.repr {
        install(vm, cls, "__repr__", Arity::exact(1), dataclass_repr)?;
    }
    if options.eq {
        install(vm, cls, "__eq__", Arity::exact(2), dataclass_eq)?;
    }
    if options.frozen {
        for (name, handler) in [
            ("__setattr__", frozen_setattr as NativeFn),
            ("__delattr__", frozen_delattr),
        ] {
            if own_attr(vm, cls, name).is_some() {
                return Err(ExcType::type_error(format!(
                    "Cannot overwrite attribute {name} in class {class_name}"
                )));
            }
            let arity = if name == "__setattr__" { Arity::exact(3) } else { Arity::exact(2) };
            let func = vm.new_native_function(name, arity, handler);
            vm.class_set_attr(cls, name, func)?;
        }
    }
    tracing::debug!(
        target: "pyrite::vm",
        class = %class_name,
        fields = names.len(),
        frozen = options.frozen,
        "dataclass processed"
    );
    Ok(())
}

/// Adds a synthesized method unless the class body defines its own.
fn install(vm: &mut Vm, cls: HeapId, name: &str, arity: Arity, handler: NativeFn) -> RunResult<()> {
    if own_attr(vm, cls, name).is_some() {
        return Ok(());
    }
    let func = vm.new_native_function(name, arity, handler);
    vm.class_set_attr(cls, name, func)
}

/// The field names of a dataclass, or `None` for anything else.
fn field_names(vm: &Vm, cls: HeapId) -> Option<Vec<String>> {
    let (fields, _) = vm.lookup_mro(cls, FIELDS_ATTR)?;
    let names = vm
        .sequence_items(fields)?
        .into_iter()
        .filter_map(|name| vm.str_value(name).map(str::to_owned))
        .collect();
    Some(names)
}

fn dataclass_fields_of(vm: &Vm, value: Value) -> RunResult<Vec<String>> {
    let cls = match value {
        Value::Ref(id) if vm.is_class(value) => id,
        _ => vm.type_of(value),
    };
    field_names(vm, cls).ok_or_else(|| ExcType::type_error("must be called with a dataclass type or instance"))
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 { format!("{n} {word}") } else { format!("{n} {word}s") }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b' and 'c'`.
fn quoted_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    match quoted.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
        _ => quoted.concat(),
    }
}

/// Synthesized `__init__(self, *fields)`; runs `__post_init__` when the class defines one.
fn dataclass_init(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let positional = ctx.args()[1..].to_vec();
    let kwargs = ctx.kwargs().to_vec();
    let vm = ctx.vm();
    let cls = vm.type_of(this);
    let names = dataclass_fields_of(vm, this)?;

    if positional.len() > names.len() {
        return Err(ExcType::arity_error(format!(
            "__init__() takes {} but {} were given",
            plural(names.len() + 1, "positional argument"),
            positional.len() + 1
        )));
    }
    let mut values: Vec<Option<Value>> = names.iter().map(|_| None).collect();
    for (slot, value) in values.iter_mut().zip(positional) {
        *slot = Some(value);
    }
    for (key, value) in kwargs {
        let Some(index) = names.iter().position(|n| *n == key) else {
            return Err(ExcType::arity_error(format!(
                "__init__() got an unexpected keyword argument '{key}'"
            )));
        };
        if values[index].is_some() {
            return Err(ExcType::arity_error(format!(
                "__init__() got multiple values for argument '{key}'"
            )));
        }
        values[index] = Some(value);
    }

    let mut missing = Vec::new();
    for (name, slot) in names.iter().zip(values.iter_mut()) {
        if slot.is_none() {
            match vm.lookup_mro(cls, name) {
                Some((default, _)) => *slot = Some(default),
                None => missing.push(name.as_str()),
            }
        }
    }
    if !missing.is_empty() {
        return Err(ExcType::arity_error(format!(
            "__init__() missing {}: {}",
            plural(missing.len(), "required positional argument"),
            quoted_list(&missing)
        )));
    }

    let frozen = matches!(vm.lookup_mro(cls, FROZEN_ATTR), Some((Value::Bool(true), _)));
    for (name, value) in names.iter().zip(values) {
        let value = value.unwrap_or(Value::None);
        if frozen {
            vm.generic_set_attr(this, name, value)?;
        } else {
            vm.set_attr(this, name, value)?;
        }
    }
    if vm.lookup_mro(cls, "__post_init__").is_some() {
        vm.call_method(this, "__post_init__", ArgValues::empty())?;
    }
    Ok(0)
}

/// `Point(x=1, y=2)`.
fn dataclass_repr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let vm = ctx.vm();
    let names = dataclass_fields_of(vm, this)?;
    let mut parts = Vec::with_capacity(names.len());
    for name in &names {
        let value = vm.get_attr(this, name)?;
        parts.push(format!("{name}={}", vm.repr_of(value)?));
    }
    let cls = vm.type_of(this);
    let text = format!("{}({})", vm.class_display_name(cls), parts.join(", "));
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

/// Field-wise equality between instances of exactly the same class.
fn dataclass_eq(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, other) = (ctx.arg(0)?, ctx.arg(1)?);
    let vm = ctx.vm();
    if vm.type_of(this) != vm.type_of(other) {
        return ctx.ret(Value::NotImplemented);
    }
    if this.is(other) {
        return ctx.ret(Value::Bool(true));
    }
    for name in dataclass_fields_of(vm, this)? {
        let lhs = vm.get_attr(this, &name)?;
        let rhs = vm.get_attr(other, &name)?;
        if !vm.values_equal(lhs, rhs)? {
            return ctx.ret(Value::Bool(false));
        }
    }
    ctx.ret(Value::Bool(true))
}

fn frozen_setattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let name = ctx.arg_str(1)?;
    Err(ExcType::frozen_instance(&name))
}

fn frozen_delattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let name = ctx.arg_str(1)?;
    Err(ExcType::frozen_instance(&name))
}

/// `fields(class_or_instance)`: the field names as a tuple.
fn fields(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let target = ctx.arg(0)?;
    let vm = ctx.vm();
    let names = dataclass_fields_of(vm, target)?;
    let values = names
        .into_iter()
        .map(|name| vm.new_str(name))
        .collect::<RunResult<Vec<_>>>()?;
    let tuple = vm.new_tuple(values)?;
    ctx.ret(tuple)
}

fn is_dataclass(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let target = ctx.arg(0)?;
    let result = dataclass_fields_of(ctx.vm_ref(), target).is_ok();
    ctx.ret(Value::Bool(result))
}

/// `asdict(instance)`: a dict of field values; nested dataclasses are not converted.
fn asdict(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let vm = ctx.vm();
    if vm.is_class(this) {
        return Err(ExcType::type_error("asdict() should be called on dataclass instances"));
    }
    let names = dataclass_fields_of(vm, this)?;
    let mut pairs = Vec::with_capacity(names.len());
    for name in names {
        let value = vm.get_attr(this, &name)?;
        pairs.push((vm.new_str(name)?, value));
    }
    let dict = vm.new_dict(pairs)?;
    ctx.ret(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_lists_read_naturally() {
        assert_eq!(quoted_list(&["x"]), "'x'");
        assert_eq!(quoted_list(&["x", "y"]), "'x' and 'y'");
        assert_eq!(quoted_list(&["x", "y", "z"]), "'x', 'y' and 'z'");
        assert_eq!(plural(1, "argument"), "1 argument");
        assert_eq!(plural(3, "argument"), "3 arguments");
    }
}
