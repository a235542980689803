//! Native members of `object` and `type`.
//!
//! These are the defaults every class falls back to: instance allocation, attribute
//! storage, identity equality, the default reprs, and class creation through
//! `type.__new__`.

use crate::{
    Vm,
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeMember},
    types::class::{Instance, InstanceLayout},
    value::Value,
};

const OBJECT_MEMBERS: &[NativeMember] = &[
    NativeMember::static_method("__new__", Arity::at_least(1), object_new),
    NativeMember::method("__init__", Arity::at_least(1), object_init),
    NativeMember::method("__setattr__", Arity::exact(3), object_setattr),
    NativeMember::method("__delattr__", Arity::exact(2), object_delattr),
    NativeMember::method("__repr__", Arity::exact(1), object_repr),
    NativeMember::method("__str__", Arity::exact(1), object_str),
    NativeMember::method("__eq__", Arity::exact(2), object_eq),
    NativeMember::method("__ne__", Arity::exact(2), object_ne),
    NativeMember::class_method("__init_subclass__", Arity::exact(1), object_init_subclass),
    NativeMember::class_method("__subclasshook__", Arity::exact(2), object_subclasshook),
];

const TYPE_MEMBERS: &[NativeMember] = &[
    NativeMember::static_method("__new__", Arity::range(2, 4), type_new),
    NativeMember::method("__init__", Arity::at_least(1), type_init),
    NativeMember::method("__call__", Arity::at_least(1), type_call),
    NativeMember::method("__repr__", Arity::exact(1), type_repr),
    NativeMember::method("mro", Arity::exact(1), type_mro),
    NativeMember::method("__subclasses__", Arity::exact(1), type_subclasses),
    NativeMember::class_method("__prepare__", Arity::at_least(1), type_prepare),
    NativeMember::method("__subclasscheck__", Arity::exact(2), type_subclasscheck),
    NativeMember::method("__instancecheck__", Arity::exact(2), type_instancecheck),
];

pub(super) fn register(vm: &mut Vm) {
    let object = vm.types.object;
    let type_ = vm.types.type_;
    vm.install_members(object, OBJECT_MEMBERS);
    vm.install_members(type_, TYPE_MEMBERS);
}

/// Whether `name` resolves on `cls` to something other than `object`'s definition.
fn overrides(vm: &Vm, cls: HeapId, name: &str) -> bool {
    vm.lookup_mro(cls, name).is_some_and(|(_, owner)| owner != vm.types.object)
}

/// `object.__new__(cls, *args)`.
fn object_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let has_extra = ctx.arg_count() > 1 || !ctx.kwargs().is_empty();
    let vm = ctx.vm();
    let Some(class) = vm.class_obj(cls) else {
        return Err(ExcType::type_error("object.__new__(X): X is not a type object"));
    };
    let class_name = vm.class_display_name(cls);
    match class.layout {
        InstanceLayout::Object => {}
        InstanceLayout::Class => {
            return Err(ExcType::type_error(format!(
                "object.__new__({class_name}) is not safe, use type.__new__()"
            )));
        }
        InstanceLayout::Builtin => {
            return Err(ExcType::type_error(format!(
                "object.__new__({class_name}) is not safe, use {class_name}.__new__()"
            )));
        }
    }
    if !class.abstract_methods.is_empty() {
        let methods = class.abstract_methods.clone();
        return Err(ExcType::abstract_instantiation(&class_name, &methods));
    }
    if has_extra && (overrides(vm, cls, "__new__") || !overrides(vm, cls, "__init__")) {
        return Err(ExcType::arity_error(format!("{class_name}() takes no arguments")));
    }
    let instance = vm.alloc(HeapData::Instance(Instance {
        class_id: cls,
        attrs: Default::default(),
    }))?;
    ctx.ret(Value::Ref(instance))
}

/// `object.__init__(self, *args)`: accepts extra arguments only when `__new__` consumed them.
fn object_init(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let has_extra = ctx.arg_count() > 1 || !ctx.kwargs().is_empty();
    if has_extra {
        let vm = ctx.vm_ref();
        let cls = vm.type_of(this);
        if overrides(vm, cls, "__init__") || !overrides(vm, cls, "__new__") {
            return Err(ExcType::arity_error(format!(
                "{}.__init__() takes exactly one argument (the instance to initialize)",
                vm.class_display_name(cls)
            )));
        }
    }
    Ok(0)
}

fn object_setattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(3, Some(3))?;
    let (this, value) = (ctx.arg(0)?, ctx.arg(2)?);
    let name = ctx.arg_str(1)?;
    ctx.vm().generic_set_attr(this, &name, value)?;
    Ok(0)
}

fn object_delattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let this = ctx.arg(0)?;
    let name = ctx.arg_str(1)?;
    ctx.vm().generic_del_attr(this, &name)?;
    Ok(0)
}

fn object_repr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let vm = ctx.vm();
    let text = match this {
        Value::Ref(id) if matches!(vm.heap.get(id), HeapData::Instance(_)) => {
            vm.default_object_repr(vm.type_of(this), id)
        }
        other => vm.repr_of(other)?,
    };
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

fn object_str(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let vm = ctx.vm();
    let text = vm.repr_of(this)?;
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

fn object_eq(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let (this, other) = (ctx.arg(0)?, ctx.arg(1)?);
    ctx.ret(if this.is(other) { Value::Bool(true) } else { Value::NotImplemented })
}

/// `object.__ne__`: the inverse of `__eq__` unless that returned `NotImplemented`.
fn object_ne(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let (this, other) = (ctx.arg(0)?, ctx.arg(1)?);
    let vm = ctx.vm();
    let result = match vm.dispatch_dunder(this, "__eq__", &[other])? {
        Some(eq) => Value::Bool(!vm.truthy(eq)?),
        None => Value::NotImplemented,
    };
    ctx.ret(result)
}

fn object_init_subclass(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    if let Some((key, _)) = ctx.kwargs().first() {
        let cls = ctx.arg_class(0)?;
        return Err(ExcType::type_error(format!(
            "{}.__init_subclass__() takes no keyword argument '{key}'",
            ctx.vm_ref().class_display_name(cls)
        )));
    }
    Ok(0)
}

fn object_subclasshook(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.ret(Value::NotImplemented)
}

/// `type.__new__(meta, name, bases, namespace, **kwargs)`, or `type(x)`.
fn type_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let meta = ctx.arg_class(0)?;
    if ctx.arg_count() == 2 {
        let value = ctx.arg(1)?;
        let cls = ctx.vm_ref().type_of(value);
        return ctx.ret(Value::Ref(cls));
    }
    ctx.check_arity(4, Some(4))?;
    let name = ctx.arg_str(1)?;
    let (bases, namespace) = (ctx.arg(2)?, ctx.arg(3)?);
    let kwargs = ctx.kwargs().to_vec();
    let vm = ctx.vm();
    let Some(base_values) = vm.sequence_items(bases) else {
        return Err(ExcType::type_error(format!(
            "type.__new__() argument 2 must be tuple, not {}",
            vm.type_name(bases)
        )));
    };
    let mut base_ids = Vec::with_capacity(base_values.len());
    for base in base_values {
        base_ids.push(vm.expect_class(base)?);
    }
    let attrs = vm.namespace_to_attrs(namespace)?;
    let cls = vm.create_class_object(meta, &name, &base_ids, attrs, kwargs)?;
    ctx.ret(Value::Ref(cls))
}

fn type_init(_ctx: &mut CallContext<'_>) -> RunResult<usize> {
    Ok(0)
}

/// `type.__call__(cls, *args, **kwargs)`, reachable from metaclass overrides via `super()`.
fn type_call(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let args = ArgValues::with_kwargs(ctx.args()[1..].iter().copied(), ctx.kwargs().to_vec());
    let result = ctx.vm().type_call(cls, args)?;
    ctx.ret(result)
}

fn type_repr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();
    let text = format!("<class '{}'>", vm.class_path(cls));
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

/// `type.mro()`: the default C3 order, as a list.
fn type_mro(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();
    let mro = vm.mro_of(cls).into_iter().map(Value::Ref).collect();
    let list = vm.new_list(mro)?;
    ctx.ret(list)
}

/// `type.__subclasses__()`: live direct subclasses in creation order.
fn type_subclasses(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();
    let subclasses = vm
        .class_obj(cls)
        .map(|c| c.subclasses.iter().copied().map(Value::Ref).collect())
        .unwrap_or_default();
    let list = vm.new_list(subclasses)?;
    ctx.ret(list)
}

fn type_prepare(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let namespace = ctx.vm().new_dict(Vec::new())?;
    ctx.ret(namespace)
}

fn type_subclasscheck(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let sup = ctx.arg_class(0)?;
    let sub = ctx.arg_class(1)?;
    let result = ctx.vm().default_subclass_check(sub, sup)?;
    ctx.ret(Value::Bool(result))
}

fn type_instancecheck(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (cls, value) = (ctx.arg(0)?, ctx.arg(1)?);
    let result = ctx.vm().is_instance(value, cls)?;
    ctx.ret(Value::Bool(result))
}
