//! `property`, `classmethod`, `staticmethod` and `super`.

use crate::{
    Vm,
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeMember},
    types::function::{Property, SuperProxy},
    value::Value,
};

const PROPERTY_MEMBERS: &[NativeMember] = &[
    NativeMember::static_method("__new__", Arity::range(1, 5), property_new),
    NativeMember::method("getter", Arity::exact(2), property_getter),
    NativeMember::method("setter", Arity::exact(2), property_setter),
    NativeMember::method("deleter", Arity::exact(2), property_deleter),
    NativeMember::method("__get__", Arity::range(2, 3), property_get),
    NativeMember::method("__set__", Arity::exact(3), property_set),
];

pub(super) fn register(vm: &mut Vm) {
    let t = vm.types.clone();
    vm.install_members(t.property, PROPERTY_MEMBERS);
    vm.install_members(
        t.classmethod,
        &[NativeMember::static_method("__new__", Arity::exact(2), classmethod_new)],
    );
    vm.install_members(
        t.staticmethod,
        &[NativeMember::static_method("__new__", Arity::exact(2), staticmethod_new)],
    );
    vm.install_members(t.super_, &[NativeMember::static_method("__new__", Arity::range(1, 3), super_new)]);
}

/// `property(fget=None, fset=None, fdel=None, doc=None)`.
fn property_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_kwargs(&["fget", "fset", "fdel", "doc"])?;
    let accessor = |index: usize, name: &str| ctx.arg_opt(index).or_else(|| ctx.kwarg(name)).unwrap_or(Value::None);
    let prop = Property {
        fget: accessor(1, "fget"),
        fset: accessor(2, "fset"),
        fdel: accessor(3, "fdel"),
    };
    let id = ctx.vm().alloc(HeapData::Property(prop))?;
    ctx.ret(Value::Ref(id))
}

fn property_of(vm: &Vm, value: Value) -> RunResult<Property> {
    match value {
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Property(prop) => Ok(*prop),
            _ => Err(ExcType::type_error(format!(
                "descriptor requires a 'property' object but received '{}'",
                vm.type_name(value)
            ))),
        },
        _ => Err(ExcType::type_error("descriptor requires a 'property' object")),
    }
}

/// Copies the property with one accessor replaced, as `@prop.setter` does.
fn replace_accessor(ctx: &mut CallContext<'_>, update: fn(&mut Property, Value)) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let (this, func) = (ctx.arg(0)?, ctx.arg(1)?);
    let vm = ctx.vm();
    let mut prop = property_of(vm, this)?;
    update(&mut prop, func);
    let id = vm.alloc(HeapData::Property(prop))?;
    ctx.ret(Value::Ref(id))
}

fn property_getter(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    replace_accessor(ctx, |prop, func| prop.fget = func)
}

fn property_setter(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    replace_accessor(ctx, |prop, func| prop.fset = func)
}

fn property_deleter(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    replace_accessor(ctx, |prop, func| prop.fdel = func)
}

/// `prop.__get__(instance, owner=None)`; the property itself when accessed on the class.
fn property_get(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, instance) = (ctx.arg(0)?, ctx.arg(1)?);
    let vm = ctx.vm();
    let prop = property_of(vm, this)?;
    if instance.is_none() {
        return ctx.ret(this);
    }
    if prop.fget.is_none() {
        return Err(ExcType::attribute_error(vm.type_name(instance), "<property>"));
    }
    let result = vm.call(prop.fget, ArgValues::one(instance))?;
    ctx.ret(result)
}

fn property_set(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, instance, value) = (ctx.arg(0)?, ctx.arg(1)?, ctx.arg(2)?);
    let vm = ctx.vm();
    let prop = property_of(vm, this)?;
    if prop.fset.is_none() {
        return Err(ExcType::attribute_error(vm.type_name(instance), "<property>"));
    }
    vm.call(prop.fset, ArgValues::two(instance, value))?;
    Ok(0)
}

fn classmethod_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let func = ctx.arg(1)?;
    let id = ctx.vm().alloc(HeapData::ClassMethod(func))?;
    ctx.ret(Value::Ref(id))
}

fn staticmethod_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let func = ctx.arg(1)?;
    let id = ctx.vm().alloc(HeapData::StaticMethod(func))?;
    ctx.ret(Value::Ref(id))
}

/// `super()` inside a method, or `super(cls, obj)`.
fn super_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let proxy = match ctx.arg_count() {
        1 => implicit_super(ctx.vm_ref())?,
        3 => {
            let this_class = ctx.arg_class(1)?;
            let object = ctx.arg(2)?;
            check_super_object(ctx.vm_ref(), this_class, object)?;
            SuperProxy { this_class, object }
        }
        _ => return Err(ExcType::type_error("super() takes zero or two arguments")),
    };
    let id = ctx.vm().alloc(HeapData::Super(proxy))?;
    ctx.ret(Value::Ref(id))
}

/// Zero-argument `super()`: the defining class of the calling function and its first argument.
fn implicit_super(vm: &Vm) -> RunResult<SuperProxy> {
    let Some(frame) = vm.call_stack.last() else {
        return Err(ExcType::runtime_error("super(): no current frame"));
    };
    let owner = frame.function.and_then(|func| match vm.heap.get(func) {
        HeapData::Function(f) => f.owner,
        _ => None,
    });
    let Some(this_class) = owner else {
        return Err(ExcType::runtime_error("super(): __class__ cell not found"));
    };
    if frame.first_arg.is_undefined() {
        return Err(ExcType::runtime_error("super(): no arguments"));
    }
    Ok(SuperProxy {
        this_class,
        object: frame.first_arg,
    })
}

fn check_super_object(vm: &Vm, this_class: HeapId, object: Value) -> RunResult<()> {
    let instance_ok = vm.mro_of(vm.type_of(object)).contains(&this_class);
    let class_ok = match object {
        Value::Ref(id) if vm.is_class(object) => vm.mro_of(id).contains(&this_class),
        _ => false,
    };
    if instance_ok || class_ok {
        Ok(())
    } else {
        Err(ExcType::type_error(
            "super(type, obj): obj must be an instance or subtype of type",
        ))
    }
}
