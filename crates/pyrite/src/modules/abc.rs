//! Implementation of the `abc` module.
//!
//! - `ABCMeta` is a metaclass whose `register` records virtual subclasses
//! - `ABC` is a convenience base using `ABCMeta`
//! - `abstractmethod` marks a function; class creation collects marked names into
//!   `__abstractmethods__` and `object.__new__` refuses to instantiate such classes

use crate::{
    Vm,
    exception::{ExcType, RunResult},
    heap::HeapData,
    native::{Arity, CallContext, NativeMember},
    value::Value,
};

const ABC_META_MEMBERS: &[NativeMember] = &[
    NativeMember::method("register", Arity::exact(2), abc_register),
    NativeMember::method("__instancecheck__", Arity::exact(2), abc_instancecheck),
    NativeMember::method("__subclasscheck__", Arity::exact(2), abc_subclasscheck),
];

pub(super) fn create_module(vm: &mut Vm) -> RunResult<()> {
    let type_class = vm.type_class();
    let abc_meta = vm.new_native_class("ABCMeta", &[type_class], None, ABC_META_MEMBERS)?;
    super::set_module_name(vm, abc_meta, "abc")?;
    let abc = vm.new_native_class("ABC", &[], Some(abc_meta), &[])?;
    super::set_module_name(vm, abc, "abc")?;

    let mut builder = vm.module_builder("abc");
    builder
        .class("ABCMeta", abc_meta)
        .class("ABC", abc)
        .function("abstractmethod", Arity::exact(1), abstractmethod)
        .function("update_abstractmethods", Arity::exact(1), update_abstractmethods);
    builder.build();
    Ok(())
}

/// `abstractmethod(func)`: marks and returns `func`.
///
/// Accepts plain functions and `classmethod`/`staticmethod`/`property` wrappers
/// around them, marking the wrapped function.
fn abstractmethod(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let func = ctx.arg(0)?;
    let vm = ctx.vm();
    if !mark_abstract(vm, func) {
        return Err(ExcType::type_error(format!(
            "abstractmethod() expects a function, not '{}'",
            vm.type_name(func)
        )));
    }
    ctx.ret(func)
}

fn mark_abstract(vm: &mut Vm, value: Value) -> bool {
    let Value::Ref(id) = value else { return false };
    let inner = match vm.heap.get_mut(id) {
        HeapData::Function(func) => {
            func.is_abstract = true;
            return true;
        }
        HeapData::ClassMethod(f) | HeapData::StaticMethod(f) => *f,
        HeapData::Property(p) => p.fget,
        _ => return false,
    };
    mark_abstract(vm, inner)
}

/// `update_abstractmethods(cls)`: recomputes `__abstractmethods__` after a class was
/// patched, returning the class.
fn update_abstractmethods(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    ctx.vm().update_abstract_methods(cls);
    ctx.ret(Value::Ref(cls))
}

/// `ABCMeta.register(cls, subclass)`: returns `subclass` so it works as a decorator.
fn abc_register(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (cls, subclass) = (ctx.arg(0)?, ctx.arg(1)?);
    let vm = ctx.vm();
    if !vm.is_class(subclass) {
        return Err(ExcType::type_error("Can only register classes"));
    }
    vm.register_virtual_subclass(cls, subclass)?;
    let name = vm.repr_of(subclass)?;
    tracing::debug!(target: "pyrite::vm", subclass = %name, "virtual subclass registered");
    ctx.ret(subclass)
}

fn abc_instancecheck(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (cls, instance) = (ctx.arg(0)?, ctx.arg(1)?);
    let result = ctx.vm().is_instance(instance, cls)?;
    ctx.ret(Value::Bool(result))
}

/// `ABCMeta.__subclasscheck__`: the subclass hook, then the MRO, then the registry.
fn abc_subclasscheck(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let sub = ctx.arg(1)?;
    let vm = ctx.vm();
    let Some(sub) = sub.ref_id().filter(|_| vm.is_class(sub)) else {
        return Err(ExcType::type_error("issubclass() arg 1 must be a class"));
    };
    let result = vm.default_subclass_check(sub, cls)?;
    ctx.ret(Value::Bool(result))
}
