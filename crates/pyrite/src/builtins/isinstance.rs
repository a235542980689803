//! Implementation of the isinstance() and issubclass() builtin functions.

use crate::{
    Vm,
    exception::{ExcType, RunResult},
    heap::HeapData,
    native::CallContext,
    value::Value,
};

/// Implementation of the isinstance() builtin function.
///
/// The second argument may be a class or a (possibly nested) tuple of classes.
/// Metaclass `__instancecheck__` overrides are honoured.
pub(super) fn builtin_isinstance(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let (value, classinfo) = (ctx.arg(0)?, ctx.arg(1)?);
    let result = check_classinfo(ctx.vm(), classinfo, "isinstance", &mut |vm, cls| {
        instance_check(vm, value, cls)
    })?;
    ctx.ret(Value::Bool(result))
}

/// Implementation of the issubclass() builtin function.
pub(super) fn builtin_issubclass(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let (sub, classinfo) = (ctx.arg(0)?, ctx.arg(1)?);
    let vm = ctx.vm();
    let Some(sub_id) = sub.ref_id().filter(|_| vm.is_class(sub)) else {
        return Err(ExcType::type_error("issubclass() arg 1 must be a class"));
    };
    let result = check_classinfo(vm, classinfo, "issubclass", &mut |vm, cls| {
        let sup = vm.expect_class(cls)?;
        vm.is_subclass(sub_id, sup)
    })?;
    ctx.ret(Value::Bool(result))
}

/// Applies `check` to `classinfo`, or to each member when it is a tuple.
fn check_classinfo(
    vm: &mut Vm,
    classinfo: Value,
    func: &str,
    check: &mut dyn FnMut(&mut Vm, Value) -> RunResult<bool>,
) -> RunResult<bool> {
    if vm.is_class(classinfo) {
        return check(vm, classinfo);
    }
    let is_tuple = classinfo
        .ref_id()
        .is_some_and(|id| matches!(vm.heap.get(id), HeapData::Tuple(_)));
    if is_tuple && let Some(members) = vm.sequence_items(classinfo) {
        for member in members {
            if check_classinfo(vm, member, func, check)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    Err(ExcType::type_error(format!(
        "{func}() arg 2 must be a type or tuple of types"
    )))
}

/// `isinstance(value, cls)` through the metaclass `__instancecheck__` when it is overridden.
fn instance_check(vm: &mut Vm, value: Value, cls: Value) -> RunResult<bool> {
    let cls_id = vm.expect_class(cls)?;
    let meta = vm.type_of(cls);
    if let Some((_, owner)) = vm.lookup_mro(meta, "__instancecheck__")
        && owner != vm.types.type_
    {
        // Exact type matches never reach the hook.
        if vm.type_of(value) == cls_id {
            return Ok(true);
        }
        let result = vm
            .dispatch_dunder(cls, "__instancecheck__", &[value])?
            .unwrap_or(Value::Bool(false));
        return vm.truthy(result);
    }
    vm.is_instance(value, cls)
}
