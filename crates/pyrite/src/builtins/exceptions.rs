//! The builtin exception hierarchy.
//!
//! Exception classes are ordinary guest-visible classes created through the regular
//! class path, so user code can subclass them freely. `BaseException` carries the
//! natives; every other class inherits them.

use strum::IntoEnumIterator;

use crate::{
    Vm,
    bytecode::vm::init_exception_attrs,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeMember},
    types::{AttrMap, class::Instance},
    value::Value,
};

const BASE_EXCEPTION_MEMBERS: &[NativeMember] = &[
    NativeMember::static_method("__new__", Arity::at_least(1), exception_new),
    NativeMember::method("__init__", Arity::at_least(1), exception_init),
    NativeMember::method("__str__", Arity::exact(1), exception_str),
    NativeMember::method("__repr__", Arity::exact(1), exception_repr),
    NativeMember::method("with_traceback", Arity::exact(2), exception_with_traceback),
];

pub(super) fn register(vm: &mut Vm) -> RunResult<()> {
    for exc_type in ExcType::iter() {
        create_exception_class(vm, exc_type)?;
    }
    if let Some(&base) = vm.exc_classes.get(&ExcType::BaseException) {
        vm.install_members(base, BASE_EXCEPTION_MEMBERS);
    }
    Ok(())
}

/// Creates the class for `exc_type`, creating its ancestors first.
fn create_exception_class(vm: &mut Vm, exc_type: ExcType) -> RunResult<HeapId> {
    if let Some(&id) = vm.exc_classes.get(&exc_type) {
        return Ok(id);
    }
    let bases = match exc_type.parent() {
        Some(parent) => vec![create_exception_class(vm, parent)?],
        None => Vec::new(),
    };
    let module = match exc_type {
        ExcType::FrozenInstanceError => "dataclasses",
        _ => "builtins",
    };
    let mut namespace = AttrMap::default();
    namespace.insert("__module__".to_owned(), vm.new_str(module)?);
    let name: &'static str = exc_type.into();
    let meta = vm.types.type_;
    let id = vm.create_class_object(meta, name, &bases, namespace, Vec::new())?;
    vm.exc_classes.insert(exc_type, id);
    Ok(id)
}

fn instance_id(vm: &Vm, value: Value) -> RunResult<HeapId> {
    match value {
        Value::Ref(id) if matches!(vm.heap.get(id), HeapData::Instance(_)) => Ok(id),
        _ => Err(ExcType::type_error(format!(
            "descriptor requires a 'BaseException' object but received '{}'",
            vm.type_name(value)
        ))),
    }
}

/// `BaseException.__new__(cls, *args)`: records `args` before any `__init__` runs.
fn exception_new(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let rest = ctx.args()[1..].to_vec();
    let vm = ctx.vm();
    if !vm.is_exception_class(cls) {
        return Err(ExcType::type_error(format!(
            "BaseException.__new__({}): not a subtype of BaseException",
            vm.class_display_name(cls)
        )));
    }
    let first = rest.first().copied();
    let args = vm.new_tuple(rest)?;
    let mut attrs = AttrMap::default();
    init_exception_attrs(&mut attrs, args);
    if let Some(&stop) = vm.exc_classes.get(&ExcType::StopIteration)
        && vm.mro_of(cls).contains(&stop)
    {
        attrs.insert("value".to_owned(), first.unwrap_or(Value::None));
    }
    let id = vm.alloc(HeapData::Instance(Instance { class_id: cls, attrs }))?;
    ctx.ret(Value::Ref(id))
}

/// `BaseException.__init__(self, *args)`: replaces `args`.
fn exception_init(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let rest = ctx.args()[1..].to_vec();
    let vm = ctx.vm();
    instance_id(vm, this)?;
    let args = vm.new_tuple(rest)?;
    vm.set_exc_attr(this, "args", args);
    Ok(0)
}

fn exception_args(vm: &Vm, this: Value) -> RunResult<Vec<Value>> {
    instance_id(vm, this)?;
    let args = vm.exc_attr(this, "args").unwrap_or(Value::None);
    Ok(vm.sequence_items(args).unwrap_or_default())
}

/// `str(exc)`: empty without arguments, `str(arg)` for one, the tuple repr otherwise.
fn exception_str(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let vm = ctx.vm();
    let args = exception_args(vm, this)?;
    let text = match args.as_slice() {
        [] => String::new(),
        [single] => vm.str_of(*single)?,
        _ => {
            let tuple = vm.exc_attr(this, "args").unwrap_or(Value::None);
            vm.repr_of(tuple)?
        }
    };
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

/// `repr(exc)`: `Name(arg, ...)`.
fn exception_repr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let vm = ctx.vm();
    let args = exception_args(vm, this)?;
    let name = vm.type_name(this);
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(vm.repr_of(arg)?);
    }
    let text = vm.new_str(format!("{name}({})", parts.join(", ")))?;
    ctx.ret(text)
}

/// Tracebacks are owned by the runtime; this exists for compatibility and returns `self`.
fn exception_with_traceback(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    instance_id(ctx.vm_ref(), this)?;
    ctx.ret(this)
}
