//! The native calling convention.
//!
//! A native function is a plain `fn(&mut CallContext<'_>) -> RunResult<usize>`. The
//! [`CallContext`] is the argument frame of the call: handlers read their arguments
//! from it, push results onto it and return how many they pushed. Zero results become
//! `None`, one result is returned as is, several are packed into a tuple.
//!
//! The bridge performs no argument checking of its own; [`Arity`] is only shown in
//! reprs. Handlers validate explicitly with [`CallContext::check_arity`],
//! [`CallContext::arg_int`] and friends. A panicking handler is caught at the bridge and
//! surfaces as a `SystemError` in the calling guest frame.
//!
//! Natives are published with [`ModuleBuilder`] (modules for `import`) or
//! [`Vm::set_builtin`] (names visible everywhere).

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use smallvec::SmallVec;

use crate::{
    Vm,
    args::ArgValues,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    types::{
        AttrMap,
        class::{InstanceLayout, class_name},
        function::{NativeFunction, Property},
    },
    value::Value,
};

/// Signature of a native function.
pub type NativeFn = fn(&mut CallContext<'_>) -> RunResult<usize>;

/// Declared argument count of a native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const ANY: Self = Self { min: 0, max: None };

    #[must_use]
    pub const fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    #[must_use]
    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    #[must_use]
    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{}-{max}", self.min),
            None => write!(f, "{}+", self.min),
        }
    }
}

/// The argument frame of a native call.
pub struct CallContext<'vm> {
    vm: &'vm mut Vm,
    name: String,
    /// Arguments first, then pushed results.
    frame: SmallVec<[Value; 8]>,
    nargs: usize,
    kwargs: Vec<(String, Value)>,
}

impl<'vm> CallContext<'vm> {
    pub(crate) fn new(vm: &'vm mut Vm, name: String, args: ArgValues) -> Self {
        let nargs = args.positional.len();
        Self {
            vm,
            name,
            frame: args.positional.into_iter().collect(),
            nargs,
            kwargs: args.kwargs,
        }
    }

    pub fn vm(&mut self) -> &mut Vm {
        self.vm
    }

    pub fn vm_ref(&self) -> &Vm {
        self.vm
    }

    /// Name the function was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of positional arguments.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.nargs
    }

    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.frame[..self.nargs]
    }

    #[must_use]
    pub fn arg_opt(&self, index: usize) -> Option<Value> {
        self.args().get(index).copied()
    }

    /// Positional argument `index`, or an arity error naming the function.
    pub fn arg(&self, index: usize) -> RunResult<Value> {
        self.arg_opt(index).ok_or_else(|| {
            ExcType::arity_error(format!(
                "{}() missing required argument (pos {})",
                self.name,
                index + 1
            ))
        })
    }

    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<Value> {
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| *v)
    }

    #[must_use]
    pub fn kwargs(&self) -> &[(String, Value)] {
        &self.kwargs
    }

    /// Checks the positional argument count.
    pub fn check_arity(&self, min: usize, max: Option<usize>) -> RunResult<()> {
        let n = self.nargs;
        if n >= min && max.is_none_or(|max| n <= max) {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => format!("exactly {min}"),
            Some(max) if n > max => format!("at most {max}"),
            _ => format!("at least {min}"),
        };
        let noun = if max.unwrap_or(min) == 1 { "argument" } else { "arguments" };
        Err(ExcType::arity_error(format!(
            "{}() takes {expected} {noun} ({n} given)",
            self.name
        )))
    }

    /// Fails when any keyword argument was passed.
    pub fn check_no_kwargs(&self) -> RunResult<()> {
        if self.kwargs.is_empty() {
            Ok(())
        } else {
            Err(ExcType::arity_error(format!(
                "{}() takes no keyword arguments",
                self.name
            )))
        }
    }

    /// Fails on any keyword argument not in `allowed`.
    pub fn check_kwargs(&self, allowed: &[&str]) -> RunResult<()> {
        match self.kwargs.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            Some((k, _)) => Err(ExcType::arity_error(format!(
                "{}() got an unexpected keyword argument '{k}'",
                self.name
            ))),
            None => Ok(()),
        }
    }

    /// Positional argument `index` as an integer (bools accepted).
    pub fn arg_int(&self, index: usize) -> RunResult<i64> {
        let value = self.arg(index)?;
        value.as_int().ok_or_else(|| {
            ExcType::type_error(format!(
                "{}() argument {} must be int, not {}",
                self.name,
                index + 1,
                self.vm.type_name(value)
            ))
        })
    }

    pub fn arg_str(&self, index: usize) -> RunResult<String> {
        let value = self.arg(index)?;
        match self.vm.str_value(value) {
            Some(s) => Ok(s.to_owned()),
            None => Err(ExcType::type_error(format!(
                "{}() argument {} must be str, not {}",
                self.name,
                index + 1,
                self.vm.type_name(value)
            ))),
        }
    }

    /// Positional argument `index` as a class.
    pub fn arg_class(&self, index: usize) -> RunResult<HeapId> {
        let value = self.arg(index)?;
        match value {
            Value::Ref(id) if matches!(self.vm.heap.get(id), HeapData::Class(_)) => Ok(id),
            _ => Err(ExcType::type_error(format!(
                "{}() argument {} must be a class, not {}",
                self.name,
                index + 1,
                self.vm.type_name(value)
            ))),
        }
    }

    /// Pushes one result onto the frame.
    pub fn push(&mut self, value: Value) {
        self.frame.push(value);
    }

    /// Pushes a single result and reports it: `return ctx.ret(v)`.
    pub fn ret(&mut self, value: Value) -> RunResult<usize> {
        self.push(value);
        Ok(1)
    }

    fn finish(self, count: usize) -> RunResult<Value> {
        let pushed = self.frame.len() - self.nargs;
        if count > pushed {
            return Err(ExcType::system_error(format!(
                "{}() reported {count} results but pushed {pushed}",
                self.name
            )));
        }
        let results = &self.frame[self.frame.len() - count..];
        match count {
            0 => Ok(Value::None),
            1 => Ok(results[0]),
            _ => {
                let items = results.to_vec();
                self.vm.new_tuple(items)
            }
        }
    }
}

/// Lengths of the VM's execution bookkeeping at a native call, so a panic that skips
/// the normal exits can put them back.
struct ExecutionMarks {
    call_stack: usize,
    handled: usize,
    repr_depth: usize,
    repr_active: usize,
    running_generators: usize,
}

impl ExecutionMarks {
    fn take(vm: &Vm) -> Self {
        Self {
            call_stack: vm.call_stack.len(),
            handled: vm.handled.len(),
            repr_depth: vm.repr_depth,
            repr_active: vm.repr_active.len(),
            running_generators: vm.running_generators.len(),
        }
    }

    fn restore(self, vm: &mut Vm) {
        vm.call_stack.truncate(self.call_stack);
        vm.handled.truncate(self.handled);
        vm.repr_depth = self.repr_depth;
        vm.repr_active.truncate(self.repr_active);
        // their frames unwound with the panic
        let stranded = vm.running_generators.split_off(self.running_generators.min(vm.running_generators.len()));
        for id in stranded {
            vm.finish_generator(id);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl Vm {
    /// Invokes a native handler through the bridge.
    pub(crate) fn call_native(&mut self, native_id: HeapId, args: ArgValues) -> RunResult<Value> {
        let (name, handler) = match self.heap.get(native_id) {
            HeapData::NativeFunction(native) => (native.name.clone(), native.handler),
            _ => return Err(ExcType::system_error("call_native on a non-native object")),
        };
        let marks = ExecutionMarks::take(self);
        let mut ctx = CallContext::new(self, name, args);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let count = handler(&mut ctx)?;
            ctx.finish(count)
        }));
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                marks.restore(self);
                let msg = panic_message(payload.as_ref());
                tracing::warn!(target: "pyrite::native", panic = %msg, "native function panicked");
                Err(ExcType::system_error(format!("native function panicked: {msg}")))
            }
        }
    }

    /// Allocates a native function object.
    pub fn new_native_function(&mut self, name: &str, arity: Arity, handler: NativeFn) -> Value {
        Value::Ref(self.heap.allocate(HeapData::NativeFunction(NativeFunction {
            name: name.to_owned(),
            arity,
            handler,
        })))
    }

    /// Starts building a native module.
    pub fn module_builder(&mut self, name: &str) -> ModuleBuilder<'_> {
        ModuleBuilder {
            vm: self,
            name: name.to_owned(),
            attrs: AttrMap::default(),
        }
    }

    /// Creates a class whose namespace holds native members.
    ///
    /// Goes through the regular class-creation path (C3, metaclass selection,
    /// `__init_subclass__`), so native classes behave like guest ones.
    pub fn new_native_class(
        &mut self,
        name: &str,
        bases: &[Value],
        metaclass: Option<Value>,
        members: &[NativeMember],
    ) -> RunResult<Value> {
        let mut namespace = AttrMap::default();
        for member in members {
            let value = self.member_value(member);
            namespace.insert(member.name.to_owned(), value);
        }
        self.create_class(name, bases, namespace, metaclass)
    }

    /// The namespace value of a native member: the function, wrapped as its kind requires.
    pub(crate) fn member_value(&mut self, member: &NativeMember) -> Value {
        let func = self.new_native_function(member.name, member.arity, member.handler);
        match member.kind {
            MemberKind::Method => func,
            MemberKind::ClassMethod => Value::Ref(self.heap.allocate(HeapData::ClassMethod(func))),
            MemberKind::StaticMethod => Value::Ref(self.heap.allocate(HeapData::StaticMethod(func))),
            MemberKind::Property => Value::Ref(self.heap.allocate(HeapData::Property(Property {
                fget: func,
                fset: Value::None,
                fdel: Value::None,
            }))),
        }
    }

    /// Adds native members to an existing class namespace.
    pub(crate) fn install_members(&mut self, class: HeapId, members: &[NativeMember]) {
        for member in members {
            let value = self.member_value(member);
            if let HeapData::Class(cls) = self.heap.get_mut(class) {
                cls.namespace.insert(member.name.to_owned(), value);
            }
        }
    }

    /// Whether `id` names a class whose instances are plain attribute-dict objects.
    pub(crate) fn has_object_layout(&self, id: HeapId) -> bool {
        matches!(self.heap.get(id), HeapData::Class(cls) if cls.layout == InstanceLayout::Object)
    }

    pub(crate) fn class_display_name(&self, id: HeapId) -> String {
        class_name(&self.heap, id)
    }
}

/// How a native member is stored in a class namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    ClassMethod,
    StaticMethod,
    /// Read-only property whose getter is the handler.
    Property,
}

/// A native member of a class created with [`Vm::new_native_class`].
#[derive(Debug, Clone, Copy)]
pub struct NativeMember {
    pub name: &'static str,
    pub arity: Arity,
    pub handler: NativeFn,
    pub kind: MemberKind,
}

impl NativeMember {
    #[must_use]
    pub const fn method(name: &'static str, arity: Arity, handler: NativeFn) -> Self {
        Self {
            name,
            arity,
            handler,
            kind: MemberKind::Method,
        }
    }

    #[must_use]
    pub const fn class_method(name: &'static str, arity: Arity, handler: NativeFn) -> Self {
        Self {
            name,
            arity,
            handler,
            kind: MemberKind::ClassMethod,
        }
    }

    #[must_use]
    pub const fn static_method(name: &'static str, arity: Arity, handler: NativeFn) -> Self {
        Self {
            name,
            arity,
            handler,
            kind: MemberKind::StaticMethod,
        }
    }

    #[must_use]
    pub const fn property(name: &'static str, handler: NativeFn) -> Self {
        Self {
            name,
            arity: Arity::exact(1),
            handler,
            kind: MemberKind::Property,
        }
    }
}

/// Builder for a module of native functions and constants.
pub struct ModuleBuilder<'vm> {
    vm: &'vm mut Vm,
    name: String,
    attrs: AttrMap,
}

impl ModuleBuilder<'_> {
    pub fn vm(&mut self) -> &mut Vm {
        self.vm
    }

    pub fn function(&mut self, name: &str, arity: Arity, handler: NativeFn) -> &mut Self {
        let func = self.vm.new_native_function(name, arity, handler);
        self.attrs.insert(name.to_owned(), func);
        self
    }

    pub fn constant(&mut self, name: &str, value: Value) -> &mut Self {
        self.attrs.insert(name.to_owned(), value);
        self
    }

    /// Adds a class built with [`Vm::new_native_class`] or [`Vm::create_class`].
    pub fn class(&mut self, name: &str, class: Value) -> &mut Self {
        self.attrs.insert(name.to_owned(), class);
        self
    }

    /// Creates the module object and registers it for `import`.
    pub fn build(self) -> Value {
        let module = self.vm.new_module(&self.name, self.attrs);
        self.vm.register_module(&self.name, module);
        module
    }
}
