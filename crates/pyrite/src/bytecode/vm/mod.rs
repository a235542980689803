//! The virtual machine.
//!
//! [`Vm`] is the context object that owns everything a running program touches: the
//! heap arena, the builtin classes, the module table, resource counters, the tracer and
//! the print writer. There is no global state; several VMs can coexist on one thread.
//!
//! The implementation is split by concern:
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `run` | frame execution and opcode dispatch |
//! | `attr` | attribute resolution, descriptors, dunder dispatch |
//! | `call` | the single call path, argument binding |
//! | `class_build` | class statements, metaclasses, C3, subclass checks |
//! | `binary`, `compare` | operators and comparisons |
//! | `collections` | containers, subscripts, iteration |
//! | `format` | `repr()` and `str()` |
//! | `generator` | generator and coroutine resumption |
//! | `exceptions` | raising, handler lookup, conversion to public errors |
//!
//! Frames are owned by the Rust call that executes them (or by a suspended generator),
//! so heap values are only guaranteed reachable by the collector while no frame is
//! running. [`Vm::collect_garbage`] therefore refuses to run mid-execution.

mod attr;
mod binary;
mod call;
mod class_build;
mod collections;
mod compare;
mod exceptions;
mod format;
mod generator;
mod run;

use std::rc::Rc;

use ahash::AHashMap;

pub(crate) use exceptions::init_exception_attrs;
pub(crate) use run::FrameExit;

use crate::{
    builtins::{self, BuiltinTypes},
    bytecode::Code,
    exception::{ErrorKind, ExcType, RawStackFrame, RunError, RunResult},
    exception_public::Exception,
    heap::{Heap, HeapData, HeapId, HeapStats},
    io::{PrintWriter, StdPrint},
    modules,
    resource::{LimitTracker, ResourceLimits},
    tracer::{NoopTracer, VmTracer},
    types::{
        AttrMap,
        class::Module,
        dict::Dict,
        function::push_values,
        host::HostData,
        set::Set,
    },
    value::Value,
};

/// An executing (or suspended) activation of a code object.
#[derive(Debug)]
pub(crate) struct Frame {
    pub code: Rc<Code>,
    /// Offset of the next instruction.
    pub ip: usize,
    /// Offset of the instruction being executed, used for handler lookup and tracebacks.
    pub last_ip: usize,
    pub locals: Vec<Value>,
    /// Cell objects: the code's cellvars, then the function's closure cells.
    pub cells: Vec<HeapId>,
    pub stack: Vec<Value>,
    /// Module providing globals.
    pub globals: HeapId,
    /// Class-body namespace mapping for `LoadName`/`StoreName`.
    pub namespace: Option<HeapId>,
    pub function: Option<HeapId>,
    /// Exceptions currently being handled by `except` blocks, innermost last.
    pub handling: Vec<Value>,
}

impl Frame {
    pub fn new(code: Rc<Code>, globals: HeapId) -> Self {
        let locals = vec![Value::Undefined; code.num_locals()];
        Self {
            code,
            ip: 0,
            last_ip: 0,
            locals,
            cells: Vec::new(),
            stack: Vec::new(),
            globals,
            namespace: None,
            function: None,
            handling: Vec::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> RunResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RunError::internal("evaluation stack underflow"))
    }

    #[inline]
    pub fn peek(&self) -> RunResult<Value> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| RunError::internal("evaluation stack underflow"))
    }

    /// Pops `n` values, returned in push order.
    pub fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        let len = self.stack.len();
        if n > len {
            return Err(RunError::internal("evaluation stack underflow"));
        }
        Ok(self.stack.split_off(len - n))
    }

    pub fn location(&self) -> RawStackFrame {
        RawStackFrame {
            name: self.code.name().to_owned(),
            filename: self.code.filename().to_owned(),
            line: self.code.line_for(self.last_ip),
        }
    }

    pub fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        push_values(out, self.locals.iter().copied());
        push_values(out, self.stack.iter().copied());
        push_values(out, self.handling.iter().copied());
        out.extend(self.cells.iter().copied());
        out.push(self.globals);
        out.extend(self.namespace);
        out.extend(self.function);
    }
}

/// Per-frame information visible to natives called from that frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameInfo {
    pub function: Option<HeapId>,
    /// The first argument at frame entry (`self`/`cls`), for zero-argument `super()`.
    pub first_arg: Value,
}

/// A runtime instance: heap, builtins, modules and execution state.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) types: BuiltinTypes,
    pub(crate) exc_classes: AHashMap<ExcType, HeapId>,
    /// The `builtins` module.
    pub(crate) builtins: HeapId,
    pub(crate) modules: AHashMap<String, HeapId>,
    pub(crate) call_stack: Vec<FrameInfo>,
    pub(crate) tracker: LimitTracker,
    pub(crate) tracer: Box<dyn VmTracer>,
    pub(crate) print: Box<dyn PrintWriter>,
    /// Tracebacks of exceptions that reached a guest handler, for re-raising.
    pub(crate) tracebacks: AHashMap<HeapId, Vec<RawStackFrame>>,
    /// Error kinds of runtime-raised exceptions that were materialized for a handler.
    pub(crate) exc_kinds: AHashMap<HeapId, ErrorKind>,
    pub(crate) repr_depth: usize,
    /// Containers whose repr is being built, to print self-references as `[...]`.
    pub(crate) repr_active: Vec<HeapId>,
    /// Generators whose frame is currently executing, innermost last.
    pub(crate) running_generators: Vec<HeapId>,
    /// Exceptions being handled by every active frame, innermost last.
    pub(crate) handled: Vec<Value>,
    /// Host-held values kept alive across collections, with pin counts.
    pub(crate) pinned: AHashMap<HeapId, usize>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates a VM with default limits, no tracing and stdout printing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::default())
    }

    #[must_use]
    pub fn with_limits(limits: ResourceLimits) -> Self {
        let mut heap = Heap::new();
        let types = BuiltinTypes::bootstrap(&mut heap);
        let builtins = heap.allocate(HeapData::Module(Module {
            name: "builtins".to_owned(),
            attrs: AttrMap::default(),
        }));
        let mut vm = Self {
            heap,
            types,
            exc_classes: AHashMap::default(),
            builtins,
            modules: AHashMap::default(),
            call_stack: Vec::new(),
            tracker: LimitTracker::new(ResourceLimits::unlimited()),
            tracer: Box::new(NoopTracer),
            print: Box::new(StdPrint),
            tracebacks: AHashMap::default(),
            exc_kinds: AHashMap::default(),
            repr_depth: 0,
            repr_active: Vec::new(),
            running_generators: Vec::new(),
            handled: Vec::new(),
            pinned: AHashMap::default(),
        };
        vm.modules.insert("builtins".to_owned(), builtins);
        if let Err(err) = builtins::init(&mut vm).and_then(|()| modules::register_all(&mut vm)) {
            tracing::error!(target: "pyrite::vm", error = %err, "runtime bootstrap failed");
        }
        // bootstrap objects do not count against the guest's limits
        vm.tracker = LimitTracker::new(limits);
        tracing::debug!(target: "pyrite::vm", objects = vm.heap.live_count(), "vm initialized");
        vm
    }

    /// Replaces the tracer, returning the previous one.
    pub fn set_tracer(&mut self, tracer: Box<dyn VmTracer>) -> Box<dyn VmTracer> {
        std::mem::replace(&mut self.tracer, tracer)
    }

    #[must_use]
    pub fn with_tracer(mut self, tracer: Box<dyn VmTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Replaces the print writer, returning the previous one.
    pub fn set_print_writer(&mut self, print: Box<dyn PrintWriter>) -> Box<dyn PrintWriter> {
        std::mem::replace(&mut self.print, print)
    }

    #[must_use]
    pub fn with_print(mut self, print: Box<dyn PrintWriter>) -> Self {
        self.print = print;
        self
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        self.tracker.limits()
    }

    /// Number of instructions executed so far.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.tracker.operations()
    }

    // allocation

    /// Allocates a heap object, counting it against the allocation limit.
    pub(crate) fn alloc(&mut self, data: HeapData) -> RunResult<HeapId> {
        self.tracker.on_allocate()?;
        Ok(self.heap.allocate(data))
    }

    pub fn new_str(&mut self, s: impl Into<String>) -> RunResult<Value> {
        Ok(Value::Ref(self.alloc(HeapData::Str(s.into()))?))
    }

    pub fn new_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> RunResult<Value> {
        Ok(Value::Ref(self.alloc(HeapData::Bytes(bytes.into()))?))
    }

    pub fn new_list(&mut self, items: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Ref(self.alloc(HeapData::List(items))?))
    }

    pub fn new_tuple(&mut self, items: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Ref(self.alloc(HeapData::Tuple(items))?))
    }

    /// Builds a dict; later duplicates overwrite earlier values.
    pub fn new_dict(&mut self, pairs: Vec<(Value, Value)>) -> RunResult<Value> {
        let mut dict = Dict::new();
        for (k, v) in pairs {
            let hk = self.hash_key(k)?;
            dict.insert(hk, k, v);
        }
        Ok(Value::Ref(self.alloc(HeapData::Dict(dict))?))
    }

    pub fn new_set(&mut self, items: Vec<Value>) -> RunResult<Value> {
        let set = self.build_set(items)?;
        Ok(Value::Ref(self.alloc(HeapData::Set(set))?))
    }

    pub fn new_frozenset(&mut self, items: Vec<Value>) -> RunResult<Value> {
        let set = self.build_set(items)?;
        Ok(Value::Ref(self.alloc(HeapData::FrozenSet(set))?))
    }

    pub(crate) fn build_set(&mut self, items: Vec<Value>) -> RunResult<Set> {
        let mut set = Set::new();
        for item in items {
            let hk = self.hash_key(item)?;
            set.add(hk, item);
        }
        Ok(set)
    }

    pub(crate) fn new_module(&mut self, name: &str, mut attrs: AttrMap) -> Value {
        if !attrs.contains_key("__name__") {
            let name_value = Value::Ref(self.heap.allocate(HeapData::Str(name.to_owned())));
            attrs.insert("__name__".to_owned(), name_value);
        }
        Value::Ref(self.heap.allocate(HeapData::Module(Module {
            name: name.to_owned(),
            attrs,
        })))
    }

    /// Wraps host data in a guest value.
    pub fn new_host_extension(&mut self, data: Box<dyn HostData>) -> RunResult<Value> {
        Ok(Value::Ref(self.alloc(HeapData::HostExtension(data))?))
    }

    /// Host data of an extension value, if it holds a `T`.
    #[must_use]
    pub fn host_data<T: HostData>(&self, value: Value) -> Option<&T> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::HostExtension(data) => {
                    let any: &dyn std::any::Any = data.as_ref();
                    any.downcast_ref::<T>()
                }
                _ => None,
            },
            _ => None,
        }
    }

    // read access for hosts and natives

    /// The text of a `str` value.
    #[must_use]
    pub fn str_value(&self, value: Value) -> Option<&str> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Items of a list or tuple.
    #[must_use]
    pub fn sequence_items(&self, value: Value) -> Option<Vec<Value>> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::List(items) | HeapData::Tuple(items) => Some(items.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Key/value pairs of a dict, in insertion order.
    #[must_use]
    pub fn dict_items(&self, value: Value) -> Option<Vec<(Value, Value)>> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Dict(dict) => Some(dict.items()),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn is_class(&self, value: Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Class(_)))
    }

    pub(crate) fn expect_class(&self, value: Value) -> RunResult<HeapId> {
        match value {
            Value::Ref(id) if matches!(self.heap.get(id), HeapData::Class(_)) => Ok(id),
            _ => Err(ExcType::type_error(format!(
                "expected a class, got '{}'",
                self.type_name(value)
            ))),
        }
    }

    // modules and builtins

    /// Publishes a module for `import`.
    pub fn register_module(&mut self, name: &str, module: Value) {
        if let Value::Ref(id) = module {
            tracing::debug!(target: "pyrite::vm", module = name, "module registered");
            self.modules.insert(name.to_owned(), id);
        }
    }

    /// Looks up a registered module.
    pub fn import(&mut self, name: &str) -> RunResult<Value> {
        self.modules
            .get(name)
            .map(|id| Value::Ref(*id))
            .ok_or_else(|| ExcType::module_not_found(name))
    }

    /// Makes `value` visible to every module under `name`.
    pub fn set_builtin(&mut self, name: &str, value: Value) {
        if let HeapData::Module(module) = self.heap.get_mut(self.builtins) {
            module.attrs.insert(name.to_owned(), value);
        }
    }

    pub(crate) fn builtin(&self, name: &str) -> Option<Value> {
        match self.heap.get(self.builtins) {
            HeapData::Module(module) => module.attrs.get(name).copied(),
            _ => None,
        }
    }

    /// A module-level variable.
    #[must_use]
    pub fn global(&self, module: Value, name: &str) -> Option<Value> {
        match module {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Module(m) => m.attrs.get(name).copied(),
                _ => None,
            },
            _ => None,
        }
    }

    /// The builtin class of an exception type.
    #[must_use]
    pub fn exception_class(&self, exc_type: ExcType) -> Value {
        self.exc_classes
            .get(&exc_type)
            .map_or(Value::None, |id| Value::Ref(*id))
    }

    /// `object`.
    #[must_use]
    pub fn object_class(&self) -> Value {
        Value::Ref(self.types.object)
    }

    /// `type`.
    #[must_use]
    pub fn type_class(&self) -> Value {
        Value::Ref(self.types.type_)
    }

    // running code

    /// Executes `code` as the body of a new module `name`, registering the module.
    ///
    /// Returns the module, whose globals can be read with [`Vm::global`].
    pub fn run_module(&mut self, name: &str, code: Rc<Code>) -> Result<Value, Exception> {
        let module = self.new_module(name, AttrMap::default());
        self.register_module(name, module);
        self.eval_code(module, code).map(|_| module)
    }

    /// Executes `code` with `module`'s namespace as globals and returns its return value.
    pub fn eval_code(&mut self, module: Value, code: Rc<Code>) -> Result<Value, Exception> {
        let result = self.run_code(module, code);
        result.map_err(|err| self.to_exception(err))
    }

    pub(crate) fn run_code(&mut self, module: Value, code: Rc<Code>) -> RunResult<Value> {
        let Value::Ref(module_id) = module else {
            return Err(ExcType::type_error("globals must be a module"));
        };
        if !matches!(self.heap.get(module_id), HeapData::Module(_)) {
            return Err(ExcType::type_error("globals must be a module"));
        }
        let mut frame = Frame::new(code, module_id);
        match self.run_frame(&mut frame, None)? {
            FrameExit::Return(value) => Ok(value),
            FrameExit::Yield(_) => Err(ExcType::type_error("'yield' outside function")),
        }
    }

    // garbage collection

    /// Keeps `value` alive across every collection until a matching [`Vm::unpin`].
    ///
    /// Pins nest: a value pinned twice needs two unpins. Immediates are ignored.
    pub fn pin(&mut self, value: Value) {
        if let Some(id) = value.ref_id() {
            *self.pinned.entry(id).or_insert(0) += 1;
        }
    }

    /// Releases one pin taken by [`Vm::pin`]. Returns whether the value is still pinned.
    pub fn unpin(&mut self, value: Value) -> bool {
        let Some(id) = value.ref_id() else {
            return false;
        };
        match self.pinned.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.pinned.remove(&id);
                false
            }
            None => false,
        }
    }

    /// Frees every heap object not reachable from the VM's own roots, pinned values or `roots`.
    ///
    /// Host code must pin or pass every value it intends to keep using. Does nothing (and
    /// returns 0) while guest code is executing.
    pub fn collect_garbage(&mut self, roots: &[Value]) -> usize {
        if !self.call_stack.is_empty() {
            return 0;
        }
        let mut root_ids: Vec<HeapId> = roots.iter().filter_map(|v| v.ref_id()).collect();
        root_ids.extend(self.pinned.keys().copied());
        root_ids.push(self.builtins);
        root_ids.extend(self.modules.values().copied());
        root_ids.extend(self.exc_classes.values().copied());
        root_ids.extend(self.types.all());
        let freed = self.heap.collect_garbage(root_ids);
        let heap = &self.heap;
        self.tracebacks.retain(|id, _| heap.is_live(*id));
        self.exc_kinds.retain(|id, _| heap.is_live(*id));
        self.tracker.reset_gc_counter();
        tracing::debug!(target: "pyrite::gc", freed, live = self.heap.live_count(), "garbage collected");
        freed
    }

    /// Collects with `roots` if the configured GC interval has elapsed.
    ///
    /// The VM never collects on its own, since only the host knows which values it
    /// still holds. Returns the number of freed objects when a collection ran.
    pub fn collect_if_due(&mut self, roots: &[Value]) -> Option<usize> {
        if self.tracker.gc_due() && self.call_stack.is_empty() {
            Some(self.collect_garbage(roots))
        } else {
            None
        }
    }

    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }
}
