//! An embeddable runtime core for a Python-compatible object model.
//!
//! `pyrite` executes compiled [`Code`] objects on a [`Vm`]. The VM owns a garbage-collected
//! heap of classes, instances and containers, resolves attributes through C3 method
//! resolution orders, drives generators and coroutines as explicit state machines and
//! reports uncaught guest exceptions as [`Exception`]s with tracebacks.
//!
//! Hosts extend the guest environment with native functions and classes
//! ([`ModuleBuilder`], [`Vm::new_native_class`]) and exchange data through [`Object`].
//! The `abc`, `enum` and `dataclasses` modules are built in.

// first, since the VM and types refer to heap ids everywhere
mod heap;

mod args;
mod builtins;
mod bytecode;
mod exception;
mod exception_public;
mod io;
mod modules;
mod native;
mod object;
mod resource;
pub mod run;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    args::ArgValues,
    bytecode::{
        CellVar, Code, CodeBuilder, CodeKind, CodeLoadError, Constant, ExceptionEntry, Label, LocationEntry, Opcode,
        Signature, Vm,
        op::{BinaryOp, BuildClassFlags, CompareOp, MakeFunctionFlags},
    },
    exception::{ErrorKind, ExcType, RunError, RunResult, SimpleException},
    exception_public::{Exception, StackFrame},
    heap::{HeapId, HeapStats},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    native::{Arity, CallContext, MemberKind, ModuleBuilder, NativeFn, NativeMember},
    object::Object,
    resource::{DEFAULT_MAX_RECURSION_DEPTH, ResourceError, ResourceLimits},
    tracer::{LogTracer, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, TraceEvent, VmTracer},
    types::{
        AttrMap,
        class::{MAX_INHERITANCE_DEPTH, MAX_MRO_LENGTH},
        generator::{GeneratorState, Resumption},
        host::HostData,
    },
    value::{Complex, Value},
};
