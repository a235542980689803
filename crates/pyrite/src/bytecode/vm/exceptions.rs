//! Raising, matching and converting exceptions.
//!
//! Runtime errors travel as [`SimpleException`] payloads until a guest handler needs to
//! see them; only then are they materialized into instances of the builtin exception
//! classes. Guest-raised exceptions are instances from the start.

use super::{Frame, Vm};
use crate::{
    args::ArgValues,
    exception::{ErrorKind, ExcType, ExceptionRaise, Raised, RunError, RunResult},
    exception_public::Exception,
    heap::{HeapData, HeapId},
    types::{AttrMap, class::Instance},
    value::Value,
};

impl Vm {
    /// Routes an error to the innermost handler of `frame` covering the failing
    /// instruction, or adds the frame to the traceback and propagates.
    pub(crate) fn handle_exception(&mut self, frame: &mut Frame, err: RunError) -> RunResult<()> {
        let mut raise = match err {
            RunError::Exc(raise) => raise,
            mut other => {
                other.push_frame(frame.location());
                return Err(other);
            }
        };
        if raise.frames.is_empty() {
            let type_name = self.raised_type_name(&raise.exc);
            self.tracer.on_exception(&type_name, self.call_stack.len());
            tracing::trace!(target: "pyrite::vm", exception = %type_name, "exception raised");
        }
        raise.frames.push(frame.location());
        let Some(entry) = frame.code.handler_for(frame.last_ip) else {
            return Err(RunError::Exc(raise));
        };

        let exc = self.materialize(&raise)?;
        self.tracebacks.insert(exc, std::mem::take(&mut raise.frames));
        let exc = Value::Ref(exc);
        if let Some(context) = self.active_exception(frame)
            && !context.is(exc)
            && self.exc_attr(exc, "__context__").is_none_or(Value::is_none)
        {
            self.set_exc_attr(exc, "__context__", context);
        }
        frame.stack.truncate(usize::from(entry.stack_depth));
        frame.push(exc);
        frame.handling.push(exc);
        self.handled.push(exc);
        frame.ip = entry.handler as usize;
        Ok(())
    }

    /// Leaves the innermost `except` block of `frame`.
    pub(crate) fn pop_handled(&mut self, frame: &mut Frame) {
        if frame.handling.pop().is_some() {
            self.handled.pop();
        }
    }

    /// The exception a bare `raise` re-raises: the innermost one handled by `frame` or,
    /// failing that, by any of its callers.
    pub(crate) fn active_exception(&self, frame: &Frame) -> Option<Value> {
        frame.handling.last().or_else(|| self.handled.last()).copied()
    }

    fn raised_type_name(&self, raised: &Raised) -> String {
        match raised {
            Raised::Simple(simple) => simple.exc_type().to_string(),
            Raised::Instance(id) => self.class_display_name(self.type_of(Value::Ref(*id))),
        }
    }

    /// The heap instance for a raise, creating one for builtin payloads.
    pub(crate) fn materialize(&mut self, raise: &ExceptionRaise) -> RunResult<HeapId> {
        match &raise.exc {
            Raised::Instance(id) => Ok(*id),
            Raised::Simple(simple) => {
                let value = self.new_exception(simple.exc_type(), simple.message())?;
                let id = value.ref_id().ok_or_else(|| RunError::internal("exception is not a heap object"))?;
                if simple.kind() != simple.exc_type().default_kind() {
                    self.exc_kinds.insert(id, simple.kind());
                }
                Ok(id)
            }
        }
    }

    /// A new instance of a builtin exception class, without running guest code.
    pub fn new_exception(&mut self, exc_type: ExcType, message: Option<&str>) -> RunResult<Value> {
        let class_id = self
            .exc_classes
            .get(&exc_type)
            .copied()
            .ok_or_else(|| RunError::internal("exception classes not initialized"))?;
        let args = match message {
            Some(msg) => {
                let msg = self.new_str(msg)?;
                self.new_tuple(vec![msg])?
            }
            None => self.new_tuple(Vec::new())?,
        };
        let mut attrs = AttrMap::default();
        init_exception_attrs(&mut attrs, args);
        if exc_type == ExcType::StopIteration {
            attrs.insert("value".to_owned(), Value::None);
        }
        Ok(Value::Ref(self.alloc(HeapData::Instance(Instance { class_id, attrs }))?))
    }

    /// Builds the error for `raise exc [from cause]`.
    pub(crate) fn make_raise(&mut self, exc: Value, cause: Option<Value>) -> RunError {
        match self.build_raise(exc, cause) {
            Ok(id) => ExceptionRaise::instance(id).into(),
            Err(err) => err,
        }
    }

    fn build_raise(&mut self, exc: Value, cause: Option<Value>) -> RunResult<HeapId> {
        let id = self
            .exception_instance(exc)?
            .ok_or_else(|| ExcType::type_error("exceptions must derive from BaseException"))?;
        if let Some(cause) = cause {
            let cause = if cause.is_none() {
                Value::None
            } else {
                match self.exception_instance(cause)? {
                    Some(cause_id) => Value::Ref(cause_id),
                    None => return Err(ExcType::type_error("exception causes must derive from BaseException")),
                }
            };
            self.set_exc_attr(Value::Ref(id), "__cause__", cause);
            self.set_exc_attr(Value::Ref(id), "__suppress_context__", Value::Bool(true));
        }
        Ok(id)
    }

    /// Instantiates exception classes; passes exception instances through.
    fn exception_instance(&mut self, value: Value) -> RunResult<Option<HeapId>> {
        let Value::Ref(id) = value else { return Ok(None) };
        if self.is_exception_class(id) {
            let instance = self.call(value, ArgValues::empty())?;
            return match instance {
                Value::Ref(inst) if self.is_exception_instance(instance) => Ok(Some(inst)),
                _ => Err(ExcType::type_error(
                    "calling an exception class did not return an exception instance",
                )),
            };
        }
        Ok(self.is_exception_instance(value).then_some(id))
    }

    /// Re-raises an exception that reached a handler, keeping its original traceback.
    pub(crate) fn reraise(&mut self, exc: Value) -> RunError {
        let Value::Ref(id) = exc else {
            return ExcType::type_error("exceptions must derive from BaseException");
        };
        let mut frames = self.tracebacks.get(&id).cloned().unwrap_or_default();
        // the handling frame is added again as the error leaves it
        frames.pop();
        RunError::Exc(Box::new(ExceptionRaise {
            exc: Raised::Instance(id),
            frames,
        }))
    }

    pub(crate) fn is_exception_class(&self, id: HeapId) -> bool {
        let Some(base) = self.exc_classes.get(&ExcType::BaseException) else {
            return false;
        };
        self.class_obj(id).is_some_and(|cls| cls.mro.contains(base))
    }

    pub(crate) fn is_exception_instance(&self, value: Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Instance(_)))
            && self.is_exception_class(self.type_of(value))
    }

    /// `except class:` matching; `class` may be a tuple of classes. Virtual subclasses
    /// registered on the handler class match too.
    pub(crate) fn exception_matches(&mut self, exc: Value, class: Value) -> RunResult<bool> {
        if let Some(classes) = self.sequence_items(class)
            && matches!(class, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Tuple(_)))
        {
            for class in classes {
                if self.exception_matches(exc, class)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        match class {
            Value::Ref(id) if self.is_exception_class(id) => {
                let exc_type = self.type_of(exc);
                if self.mro_of(exc_type).contains(&id) {
                    return Ok(true);
                }
                self.is_subclass(exc_type, id)
            }
            _ => Err(ExcType::type_error(
                "catching classes that do not inherit from BaseException is not allowed",
            )),
        }
    }

    /// Whether an error is an instance of the builtin exception `exc_type` (or a subclass).
    pub(crate) fn error_matches(&self, err: &RunError, exc_type: ExcType) -> bool {
        match err {
            RunError::Exc(raise) => match &raise.exc {
                Raised::Simple(simple) => simple.exc_type().is_subclass_of(exc_type),
                Raised::Instance(id) => self
                    .exc_classes
                    .get(&exc_type)
                    .is_some_and(|class| self.mro_of(self.type_of(Value::Ref(*id))).contains(class)),
            },
            RunError::Internal(_) | RunError::UncatchableExc(_) => false,
        }
    }

    /// The `value` carried by a `StopIteration` error.
    pub(crate) fn stop_iteration_value(&self, err: &RunError) -> Value {
        match err {
            RunError::Exc(raise) => match &raise.exc {
                Raised::Instance(id) => self.exc_attr(Value::Ref(*id), "value").unwrap_or(Value::None),
                Raised::Simple(_) => Value::None,
            },
            _ => Value::None,
        }
    }

    /// The exception object of an error, materializing builtin payloads.
    pub(crate) fn error_value(&mut self, err: &RunError) -> RunResult<Value> {
        match err {
            RunError::Exc(raise) | RunError::UncatchableExc(raise) => Ok(Value::Ref(self.materialize(raise)?)),
            RunError::Internal(msg) => self.new_exception(ExcType::SystemError, Some(msg)),
        }
    }

    pub(crate) fn exc_attr(&self, exc: Value, name: &str) -> Option<Value> {
        match exc {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Instance(inst) => inst.attrs.get(name).copied(),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn set_exc_attr(&mut self, exc: Value, name: &str, value: Value) {
        if let Value::Ref(id) = exc
            && let HeapData::Instance(inst) = self.heap.get_mut(id)
        {
            inst.attrs.insert(name.to_owned(), value);
        }
    }

    /// Converts an error that escaped guest code into the public error type.
    pub fn to_exception(&mut self, err: RunError) -> Exception {
        match err {
            RunError::Internal(msg) => Exception::new(
                ExcType::SystemError.to_string(),
                Some(format!("internal error: {msg}")),
                ErrorKind::Other,
                &[],
            ),
            RunError::Exc(raise) | RunError::UncatchableExc(raise) => match raise.exc {
                Raised::Simple(simple) => Exception::new(
                    simple.exc_type().to_string(),
                    simple.message().map(str::to_owned),
                    simple.kind(),
                    &raise.frames,
                ),
                Raised::Instance(id) => {
                    let class = self.type_of(Value::Ref(id));
                    let type_name = self.class_display_name(class);
                    let message = self.str_of(Value::Ref(id)).ok().filter(|m| !m.is_empty());
                    let kind = self.instance_error_kind(id, class);
                    Exception::new(type_name, message, kind, &raise.frames)
                }
            },
        }
    }

    fn instance_error_kind(&self, id: HeapId, class: HeapId) -> ErrorKind {
        if let Some(kind) = self.exc_kinds.get(&id) {
            return *kind;
        }
        self.exc_classes
            .iter()
            .find(|(_, class_id)| **class_id == class)
            .map_or(ErrorKind::UserRaised, |(exc_type, _)| exc_type.default_kind())
    }
}

/// Attributes every exception instance starts with.
pub(crate) fn init_exception_attrs(attrs: &mut AttrMap, args: Value) {
    attrs.insert("args".to_owned(), args);
    attrs.insert("__cause__".to_owned(), Value::None);
    attrs.insert("__context__".to_owned(), Value::None);
    attrs.insert("__suppress_context__".to_owned(), Value::Bool(false));
}
