//! Runtime error representation.
//!
//! Host code and native functions raise errors as [`RunError`]s. The common case is a
//! [`SimpleException`]: an [`ExcType`] plus a message and an [`ErrorKind`]. Exceptions
//! raised by guest code (`raise MyError(...)`) travel as the heap instance itself so that
//! identity and custom attributes survive the unwind. A `SimpleException` is only
//! materialized into a heap instance when a guest `except` clause catches it.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::heap::HeapId;

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Builtin exception classes known to the runtime.
///
/// Uses strum derives for `Display`, `FromStr` and `Into<&'static str>`; the string form
/// is the guest-visible class name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
pub enum ExcType {
    BaseException,
    Exception,
    GeneratorExit,
    KeyboardInterrupt,
    SystemExit,

    ArithmeticError,
    ZeroDivisionError,
    OverflowError,

    AssertionError,

    AttributeError,
    /// Raised by frozen dataclasses on attribute assignment or deletion.
    FrozenInstanceError,

    ImportError,
    ModuleNotFoundError,

    LookupError,
    KeyError,
    IndexError,

    MemoryError,

    NameError,
    UnboundLocalError,

    OSError,
    TimeoutError,

    RuntimeError,
    NotImplementedError,
    RecursionError,

    StopIteration,
    SystemError,
    TypeError,
    ValueError,
}

impl ExcType {
    /// The direct builtin parent class, `None` only for `BaseException`.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        Some(match self {
            Self::BaseException => return None,
            Self::Exception | Self::GeneratorExit | Self::KeyboardInterrupt | Self::SystemExit => Self::BaseException,
            Self::ZeroDivisionError | Self::OverflowError => Self::ArithmeticError,
            Self::FrozenInstanceError => Self::AttributeError,
            Self::ModuleNotFoundError => Self::ImportError,
            Self::KeyError | Self::IndexError => Self::LookupError,
            Self::UnboundLocalError => Self::NameError,
            Self::TimeoutError => Self::OSError,
            Self::NotImplementedError | Self::RecursionError => Self::RuntimeError,
            Self::ArithmeticError
            | Self::AssertionError
            | Self::AttributeError
            | Self::ImportError
            | Self::LookupError
            | Self::MemoryError
            | Self::NameError
            | Self::OSError
            | Self::RuntimeError
            | Self::StopIteration
            | Self::SystemError
            | Self::TypeError
            | Self::ValueError => Self::Exception,
        })
    }

    /// Whether `self` is `handler_type` or one of its builtin subclasses.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        let mut current = Some(self);
        while let Some(exc_type) = current {
            if exc_type == handler_type {
                return true;
            }
            current = exc_type.parent();
        }
        false
    }

    /// The error kind reported for exceptions of this class when nothing more specific applies.
    #[must_use]
    pub fn default_kind(self) -> ErrorKind {
        match self {
            Self::TypeError => ErrorKind::TypeMismatch,
            Self::AttributeError | Self::FrozenInstanceError => ErrorKind::AttributeNotFound,
            Self::KeyError => ErrorKind::KeyNotFound,
            Self::IndexError => ErrorKind::IndexOutOfRange,
            Self::ZeroDivisionError => ErrorKind::ZeroDivision,
            Self::StopIteration => ErrorKind::StopIteration,
            _ => ErrorKind::Other,
        }
    }

    pub(crate) fn type_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    pub(crate) fn value_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::ValueError, msg).into()
    }

    pub(crate) fn runtime_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::RuntimeError, msg).into()
    }

    pub(crate) fn index_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::IndexError, msg).into()
    }

    pub(crate) fn overflow_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::OverflowError, msg).into()
    }

    pub(crate) fn system_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::SystemError, msg).into()
    }

    pub(crate) fn os_error(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::OSError, msg).into()
    }

    pub(crate) fn zero_division(msg: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::ZeroDivisionError, msg).into()
    }

    /// `KeyError` carrying the repr of the missing key, as CPython does.
    pub(crate) fn key_error(key_repr: impl Into<String>) -> RunError {
        SimpleException::new_msg(Self::KeyError, key_repr).into()
    }

    pub(crate) fn attribute_error(type_name: impl fmt::Display, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
        .into()
    }

    pub(crate) fn class_attribute_error(class_name: impl fmt::Display, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("type object '{class_name}' has no attribute '{attr}'"),
        )
        .into()
    }

    pub(crate) fn arity_error(msg: impl Into<String>) -> RunError {
        SimpleException::with_kind(Self::TypeError, msg, ErrorKind::ArityMismatch).into()
    }

    pub(crate) fn inconsistent_mro(base_names: &[String]) -> RunError {
        SimpleException::with_kind(
            Self::TypeError,
            format!(
                "Cannot create a consistent method resolution order (MRO) for bases {}",
                base_names.join(", ")
            ),
            ErrorKind::InconsistentHierarchy,
        )
        .into()
    }

    pub(crate) fn abstract_instantiation(class_name: &str, methods: &[String]) -> RunError {
        let quoted: Vec<String> = methods.iter().map(|m| format!("'{m}'")).collect();
        let noun = if methods.len() == 1 { "method" } else { "methods" };
        SimpleException::with_kind(
            Self::TypeError,
            format!(
                "Can't instantiate abstract class {class_name} without an implementation for abstract {noun} {}",
                quoted.join(", ")
            ),
            ErrorKind::AbstractInstantiation,
        )
        .into()
    }

    pub(crate) fn name_error(name: &str) -> RunError {
        SimpleException::new_msg(Self::NameError, format!("name '{name}' is not defined")).into()
    }

    pub(crate) fn unbound_local(name: &str) -> RunError {
        SimpleException::new_msg(
            Self::UnboundLocalError,
            format!("cannot access local variable '{name}' where it is not associated with a value"),
        )
        .into()
    }

    pub(crate) fn not_iterable(type_name: impl fmt::Display) -> RunError {
        Self::type_error(format!("'{type_name}' object is not iterable"))
    }

    pub(crate) fn not_callable(type_name: impl fmt::Display) -> RunError {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    pub(crate) fn unhashable(type_name: impl fmt::Display) -> RunError {
        Self::type_error(format!("unhashable type: '{type_name}'"))
    }

    pub(crate) fn unsupported_operand(op: &str, left: impl fmt::Display, right: impl fmt::Display) -> RunError {
        Self::type_error(format!(
            "unsupported operand type(s) for {op}: '{left}' and '{right}'"
        ))
    }

    pub(crate) fn module_not_found(name: &str) -> RunError {
        SimpleException::new_msg(Self::ModuleNotFoundError, format!("No module named '{name}'")).into()
    }

    pub(crate) fn frozen_instance(field: &str) -> RunError {
        SimpleException::new_msg(Self::FrozenInstanceError, format!("cannot assign to field '{field}'")).into()
    }

    pub(crate) fn generator_running() -> RunError {
        Self::value_error("generator already executing")
    }

    pub(crate) fn stop_iteration() -> RunError {
        SimpleException::new(Self::StopIteration).into()
    }
}

/// Classification of a runtime error, independent of the guest class that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// C3 linearization failed for the requested bases.
    InconsistentHierarchy,
    AttributeNotFound,
    TypeMismatch,
    /// Wrong number of arguments, or unexpected/duplicate keyword arguments.
    ArityMismatch,
    /// Instantiation of a class that still has abstract methods.
    AbstractInstantiation,
    KeyNotFound,
    IndexOutOfRange,
    ZeroDivision,
    StopIteration,
    /// An exception whose class was defined by guest code.
    UserRaised,
    Other,
}

/// A builtin exception that has not been materialized as a heap instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleException {
    exc_type: ExcType,
    message: Option<String>,
    kind: ErrorKind,
}

impl SimpleException {
    #[must_use]
    pub fn new(exc_type: ExcType) -> Self {
        Self {
            exc_type,
            message: None,
            kind: exc_type.default_kind(),
        }
    }

    #[must_use]
    pub fn new_msg(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            exc_type,
            message: Some(message.into()),
            kind: exc_type.default_kind(),
        }
    }

    #[must_use]
    pub fn with_kind(exc_type: ExcType, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            exc_type,
            message: Some(message.into()),
            kind,
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// One traceback entry recorded while an error leaves a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStackFrame {
    pub name: String,
    pub filename: String,
    pub line: u32,
}

/// The exception payload of a raise.
#[derive(Debug, Clone)]
pub(crate) enum Raised {
    Simple(SimpleException),
    /// A heap instance of a `BaseException` subclass.
    Instance(HeapId),
}

/// An exception in flight together with the frames it has left so far.
///
/// `frames` is ordered innermost first.
#[derive(Debug, Clone)]
pub struct ExceptionRaise {
    pub(crate) exc: Raised,
    pub(crate) frames: Vec<RawStackFrame>,
}

impl ExceptionRaise {
    pub(crate) fn instance(id: HeapId) -> Self {
        Self {
            exc: Raised::Instance(id),
            frames: Vec::new(),
        }
    }

    /// The builtin payload, if the exception has not been materialized.
    #[must_use]
    pub fn simple(&self) -> Option<&SimpleException> {
        match &self.exc {
            Raised::Simple(simple) => Some(simple),
            Raised::Instance(_) => None,
        }
    }

    #[must_use]
    pub fn frames(&self) -> &[RawStackFrame] {
        &self.frames
    }
}

impl From<SimpleException> for ExceptionRaise {
    fn from(exc: SimpleException) -> Self {
        Self {
            exc: Raised::Simple(exc),
            frames: Vec::new(),
        }
    }
}

/// Error produced while running guest code or a native function.
#[derive(Debug, Clone)]
pub enum RunError {
    /// Internal interpreter error: a broken runtime invariant, never catchable by guest code.
    Internal(Cow<'static, str>),
    /// Catchable guest exception.
    Exc(Box<ExceptionRaise>),
    /// Guest exception raised by a resource limit; `except` clauses never see it.
    UncatchableExc(Box<ExceptionRaise>),
}

impl RunError {
    pub(crate) fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    pub(crate) fn uncatchable(exc: SimpleException) -> Self {
        Self::UncatchableExc(Box::new(exc.into()))
    }

    /// The builtin exception type when the payload has not been materialized.
    #[must_use]
    pub fn simple_type(&self) -> Option<ExcType> {
        match self {
            Self::Exc(raise) | Self::UncatchableExc(raise) => raise.simple().map(SimpleException::exc_type),
            Self::Internal(_) => None,
        }
    }

    /// Appends a traceback entry as the error leaves a frame.
    pub(crate) fn push_frame(&mut self, frame: RawStackFrame) {
        if let Self::Exc(raise) | Self::UncatchableExc(raise) = self {
            raise.frames.push(frame);
        }
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc.into()))
    }
}

impl From<ExceptionRaise> for RunError {
    fn from(exc: ExceptionRaise) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Exc(raise) | Self::UncatchableExc(raise) => match &raise.exc {
                Raised::Simple(simple) => write!(f, "{simple}"),
                Raised::Instance(id) => write!(f, "<exception instance {}>", id.index()),
            },
        }
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_exception_reaches_base_exception() {
        for exc_type in ExcType::iter() {
            assert!(exc_type.is_subclass_of(ExcType::BaseException), "{exc_type}");
        }
    }

    #[test]
    fn lookup_error_covers_key_and_index() {
        assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::IndexError.is_subclass_of(ExcType::LookupError));
        assert!(!ExcType::TypeError.is_subclass_of(ExcType::LookupError));
        assert!(!ExcType::GeneratorExit.is_subclass_of(ExcType::Exception));
    }

    #[test]
    fn abstract_message_lists_methods() {
        let err = ExcType::abstract_instantiation("Animal", &["speak".to_owned()]);
        assert_eq!(
            err.to_string(),
            "TypeError: Can't instantiate abstract class Animal without an implementation for abstract method 'speak'"
        );
    }
}
