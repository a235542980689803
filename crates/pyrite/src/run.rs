//! Running a compiled program end to end.
//!
//! [`run_bytes`] decodes a wire-format code object and executes it as `__main__`;
//! [`run_main`] does the same for a process entry point, printing failures to stderr
//! and mapping them to an exit status.

use std::{fmt, process::ExitCode, rc::Rc};

use crate::{
    Vm,
    bytecode::{Code, CodeLoadError},
    exception_public::Exception,
    value::Value,
};

/// Name of the module a program runs as.
pub const MAIN_MODULE: &str = "__main__";

/// Exit status when the code object could not be decoded.
pub const LOAD_FAILURE_EXIT_CODE: u8 = 2;

/// Why a program did not complete.
#[derive(Debug)]
pub enum RunFailure {
    /// The code object was rejected before execution started.
    Load(CodeLoadError),
    /// Guest code raised an exception that nothing caught.
    Raised(Exception),
}

impl RunFailure {
    /// Process exit status for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Load(_) => LOAD_FAILURE_EXIT_CODE,
            Self::Raised(exc) => exc.exit_code(),
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(err) => write!(f, "{err}"),
            Self::Raised(exc) => write!(f, "{exc}"),
        }
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            Self::Raised(exc) => Some(exc),
        }
    }
}

impl From<CodeLoadError> for RunFailure {
    fn from(err: CodeLoadError) -> Self {
        Self::Load(err)
    }
}

impl From<Exception> for RunFailure {
    fn from(exc: Exception) -> Self {
        Self::Raised(exc)
    }
}

/// Decodes `bytes` and runs the code as the `__main__` module, returning the module.
pub fn run_bytes(vm: &mut Vm, bytes: &[u8]) -> Result<Value, RunFailure> {
    let code = Code::from_bytes(bytes)?;
    tracing::debug!(target: "pyrite::vm", code = code.name(), file = code.filename(), "running main module");
    Ok(vm.run_module(MAIN_MODULE, Rc::new(code))?)
}

/// Runs a wire-format program and converts the outcome into a process exit status.
///
/// Uncaught exceptions print their traceback to stderr; load failures are reported
/// before anything executes.
pub fn run_main(vm: &mut Vm, bytes: &[u8]) -> ExitCode {
    match run_bytes(vm, bytes) {
        Ok(_) => ExitCode::SUCCESS,
        Err(failure) => {
            if let RunFailure::Load(err) = &failure {
                tracing::error!(target: "pyrite::vm", error = %err, "code object rejected");
            }
            eprintln!("{failure}");
            ExitCode::from(failure.exit_code())
        }
    }
}
