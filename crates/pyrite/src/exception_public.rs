use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exception::{ErrorKind, RawStackFrame};

/// A guest exception that escaped to the host.
///
/// Produced by [`Vm::run_module`](crate::Vm::run_module) and
/// [`Vm::to_exception`](crate::Vm::to_exception). The `Display` form mirrors CPython:
/// the traceback (outermost call first) followed by `TypeName: message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    type_name: String,
    message: Option<String>,
    kind: ErrorKind,
    traceback: Vec<StackFrame>,
}

/// A single traceback line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub filename: String,
    pub line: u32,
    pub name: String,
}

impl From<&RawStackFrame> for StackFrame {
    fn from(raw: &RawStackFrame) -> Self {
        Self {
            filename: raw.filename.clone(),
            line: raw.line,
            name: raw.name.clone(),
        }
    }
}

impl Exception {
    pub(crate) fn new(type_name: String, message: Option<String>, kind: ErrorKind, raw_frames: &[RawStackFrame]) -> Self {
        // raw frames are collected innermost first
        let traceback = raw_frames.iter().rev().map(StackFrame::from).collect();
        Self {
            type_name,
            message,
            kind,
            traceback,
        }
    }

    /// The guest class name, e.g. `"TypeError"` or a user-defined class name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// `str(exc)` of the guest exception, `None` when it was raised without arguments.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Traceback entries, outermost call first.
    #[must_use]
    pub fn traceback(&self) -> &[StackFrame] {
        &self.traceback
    }

    /// `TypeName: message`, the last line of the traceback.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.message {
            Some(msg) if !msg.is_empty() => format!("{}: {msg}", self.type_name),
            _ => self.type_name.clone(),
        }
    }

    /// Process exit status for an uncaught exception.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.traceback.is_empty() {
            writeln!(f, "Traceback (most recent call last):")?;
            for frame in &self.traceback {
                writeln!(f, "  File \"{}\", line {}, in {}", frame.filename, frame.line, frame.name)?;
            }
        }
        write!(f, "{}", self.summary())
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn display_prints_traceback_outermost_first() {
        let frames = vec![
            RawStackFrame {
                name: "inner".to_owned(),
                filename: "app.py".to_owned(),
                line: 7,
            },
            RawStackFrame {
                name: "<module>".to_owned(),
                filename: "app.py".to_owned(),
                line: 12,
            },
        ];
        let exc = Exception::new(
            "ValueError".to_owned(),
            Some("bad value".to_owned()),
            ErrorKind::Other,
            &frames,
        );
        assert_eq!(
            exc.to_string(),
            "Traceback (most recent call last):\n  File \"app.py\", line 12, in <module>\n  File \"app.py\", line 7, in inner\nValueError: bad value"
        );
        assert_eq!(exc.exit_code(), 1);
    }
}
