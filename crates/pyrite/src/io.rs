use std::{
    borrow::Cow,
    cell::RefCell,
    io::{self, Write as _},
    rc::Rc,
};

use crate::exception::{ExcType, RunResult};

/// Trait for handling output from the `print()` builtin function.
///
/// Implement this trait to capture or redirect guest output. The default implementation
/// [`StdPrint`] writes to stdout.
pub trait PrintWriter {
    /// Called once for each formatted argument passed to `print()`.
    ///
    /// Writes only the argument's text; separators and the terminator are emitted via
    /// [`stdout_push`](Self::stdout_push) or further `stdout_write` calls.
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()>;

    /// Adds a single character to stdout.
    fn stdout_push(&mut self, end: char) -> RunResult<()>;
}

/// Default `PrintWriter` that writes to stdout.
///
/// Output is buffered per thread and flushed when the writer is dropped or a newline
/// is pushed.
#[derive(Debug)]
pub struct StdPrint;

thread_local! {
    static STDOUT_BUFFER: RefCell<String> = const { RefCell::new(String::new()) };
}

fn flush_buffer() -> RunResult<()> {
    STDOUT_BUFFER.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        if buffer.is_empty() {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        let result = stdout.write_all(buffer.as_bytes()).and_then(|()| stdout.flush());
        buffer.clear();
        result.map_err(|err| ExcType::os_error(format!("cannot write to stdout: {err}")))
    })
}

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        STDOUT_BUFFER.with(|buffer| buffer.borrow_mut().push_str(&output));
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        STDOUT_BUFFER.with(|buffer| buffer.borrow_mut().push(end));
        if end == '\n' { flush_buffer() } else { Ok(()) }
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        let _ = flush_buffer();
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Clones share the same buffer, so a host can hand one clone to the VM and read the
/// output through another.
#[derive(Debug, Clone, Default)]
pub struct CollectStringPrint(Rc<RefCell<String>>);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything collected so far.
    #[must_use]
    pub fn output(&self) -> String {
        self.0.borrow().clone()
    }

    /// Takes the collected output, leaving the buffer empty.
    #[must_use]
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        self.0.borrow_mut().push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        self.0.borrow_mut().push(end);
        Ok(())
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> RunResult<()> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: char) -> RunResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collected_output_is_shared_between_clones() {
        let collector = CollectStringPrint::new();
        let mut writer: Box<dyn PrintWriter> = Box::new(collector.clone());
        writer.stdout_write(Cow::Borrowed("hello")).unwrap();
        writer.stdout_push('\n').unwrap();
        assert_eq!(collector.output(), "hello\n");
        assert_eq!(collector.take_output(), "hello\n");
        assert_eq!(collector.output(), "");
    }
}
