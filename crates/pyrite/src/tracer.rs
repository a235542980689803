//! VM execution tracing.
//!
//! The [`VmTracer`] trait defines hook points at key execution events. The VM holds a
//! boxed tracer (default [`NoopTracer`]) and calls the hooks as it runs; concrete
//! implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | does nothing (default) |
//! | [`LogTracer`] | forwards events to `tracing` under the `pyrite::vm` target |
//! | [`ProfilingTracer`] | opcode frequency counters and call depth tracking |
//! | [`RecordingTracer`] | full event recording for tests and post-mortem analysis |
//!
//! ```ignore
//! let mut vm = Vm::new().with_tracer(Box::new(RecordingTracer::new()));
//! ```

use ahash::AHashMap;

use crate::{bytecode::Opcode, types::generator::GeneratorState};

/// Trace event emitted during VM execution, as captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An opcode was dispatched at the given instruction offset.
    Instruction { ip: usize, opcode: Opcode, stack_depth: usize },
    /// A frame was pushed.
    Call { name: String, depth: usize },
    /// A frame was popped; `depth` is the call stack depth after the pop.
    Return { depth: usize },
    /// An exception started unwinding.
    Exception { type_name: String, depth: usize },
    /// A generator or coroutine changed lifecycle state.
    GeneratorState { name: String, state: GeneratorState },
    /// A class object was created.
    ClassCreated { name: String, mro_len: usize },
}

/// Hooks called by the VM during execution.
///
/// All methods have default no-op implementations; implementations only override the
/// hooks they care about.
pub trait VmTracer: std::fmt::Debug {
    /// Called before each opcode dispatch. This is the hottest hook.
    #[inline(always)]
    fn on_instruction(&mut self, _ip: usize, _opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {}

    /// Called when a frame is pushed (function call, class body, generator resumption).
    #[inline(always)]
    fn on_call(&mut self, _name: &str, _depth: usize) {}

    /// Called when a frame is popped.
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called once per raised exception, in the frame that raised it.
    #[inline(always)]
    fn on_exception(&mut self, _type_name: &str, _depth: usize) {}

    #[inline(always)]
    fn on_generator_state(&mut self, _name: &str, _state: GeneratorState) {}

    #[inline(always)]
    fn on_class_created(&mut self, _name: &str, _mro_len: usize) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Forwards events to the `tracing` ecosystem.
///
/// Instruction events are emitted at `TRACE` level, everything else at `DEBUG`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer {
    instructions: bool,
}

impl LogTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also logs every dispatched instruction.
    #[must_use]
    pub fn with_instructions(mut self) -> Self {
        self.instructions = true;
        self
    }
}

impl VmTracer for LogTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize, frame_depth: usize) {
        if self.instructions {
            tracing::trace!(target: "pyrite::vm", ip, %opcode, stack_depth, frame_depth, "instruction");
        }
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        tracing::debug!(target: "pyrite::vm", name, depth, "call");
    }

    fn on_return(&mut self, depth: usize) {
        tracing::debug!(target: "pyrite::vm", depth, "return");
    }

    fn on_exception(&mut self, type_name: &str, depth: usize) {
        tracing::debug!(target: "pyrite::vm", exception = type_name, depth, "exception");
    }

    fn on_generator_state(&mut self, name: &str, state: GeneratorState) {
        tracing::debug!(target: "pyrite::vm", name, %state, "generator state");
    }

    fn on_class_created(&mut self, name: &str, mro_len: usize) {
        tracing::debug!(target: "pyrite::vm", name, mro_len, "class created");
    }
}

/// Collects execution statistics.
///
/// Retrieve results via [`ProfilingTracer::report`] after execution.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    opcode_counts: AHashMap<Opcode, u64>,
    total_instructions: u64,
    max_depth: usize,
    total_calls: u64,
    total_exceptions: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug)]
pub struct ProfilingReport {
    /// Per-opcode execution counts, most executed first.
    pub opcode_counts: Vec<(Opcode, u64)>,
    pub total_instructions: u64,
    /// Maximum call stack depth observed.
    pub max_depth: usize,
    pub total_calls: u64,
    pub total_exceptions: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut opcode_counts: Vec<_> = self.opcode_counts.iter().map(|(&k, &v)| (k, v)).collect();
        opcode_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| (a.0 as u8).cmp(&(b.0 as u8))));
        ProfilingReport {
            opcode_counts,
            total_instructions: self.total_instructions,
            max_depth: self.max_depth,
            total_calls: self.total_calls,
            total_exceptions: self.total_exceptions,
        }
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _ip: usize, opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
        self.total_instructions += 1;
    }

    #[inline]
    fn on_call(&mut self, _name: &str, depth: usize) {
        self.total_calls += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    fn on_exception(&mut self, _type_name: &str, _depth: usize) {
        self.total_exceptions += 1;
    }
}

/// Records every event.
///
/// Instruction events are only kept when enabled with
/// [`with_instructions`](Self::with_instructions), since they dominate the trace.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    instructions: bool,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_instructions(mut self) -> Self {
        self.instructions = true;
        self
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize, _frame_depth: usize) {
        if self.instructions {
            self.events.push(TraceEvent::Instruction { ip, opcode, stack_depth });
        }
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        self.events.push(TraceEvent::Call {
            name: name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.push(TraceEvent::Return { depth });
    }

    fn on_exception(&mut self, type_name: &str, depth: usize) {
        self.events.push(TraceEvent::Exception {
            type_name: type_name.to_owned(),
            depth,
        });
    }

    fn on_generator_state(&mut self, name: &str, state: GeneratorState) {
        self.events.push(TraceEvent::GeneratorState {
            name: name.to_owned(),
            state,
        });
    }

    fn on_class_created(&mut self, name: &str, mro_len: usize) {
        self.events.push(TraceEvent::ClassCreated {
            name: name.to_owned(),
            mro_len,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiling_report_orders_by_frequency() {
        let mut tracer = ProfilingTracer::new();
        tracer.on_instruction(0, Opcode::LoadConst, 0, 1);
        tracer.on_instruction(1, Opcode::Pop, 1, 1);
        tracer.on_instruction(2, Opcode::LoadConst, 0, 1);
        tracer.on_call("f", 2);
        tracer.on_call("g", 3);
        let report = tracer.report();
        assert_eq!(report.opcode_counts[0], (Opcode::LoadConst, 2));
        assert_eq!(report.total_instructions, 3);
        assert_eq!(report.max_depth, 3);
        assert_eq!(report.total_calls, 2);
    }

    #[test]
    fn recording_skips_instructions_unless_enabled() {
        let mut tracer = RecordingTracer::new();
        tracer.on_instruction(0, Opcode::Nop, 0, 1);
        tracer.on_class_created("A", 2);
        assert_eq!(
            tracer.events(),
            &[TraceEvent::ClassCreated {
                name: "A".to_owned(),
                mro_len: 2
            }]
        );
    }
}
