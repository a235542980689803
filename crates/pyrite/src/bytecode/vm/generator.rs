//! Generator and coroutine resumption.
//!
//! A generator owns its suspended [`Frame`]. Resuming takes the frame out of the heap
//! slot, runs it on the Rust stack until it yields, returns or raises, and puts it back
//! when it suspended again. While the frame is out the generator is marked running,
//! which rejects re-entrant resumption.
//!
//! `yield from` and `await` are driven by the `YieldFrom` instruction: while the
//! sub-iterator yields, the outer frame stays parked on that instruction, so a later
//! `send` or `throw` is forwarded to the sub-iterator first.

use std::rc::Rc;

use super::{Frame, FrameExit, Vm};
use crate::{
    args::ArgValues,
    bytecode::{Code, CodeKind, op::Opcode},
    exception::{ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    types::generator::{Flavor, Generator, GeneratorState, Resumption},
    value::Value,
};

/// What a resumption delivers at the suspension point.
enum Resume {
    Send(Value),
    Throw(RunError),
}

impl Vm {
    pub(crate) fn new_generator(&mut self, frame: Frame, flavor: Flavor) -> RunResult<Value> {
        let generator = Generator::new(frame, flavor);
        self.tracer.on_generator_state(&generator.name, GeneratorState::Created);
        Ok(Value::Ref(self.alloc(HeapData::Generator(generator))?))
    }

    /// Creates a generator (or coroutine, for coroutine code) whose body is `code`, with
    /// `module` as globals. The body does not run until the first [`send`](Self::send).
    pub fn create_generator(&mut self, module: Value, code: Rc<Code>) -> RunResult<Value> {
        let Some(module_id) = module.ref_id().filter(|id| matches!(self.heap.get(*id), HeapData::Module(_))) else {
            return Err(ExcType::type_error("globals must be a module"));
        };
        let flavor = match code.kind() {
            CodeKind::Coroutine => Flavor::Coroutine,
            CodeKind::Generator | CodeKind::Function => Flavor::Generator,
        };
        self.new_generator(Frame::new(code, module_id), flavor)
    }

    /// Whether `value` is a generator or coroutine object.
    pub(crate) fn is_generator(&self, value: Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Generator(_)))
    }

    fn generator_id(&self, value: Value) -> RunResult<HeapId> {
        match value {
            Value::Ref(id) if matches!(self.heap.get(id), HeapData::Generator(_)) => Ok(id),
            _ => Err(ExcType::type_error(format!(
                "expected a generator or coroutine, got '{}'",
                self.type_name(value)
            ))),
        }
    }

    /// Lifecycle state of a generator or coroutine.
    #[must_use]
    pub fn generator_state(&self, value: Value) -> Option<GeneratorState> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Generator(g) => Some(g.state),
                _ => None,
            },
            _ => None,
        }
    }

    /// Resumes a generator or coroutine with `value`.
    ///
    /// The value sent to a generator that has not started yet is discarded. Sending to
    /// an exhausted generator fails with `StopIteration`; sending to a running one fails
    /// with `ValueError`.
    pub fn send(&mut self, generator: Value, value: Value) -> RunResult<Resumption> {
        let id = self.generator_id(generator)?;
        self.resume(id, Resume::Send(value))
    }

    /// Raises `exc` (an exception class or instance) at the generator's suspension point.
    ///
    /// A generator that never started is finished without running its body and the
    /// exception propagates to the caller.
    pub fn throw(&mut self, generator: Value, exc: Value) -> RunResult<Resumption> {
        let id = self.generator_id(generator)?;
        let err = self.make_raise(exc, None);
        self.resume(id, Resume::Throw(err))
    }

    /// Finishes a generator by raising `GeneratorExit` inside it.
    ///
    /// Fails with `RuntimeError` when the body yields again instead of exiting.
    pub fn close(&mut self, generator: Value) -> RunResult<Value> {
        let id = self.generator_id(generator)?;
        let suspended = match self.heap.get(id) {
            HeapData::Generator(g) => g.state == GeneratorState::Suspended,
            _ => false,
        };
        if !suspended {
            self.finish_generator(id);
            return Ok(Value::None);
        }
        let exit = self.new_exception(ExcType::GeneratorExit, None)?;
        let err = self.make_raise(exit, None);
        match self.resume(id, Resume::Throw(err)) {
            Ok(Resumption::Yielded(_)) => Err(ExcType::runtime_error("generator ignored GeneratorExit")),
            Ok(Resumption::Returned(_)) => Ok(Value::None),
            Err(err)
                if self.error_matches(&err, ExcType::GeneratorExit) || self.error_matches(&err, ExcType::StopIteration) =>
            {
                Ok(Value::None)
            }
            Err(err) => Err(err),
        }
    }

    /// `next(generator)`, with exhaustion reported as `None`.
    pub(crate) fn generator_next(&mut self, id: HeapId) -> RunResult<Option<Value>> {
        if let HeapData::Generator(g) = self.heap.get(id)
            && g.state == GeneratorState::Exhausted
        {
            return Ok(None);
        }
        match self.resume(id, Resume::Send(Value::None))? {
            Resumption::Yielded(value) => Ok(Some(value)),
            Resumption::Returned(_) => Ok(None),
        }
    }

    /// Guest-level `generator.send(value)`: a started generator receives the value; a
    /// fresh one only accepts `None`.
    pub(crate) fn generator_send_method(&mut self, generator: Value, value: Value) -> RunResult<Value> {
        let id = self.generator_id(generator)?;
        if let HeapData::Generator(g) = self.heap.get(id)
            && g.state == GeneratorState::Created
            && !value.is_none()
        {
            let kind = flavor_name(g.flavor);
            return Err(ExcType::type_error(format!(
                "can't send non-None value to a just-started {kind}"
            )));
        }
        self.resumption_to_value(id, Resume::Send(value))
    }

    /// Guest-level `generator.throw(exc)`.
    pub(crate) fn generator_throw_method(&mut self, generator: Value, exc: Value) -> RunResult<Value> {
        let id = self.generator_id(generator)?;
        let err = self.make_raise(exc, None);
        self.resumption_to_value(id, Resume::Throw(err))
    }

    /// Maps a resumption onto guest conventions: yielded values are returned, a finished
    /// generator raises `StopIteration(value)`.
    fn resumption_to_value(&mut self, id: HeapId, input: Resume) -> RunResult<Value> {
        match self.resume(id, input)? {
            Resumption::Yielded(value) => Ok(value),
            Resumption::Returned(value) => Err(self.stop_iteration_with(value)),
        }
    }

    /// A `StopIteration` error carrying `value`.
    pub(crate) fn stop_iteration_with(&mut self, value: Value) -> RunError {
        if value.is_none() {
            return ExcType::stop_iteration();
        }
        match self.new_exception(ExcType::StopIteration, None) {
            Ok(exc) => {
                if let Ok(args) = self.new_tuple(vec![value]) {
                    self.set_exc_attr(exc, "args", args);
                }
                self.set_exc_attr(exc, "value", value);
                self.make_raise(exc, None)
            }
            Err(err) => err,
        }
    }

    pub(crate) fn finish_generator(&mut self, id: HeapId) {
        self.leave_generator(id);
        if let HeapData::Generator(g) = self.heap.get_mut(id) {
            g.state = GeneratorState::Exhausted;
            g.running = false;
            g.frame = None;
            let name = g.name.clone();
            self.tracer.on_generator_state(&name, GeneratorState::Exhausted);
        }
    }

    fn resume(&mut self, id: HeapId, input: Resume) -> RunResult<Resumption> {
        let (state, running) = match self.heap.get(id) {
            HeapData::Generator(g) => (g.state, g.running),
            _ => return Err(RunError::internal("resume on a non-generator")),
        };
        if running {
            return Err(ExcType::generator_running());
        }
        match (state, input) {
            (GeneratorState::Exhausted, Resume::Send(_)) => Err(ExcType::stop_iteration()),
            (GeneratorState::Exhausted, Resume::Throw(err)) => Err(err),
            (GeneratorState::Created, Resume::Throw(err)) => {
                self.finish_generator(id);
                Err(err)
            }
            (GeneratorState::Created, Resume::Send(_)) => {
                let frame = self.take_frame(id)?;
                self.run_generator(id, frame, None)
            }
            (GeneratorState::Suspended, Resume::Send(value)) => {
                let mut frame = self.take_frame(id)?;
                frame.push(value);
                self.run_generator(id, frame, None)
            }
            (GeneratorState::Suspended, Resume::Throw(err)) => {
                let frame = self.take_frame(id)?;
                self.throw_into_frame(id, frame, err)
            }
        }
    }

    /// Moves the suspended frame out of the generator and marks it running.
    fn take_frame(&mut self, id: HeapId) -> RunResult<Frame> {
        let HeapData::Generator(g) = self.heap.get_mut(id) else {
            return Err(RunError::internal("resume on a non-generator"));
        };
        let frame = g.frame.take().ok_or_else(|| RunError::internal("generator lost its frame"))?;
        g.running = true;
        self.running_generators.push(id);
        Ok(frame)
    }

    fn leave_generator(&mut self, id: HeapId) {
        if let Some(pos) = self.running_generators.iter().rposition(|g| *g == id) {
            self.running_generators.remove(pos);
        }
    }

    /// Delivers a thrown error to a suspended frame, forwarding it to the sub-iterator
    /// first when the frame is parked in `yield from`/`await`.
    fn throw_into_frame(&mut self, id: HeapId, mut frame: Frame, err: RunError) -> RunResult<Resumption> {
        let parked_in_yield_from = frame.code.bytecode().get(frame.last_ip) == Some(&(Opcode::YieldFrom as u8));
        if !parked_in_yield_from {
            return self.run_generator(id, frame, Some(err));
        }
        let inner = frame.peek()?;
        match self.throw_into_iterator(inner, err) {
            Ok(Resumption::Yielded(value)) => {
                self.suspend(id, frame);
                Ok(Resumption::Yielded(value))
            }
            Ok(Resumption::Returned(value)) => {
                frame.pop()?;
                frame.push(value);
                frame.ip = frame.last_ip + 1;
                self.run_generator(id, frame, None)
            }
            Err(err) => self.run_generator(id, frame, Some(err)),
        }
    }

    fn throw_into_iterator(&mut self, iterator: Value, err: RunError) -> RunResult<Resumption> {
        if let Value::Ref(inner_id) = iterator
            && matches!(self.heap.get(inner_id), HeapData::Generator(_))
        {
            return self.resume(inner_id, Resume::Throw(err));
        }
        let Some(throw) = self.get_attr_opt(iterator, "throw")? else {
            return Err(err);
        };
        let exc = self.error_value(&err)?;
        match self.call(throw, ArgValues::one(exc)) {
            Ok(value) => Ok(Resumption::Yielded(value)),
            Err(err) if self.error_matches(&err, ExcType::StopIteration) => {
                Ok(Resumption::Returned(self.stop_iteration_value(&err)))
            }
            Err(err) => Err(err),
        }
    }

    fn suspend(&mut self, id: HeapId, frame: Frame) {
        self.leave_generator(id);
        if let HeapData::Generator(g) = self.heap.get_mut(id) {
            g.frame = Some(frame);
            g.running = false;
            if g.state != GeneratorState::Suspended {
                g.state = GeneratorState::Suspended;
                let name = g.name.clone();
                self.tracer.on_generator_state(&name, GeneratorState::Suspended);
            }
        }
    }

    fn run_generator(&mut self, id: HeapId, mut frame: Frame, pending: Option<RunError>) -> RunResult<Resumption> {
        let result = self.run_frame(&mut frame, pending);
        match result {
            Ok(FrameExit::Yield(value)) => {
                self.suspend(id, frame);
                Ok(Resumption::Yielded(value))
            }
            Ok(FrameExit::Return(value)) => {
                self.finish_generator(id);
                Ok(Resumption::Returned(value))
            }
            Err(err) => {
                let flavor = match self.heap.get(id) {
                    HeapData::Generator(g) => g.flavor,
                    _ => Flavor::Generator,
                };
                self.finish_generator(id);
                if self.error_matches(&err, ExcType::StopIteration) {
                    // a StopIteration escaping the body must not look like normal exhaustion
                    return Err(ExcType::runtime_error(format!(
                        "{} raised StopIteration",
                        flavor_name(flavor)
                    )));
                }
                Err(err)
            }
        }
    }

    /// One step of `yield from`/`await`: forwards `sent` to the sub-iterator.
    pub(crate) fn delegate_send(&mut self, iterator: Value, sent: Value) -> RunResult<Resumption> {
        if let Value::Ref(inner_id) = iterator
            && let HeapData::Generator(g) = self.heap.get(inner_id)
        {
            if g.state == GeneratorState::Exhausted {
                return Ok(Resumption::Returned(Value::None));
            }
            return self.resume(inner_id, Resume::Send(sent));
        }
        if sent.is_none() {
            return Ok(match self.next_with_return(iterator)? {
                Ok(value) => Resumption::Yielded(value),
                Err(returned) => Resumption::Returned(returned),
            });
        }
        match self.call_method(iterator, "send", ArgValues::one(sent)) {
            Ok(value) => Ok(Resumption::Yielded(value)),
            Err(err) if self.error_matches(&err, ExcType::StopIteration) => {
                Ok(Resumption::Returned(self.stop_iteration_value(&err)))
            }
            Err(err) => Err(err),
        }
    }

    /// Advances a non-generator iterator, keeping the `StopIteration` value on exhaustion.
    fn next_with_return(&mut self, iterator: Value) -> RunResult<Result<Value, Value>> {
        if !self.uses_dunders(iterator) {
            return Ok(self.next_value(iterator)?.ok_or(Value::None));
        }
        let Some(next) = self.special_method(iterator, "__next__")? else {
            return Err(ExcType::type_error(format!(
                "'{}' object is not an iterator",
                self.type_name(iterator)
            )));
        };
        match self.call(next, ArgValues::empty()) {
            Ok(value) => Ok(Ok(value)),
            Err(err) if self.error_matches(&err, ExcType::StopIteration) => Ok(Err(self.stop_iteration_value(&err))),
            Err(err) => Err(err),
        }
    }

    /// The iterator behind an `await` operand.
    pub(crate) fn get_awaitable(&mut self, awaitable: Value) -> RunResult<Value> {
        if let Value::Ref(id) = awaitable
            && let HeapData::Generator(g) = self.heap.get(id)
            && g.flavor == Flavor::Coroutine
        {
            return Ok(awaitable);
        }
        if self.uses_dunders(awaitable)
            && let Some(iterator) = self.dispatch_dunder(awaitable, "__await__", &[])?
        {
            if self.is_generator(iterator) || self.uses_dunders(iterator) {
                return Ok(iterator);
            }
            return Err(ExcType::type_error(format!(
                "__await__() returned non-iterator of type '{}'",
                self.type_name(iterator)
            )));
        }
        Err(ExcType::type_error(format!(
            "object {} can't be used in 'await' expression",
            self.type_name(awaitable)
        )))
    }

    /// Drives a coroutine to completion, resuming it with `None` whenever it suspends,
    /// and returns its result.
    pub fn run_coroutine(&mut self, coroutine: Value) -> RunResult<Value> {
        let awaitable = self.get_awaitable(coroutine)?;
        loop {
            match self.delegate_send(awaitable, Value::None)? {
                Resumption::Yielded(_) => {}
                Resumption::Returned(value) => return Ok(value),
            }
        }
    }
}

fn flavor_name(flavor: Flavor) -> &'static str {
    match flavor {
        Flavor::Generator => "generator",
        Flavor::Coroutine => "coroutine",
    }
}
