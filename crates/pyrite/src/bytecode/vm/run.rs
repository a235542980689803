//! Frame execution and opcode dispatch.

use std::rc::Rc;

use super::{Frame, FrameInfo, Vm};
use crate::{
    args::ArgValues,
    bytecode::{
        Code, Constant,
        op::{BinaryOp, BuildClassFlags, CompareOp, MakeFunctionFlags, Opcode},
    },
    exception::{ExcType, RunError, RunResult, SimpleException},
    heap::{HeapData, HeapId},
    types::{AttrMap, function::Function, generator::Resumption},
    value::{Complex, Value},
};

/// How a frame stopped running.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FrameExit {
    Return(Value),
    /// Suspended at a `yield`; only generator and coroutine frames produce this.
    Yield(Value),
}

/// Fetches a `u8` operand, advancing the instruction pointer.
macro_rules! fetch_u8 {
    ($frame:expr, $code:expr) => {{
        let byte = *$code
            .bytecode()
            .get($frame.ip)
            .ok_or_else(|| RunError::internal("truncated operand"))?;
        $frame.ip += 1;
        byte
    }};
}

/// Fetches a little-endian `u16` operand, advancing the instruction pointer.
macro_rules! fetch_u16 {
    ($frame:expr, $code:expr) => {{
        let lo = fetch_u8!($frame, $code);
        let hi = fetch_u8!($frame, $code);
        u16::from_le_bytes([lo, hi])
    }};
}

impl Vm {
    /// Runs `frame` until it returns or yields.
    ///
    /// `pending` is raised at the frame's current position before any instruction
    /// executes; generators use it for `throw()`.
    pub(crate) fn run_frame(&mut self, frame: &mut Frame, pending: Option<RunError>) -> RunResult<FrameExit> {
        let depth = self.call_stack.len();
        self.tracker.check_recursion(depth)?;
        self.call_stack.push(FrameInfo {
            function: frame.function,
            first_arg: frame.locals.first().copied().unwrap_or(Value::Undefined),
        });
        // a resumed generator may be suspended inside an `except` block
        let handled_len = self.handled.len();
        self.handled.extend(frame.handling.iter().copied());
        self.tracer.on_call(frame.code.name(), depth + 1);
        let result = self.execute(frame, pending);
        self.handled.truncate(handled_len);
        self.call_stack.truncate(depth);
        self.tracer.on_return(depth);
        result
    }

    fn execute(&mut self, frame: &mut Frame, mut pending: Option<RunError>) -> RunResult<FrameExit> {
        let code = Rc::clone(&frame.code);
        loop {
            let outcome = match pending.take() {
                Some(err) => Err(err),
                None => self.step(frame, &code),
            };
            match outcome {
                Ok(None) => {}
                Ok(Some(exit)) => return Ok(exit),
                Err(err) => self.handle_exception(frame, err)?,
            }
        }
    }

    /// Executes one instruction.
    #[expect(clippy::too_many_lines)]
    fn step(&mut self, frame: &mut Frame, code: &Code) -> RunResult<Option<FrameExit>> {
        let Some(&byte) = code.bytecode().get(frame.ip) else {
            return Ok(Some(FrameExit::Return(Value::None)));
        };
        frame.last_ip = frame.ip;
        frame.ip += 1;
        let opcode = Opcode::from_repr(byte).ok_or_else(|| RunError::internal(format!("invalid opcode {byte}")))?;
        self.tracker.on_instruction()?;
        self.tracer
            .on_instruction(frame.last_ip, opcode, frame.stack.len(), self.call_stack.len());

        match opcode {
            Opcode::Nop => {}
            Opcode::Pop => {
                frame.pop()?;
            }
            Opcode::Dup => {
                let value = frame.peek()?;
                frame.push(value);
            }
            Opcode::RotTwo => {
                let len = stack_len_at_least(frame, 2)?;
                frame.stack.swap(len - 1, len - 2);
            }
            Opcode::RotThree => {
                let len = stack_len_at_least(frame, 3)?;
                frame.stack[len - 3..].rotate_right(1);
            }

            Opcode::LoadConst => {
                let idx = fetch_u16!(frame, code);
                let constant = code
                    .constant(usize::from(idx))
                    .ok_or_else(|| RunError::internal("constant index out of range"))?;
                let value = self.load_constant(constant)?;
                frame.push(value);
            }
            Opcode::LoadNone => frame.push(Value::None),
            Opcode::LoadTrue => frame.push(Value::Bool(true)),
            Opcode::LoadFalse => frame.push(Value::Bool(false)),

            Opcode::LoadLocal => {
                let idx = usize::from(fetch_u16!(frame, code));
                let value = local_slot(frame, idx)?;
                if value.is_undefined() {
                    return Err(ExcType::unbound_local(local_name(code, idx)));
                }
                frame.push(value);
            }
            Opcode::StoreLocal => {
                let idx = usize::from(fetch_u16!(frame, code));
                let value = frame.pop()?;
                *local_slot_mut(frame, idx)? = value;
            }
            Opcode::DeleteLocal => {
                let idx = usize::from(fetch_u16!(frame, code));
                let slot = local_slot_mut(frame, idx)?;
                if slot.is_undefined() {
                    return Err(ExcType::unbound_local(local_name(code, idx)));
                }
                *slot = Value::Undefined;
            }
            Opcode::LoadDeref => {
                let idx = usize::from(fetch_u16!(frame, code));
                let cell = cell_slot(frame, idx)?;
                let value = match self.heap.get(cell) {
                    HeapData::Cell(v) => *v,
                    _ => return Err(RunError::internal("cell slot does not hold a cell")),
                };
                if value.is_undefined() {
                    return Err(unbound_deref(code, idx));
                }
                frame.push(value);
            }
            Opcode::StoreDeref => {
                let idx = usize::from(fetch_u16!(frame, code));
                let cell = cell_slot(frame, idx)?;
                let value = frame.pop()?;
                if let HeapData::Cell(slot) = self.heap.get_mut(cell) {
                    *slot = value;
                }
            }
            Opcode::LoadClosure => {
                let idx = usize::from(fetch_u16!(frame, code));
                let cell = cell_slot(frame, idx)?;
                frame.push(Value::Ref(cell));
            }

            Opcode::LoadGlobal => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let value = self.load_global(frame, name)?;
                frame.push(value);
            }
            Opcode::StoreGlobal => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let value = frame.pop()?;
                self.store_global(frame, name, value);
            }
            Opcode::DeleteGlobal => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                self.delete_global(frame, name)?;
            }
            Opcode::LoadName => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                if let Some(ns) = frame.namespace
                    && let Some(value) = self.namespace_get(ns, name)?
                {
                    frame.push(value);
                } else {
                    let value = self.load_global(frame, name)?;
                    frame.push(value);
                }
            }
            Opcode::StoreName => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let value = frame.pop()?;
                match frame.namespace {
                    Some(ns) => {
                        let key = self.new_str(name)?;
                        self.set_item(Value::Ref(ns), key, value)?;
                    }
                    None => self.store_global(frame, name, value),
                }
            }
            Opcode::DeleteName => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                match frame.namespace {
                    Some(ns) => {
                        let key = self.new_str(name)?;
                        self.del_item(Value::Ref(ns), key).map_err(|err| {
                            if self.error_matches(&err, ExcType::KeyError) {
                                ExcType::name_error(name)
                            } else {
                                err
                            }
                        })?;
                    }
                    None => self.delete_global(frame, name)?,
                }
            }

            Opcode::LoadAttr => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let obj = frame.pop()?;
                let value = self.get_attr(obj, name)?;
                frame.push(value);
            }
            Opcode::StoreAttr => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let obj = frame.pop()?;
                let value = frame.pop()?;
                self.set_attr(obj, name, value)?;
            }
            Opcode::DeleteAttr => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let obj = frame.pop()?;
                self.del_attr(obj, name)?;
            }

            Opcode::BinarySubscr => {
                let key = frame.pop()?;
                let container = frame.pop()?;
                let value = self.get_item(container, key)?;
                frame.push(value);
            }
            Opcode::StoreSubscr => {
                let key = frame.pop()?;
                let container = frame.pop()?;
                let value = frame.pop()?;
                self.set_item(container, key, value)?;
            }
            Opcode::DeleteSubscr => {
                let key = frame.pop()?;
                let container = frame.pop()?;
                self.del_item(container, key)?;
            }

            Opcode::BinaryOp | Opcode::InplaceOp => {
                let raw = fetch_u8!(frame, code);
                let op = BinaryOp::from_repr(raw)
                    .ok_or_else(|| RunError::internal(format!("invalid binary operator {raw}")))?;
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                let value = if opcode == Opcode::InplaceOp {
                    self.inplace_op(lhs, rhs, op)?
                } else {
                    self.binary_op(lhs, rhs, op)?
                };
                frame.push(value);
            }
            Opcode::UnaryNeg => {
                let value = frame.pop()?;
                let result = self.unary_neg(value)?;
                frame.push(result);
            }
            Opcode::UnaryPos => {
                let value = frame.pop()?;
                let result = self.unary_pos(value)?;
                frame.push(result);
            }
            Opcode::UnaryInvert => {
                let value = frame.pop()?;
                let result = self.unary_invert(value)?;
                frame.push(result);
            }
            Opcode::UnaryNot => {
                let value = frame.pop()?;
                let truthy = self.truthy(value)?;
                frame.push(Value::Bool(!truthy));
            }
            Opcode::CompareOp => {
                let raw = fetch_u8!(frame, code);
                let op = CompareOp::from_repr(raw)
                    .ok_or_else(|| RunError::internal(format!("invalid comparison operator {raw}")))?;
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                let value = self.compare_op(lhs, rhs, op)?;
                frame.push(value);
            }

            Opcode::BuildList => {
                let n = usize::from(fetch_u16!(frame, code));
                let items = frame.pop_n(n)?;
                let value = self.new_list(items)?;
                frame.push(value);
            }
            Opcode::BuildTuple => {
                let n = usize::from(fetch_u16!(frame, code));
                let items = frame.pop_n(n)?;
                let value = self.new_tuple(items)?;
                frame.push(value);
            }
            Opcode::BuildSet => {
                let n = usize::from(fetch_u16!(frame, code));
                let items = frame.pop_n(n)?;
                let value = self.new_set(items)?;
                frame.push(value);
            }
            Opcode::BuildDict => {
                let n = usize::from(fetch_u16!(frame, code));
                let flat = frame.pop_n(n * 2)?;
                let pairs = flat.chunks_exact(2).map(|kv| (kv[0], kv[1])).collect();
                let value = self.new_dict(pairs)?;
                frame.push(value);
            }
            Opcode::ListAppend => {
                let depth = usize::from(fetch_u16!(frame, code));
                let value = frame.pop()?;
                let len = stack_len_at_least(frame, depth + 1)?;
                let list = frame.stack[len - 1 - depth];
                match list {
                    Value::Ref(id) => match self.heap.get_mut(id) {
                        HeapData::List(items) => items.push(value),
                        _ => return Err(RunError::internal("ListAppend target is not a list")),
                    },
                    _ => return Err(RunError::internal("ListAppend target is not a list")),
                }
            }
            Opcode::UnpackSequence => {
                let n = usize::from(fetch_u16!(frame, code));
                let seq = frame.pop()?;
                let items = self.collect_iter(seq)?;
                if items.len() < n {
                    return Err(ExcType::value_error(format!(
                        "not enough values to unpack (expected {n}, got {})",
                        items.len()
                    )));
                }
                if items.len() > n {
                    return Err(ExcType::value_error(format!("too many values to unpack (expected {n})")));
                }
                frame.stack.extend(items.into_iter().rev());
            }

            Opcode::Jump => {
                let target = fetch_u16!(frame, code);
                frame.ip = usize::from(target);
            }
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue => {
                let target = fetch_u16!(frame, code);
                let value = frame.pop()?;
                if self.truthy(value)? == (opcode == Opcode::PopJumpIfTrue) {
                    frame.ip = usize::from(target);
                }
            }
            Opcode::JumpIfFalseOrPop | Opcode::JumpIfTrueOrPop => {
                let target = fetch_u16!(frame, code);
                let value = frame.peek()?;
                if self.truthy(value)? == (opcode == Opcode::JumpIfTrueOrPop) {
                    frame.ip = usize::from(target);
                } else {
                    frame.pop()?;
                }
            }

            Opcode::GetIter => {
                let iterable = frame.pop()?;
                let iterator = self.get_iter(iterable)?;
                frame.push(iterator);
            }
            Opcode::ForIter => {
                let target = fetch_u16!(frame, code);
                let iterator = frame.peek()?;
                match self.next_value(iterator)? {
                    Some(item) => frame.push(item),
                    None => {
                        frame.pop()?;
                        frame.ip = usize::from(target);
                    }
                }
            }

            Opcode::MakeFunction => {
                let idx = fetch_u16!(frame, code);
                let flags = fetch_u8!(frame, code);
                let Some(Constant::Code(func_code)) = code.constant(usize::from(idx)) else {
                    return Err(RunError::internal("MakeFunction operand is not a code constant"));
                };
                let func_code = Rc::clone(func_code);
                let value = self.make_function(frame, func_code, flags)?;
                frame.push(value);
            }
            Opcode::CallFunction => {
                let argc = usize::from(fetch_u8!(frame, code));
                let args = frame.pop_n(argc)?;
                let callable = frame.pop()?;
                let result = self.call(callable, ArgValues::positional(args))?;
                frame.push(result);
            }
            Opcode::CallFunctionKw => {
                let total = usize::from(fetch_u8!(frame, code));
                let names = frame.pop()?;
                let mut values = frame.pop_n(total)?;
                let callable = frame.pop()?;
                let names = self
                    .sequence_items(names)
                    .ok_or_else(|| RunError::internal("CallFunctionKw names are not a tuple"))?;
                if names.len() > values.len() {
                    return Err(RunError::internal("CallFunctionKw has more names than arguments"));
                }
                let kw_values = values.split_off(values.len() - names.len());
                let mut kwargs = Vec::with_capacity(names.len());
                for (name, value) in names.into_iter().zip(kw_values) {
                    let name = self
                        .str_value(name)
                        .ok_or_else(|| RunError::internal("keyword name is not a string"))?;
                    kwargs.push((name.to_owned(), value));
                }
                let result = self.call(callable, ArgValues::with_kwargs(values, kwargs))?;
                frame.push(result);
            }
            Opcode::CallFunctionEx => {
                let kwargs = frame.pop()?;
                let args = frame.pop()?;
                let callable = frame.pop()?;
                let positional = self.collect_iter(args)?;
                let kwargs = if kwargs.is_none() { Vec::new() } else { self.kwargs_from_mapping(kwargs)? };
                let result = self.call(callable, ArgValues::with_kwargs(positional, kwargs))?;
                frame.push(result);
            }
            Opcode::ReturnValue => {
                let value = frame.pop()?;
                return Ok(Some(FrameExit::Return(value)));
            }

            Opcode::BuildClass => {
                let nbases = usize::from(fetch_u8!(frame, code));
                let flags = fetch_u8!(frame, code);
                let kwargs = if flags & BuildClassFlags::KWARGS == 0 {
                    Vec::new()
                } else {
                    let mapping = frame.pop()?;
                    self.kwargs_from_mapping(mapping)?
                };
                let metaclass = if flags & BuildClassFlags::METACLASS == 0 {
                    None
                } else {
                    Some(frame.pop()?)
                };
                let bases = frame.pop_n(nbases)?;
                let name = frame.pop()?;
                let body = frame.pop()?;
                let class = self.build_class(body, name, &bases, metaclass, kwargs)?;
                frame.push(class);
            }

            Opcode::ImportName => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let module = self.import(name)?;
                frame.push(module);
            }
            Opcode::ImportFrom => {
                let name = operand_name(code, fetch_u16!(frame, code))?;
                let module = frame.peek()?;
                let value = match self.get_attr(module, name) {
                    Ok(value) => value,
                    Err(err) if self.error_matches(&err, ExcType::AttributeError) => {
                        let module_name = match module {
                            Value::Ref(id) => match self.heap.get(id) {
                                HeapData::Module(m) => m.name.clone(),
                                _ => "?".to_owned(),
                            },
                            _ => "?".to_owned(),
                        };
                        return Err(SimpleException::new_msg(
                            ExcType::ImportError,
                            format!("cannot import name '{name}' from '{module_name}'"),
                        )
                        .into());
                    }
                    Err(err) => return Err(err),
                };
                frame.push(value);
            }

            Opcode::Raise => {
                let argc = fetch_u8!(frame, code);
                return Err(match argc {
                    0 => match self.active_exception(frame) {
                        Some(exc) => self.reraise(exc),
                        None => ExcType::runtime_error("No active exception to reraise"),
                    },
                    1 => {
                        let exc = frame.pop()?;
                        self.make_raise(exc, None)
                    }
                    _ => {
                        let cause = frame.pop()?;
                        let exc = frame.pop()?;
                        self.make_raise(exc, Some(cause))
                    }
                });
            }
            Opcode::Reraise => {
                let exc = frame.pop()?;
                self.pop_handled(frame);
                return Err(self.reraise(exc));
            }
            Opcode::CheckExcMatch => {
                let class = frame.pop()?;
                let exc = frame.peek()?;
                let matches = self.exception_matches(exc, class)?;
                frame.push(Value::Bool(matches));
            }
            Opcode::PopExcept => {
                self.pop_handled(frame);
            }

            Opcode::EnterWith => {
                let manager = frame.pop()?;
                let (Some(enter), Some(exit)) = (
                    self.special_method(manager, "__enter__")?,
                    self.special_method(manager, "__exit__")?,
                ) else {
                    return Err(ExcType::type_error(format!(
                        "'{}' object does not support the context manager protocol",
                        self.type_name(manager)
                    )));
                };
                let entered = self.call(enter, ArgValues::empty())?;
                frame.push(exit);
                frame.push(entered);
            }
            Opcode::ExitWith => {
                let exit = frame.pop()?;
                self.call(exit, ArgValues::positional([Value::None, Value::None, Value::None]))?;
            }
            Opcode::ExitWithExc => {
                let exc = frame.pop()?;
                let exit = frame.pop()?;
                self.pop_handled(frame);
                let exc_class = Value::Ref(self.type_of(exc));
                let suppress = self.call(exit, ArgValues::positional([exc_class, exc, Value::None]))?;
                if !self.truthy(suppress)? {
                    return Err(self.reraise(exc));
                }
            }

            Opcode::YieldValue => {
                let value = frame.pop()?;
                return Ok(Some(FrameExit::Yield(value)));
            }
            Opcode::GetYieldFromIter => {
                let iterable = frame.pop()?;
                let iterator = if self.is_generator(iterable) {
                    iterable
                } else {
                    self.get_iter(iterable)?
                };
                frame.push(iterator);
            }
            Opcode::YieldFrom => {
                let sent = frame.pop()?;
                let iterator = frame.peek()?;
                match self.delegate_send(iterator, sent)? {
                    Resumption::Yielded(value) => {
                        // resumption pushes the next sent value and re-executes this instruction
                        frame.ip = frame.last_ip;
                        return Ok(Some(FrameExit::Yield(value)));
                    }
                    Resumption::Returned(value) => {
                        frame.pop()?;
                        frame.push(value);
                    }
                }
            }
            Opcode::GetAwaitable => {
                let awaitable = frame.pop()?;
                let iterator = self.get_awaitable(awaitable)?;
                frame.push(iterator);
            }
        }
        Ok(None)
    }

    fn load_constant(&mut self, constant: &Constant) -> RunResult<Value> {
        Ok(match constant {
            Constant::None => Value::None,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::Complex(re, im) => Value::Complex(Complex::new(*re, *im)),
            Constant::Str(s) => self.new_str(s.as_str())?,
            Constant::Bytes(b) => self.new_bytes(b.as_slice())?,
            Constant::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.load_constant(item)?);
                }
                self.new_tuple(values)?
            }
            Constant::Code(_) => return Err(RunError::internal("code constants are only loaded by MakeFunction")),
        })
    }

    fn load_global(&mut self, frame: &Frame, name: &str) -> RunResult<Value> {
        if let HeapData::Module(module) = self.heap.get(frame.globals)
            && let Some(value) = module.attrs.get(name)
        {
            return Ok(*value);
        }
        self.builtin(name).ok_or_else(|| ExcType::name_error(name))
    }

    fn store_global(&mut self, frame: &Frame, name: &str, value: Value) {
        if let HeapData::Module(module) = self.heap.get_mut(frame.globals) {
            module.attrs.insert(name.to_owned(), value);
        }
    }

    fn delete_global(&mut self, frame: &Frame, name: &str) -> RunResult<()> {
        let removed = match self.heap.get_mut(frame.globals) {
            HeapData::Module(module) => module.attrs.shift_remove(name).is_some(),
            _ => false,
        };
        if removed { Ok(()) } else { Err(ExcType::name_error(name)) }
    }

    /// Converts a `**kwargs` mapping into keyword arguments.
    pub(crate) fn kwargs_from_mapping(&mut self, mapping: Value) -> RunResult<Vec<(String, Value)>> {
        let Some(items) = self.dict_items(mapping) else {
            return Err(ExcType::type_error(format!(
                "argument after ** must be a mapping, not {}",
                self.type_name(mapping)
            )));
        };
        items
            .into_iter()
            .map(|(k, v)| match self.str_value(k) {
                Some(name) => Ok((name.to_owned(), v)),
                None => Err(ExcType::type_error("keywords must be strings")),
            })
            .collect()
    }

    fn make_function(&mut self, frame: &mut Frame, code: Rc<Code>, flags: u8) -> RunResult<Value> {
        let cells = if flags & MakeFunctionFlags::CLOSURE == 0 {
            Vec::new()
        } else {
            let closure = frame.pop()?;
            self.sequence_items(closure)
                .ok_or_else(|| RunError::internal("closure is not a tuple"))?
                .into_iter()
                .filter_map(Value::ref_id)
                .collect()
        };
        let kw_defaults = if flags & MakeFunctionFlags::KW_DEFAULTS == 0 {
            Vec::new()
        } else {
            let mapping = frame.pop()?;
            self.kwargs_from_mapping(mapping)?
        };
        let defaults = if flags & MakeFunctionFlags::DEFAULTS == 0 {
            Vec::new()
        } else {
            let tuple = frame.pop()?;
            self.sequence_items(tuple)
                .ok_or_else(|| RunError::internal("defaults are not a tuple"))?
        };
        let function = Function {
            code,
            defaults,
            kw_defaults,
            cells,
            globals: frame.globals,
            owner: None,
            attrs: AttrMap::default(),
            is_abstract: false,
        };
        Ok(Value::Ref(self.alloc(HeapData::Function(function))?))
    }
}

fn stack_len_at_least(frame: &Frame, n: usize) -> RunResult<usize> {
    let len = frame.stack.len();
    if len < n {
        return Err(RunError::internal("evaluation stack underflow"));
    }
    Ok(len)
}

fn local_slot(frame: &Frame, idx: usize) -> RunResult<Value> {
    frame
        .locals
        .get(idx)
        .copied()
        .ok_or_else(|| RunError::internal("local index out of range"))
}

fn local_slot_mut(frame: &mut Frame, idx: usize) -> RunResult<&mut Value> {
    frame
        .locals
        .get_mut(idx)
        .ok_or_else(|| RunError::internal("local index out of range"))
}

fn cell_slot(frame: &Frame, idx: usize) -> RunResult<HeapId> {
    frame
        .cells
        .get(idx)
        .copied()
        .ok_or_else(|| RunError::internal("cell index out of range"))
}

fn local_name(code: &Code, idx: usize) -> &str {
    code.local_names().get(idx).map_or("?", String::as_str)
}

fn operand_name(code: &Code, idx: u16) -> RunResult<&str> {
    code.name_at(usize::from(idx))
        .ok_or_else(|| RunError::internal("name index out of range"))
}

fn unbound_deref(code: &Code, idx: usize) -> RunError {
    let name = code.cell_name(idx);
    if idx < code.cell_vars().len() {
        ExcType::unbound_local(name)
    } else {
        SimpleException::new_msg(
            ExcType::NameError,
            format!("cannot access free variable '{name}' where it is not associated with a value in enclosing scope"),
        )
        .into()
    }
}
