//! The call path.
//!
//! Every call, from bytecode or from a native, goes through [`Vm::call`]. Guest
//! functions get a fresh frame with bound parameters; natives go through the bridge;
//! classes go through their metaclass's `__call__` (by default `type.__call__`, which
//! runs `__new__` then `__init__`).

use std::rc::Rc;

use super::{Frame, FrameExit, Vm};
use crate::{
    args::ArgValues,
    bytecode::CodeKind,
    exception::{ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    types::generator::Flavor,
    value::Value,
};

impl Vm {
    /// Calls any callable value.
    pub fn call(&mut self, callable: Value, args: ArgValues) -> RunResult<Value> {
        let Value::Ref(id) = callable else {
            return Err(ExcType::not_callable(self.type_name(callable)));
        };
        match self.heap.get(id) {
            HeapData::Function(_) => self.call_function(id, args),
            HeapData::NativeFunction(_) => self.call_native(id, args),
            HeapData::BoundMethod(bm) => {
                let bm = *bm;
                let mut args = args;
                args.prepend(bm.receiver);
                self.call(bm.function, args)
            }
            HeapData::Class(cls) => {
                let meta = cls.metaclass;
                self.call_class(id, meta, args)
            }
            HeapData::StaticMethod(func) => {
                let func = *func;
                self.call(func, args)
            }
            HeapData::Instance(inst) => {
                let cls = inst.class_id;
                match self.lookup_mro(cls, "__call__") {
                    Some((method, _)) => {
                        let method = self.bind(method, callable, cls)?;
                        self.call(method, args)
                    }
                    None => Err(ExcType::not_callable(self.class_display_name(cls))),
                }
            }
            _ => Err(ExcType::not_callable(self.type_name(callable))),
        }
    }

    pub(crate) fn is_callable(&self, value: Value) -> bool {
        let Value::Ref(id) = value else { return false };
        match self.heap.get(id) {
            HeapData::Function(_)
            | HeapData::NativeFunction(_)
            | HeapData::BoundMethod(_)
            | HeapData::Class(_)
            | HeapData::StaticMethod(_) => true,
            HeapData::Instance(inst) => self.lookup_mro(inst.class_id, "__call__").is_some(),
            _ => false,
        }
    }

    fn call_class(&mut self, cls: HeapId, meta: HeapId, args: ArgValues) -> RunResult<Value> {
        if let Some((call, owner)) = self.lookup_mro(meta, "__call__")
            && owner != self.types.type_
        {
            let method = self.bind(call, Value::Ref(cls), meta)?;
            return self.call(method, args);
        }
        self.type_call(cls, args)
    }

    /// `type.__call__`: `cls.__new__(cls, *args)`, then `__init__` when the result is an
    /// instance of `cls`.
    pub(crate) fn type_call(&mut self, cls: HeapId, args: ArgValues) -> RunResult<Value> {
        if cls == self.types.type_ && args.positional.len() == 1 && args.kwargs.is_empty() {
            return Ok(Value::Ref(self.type_of(args.positional[0])));
        }
        let Some((new, _)) = self.lookup_mro(cls, "__new__") else {
            return Err(RunError::internal("class without __new__"));
        };
        let new = self.bind_for_class(new, cls)?;
        let mut new_args = args.clone();
        new_args.prepend(Value::Ref(cls));
        let instance = self.call(new, new_args)?;

        let instance_type = self.type_of(instance);
        if self.mro_of(instance_type).contains(&cls)
            && let Some((init, _)) = self.lookup_mro(instance_type, "__init__")
        {
            let init = self.bind(init, instance, instance_type)?;
            let result = self.call(init, args)?;
            if !result.is_none() {
                return Err(ExcType::type_error(format!(
                    "__init__() should return None, not '{}'",
                    self.type_name(result)
                )));
            }
        }
        Ok(instance)
    }

    fn call_function(&mut self, func_id: HeapId, args: ArgValues) -> RunResult<Value> {
        let mut frame = self.bind_arguments(func_id, args)?;
        match frame.code.kind() {
            CodeKind::Function => match self.run_frame(&mut frame, None)? {
                FrameExit::Return(value) => Ok(value),
                FrameExit::Yield(_) => Err(RunError::internal("plain function frame yielded")),
            },
            CodeKind::Generator => self.new_generator(frame, Flavor::Generator),
            CodeKind::Coroutine => self.new_generator(frame, Flavor::Coroutine),
        }
    }

    /// Builds the frame for a call, binding arguments to parameter slots and creating cells.
    pub(crate) fn bind_arguments(&mut self, func_id: HeapId, args: ArgValues) -> RunResult<Frame> {
        let HeapData::Function(func) = self.heap.get(func_id) else {
            return Err(RunError::internal("bind_arguments on a non-function"));
        };
        let code = Rc::clone(&func.code);
        let defaults = func.defaults.clone();
        let kw_defaults = func.kw_defaults.clone();
        let closure = func.cells.clone();
        let mut frame = Frame::new(Rc::clone(&code), func.globals);
        frame.function = Some(func_id);

        let sig = code.signature();
        let name = code.name();
        let npos = usize::from(sig.positional);
        let param_names = code.local_names();
        let ArgValues { positional, kwargs } = args;

        if positional.len() > npos && !sig.varargs {
            return Err(too_many_positional(name, npos, defaults.len(), positional.len()));
        }
        for (slot, value) in frame.locals.iter_mut().zip(positional.iter().take(npos)) {
            *slot = *value;
        }
        if let Some(slot) = sig.varargs_slot() {
            let extra = positional.get(npos..).map(<[Value]>::to_vec).unwrap_or_default();
            frame.locals[slot] = self.new_tuple(extra)?;
        }

        let kwonly = sig.kwonly_range();
        let mut extra_kwargs = Vec::new();
        for (key, value) in kwargs {
            let position = param_names
                .iter()
                .enumerate()
                .take(kwonly.end)
                .position(|(i, n)| *n == key && (i < npos || kwonly.contains(&i)));
            match position {
                Some(idx) => {
                    if !frame.locals[idx].is_undefined() {
                        return Err(ExcType::arity_error(format!(
                            "{name}() got multiple values for argument '{key}'"
                        )));
                    }
                    frame.locals[idx] = value;
                }
                None if sig.varkw => extra_kwargs.push((key, value)),
                None => {
                    return Err(ExcType::arity_error(format!(
                        "{name}() got an unexpected keyword argument '{key}'"
                    )));
                }
            }
        }

        let first_default = npos.saturating_sub(defaults.len());
        let mut missing = Vec::new();
        for i in 0..npos {
            if frame.locals[i].is_undefined() {
                if i >= first_default {
                    frame.locals[i] = defaults[i - first_default];
                } else {
                    missing.push(param_names[i].clone());
                }
            }
        }
        if !missing.is_empty() {
            return Err(missing_arguments(name, "positional argument", &missing));
        }
        for i in kwonly.clone() {
            if frame.locals[i].is_undefined() {
                match kw_defaults.iter().find(|(k, _)| *k == param_names[i]) {
                    Some((_, value)) => frame.locals[i] = *value,
                    None => missing.push(param_names[i].clone()),
                }
            }
        }
        if !missing.is_empty() {
            return Err(missing_arguments(name, "keyword-only argument", &missing));
        }
        if let Some(slot) = sig.varkw_slot() {
            frame.locals[slot] = self.str_keyed_dict(extra_kwargs)?;
        }

        let mut cells = Vec::with_capacity(code.cell_vars().len() + closure.len());
        for cell_var in code.cell_vars() {
            let initial = cell_var
                .param_slot
                .map_or(Value::Undefined, |slot| frame.locals[usize::from(slot)]);
            cells.push(self.alloc(HeapData::Cell(initial))?);
        }
        cells.extend(closure);
        frame.cells = cells;
        Ok(frame)
    }
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 { format!("{n} {noun}") } else { format!("{n} {noun}s") }
}

fn too_many_positional(name: &str, npos: usize, ndefaults: usize, given: usize) -> RunError {
    let takes = if ndefaults > 0 {
        format!("from {} to {npos} positional arguments", npos - ndefaults.min(npos))
    } else {
        plural(npos, "positional argument")
    };
    let verb = if given == 1 { "was" } else { "were" };
    ExcType::arity_error(format!("{name}() takes {takes} but {given} {verb} given"))
}

fn missing_arguments(name: &str, noun: &str, missing: &[String]) -> RunError {
    let quoted: Vec<String> = missing.iter().map(|m| format!("'{m}'")).collect();
    let list = match quoted.as_slice() {
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
        [] => String::new(),
    };
    ExcType::arity_error(format!(
        "{name}() missing {}: {list}",
        plural(missing.len(), &format!("required {noun}"))
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_lists_read_like_prose() {
        let err = missing_arguments("f", "positional argument", &["a".to_owned(), "b".to_owned(), "c".to_owned()]);
        assert_eq!(
            err.to_string(),
            "TypeError: f() missing 3 required positional arguments: 'a', 'b', and 'c'"
        );
        let err = missing_arguments("f", "positional argument", &["x".to_owned()]);
        assert_eq!(err.to_string(), "TypeError: f() missing 1 required positional argument: 'x'");
    }

    #[test]
    fn positional_overflow_mentions_defaults() {
        let err = too_many_positional("g", 2, 1, 3);
        assert_eq!(
            err.to_string(),
            "TypeError: g() takes from 1 to 2 positional arguments but 3 were given"
        );
        let err = too_many_positional("h", 0, 0, 1);
        assert_eq!(err.to_string(), "TypeError: h() takes 0 positional arguments but 1 was given");
    }
}
