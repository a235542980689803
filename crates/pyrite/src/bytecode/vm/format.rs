//! `repr()` and `str()`.

use std::fmt::Write as _;

use super::Vm;
use crate::{
    exception::{ExcType, RunResult, SimpleException},
    heap::{HeapData, HeapId},
    types::{
        generator::Flavor,
        str_bytes::{bytes_repr, str_repr},
    },
    value::{Value, complex_repr, float_repr},
};

/// Nesting depth at which container reprs give up.
const MAX_REPR_DEPTH: usize = 200;

impl Vm {
    /// `repr(value)`.
    pub fn repr_of(&mut self, value: Value) -> RunResult<String> {
        if self.repr_depth >= MAX_REPR_DEPTH {
            return Err(SimpleException::new_msg(
                ExcType::RecursionError,
                "maximum recursion depth exceeded while getting the repr of an object",
            )
            .into());
        }
        self.repr_depth += 1;
        let result = self.repr_inner(value);
        self.repr_depth -= 1;
        result
    }

    fn repr_inner(&mut self, value: Value) -> RunResult<String> {
        let id = match value {
            Value::Undefined => return Ok("<undefined>".to_owned()),
            Value::Ref(id) => id,
            Value::Float(f) => return Ok(float_repr(f)),
            Value::Complex(c) => return Ok(complex_repr(c)),
            other => return Ok(other.to_string()),
        };
        if self.uses_dunders(value)
            && let Some(result) = self.dispatch_dunder(value, "__repr__", &[])?
        {
            return match self.str_value(result) {
                Some(s) => Ok(s.to_owned()),
                None => Err(ExcType::type_error(format!(
                    "__repr__ returned non-string (type {})",
                    self.type_name(result)
                ))),
            };
        }
        match self.heap.get(id) {
            HeapData::Str(s) => Ok(str_repr(s)),
            HeapData::Bytes(b) => Ok(bytes_repr(b)),
            HeapData::List(items) => {
                let items = items.clone();
                self.guarded_items(id, "[", &items, "]", "[...]")
            }
            HeapData::Tuple(items) => {
                let items = items.clone();
                if items.len() == 1 {
                    let inner = self.repr_of(items[0])?;
                    return Ok(format!("({inner},)"));
                }
                self.guarded_items(id, "(", &items, ")", "(...)")
            }
            HeapData::Dict(dict) => {
                let pairs = dict.items();
                if self.repr_stack_contains(id) {
                    return Ok("{...}".to_owned());
                }
                self.repr_active.push(id);
                let result = self.join_pairs(&pairs);
                self.repr_active.pop();
                Ok(format!("{{{}}}", result?))
            }
            HeapData::Set(set) => {
                let items = set.values();
                if items.is_empty() {
                    return Ok("set()".to_owned());
                }
                self.guarded_items(id, "{", &items, "}", "set(...)")
            }
            HeapData::FrozenSet(set) => {
                let items = set.values();
                if items.is_empty() {
                    return Ok("frozenset()".to_owned());
                }
                let inner = self.guarded_items(id, "{", &items, "}", "...")?;
                Ok(format!("frozenset({inner})"))
            }
            HeapData::Function(func) => {
                let name = func.name().to_owned();
                let qualname = match func.owner.and_then(|owner| self.class_obj(owner)) {
                    Some(cls) => format!("{}.{name}", cls.name),
                    None => name,
                };
                Ok(format!("<function {qualname} at {}>", address(id)))
            }
            HeapData::NativeFunction(native) => Ok(format!("<built-in function {}>", native.name)),
            HeapData::BoundMethod(bm) => {
                let bm = *bm;
                let func_name = self.callable_name(bm.function);
                let owner = match bm.receiver {
                    Value::Ref(rid) if matches!(self.heap.get(rid), HeapData::Class(_)) => self.class_display_name(rid),
                    other => self.type_name(other),
                };
                let receiver = self.repr_of(bm.receiver)?;
                Ok(format!("<bound method {owner}.{func_name} of {receiver}>"))
            }
            HeapData::Class(_) => Ok(format!("<class '{}'>", self.class_path(id))),
            HeapData::Instance(inst) => {
                let cls = inst.class_id;
                Ok(self.default_object_repr(cls, id))
            }
            HeapData::Module(module) => Ok(format!("<module '{}'>", module.name)),
            HeapData::HostExtension(data) => Ok(format!("<{} object at {}>", data.type_name(), address(id))),
            HeapData::Cell(_) => Ok(format!("<cell at {}>", address(id))),
            HeapData::Property(_) => Ok(format!("<property object at {}>", address(id))),
            HeapData::ClassMethod(_) => Ok(format!("<classmethod object at {}>", address(id))),
            HeapData::StaticMethod(_) => Ok(format!("<staticmethod object at {}>", address(id))),
            HeapData::Generator(g) => {
                let kind = match g.flavor {
                    Flavor::Generator => "generator",
                    Flavor::Coroutine => "coroutine",
                };
                Ok(format!("<{kind} object {} at {}>", g.name, address(id)))
            }
            HeapData::Range(r) => Ok(if r.step == 1 {
                format!("range({}, {})", r.start, r.stop)
            } else {
                format!("range({}, {}, {})", r.start, r.stop, r.step)
            }),
            HeapData::Iterator(_) => Ok(format!("<iterator object at {}>", address(id))),
            HeapData::Super(proxy) => {
                let proxy = *proxy;
                let this = self.class_path(proxy.this_class);
                let object = self.repr_of(proxy.object)?;
                Ok(format!("<super: <class '{this}'>, {object}>"))
            }
        }
    }

    fn repr_stack_contains(&self, id: HeapId) -> bool {
        self.repr_active.contains(&id)
    }

    /// Joins item reprs between delimiters, printing `recursive` for a container that
    /// contains itself.
    fn guarded_items(&mut self, id: HeapId, open: &str, items: &[Value], close: &str, recursive: &str) -> RunResult<String> {
        if self.repr_stack_contains(id) {
            return Ok(recursive.to_owned());
        }
        self.repr_active.push(id);
        let result = self.join_reprs(items);
        self.repr_active.pop();
        Ok(format!("{open}{}{close}", result?))
    }

    fn join_reprs(&mut self, items: &[Value]) -> RunResult<String> {
        let mut out = String::new();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&self.repr_of(*item)?);
        }
        Ok(out)
    }

    fn join_pairs(&mut self, pairs: &[(Value, Value)]) -> RunResult<String> {
        let mut out = String::new();
        for (i, (k, v)) in pairs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let k = self.repr_of(*k)?;
            let v = self.repr_of(*v)?;
            let _ = write!(out, "{k}: {v}");
        }
        Ok(out)
    }

    /// `<module.Name object at 0x..>`, the repr of `object.__repr__`.
    pub(crate) fn default_object_repr(&self, cls: HeapId, id: HeapId) -> String {
        format!("<{} object at {}>", self.class_path(cls), address(id))
    }

    /// A class name qualified by its `__module__`, omitted for builtins.
    pub(crate) fn class_path(&self, cls: HeapId) -> String {
        let Some(class) = self.class_obj(cls) else {
            return "?".to_owned();
        };
        let qualname = class
            .namespace
            .get("__qualname__")
            .and_then(|v| self.str_value(*v))
            .unwrap_or(&class.name);
        match class.namespace.get("__module__").and_then(|v| self.str_value(*v)) {
            Some(module) if module != "builtins" => format!("{module}.{qualname}"),
            _ => qualname.to_owned(),
        }
    }

    fn callable_name(&self, callable: Value) -> String {
        match callable {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Function(func) => func.name().to_owned(),
                HeapData::NativeFunction(native) => native.name.clone(),
                _ => self.type_name(callable),
            },
            other => self.type_name(other),
        }
    }

    /// `str(value)`.
    pub fn str_of(&mut self, value: Value) -> RunResult<String> {
        if let Value::Ref(id) = value {
            if let HeapData::Str(s) = self.heap.get(id) {
                return Ok(s.clone());
            }
            if self.uses_dunders(value)
                && let Some(result) = self.dispatch_dunder(value, "__str__", &[])?
            {
                return match self.str_value(result) {
                    Some(s) => Ok(s.to_owned()),
                    None => Err(ExcType::type_error(format!(
                        "__str__ returned non-string (type {})",
                        self.type_name(result)
                    ))),
                };
            }
        }
        self.repr_of(value)
    }
}

fn address(id: HeapId) -> String {
    format!("0x{:x}", 0x1000 + id.index() * 0x10)
}
