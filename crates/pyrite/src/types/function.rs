//! Callable heap objects and descriptor wrappers.

use std::rc::Rc;

use super::AttrMap;
use crate::{
    bytecode::Code,
    heap::HeapId,
    native::{Arity, NativeFn},
    value::Value,
};

/// A guest function created by `MakeFunction`.
#[derive(Debug)]
pub(crate) struct Function {
    pub code: Rc<Code>,
    /// Defaults for the trailing positional parameters.
    pub defaults: Vec<Value>,
    pub kw_defaults: Vec<(String, Value)>,
    /// Closure cells, matching `code.free_vars()`.
    pub cells: Vec<HeapId>,
    /// Module whose namespace serves as globals.
    pub globals: HeapId,
    /// Class whose namespace defined this function, for zero-argument `super()`.
    pub owner: Option<HeapId>,
    pub attrs: AttrMap,
    /// Set by `abc.abstractmethod`.
    pub is_abstract: bool,
}

impl Function {
    pub fn name(&self) -> &str {
        self.code.name()
    }

    pub fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        out.extend(self.cells.iter().copied());
        out.push(self.globals);
        out.extend(self.owner);
        push_values(out, self.defaults.iter().copied());
        push_values(out, self.kw_defaults.iter().map(|(_, v)| *v));
        push_values(out, self.attrs.values().copied());
    }
}

/// A host function registered through the native bridge.
#[derive(Debug)]
pub(crate) struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub handler: NativeFn,
}

/// A callable with a receiver prepended to its arguments.
///
/// Produced by attribute lookup: functions accessed through an instance bind the
/// instance, `classmethod`s bind the class, natives in a builtin type's namespace bind
/// the value they were looked up on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundMethod {
    pub receiver: Value,
    pub function: Value,
}

/// `property(fget, fset, fdel)`. Unset accessors are `Value::None`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Property {
    pub fget: Value,
    pub fset: Value,
    pub fdel: Value,
}

/// Result of `super()`: attribute lookups start after `this_class` in the MRO of `object`'s type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SuperProxy {
    pub this_class: HeapId,
    /// The instance, or the class itself for `super()` inside classmethods.
    pub object: Value,
}

pub(crate) fn push_values(out: &mut Vec<HeapId>, values: impl IntoIterator<Item = Value>) {
    out.extend(values.into_iter().filter_map(Value::ref_id));
}
