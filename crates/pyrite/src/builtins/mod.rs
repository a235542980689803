//! Builtin classes, functions and exception classes.
//!
//! Builtin types are ordinary [`ClassObject`]s living on the heap: `type` is its own
//! metaclass, `object` is the root of every MRO, and value types (`int`, `list`, ...)
//! carry their methods as native functions in their namespaces. Attribute lookup on a
//! builtin value binds those natives to the value, so `"a b".split()` goes through the
//! same path as a guest method call.
//!
//! Each builtin function has its own submodule; [`BuiltinsFunctions`] enumerates them
//! for registration.

mod abs;
mod callable;
mod conversions;
mod descriptors;
mod enumerate;
mod exceptions;
mod getattr;
mod hash;
mod id;
mod isinstance;
mod iter_next;
mod len;
mod methods;
mod min_max; // min and max share implementation
mod object_type;
mod print;
mod repr;
mod sorted;
mod sum;

use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

pub(crate) use sorted::sort_values;

use crate::{
    Vm,
    exception::RunResult,
    heap::{Heap, HeapData, HeapId},
    native::{Arity, NativeFn},
    types::class::{ClassObject, InstanceLayout},
    value::Value,
};

/// Heap ids of the builtin classes, fixed at VM creation.
#[derive(Debug, Clone)]
pub(crate) struct BuiltinTypes {
    pub type_: HeapId,
    pub object: HeapId,
    pub none: HeapId,
    pub not_implemented: HeapId,
    pub bool: HeapId,
    pub int: HeapId,
    pub float: HeapId,
    pub complex: HeapId,
    pub str: HeapId,
    pub bytes: HeapId,
    pub list: HeapId,
    pub tuple: HeapId,
    pub dict: HeapId,
    pub set: HeapId,
    pub frozenset: HeapId,
    pub function: HeapId,
    pub builtin_function: HeapId,
    pub method: HeapId,
    pub module: HeapId,
    pub host: HeapId,
    pub cell: HeapId,
    pub property: HeapId,
    pub classmethod: HeapId,
    pub staticmethod: HeapId,
    pub generator: HeapId,
    pub coroutine: HeapId,
    pub range: HeapId,
    pub iterator: HeapId,
    pub super_: HeapId,
}

impl BuiltinTypes {
    /// Allocates the builtin class objects with empty namespaces.
    ///
    /// `type` and `object` reference each other, so they are patched after allocation.
    pub fn bootstrap(heap: &mut Heap) -> Self {
        let type_ = heap.allocate(HeapData::Class(ClassObject::new("type", HeapId::new(0), InstanceLayout::Class)));
        let object = heap.allocate(HeapData::Class(ClassObject::new("object", type_, InstanceLayout::Object)));
        if let HeapData::Class(cls) = heap.get_mut(type_) {
            cls.metaclass = type_;
            cls.bases = vec![object];
            cls.mro = vec![type_, object];
        }
        if let HeapData::Class(cls) = heap.get_mut(object) {
            cls.mro = vec![object];
        }

        let mut value_type = |name: &str| {
            let id = heap.allocate(HeapData::Class(ClassObject::new(name, type_, InstanceLayout::Builtin)));
            if let HeapData::Class(cls) = heap.get_mut(id) {
                cls.bases = vec![object];
                cls.mro = vec![id, object];
            }
            id
        };
        let int = value_type("int");
        let bool = value_type("bool");
        let types = Self {
            type_,
            object,
            none: value_type("NoneType"),
            not_implemented: value_type("NotImplementedType"),
            bool,
            int,
            float: value_type("float"),
            complex: value_type("complex"),
            str: value_type("str"),
            bytes: value_type("bytes"),
            list: value_type("list"),
            tuple: value_type("tuple"),
            dict: value_type("dict"),
            set: value_type("set"),
            frozenset: value_type("frozenset"),
            function: value_type("function"),
            builtin_function: value_type("builtin_function_or_method"),
            method: value_type("method"),
            module: value_type("module"),
            host: value_type("host_extension"),
            cell: value_type("cell"),
            property: value_type("property"),
            classmethod: value_type("classmethod"),
            staticmethod: value_type("staticmethod"),
            generator: value_type("generator"),
            coroutine: value_type("coroutine"),
            range: value_type("range"),
            iterator: value_type("iterator"),
            super_: value_type("super"),
        };
        if let HeapData::Class(cls) = heap.get_mut(bool) {
            cls.bases = vec![int];
            cls.mro = vec![bool, int, object];
        }
        types
    }

    /// Every builtin class, for garbage collection roots.
    pub fn all(&self) -> Vec<HeapId> {
        vec![
            self.type_,
            self.object,
            self.none,
            self.not_implemented,
            self.bool,
            self.int,
            self.float,
            self.complex,
            self.str,
            self.bytes,
            self.list,
            self.tuple,
            self.dict,
            self.set,
            self.frozenset,
            self.function,
            self.builtin_function,
            self.method,
            self.module,
            self.host,
            self.cell,
            self.property,
            self.classmethod,
            self.staticmethod,
            self.generator,
            self.coroutine,
            self.range,
            self.iterator,
            self.super_,
        ]
    }
}

/// Every builtin function published in the `builtins` module.
///
/// Uses strum derives; the lowercase variant name is the guest-visible name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum BuiltinsFunctions {
    Abs,
    Callable,
    Delattr,
    Enumerate,
    Getattr,
    Hasattr,
    Hash,
    Id,
    Isinstance,
    Issubclass,
    Iter,
    Len,
    Max,
    Min,
    Next,
    Print,
    Repr,
    Setattr,
    Sorted,
    Sum,
    Zip,
}

impl BuiltinsFunctions {
    fn arity(self) -> Arity {
        match self {
            Self::Abs
            | Self::Callable
            | Self::Hash
            | Self::Id
            | Self::Iter
            | Self::Len
            | Self::Repr
            | Self::Sorted => Arity::exact(1),
            Self::Hasattr | Self::Delattr | Self::Isinstance | Self::Issubclass => Arity::exact(2),
            Self::Getattr => Arity::range(2, 3),
            Self::Setattr => Arity::exact(3),
            Self::Next | Self::Enumerate | Self::Sum => Arity::range(1, 2),
            Self::Max | Self::Min => Arity::at_least(1),
            Self::Print | Self::Zip => Arity::ANY,
        }
    }

    fn handler(self) -> NativeFn {
        match self {
            Self::Abs => abs::builtin_abs,
            Self::Callable => callable::builtin_callable,
            Self::Delattr => getattr::builtin_delattr,
            Self::Enumerate => enumerate::builtin_enumerate,
            Self::Getattr => getattr::builtin_getattr,
            Self::Hasattr => getattr::builtin_hasattr,
            Self::Hash => hash::builtin_hash,
            Self::Id => id::builtin_id,
            Self::Isinstance => isinstance::builtin_isinstance,
            Self::Issubclass => isinstance::builtin_issubclass,
            Self::Iter => iter_next::builtin_iter,
            Self::Len => len::builtin_len,
            Self::Max => min_max::builtin_max,
            Self::Min => min_max::builtin_min,
            Self::Next => iter_next::builtin_next,
            Self::Print => print::builtin_print,
            Self::Repr => repr::builtin_repr,
            Self::Setattr => getattr::builtin_setattr,
            Self::Sorted => sorted::builtin_sorted,
            Self::Sum => sum::builtin_sum,
            Self::Zip => enumerate::builtin_zip,
        }
    }
}

/// Fills the builtin class namespaces, creates the exception hierarchy and publishes
/// every builtin name.
pub(crate) fn init(vm: &mut Vm) -> RunResult<()> {
    object_type::register(vm);
    conversions::register(vm);
    descriptors::register(vm);
    methods::register(vm);
    exceptions::register(vm)?;

    let t = vm.types.clone();
    for (name, id) in [
        ("object", t.object),
        ("type", t.type_),
        ("bool", t.bool),
        ("int", t.int),
        ("float", t.float),
        ("complex", t.complex),
        ("str", t.str),
        ("bytes", t.bytes),
        ("list", t.list),
        ("tuple", t.tuple),
        ("dict", t.dict),
        ("set", t.set),
        ("frozenset", t.frozenset),
        ("range", t.range),
        ("property", t.property),
        ("classmethod", t.classmethod),
        ("staticmethod", t.staticmethod),
        ("super", t.super_),
    ] {
        vm.set_builtin(name, Value::Ref(id));
    }
    for function in BuiltinsFunctions::iter() {
        let name: &'static str = function.into();
        let value = vm.new_native_function(name, function.arity(), function.handler());
        vm.set_builtin(name, value);
    }
    vm.set_builtin("None", Value::None);
    vm.set_builtin("NotImplemented", Value::NotImplemented);
    vm.set_builtin("True", Value::Bool(true));
    vm.set_builtin("False", Value::Bool(false));
    let exc_classes: Vec<_> = vm.exc_classes.iter().map(|(t, id)| (*t, *id)).collect();
    for (exc_type, id) in exc_classes {
        let name: &'static str = exc_type.into();
        vm.set_builtin(name, Value::Ref(id));
    }
    tracing::debug!(target: "pyrite::vm", builtins = BuiltinsFunctions::iter().count(), "builtins registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_is_its_own_metaclass() {
        let mut heap = Heap::new();
        let types = BuiltinTypes::bootstrap(&mut heap);
        let HeapData::Class(type_cls) = heap.get(types.type_) else {
            panic!("type is not a class");
        };
        assert_eq!(type_cls.metaclass, types.type_);
        assert_eq!(type_cls.mro, vec![types.type_, types.object]);
        let HeapData::Class(bool_cls) = heap.get(types.bool) else {
            panic!("bool is not a class");
        };
        assert_eq!(bool_cls.mro, vec![types.bool, types.int, types.object]);
    }

    #[test]
    fn function_names_are_lowercase() {
        assert_eq!(BuiltinsFunctions::Isinstance.to_string(), "isinstance");
        let name: &'static str = BuiltinsFunctions::Getattr.into();
        assert_eq!(name, "getattr");
    }
}
