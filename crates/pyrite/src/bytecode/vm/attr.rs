//! Attribute resolution.
//!
//! Lookup order for instances follows CPython's `object.__getattribute__`:
//!
//! 1. data descriptors found on the class MRO (`property`, or objects whose class
//!    defines `__set__`/`__delete__`);
//! 2. the instance's own attributes;
//! 3. other class attributes, bound as methods (`classmethod` binds the class,
//!    `staticmethod` unwraps, objects with `__get__` are invoked);
//! 4. `__getattr__`.
//!
//! Classes resolve through their own MRO first and their metaclass's MRO second.
//! Dunder dispatch never consults instance storage.

use super::Vm;
use crate::{
    args::ArgValues,
    exception::{ExcType, RunError, RunResult, SimpleException},
    heap::{HeapData, HeapId},
    types::{
        class::ClassObject,
        dict::HashKey,
        function::{BoundMethod, SuperProxy},
        generator::Flavor,
    },
    value::Value,
};

impl Vm {
    /// The class of a value.
    pub(crate) fn type_of(&self, value: Value) -> HeapId {
        let t = &self.types;
        match value {
            Value::Undefined | Value::None => t.none,
            Value::NotImplemented => t.not_implemented,
            Value::Bool(_) => t.bool,
            Value::Int(_) => t.int,
            Value::Float(_) => t.float,
            Value::Complex(_) => t.complex,
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(_) => t.str,
                HeapData::Bytes(_) => t.bytes,
                HeapData::List(_) => t.list,
                HeapData::Tuple(_) => t.tuple,
                HeapData::Dict(_) => t.dict,
                HeapData::Set(_) => t.set,
                HeapData::FrozenSet(_) => t.frozenset,
                HeapData::Function(_) => t.function,
                HeapData::NativeFunction(_) => t.builtin_function,
                HeapData::BoundMethod(_) => t.method,
                HeapData::Class(cls) => cls.metaclass,
                HeapData::Instance(inst) => inst.class_id,
                HeapData::Module(_) => t.module,
                HeapData::HostExtension(_) => t.host,
                HeapData::Cell(_) => t.cell,
                HeapData::Property(_) => t.property,
                HeapData::ClassMethod(_) => t.classmethod,
                HeapData::StaticMethod(_) => t.staticmethod,
                HeapData::Generator(g) => match g.flavor {
                    Flavor::Generator => t.generator,
                    Flavor::Coroutine => t.coroutine,
                },
                HeapData::Range(_) => t.range,
                HeapData::Iterator(_) => t.iterator,
                HeapData::Super(_) => t.super_,
            },
        }
    }

    /// `type(value).__name__`.
    #[must_use]
    pub fn type_name(&self, value: Value) -> String {
        if let Value::Ref(id) = value
            && let HeapData::HostExtension(data) = self.heap.get(id)
        {
            return data.type_name().to_owned();
        }
        self.class_display_name(self.type_of(value))
    }

    pub(crate) fn class_obj(&self, id: HeapId) -> Option<&ClassObject> {
        match self.heap.get(id) {
            HeapData::Class(cls) => Some(cls),
            _ => None,
        }
    }

    pub(crate) fn mro_of(&self, id: HeapId) -> Vec<HeapId> {
        self.class_obj(id).map(|cls| cls.mro.clone()).unwrap_or_default()
    }

    /// Finds `name` in the namespaces along `cls`'s MRO, returning the value and the
    /// class that defines it.
    pub(crate) fn lookup_mro(&self, cls: HeapId, name: &str) -> Option<(Value, HeapId)> {
        let mro = &self.class_obj(cls)?.mro;
        mro.iter().find_map(|&klass| {
            self.class_obj(klass)
                .and_then(|c| c.namespace.get(name))
                .map(|v| (*v, klass))
        })
    }

    /// Like [`lookup_mro`](Self::lookup_mro), but skips entries up to and including `after`.
    fn lookup_mro_after(&self, cls: HeapId, after: HeapId, name: &str) -> Option<(Value, HeapId)> {
        let mro = &self.class_obj(cls)?.mro;
        let start = mro.iter().position(|&c| c == after).map_or(mro.len(), |i| i + 1);
        mro[start..].iter().find_map(|&klass| {
            self.class_obj(klass)
                .and_then(|c| c.namespace.get(name))
                .map(|v| (*v, klass))
        })
    }

    /// Whether the value's class (through the metaclass, for classes) is extended by guest code,
    /// so operators must go through dunder dispatch.
    pub(crate) fn uses_dunders(&self, value: Value) -> bool {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Instance(_) => true,
                HeapData::Class(cls) => cls.metaclass != self.types.type_,
                _ => false,
            },
            _ => false,
        }
    }

    /// Whether an object defines `__get__`/`__set__`/`__delete__` on its class.
    fn class_defines(&self, value: Value, name: &str) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Instance(_)))
            && self.lookup_mro(self.type_of(value), name).is_some()
    }

    fn is_data_descriptor(&self, attr: Value) -> bool {
        match attr {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Property(_) => true,
                HeapData::Instance(_) => self.class_defines(attr, "__set__") || self.class_defines(attr, "__delete__"),
                _ => false,
            },
            _ => false,
        }
    }

    /// Invokes a data descriptor's getter for `instance`.
    fn descriptor_get(&mut self, attr: Value, instance: Value, owner: HeapId, name: &str) -> RunResult<Value> {
        let Value::Ref(id) = attr else { return Ok(attr) };
        match self.heap.get(id) {
            HeapData::Property(prop) => {
                let fget = prop.fget;
                if fget.is_none() {
                    let type_name = self.type_name(instance);
                    return Err(missing_accessor(name, &type_name, "getter"));
                }
                self.call(fget, ArgValues::one(instance))
            }
            HeapData::Instance(_) => self.call_descriptor_get(attr, instance, Value::Ref(owner)),
            _ => Ok(attr),
        }
    }

    fn call_descriptor_get(&mut self, attr: Value, instance: Value, owner: Value) -> RunResult<Value> {
        let get = self.required_special(attr, "__get__")?;
        self.call(get, ArgValues::two(instance, owner))
    }

    /// Binds a class attribute found for an instance access.
    pub(crate) fn bind(&mut self, attr: Value, instance: Value, owner: HeapId) -> RunResult<Value> {
        let Value::Ref(id) = attr else { return Ok(attr) };
        match self.heap.get(id) {
            HeapData::Function(_) | HeapData::NativeFunction(_) => self.new_bound_method(instance, attr),
            HeapData::ClassMethod(func) => {
                let func = *func;
                let receiver = if self.is_class(instance) { instance } else { Value::Ref(owner) };
                self.new_bound_method(receiver, func)
            }
            HeapData::StaticMethod(func) => Ok(*func),
            HeapData::Property(_) => self.descriptor_get(attr, instance, owner, "?"),
            HeapData::Instance(_) if self.class_defines(attr, "__get__") => {
                self.call_descriptor_get(attr, instance, Value::Ref(owner))
            }
            _ => Ok(attr),
        }
    }

    /// Binds a class attribute found for an access on the class itself.
    pub(crate) fn bind_for_class(&mut self, attr: Value, cls: HeapId) -> RunResult<Value> {
        let Value::Ref(id) = attr else { return Ok(attr) };
        match self.heap.get(id) {
            HeapData::ClassMethod(func) => {
                let func = *func;
                self.new_bound_method(Value::Ref(cls), func)
            }
            HeapData::StaticMethod(func) => Ok(*func),
            HeapData::Instance(_) if self.class_defines(attr, "__get__") => {
                self.call_descriptor_get(attr, Value::None, Value::Ref(cls))
            }
            _ => Ok(attr),
        }
    }

    pub(crate) fn new_bound_method(&mut self, receiver: Value, function: Value) -> RunResult<Value> {
        Ok(Value::Ref(self.alloc(HeapData::BoundMethod(BoundMethod { receiver, function }))?))
    }

    /// `getattr(obj, name)`.
    pub fn get_attr(&mut self, obj: Value, name: &str) -> RunResult<Value> {
        let Value::Ref(id) = obj else {
            return self.builtin_get_attr(obj, name);
        };
        match self.heap.get(id) {
            HeapData::Instance(inst) => {
                let cls = inst.class_id;
                self.instance_get_attr(obj, id, cls, name)
            }
            HeapData::Class(_) => self.class_get_attr(id, name),
            HeapData::Module(module) => match module.attrs.get(name) {
                Some(v) => Ok(*v),
                None => {
                    let module_name = module.name.clone();
                    Err(module_attr_error(&module_name, name))
                }
            },
            HeapData::Function(func) => match name {
                "__name__" | "__qualname__" => {
                    let fname = func.name().to_owned();
                    self.new_str(fname)
                }
                "__isabstractmethod__" => Ok(Value::Bool(func.is_abstract)),
                "__defaults__" => {
                    let defaults = func.defaults.clone();
                    if defaults.is_empty() { Ok(Value::None) } else { self.new_tuple(defaults) }
                }
                _ => match func.attrs.get(name) {
                    Some(v) => Ok(*v),
                    None => self.builtin_get_attr(obj, name),
                },
            },
            HeapData::NativeFunction(native) if name == "__name__" || name == "__qualname__" => {
                let fname = native.name.clone();
                self.new_str(fname)
            }
            HeapData::BoundMethod(bm) => {
                let bm = *bm;
                match name {
                    "__self__" => Ok(bm.receiver),
                    "__func__" => Ok(bm.function),
                    _ => self.get_attr(bm.function, name),
                }
            }
            HeapData::Property(prop) => {
                let prop = *prop;
                match name {
                    "fget" => Ok(prop.fget),
                    "fset" => Ok(prop.fset),
                    "fdel" => Ok(prop.fdel),
                    "__isabstractmethod__" => Ok(Value::Bool(self.is_abstract_value(prop.fget))),
                    _ => self.builtin_get_attr(obj, name),
                }
            }
            HeapData::ClassMethod(func) | HeapData::StaticMethod(func) => {
                let func = *func;
                match name {
                    "__func__" => Ok(func),
                    "__isabstractmethod__" => Ok(Value::Bool(self.is_abstract_value(func))),
                    _ => self.builtin_get_attr(obj, name),
                }
            }
            HeapData::Super(proxy) => {
                let proxy = *proxy;
                self.super_get_attr(proxy, name)
            }
            HeapData::Generator(g) if name == "__name__" => {
                let gname = g.name.clone();
                self.new_str(gname)
            }
            HeapData::Range(r) => {
                let r = *r;
                match name {
                    "start" => Ok(Value::Int(r.start)),
                    "stop" => Ok(Value::Int(r.stop)),
                    "step" => Ok(Value::Int(r.step)),
                    _ => self.builtin_get_attr(obj, name),
                }
            }
            _ => self.builtin_get_attr(obj, name),
        }
    }

    /// Attribute lookup for values without instance storage: only the type's namespace.
    fn builtin_get_attr(&mut self, obj: Value, name: &str) -> RunResult<Value> {
        let cls = self.type_of(obj);
        if name == "__class__" {
            return Ok(Value::Ref(cls));
        }
        if let Value::Complex(c) = obj {
            match name {
                "real" => return Ok(Value::Float(c.re)),
                "imag" => return Ok(Value::Float(c.im)),
                _ => {}
            }
        }
        match self.lookup_mro(cls, name) {
            Some((attr, _)) => self.bind(attr, obj, cls),
            None => Err(ExcType::attribute_error(self.type_name(obj), name)),
        }
    }

    fn instance_get_attr(&mut self, obj: Value, id: HeapId, cls: HeapId, name: &str) -> RunResult<Value> {
        match name {
            "__class__" => return Ok(Value::Ref(cls)),
            "__dict__" => return self.instance_dict(id),
            _ => {}
        }
        let class_attr = self.lookup_mro(cls, name);
        if let Some((attr, _)) = class_attr
            && self.is_data_descriptor(attr)
        {
            return self.descriptor_get(attr, obj, cls, name);
        }
        if let HeapData::Instance(inst) = self.heap.get(id)
            && let Some(v) = inst.attrs.get(name)
        {
            return Ok(*v);
        }
        if let Some((attr, _)) = class_attr {
            return self.bind(attr, obj, cls);
        }
        if let Some((getattr, _)) = self.lookup_mro(cls, "__getattr__") {
            let method = self.bind(getattr, obj, cls)?;
            let name_value = self.new_str(name)?;
            return self.call(method, ArgValues::one(name_value));
        }
        Err(ExcType::attribute_error(self.class_display_name(cls), name))
    }

    fn instance_dict(&mut self, id: HeapId) -> RunResult<Value> {
        let attrs: Vec<(String, Value)> = match self.heap.get(id) {
            HeapData::Instance(inst) => inst.attrs.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            _ => Vec::new(),
        };
        self.str_keyed_dict(attrs)
    }

    pub(crate) fn str_keyed_dict(&mut self, entries: Vec<(String, Value)>) -> RunResult<Value> {
        let mut pairs = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            pairs.push((self.new_str(k)?, v));
        }
        self.new_dict(pairs)
    }

    fn class_get_attr(&mut self, cls: HeapId, name: &str) -> RunResult<Value> {
        if let Some(value) = self.class_special_attr(cls, name)? {
            return Ok(value);
        }
        let Some(class) = self.class_obj(cls) else {
            return Err(not_a_class());
        };
        let meta = class.metaclass;
        let meta_attr = self.lookup_mro(meta, name);
        if let Some((attr, _)) = meta_attr
            && self.is_data_descriptor(attr)
        {
            return self.descriptor_get(attr, Value::Ref(cls), meta, name);
        }
        if let Some((attr, _)) = self.lookup_mro(cls, name) {
            return self.bind_for_class(attr, cls);
        }
        if let Some((attr, _)) = meta_attr {
            return self.bind(attr, Value::Ref(cls), meta);
        }
        if let Some((getattr, _)) = self.lookup_mro(meta, "__getattr__") {
            let method = self.bind(getattr, Value::Ref(cls), meta)?;
            let name_value = self.new_str(name)?;
            return self.call(method, ArgValues::one(name_value));
        }
        Err(ExcType::class_attribute_error(self.class_display_name(cls), name))
    }

    fn class_special_attr(&mut self, cls: HeapId, name: &str) -> RunResult<Option<Value>> {
        let Some(class) = self.class_obj(cls) else { return Ok(None) };
        let value = match name {
            "__name__" | "__qualname__" => {
                let class_name = class.name.clone();
                self.new_str(class_name)?
            }
            "__mro__" => {
                let mro = class.mro.iter().map(|id| Value::Ref(*id)).collect();
                self.new_tuple(mro)?
            }
            "__bases__" => {
                let bases = class.bases.iter().map(|id| Value::Ref(*id)).collect();
                self.new_tuple(bases)?
            }
            "__class__" => Value::Ref(class.metaclass),
            "__dict__" => {
                let entries: Vec<(String, Value)> = class.namespace.iter().map(|(k, v)| (k.clone(), *v)).collect();
                self.str_keyed_dict(entries)?
            }
            "__abstractmethods__" => {
                let names = class.abstract_methods.clone();
                let mut items = Vec::with_capacity(names.len());
                for n in names {
                    items.push(self.new_str(n)?);
                }
                self.new_frozenset(items)?
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn super_get_attr(&mut self, proxy: SuperProxy, name: &str) -> RunResult<Value> {
        if name == "__class__" {
            return Ok(Value::Ref(self.types.super_));
        }
        // a class not derived from `this_class` is an instance of a metaclass
        let obj_is_class = match proxy.object {
            Value::Ref(id) => self.is_class(proxy.object) && self.mro_of(id).contains(&proxy.this_class),
            _ => false,
        };
        let start_type = match proxy.object {
            Value::Ref(id) if obj_is_class => id,
            other => self.type_of(other),
        };
        let Some((attr, _)) = self.lookup_mro_after(start_type, proxy.this_class, name) else {
            return Err(ExcType::attribute_error("super", name));
        };
        if obj_is_class {
            if let Value::Ref(id) = attr
                && matches!(self.heap.get(id), HeapData::ClassMethod(_))
            {
                return self.bind(attr, proxy.object, start_type);
            }
            return self.bind_for_class(attr, start_type);
        }
        if self.is_data_descriptor(attr) {
            return self.descriptor_get(attr, proxy.object, start_type, name);
        }
        self.bind(attr, proxy.object, start_type)
    }

    /// `getattr(obj, name, None)`-style lookup: `None` when the attribute is missing.
    pub fn get_attr_opt(&mut self, obj: Value, name: &str) -> RunResult<Option<Value>> {
        match self.get_attr(obj, name) {
            Ok(v) => Ok(Some(v)),
            Err(err) if self.error_matches(&err, ExcType::AttributeError) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn has_attr(&mut self, obj: Value, name: &str) -> RunResult<bool> {
        Ok(self.get_attr_opt(obj, name)?.is_some())
    }

    /// `setattr(obj, name, value)`, honoring `__setattr__` overrides.
    pub fn set_attr(&mut self, obj: Value, name: &str, value: Value) -> RunResult<()> {
        let Value::Ref(id) = obj else {
            return Err(read_only_error(&self.type_name(obj), name));
        };
        match self.heap.get(id) {
            HeapData::Instance(inst) => {
                let cls = inst.class_id;
                if let Some((setattr, owner)) = self.lookup_mro(cls, "__setattr__")
                    && owner != self.types.object
                {
                    let method = self.bind(setattr, obj, cls)?;
                    let name_value = self.new_str(name)?;
                    self.call(method, ArgValues::two(name_value, value))?;
                    return Ok(());
                }
                self.generic_set_attr(obj, name, value)
            }
            HeapData::Class(cls) => {
                let meta = cls.metaclass;
                if let Some((setattr, owner)) = self.lookup_mro(meta, "__setattr__")
                    && owner != self.types.type_
                    && owner != self.types.object
                {
                    let method = self.bind(setattr, obj, meta)?;
                    let name_value = self.new_str(name)?;
                    self.call(method, ArgValues::two(name_value, value))?;
                    return Ok(());
                }
                self.class_set_attr(id, name, value)
            }
            HeapData::Module(_) => {
                if let HeapData::Module(module) = self.heap.get_mut(id) {
                    module.attrs.insert(name.to_owned(), value);
                }
                Ok(())
            }
            HeapData::Function(_) => {
                if let HeapData::Function(func) = self.heap.get_mut(id) {
                    func.attrs.insert(name.to_owned(), value);
                }
                Ok(())
            }
            _ => Err(read_only_error(&self.type_name(obj), name)),
        }
    }

    /// Stores directly into a class namespace, bypassing metaclass hooks.
    pub(crate) fn class_set_attr(&mut self, cls: HeapId, name: &str, value: Value) -> RunResult<()> {
        if let Some((attr, _)) = self.lookup_mro(self.type_of(Value::Ref(cls)), name)
            && let Value::Ref(attr_id) = attr
            && let HeapData::Property(prop) = self.heap.get(attr_id)
        {
            let fset = prop.fset;
            if !fset.is_none() {
                self.call(fset, ArgValues::two(Value::Ref(cls), value))?;
                return Ok(());
            }
        }
        match self.heap.get_mut(cls) {
            HeapData::Class(class) => {
                class.namespace.insert(name.to_owned(), value);
                Ok(())
            }
            _ => Err(not_a_class()),
        }
    }

    /// `object.__setattr__`: descriptors, then instance storage.
    pub(crate) fn generic_set_attr(&mut self, obj: Value, name: &str, value: Value) -> RunResult<()> {
        let Value::Ref(id) = obj else {
            return Err(read_only_error(&self.type_name(obj), name));
        };
        let cls = self.type_of(obj);
        if let Some((attr, _)) = self.lookup_mro(cls, name)
            && let Value::Ref(attr_id) = attr
        {
            match self.heap.get(attr_id) {
                HeapData::Property(prop) => {
                    let fset = prop.fset;
                    if fset.is_none() {
                        return Err(missing_accessor(name, &self.type_name(obj), "setter"));
                    }
                    self.call(fset, ArgValues::two(obj, value))?;
                    return Ok(());
                }
                HeapData::Instance(_) if self.class_defines(attr, "__set__") => {
                    let set = self.required_special(attr, "__set__")?;
                    self.call(set, ArgValues::two(obj, value))?;
                    return Ok(());
                }
                _ => {}
            }
        }
        match self.heap.get_mut(id) {
            HeapData::Instance(inst) => {
                inst.attrs.insert(name.to_owned(), value);
                Ok(())
            }
            HeapData::Class(_) => self.class_set_attr(id, name, value),
            _ => Err(read_only_error(&self.type_name(obj), name)),
        }
    }

    /// `delattr(obj, name)`, honoring `__delattr__` overrides.
    pub fn del_attr(&mut self, obj: Value, name: &str) -> RunResult<()> {
        let Value::Ref(id) = obj else {
            return Err(ExcType::attribute_error(self.type_name(obj), name));
        };
        match self.heap.get(id) {
            HeapData::Instance(inst) => {
                let cls = inst.class_id;
                if let Some((delattr, owner)) = self.lookup_mro(cls, "__delattr__")
                    && owner != self.types.object
                {
                    let method = self.bind(delattr, obj, cls)?;
                    let name_value = self.new_str(name)?;
                    self.call(method, ArgValues::one(name_value))?;
                    return Ok(());
                }
                self.generic_del_attr(obj, name)
            }
            HeapData::Class(_) => {
                let removed = match self.heap.get_mut(id) {
                    HeapData::Class(class) => class.namespace.shift_remove(name).is_some(),
                    _ => false,
                };
                if removed {
                    Ok(())
                } else {
                    Err(ExcType::class_attribute_error(self.class_display_name(id), name))
                }
            }
            HeapData::Module(_) | HeapData::Function(_) => {
                let removed = match self.heap.get_mut(id) {
                    HeapData::Module(m) => m.attrs.shift_remove(name).is_some(),
                    HeapData::Function(f) => f.attrs.shift_remove(name).is_some(),
                    _ => false,
                };
                if removed {
                    Ok(())
                } else {
                    Err(ExcType::attribute_error(self.type_name(obj), name))
                }
            }
            _ => Err(ExcType::attribute_error(self.type_name(obj), name)),
        }
    }

    /// `object.__delattr__`.
    pub(crate) fn generic_del_attr(&mut self, obj: Value, name: &str) -> RunResult<()> {
        let cls = self.type_of(obj);
        if let Some((attr, _)) = self.lookup_mro(cls, name)
            && let Value::Ref(attr_id) = attr
        {
            match self.heap.get(attr_id) {
                HeapData::Property(prop) => {
                    let fdel = prop.fdel;
                    if fdel.is_none() {
                        return Err(missing_accessor(name, &self.type_name(obj), "deleter"));
                    }
                    self.call(fdel, ArgValues::one(obj))?;
                    return Ok(());
                }
                HeapData::Instance(_) if self.class_defines(attr, "__delete__") => {
                    let delete = self.required_special(attr, "__delete__")?;
                    self.call(delete, ArgValues::one(obj))?;
                    return Ok(());
                }
                _ => {}
            }
        }
        let removed = match obj {
            Value::Ref(id) => match self.heap.get_mut(id) {
                HeapData::Instance(inst) => inst.attrs.shift_remove(name).is_some(),
                _ => false,
            },
            _ => false,
        };
        if removed {
            Ok(())
        } else {
            Err(ExcType::attribute_error(self.class_display_name(cls), name))
        }
    }

    /// Calls the dunder `name` found on the value's class MRO.
    ///
    /// Returns `Ok(None)` when the class does not define it or it returned
    /// `NotImplemented`, telling the caller to fall back.
    pub fn dispatch_dunder(&mut self, value: Value, name: &str, args: &[Value]) -> RunResult<Option<Value>> {
        let cls = self.type_of(value);
        let Some((attr, _)) = self.lookup_mro(cls, name) else {
            return Ok(None);
        };
        let method = self.bind(attr, value, cls)?;
        let result = self.call(method, ArgValues::positional(args.iter().copied()))?;
        Ok((!result.is_not_implemented()).then_some(result))
    }

    /// A special method from the value's class MRO, bound to the value.
    ///
    /// Instance storage is never consulted, unlike [`get_attr`](Self::get_attr).
    pub(crate) fn special_method(&mut self, value: Value, name: &str) -> RunResult<Option<Value>> {
        let cls = self.type_of(value);
        match self.lookup_mro(cls, name) {
            Some((attr, _)) => self.bind(attr, value, cls).map(Some),
            None => Ok(None),
        }
    }

    fn required_special(&mut self, value: Value, name: &str) -> RunResult<Value> {
        match self.special_method(value, name)? {
            Some(method) => Ok(method),
            None => Err(ExcType::attribute_error(self.type_name(value), name)),
        }
    }

    /// `obj.name(*args)`.
    pub fn call_method(&mut self, obj: Value, name: &str, args: ArgValues) -> RunResult<Value> {
        let method = self.get_attr(obj, name)?;
        self.call(method, args)
    }

    /// Looks a name up in a dict namespace, for `LoadName` and `__prepare__` mappings.
    pub(crate) fn namespace_get(&mut self, namespace: HeapId, name: &str) -> RunResult<Option<Value>> {
        if let HeapData::Dict(dict) = self.heap.get(namespace) {
            return Ok(dict.get(&HashKey::Str(name.to_owned())));
        }
        let key = self.new_str(name)?;
        match self.get_item(Value::Ref(namespace), key) {
            Ok(v) => Ok(Some(v)),
            Err(err) if self.error_matches(&err, ExcType::KeyError) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn module_attr_error(module: &str, name: &str) -> RunError {
    SimpleException::new_msg(
        ExcType::AttributeError,
        format!("module '{module}' has no attribute '{name}'"),
    )
    .into()
}

fn read_only_error(type_name: &str, name: &str) -> RunError {
    SimpleException::new_msg(
        ExcType::AttributeError,
        format!("'{type_name}' object has no attribute '{name}' and no __dict__ for setting new attributes"),
    )
    .into()
}

fn missing_accessor(name: &str, type_name: &str, accessor: &str) -> RunError {
    SimpleException::new_msg(
        ExcType::AttributeError,
        format!("property '{name}' of '{type_name}' object has no {accessor}"),
    )
    .into()
}

fn not_a_class() -> RunError {
    RunError::internal("class slot does not hold a class")
}
