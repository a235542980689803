//! Class creation, metaclasses and subclass relationships.
//!
//! A `class` statement runs in this order:
//!
//! 1. the most derived metaclass among the explicit one and the bases' metaclasses is
//!    selected (a conflict is a `TypeError`);
//! 2. `__prepare__` produces the namespace mapping;
//! 3. the body runs with that mapping as its local namespace;
//! 4. the metaclass is called with `(name, bases, namespace, **kwargs)`.
//!
//! `type.__new__` ends in [`Vm::create_class_object`], which computes the C3 MRO,
//! collects abstract methods, calls `__set_name__` on descriptors and finally the
//! parent's `__init_subclass__`.

use std::collections::BTreeSet;

use super::Vm;
use crate::{
    args::ArgValues,
    exception::{ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    types::{
        AttrMap,
        class::{ClassObject, InstanceLayout, compute_c3_mro},
    },
    value::Value,
};

impl Vm {
    /// Executes a `class` statement.
    pub(crate) fn build_class(
        &mut self,
        body: Value,
        name: Value,
        bases: &[Value],
        metaclass: Option<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        let Some(class_name) = self.str_value(name).map(str::to_owned) else {
            return Err(RunError::internal("class name is not a string"));
        };
        let mut base_ids = Vec::with_capacity(bases.len());
        for &base in bases {
            match base {
                Value::Ref(id) if self.is_class(base) => base_ids.push(id),
                _ => {
                    return Err(ExcType::type_error(format!(
                        "bases must be types, not '{}'",
                        self.type_name(base)
                    )));
                }
            }
        }

        let meta = match metaclass {
            Some(explicit) if !self.is_class(explicit) => explicit,
            Some(Value::Ref(explicit)) => Value::Ref(self.select_metaclass(explicit, &base_ids)?),
            _ => Value::Ref(self.select_metaclass(self.types.type_, &base_ids)?),
        };
        let bases_tuple = self.new_tuple(bases.to_vec())?;

        let namespace = self.prepare_namespace(meta, name, bases_tuple, &kwargs)?;
        let Value::Ref(body_id) = body else {
            return Err(RunError::internal("class body is not a function"));
        };
        let mut frame = self.bind_arguments(body_id, ArgValues::empty())?;
        frame.namespace = namespace.ref_id();
        let module_name = match self.heap.get(frame.globals) {
            HeapData::Module(module) => module.name.clone(),
            _ => String::new(),
        };
        let module_value = self.new_str(module_name)?;
        let qualname_key = self.new_str("__qualname__")?;
        let module_key = self.new_str("__module__")?;
        self.set_item(namespace, module_key, module_value)?;
        self.set_item(namespace, qualname_key, name)?;
        self.run_frame(&mut frame, None)?;

        self.call(meta, ArgValues::with_kwargs([name, bases_tuple, namespace], kwargs))
    }

    fn prepare_namespace(
        &mut self,
        meta: Value,
        name: Value,
        bases: Value,
        kwargs: &[(String, Value)],
    ) -> RunResult<Value> {
        if let Value::Ref(meta_id) = meta
            && self.is_class(meta)
            && let Some((prepare, owner)) = self.lookup_mro(meta_id, "__prepare__")
            && owner != self.types.type_
        {
            let prepare = self.bind_for_class(prepare, meta_id)?;
            let namespace = self.call(prepare, ArgValues::with_kwargs([name, bases], kwargs.to_vec()))?;
            if !matches!(namespace, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Dict(_))) {
                return Err(ExcType::type_error(format!(
                    "__prepare__() must return a dict, not {}",
                    self.type_name(namespace)
                )));
            }
            return Ok(namespace);
        }
        self.new_dict(Vec::new())
    }

    /// The most derived of `explicit` and the metaclasses of `bases`.
    pub(crate) fn select_metaclass(&self, explicit: HeapId, bases: &[HeapId]) -> RunResult<HeapId> {
        let mut winner = explicit;
        for &base in bases {
            let Some(base_meta) = self.class_obj(base).map(|c| c.metaclass) else {
                continue;
            };
            if self.mro_of(winner).contains(&base_meta) {
                continue;
            }
            if self.mro_of(base_meta).contains(&winner) {
                winner = base_meta;
                continue;
            }
            return Err(ExcType::type_error(
                "metaclass conflict: the metaclass of a derived class must be a (non-strict) subclass of the metaclasses of all its bases",
            ));
        }
        Ok(winner)
    }

    /// Converts a class namespace dict into an attribute map.
    pub(crate) fn namespace_to_attrs(&self, namespace: Value) -> RunResult<AttrMap> {
        let Some(items) = self.dict_items(namespace) else {
            return Err(ExcType::type_error(format!(
                "type.__new__() argument 3 must be dict, not {}",
                self.type_name(namespace)
            )));
        };
        let mut attrs = AttrMap::default();
        for (k, v) in items {
            let key = self
                .str_value(k)
                .ok_or_else(|| ExcType::type_error("class namespace keys must be strings"))?;
            attrs.insert(key.to_owned(), v);
        }
        Ok(attrs)
    }

    /// `type.__new__(meta, name, bases, namespace, **kwargs)`.
    pub(crate) fn create_class_object(
        &mut self,
        meta: HeapId,
        name: &str,
        bases: &[HeapId],
        mut namespace: AttrMap,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<HeapId> {
        let meta = self.select_metaclass(meta, bases)?;
        let bases = if bases.is_empty() { vec![self.types.object] } else { bases.to_vec() };

        let mut layout = InstanceLayout::Object;
        for &base in &bases {
            match self.class_obj(base).map(|c| c.layout) {
                Some(InstanceLayout::Builtin) => {
                    return Err(ExcType::type_error(format!(
                        "type '{}' is not an acceptable base type",
                        self.class_display_name(base)
                    )));
                }
                Some(InstanceLayout::Class) => layout = InstanceLayout::Class,
                _ => {}
            }
        }

        for special in ["__init_subclass__", "__class_getitem__"] {
            if let Some(value) = namespace.get(special).copied()
                && self.is_plain_function(value)
            {
                let wrapped = Value::Ref(self.alloc(HeapData::ClassMethod(value))?);
                namespace.insert(special.to_owned(), wrapped);
            }
        }
        if let Some(value) = namespace.get("__new__").copied()
            && self.is_plain_function(value)
        {
            let wrapped = Value::Ref(self.alloc(HeapData::StaticMethod(value))?);
            namespace.insert("__new__".to_owned(), wrapped);
        }

        let mut class = ClassObject::new(name, meta, layout);
        class.bases.clone_from(&bases);
        class.namespace = namespace;
        let id = self.alloc(HeapData::Class(class))?;

        let mro = self.compute_mro(id, meta, &bases)?;
        let mro_len = mro.len();
        let owned: Vec<Value> = match self.heap.get_mut(id) {
            HeapData::Class(class) => {
                class.mro = mro;
                class.namespace.values().copied().collect()
            }
            _ => return Err(RunError::internal("class slot does not hold a class")),
        };
        for &base in &bases {
            if let HeapData::Class(base_class) = self.heap.get_mut(base) {
                base_class.subclasses.push(id);
            }
        }
        for value in &owned {
            self.set_function_owner(*value, id);
        }
        self.update_abstract_methods(id);

        self.tracer.on_class_created(name, mro_len);
        tracing::debug!(target: "pyrite::vm", class = name, mro_len, "class created");

        let entries: Vec<(String, Value)> = self
            .class_obj(id)
            .map(|c| c.namespace.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        for (attr_name, value) in entries {
            if matches!(value, Value::Ref(v) if matches!(self.heap.get(v), HeapData::Instance(_)))
                && let Some(set_name) = self.get_attr_opt_on_type(value, "__set_name__")?
            {
                let attr_name = self.new_str(attr_name)?;
                self.call(set_name, ArgValues::two(Value::Ref(id), attr_name))?;
            }
        }

        if let Some((hook, _)) = self.lookup_mro_excluding_first(id, "__init_subclass__") {
            let hook = self.bind_for_class(hook, id)?;
            let hook = match hook {
                Value::Ref(h) if matches!(self.heap.get(h), HeapData::Function(_) | HeapData::NativeFunction(_)) => {
                    self.new_bound_method(Value::Ref(id), hook)?
                }
                other => other,
            };
            self.call(hook, ArgValues::with_kwargs([], kwargs))?;
        } else if let Some((key, _)) = kwargs.first() {
            return Err(ExcType::type_error(format!(
                "{name}.__init_subclass__() takes no keyword argument '{key}'"
            )));
        }
        Ok(id)
    }

    /// C3, or the metaclass's `mro()` override.
    fn compute_mro(&mut self, id: HeapId, meta: HeapId, bases: &[HeapId]) -> RunResult<Vec<HeapId>> {
        let c3 = compute_c3_mro(id, bases, &self.heap)?;
        let Some((custom, owner)) = self.lookup_mro(meta, "mro") else {
            return Ok(c3);
        };
        if owner == self.types.type_ {
            return Ok(c3);
        }
        // the override may consult the default order through super().mro()
        if let HeapData::Class(class) = self.heap.get_mut(id) {
            class.mro.clone_from(&c3);
        }
        let method = self.bind(custom, Value::Ref(id), meta)?;
        let result = self.call(method, ArgValues::empty())?;
        let items = self.collect_iter(result)?;
        items
            .into_iter()
            .map(|item| match item {
                Value::Ref(c) if self.is_class(item) => Ok(c),
                _ => Err(ExcType::type_error(format!(
                    "mro() returned a non-class ('{}')",
                    self.type_name(item)
                ))),
            })
            .collect()
    }

    fn lookup_mro_excluding_first(&self, cls: HeapId, name: &str) -> Option<(Value, HeapId)> {
        let mro = &self.class_obj(cls)?.mro;
        mro.iter().skip(1).find_map(|&klass| {
            self.class_obj(klass)
                .and_then(|c| c.namespace.get(name))
                .map(|v| (*v, klass))
        })
    }

    fn get_attr_opt_on_type(&mut self, value: Value, name: &str) -> RunResult<Option<Value>> {
        let cls = self.type_of(value);
        match self.lookup_mro(cls, name) {
            Some((attr, _)) => Ok(Some(self.bind(attr, value, cls)?)),
            None => Ok(None),
        }
    }

    fn is_plain_function(&self, value: Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.get(id), HeapData::Function(_)))
    }

    /// Records the defining class on functions, looking through method wrappers.
    fn set_function_owner(&mut self, value: Value, owner: HeapId) {
        let Value::Ref(id) = value else { return };
        let inner: Vec<Value> = match self.heap.get_mut(id) {
            HeapData::Function(func) => {
                if func.owner.is_none() {
                    func.owner = Some(owner);
                }
                return;
            }
            HeapData::ClassMethod(f) | HeapData::StaticMethod(f) => vec![*f],
            HeapData::Property(p) => vec![p.fget, p.fset, p.fdel],
            _ => return,
        };
        for value in inner {
            self.set_function_owner(value, owner);
        }
    }

    /// Whether a namespace value is an abstract method (or wraps one).
    pub(crate) fn is_abstract_value(&self, value: Value) -> bool {
        let Value::Ref(id) = value else { return false };
        match self.heap.get(id) {
            HeapData::Function(func) => func.is_abstract,
            HeapData::ClassMethod(f) | HeapData::StaticMethod(f) => self.is_abstract_value(*f),
            HeapData::Property(p) => [p.fget, p.fset, p.fdel].into_iter().any(|f| self.is_abstract_value(f)),
            _ => false,
        }
    }

    /// Recomputes `__abstractmethods__`: abstract names defined here, plus inherited
    /// abstract names the MRO still resolves to an abstract value.
    pub(crate) fn update_abstract_methods(&mut self, cls: HeapId) {
        let Some(class) = self.class_obj(cls) else { return };
        let mut names = BTreeSet::new();
        for (name, value) in &class.namespace {
            if self.is_abstract_value(*value) {
                names.insert(name.clone());
            }
        }
        for &base in &class.bases {
            let Some(base_class) = self.class_obj(base) else { continue };
            for name in &base_class.abstract_methods {
                if self
                    .lookup_mro(cls, name)
                    .is_some_and(|(value, _)| self.is_abstract_value(value))
                {
                    names.insert(name.clone());
                }
            }
        }
        if let HeapData::Class(class) = self.heap.get_mut(cls) {
            class.abstract_methods = names.into_iter().collect();
        }
    }

    // public class API

    /// Creates a class as a `class` statement would, without a body.
    ///
    /// The metaclass defaults to the most derived metaclass of `bases`. Metaclasses
    /// overriding `__new__` receive the namespace as a dict.
    pub fn create_class(
        &mut self,
        name: &str,
        bases: &[Value],
        namespace: AttrMap,
        metaclass: Option<Value>,
    ) -> RunResult<Value> {
        let mut base_ids = Vec::with_capacity(bases.len());
        for &base in bases {
            base_ids.push(self.expect_class(base)?);
        }
        let explicit = match metaclass {
            Some(meta) => self.expect_class(meta)?,
            None => self.types.type_,
        };
        let meta = self.select_metaclass(explicit, &base_ids)?;
        let custom_new = self
            .lookup_mro(meta, "__new__")
            .is_some_and(|(_, owner)| owner != self.types.type_);
        if custom_new {
            let name_value = self.new_str(name)?;
            let bases_tuple = self.new_tuple(bases.to_vec())?;
            let entries = namespace.into_iter().collect();
            let ns = self.str_keyed_dict(entries)?;
            return self.call(Value::Ref(meta), ArgValues::positional([name_value, bases_tuple, ns]));
        }
        Ok(Value::Ref(self.create_class_object(meta, name, &base_ids, namespace, Vec::new())?))
    }

    /// A class's own namespace, in definition order.
    #[must_use]
    pub fn class_namespace(&self, class: Value) -> Option<Vec<(String, Value)>> {
        let id = class.ref_id()?;
        self.class_obj(id)
            .map(|c| c.namespace.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    /// Sets an attribute in a class namespace, bypassing metaclass `__setattr__`.
    pub fn set_class_attr(&mut self, class: Value, name: &str, value: Value) -> RunResult<()> {
        let id = self.expect_class(class)?;
        self.class_set_attr(id, name, value)
    }

    /// The MRO of a class, the class itself first.
    #[must_use]
    pub fn class_mro(&self, class: Value) -> Vec<Value> {
        class
            .ref_id()
            .map(|id| self.mro_of(id).into_iter().map(Value::Ref).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn class_bases(&self, class: Value) -> Vec<Value> {
        class
            .ref_id()
            .and_then(|id| self.class_obj(id))
            .map(|c| c.bases.iter().map(|id| Value::Ref(*id)).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn class_metaclass(&self, class: Value) -> Option<Value> {
        let id = class.ref_id()?;
        self.class_obj(id).map(|c| Value::Ref(c.metaclass))
    }

    /// Sorted names of a class's unimplemented abstract methods.
    #[must_use]
    pub fn abstract_methods(&self, class: Value) -> Vec<String> {
        class
            .ref_id()
            .and_then(|id| self.class_obj(id))
            .map(|c| c.abstract_methods.clone())
            .unwrap_or_default()
    }

    /// Records `subclass` as a virtual subclass of `class`.
    pub fn register_virtual_subclass(&mut self, class: Value, subclass: Value) -> RunResult<()> {
        let class_id = self.expect_class(class)?;
        let sub_id = self.expect_class(subclass)?;
        if self.is_subclass(sub_id, class_id)? {
            return Ok(());
        }
        if self.mro_of(class_id).contains(&sub_id) {
            return Err(ExcType::runtime_error("Refusing to create an inheritance cycle"));
        }
        if let HeapData::Class(class) = self.heap.get_mut(class_id) {
            class.registry.push(sub_id);
        }
        Ok(())
    }

    /// `issubclass(sub, sup)`, honoring `__subclasscheck__` on the metaclass.
    pub fn is_subclass(&mut self, sub: HeapId, sup: HeapId) -> RunResult<bool> {
        if let Some(meta) = self.class_obj(sup).map(|c| c.metaclass)
            && let Some((check, owner)) = self.lookup_mro(meta, "__subclasscheck__")
            && owner != self.types.type_
        {
            let method = self.bind(check, Value::Ref(sup), meta)?;
            let result = self.call(method, ArgValues::one(Value::Ref(sub)))?;
            return self.truthy(result);
        }
        self.default_subclass_check(sub, sup)
    }

    /// Subclass check used by `type` and `ABCMeta`: `__subclasshook__`, then the real
    /// MRO, then registered virtual subclasses, then the same check against each real
    /// subclass.
    pub(crate) fn default_subclass_check(&mut self, sub: HeapId, sup: HeapId) -> RunResult<bool> {
        if let Some((hook, owner)) = self.lookup_mro(sup, "__subclasshook__")
            && owner != self.types.object
        {
            let hook = self.bind_for_class(hook, sup)?;
            match self.call(hook, ArgValues::one(Value::Ref(sub)))? {
                Value::Bool(answer) => return Ok(answer),
                Value::NotImplemented => {}
                other => return Err(ExcType::type_error(format!(
                    "__subclasshook__ must return a bool or NotImplemented, not {}",
                    self.type_name(other)
                ))),
            }
        }
        if self.mro_of(sub).contains(&sup) {
            return Ok(true);
        }
        let (registry, subclasses) = self
            .class_obj(sup)
            .map(|c| (c.registry.clone(), c.subclasses.clone()))
            .unwrap_or_default();
        for registered in registry {
            if self.is_subclass(sub, registered)? {
                return Ok(true);
            }
        }
        // a class registered with a subclass of `sup` is a virtual subclass of `sup` too
        for subclass in subclasses {
            if self.is_subclass(sub, subclass)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `isinstance(value, class)`.
    pub fn is_instance(&mut self, value: Value, class: Value) -> RunResult<bool> {
        let class_id = self.expect_class(class)?;
        let value_type = self.type_of(value);
        if self.mro_of(value_type).contains(&class_id) {
            return Ok(true);
        }
        self.is_subclass(value_type, class_id)
    }
}
