//! Implementation of the `enum` module.
//!
//! Enumerations are real classes built on the regular class machinery:
//! - `EnumMeta` is the metaclass; its `__call__` performs value lookup
//!   (`Color(1) -> Color.RED`) and its `__iter__` yields members in definition order
//! - `Enum.__init_subclass__` turns the class body's plain attributes into member
//!   instances, resolving `auto()` values and collapsing duplicate values into aliases
//! - `Flag` adds bitwise operators; combinations without a named member become
//!   synthesized pseudo-members, cached per value
//!
//! Member bookkeeping lives in ordinary class attributes (`_member_names_`,
//! `_member_map_`, `_value2member_map_`), so guest code can inspect it.

use crate::{
    Vm,
    exception::{ExcType, RunError, RunResult, SimpleException},
    heap::{HeapData, HeapId},
    native::{Arity, CallContext, NativeMember},
    types::class::Instance,
    value::Value,
};

/// Canonical member names in definition order.
const MEMBER_NAMES_ATTR: &str = "_member_names_";
/// Every member name, aliases included, mapped to its member.
const MEMBER_MAP_ATTR: &str = "_member_map_";
/// Hashable member values mapped to their member; flag pseudo-members are cached here too.
const VALUE_MAP_ATTR: &str = "_value2member_map_";
/// Set on `Flag`; inherited by every flag enumeration.
const IS_FLAG_ATTR: &str = "__enum_is_flag__";

const ENUM_META_MEMBERS: &[NativeMember] = &[
    NativeMember::method("__call__", Arity::at_least(1), enum_meta_call),
    NativeMember::method("__iter__", Arity::exact(1), enum_meta_iter),
    NativeMember::method("__len__", Arity::exact(1), enum_meta_len),
    NativeMember::method("__bool__", Arity::exact(1), enum_meta_bool),
    NativeMember::method("__contains__", Arity::exact(2), enum_meta_contains),
    NativeMember::method("__getitem__", Arity::exact(2), enum_meta_getitem),
    NativeMember::method("__setattr__", Arity::exact(3), enum_meta_setattr),
    NativeMember::method("__repr__", Arity::exact(1), enum_meta_repr),
    NativeMember::property("__members__", enum_meta_members),
];

const ENUM_MEMBERS: &[NativeMember] = &[
    NativeMember::class_method("__init_subclass__", Arity::at_least(1), enum_init_subclass),
    NativeMember::method("__repr__", Arity::exact(1), enum_repr),
    NativeMember::method("__str__", Arity::exact(1), enum_str),
    NativeMember::property("name", enum_name),
    NativeMember::property("value", enum_value),
];

const FLAG_MEMBERS: &[NativeMember] = &[
    NativeMember::method("__or__", Arity::exact(2), flag_or),
    NativeMember::method("__and__", Arity::exact(2), flag_and),
    NativeMember::method("__xor__", Arity::exact(2), flag_xor),
    NativeMember::method("__invert__", Arity::exact(1), flag_invert),
    NativeMember::method("__bool__", Arity::exact(1), flag_bool),
    NativeMember::method("__contains__", Arity::exact(2), flag_contains),
    NativeMember::method("__iter__", Arity::exact(1), flag_iter),
    NativeMember::method("__len__", Arity::exact(1), flag_len),
];

pub(super) fn create_module(vm: &mut Vm) -> RunResult<()> {
    let type_class = vm.type_class();
    let enum_meta = vm.new_native_class("EnumMeta", &[type_class], None, ENUM_META_MEMBERS)?;
    super::set_module_name(vm, enum_meta, "enum")?;
    let enum_class = vm.new_native_class("Enum", &[], Some(enum_meta), ENUM_MEMBERS)?;
    super::set_module_name(vm, enum_class, "enum")?;
    let flag = vm.new_native_class("Flag", &[enum_class], None, FLAG_MEMBERS)?;
    super::set_module_name(vm, flag, "enum")?;
    vm.set_class_attr(flag, IS_FLAG_ATTR, Value::Bool(true))?;
    let auto = vm.new_native_class("auto", &[], None, &[])?;
    super::set_module_name(vm, auto, "enum")?;

    let mut builder = vm.module_builder("enum");
    builder
        .class("EnumMeta", enum_meta)
        .class("EnumType", enum_meta)
        .class("Enum", enum_class)
        .class("Flag", flag)
        .class("auto", auto)
        .function("unique", Arity::exact(1), unique);
    builder.build();
    Ok(())
}

// class bookkeeping

/// A class's own attribute, without MRO or descriptor handling.
fn own_attr(vm: &Vm, cls: HeapId, name: &str) -> Option<Value> {
    vm.class_obj(cls).and_then(|c| c.namespace.get(name).copied())
}

/// Writes straight into a class namespace, bypassing `EnumMeta.__setattr__`.
fn store_attr(vm: &mut Vm, cls: HeapId, name: &str, value: Value) {
    if let HeapData::Class(class) = vm.heap.get_mut(cls) {
        class.namespace.insert(name.to_owned(), value);
    }
}

fn is_flag_class(vm: &Vm, cls: HeapId) -> bool {
    vm.lookup_mro(cls, IS_FLAG_ATTR)
        .is_some_and(|(value, _)| matches!(value, Value::Bool(true)))
}

/// The class's canonical members in definition order.
fn members_of(vm: &Vm, cls: HeapId) -> Vec<Value> {
    let names = own_attr(vm, cls, MEMBER_NAMES_ATTR)
        .and_then(|v| vm.sequence_items(v))
        .unwrap_or_default();
    let map = own_attr(vm, cls, MEMBER_MAP_ATTR).and_then(|v| vm.dict_items(v)).unwrap_or_default();
    let mut members = Vec::with_capacity(names.len());
    for name in names {
        let Some(name) = vm.str_value(name) else { continue };
        if let Some((_, member)) = map.iter().find(|(k, _)| vm.str_value(*k) == Some(name)) {
            members.push(*member);
        }
    }
    members
}

/// Members that iteration shows: all canonical members, or only single-bit ones for flags.
fn iteration_members(vm: &Vm, cls: HeapId) -> Vec<Value> {
    let members = members_of(vm, cls);
    if !is_flag_class(vm, cls) {
        return members;
    }
    members
        .into_iter()
        .filter(|m| member_int(vm, *m).is_some_and(|v| v > 0 && v.count_ones() == 1))
        .collect()
}

fn member_attr(vm: &Vm, member: Value, name: &str) -> Option<Value> {
    match member {
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Instance(inst) => inst.attrs.get(name).copied(),
            _ => None,
        },
        _ => None,
    }
}

fn member_int(vm: &Vm, member: Value) -> Option<i64> {
    match member_attr(vm, member, "_value_")? {
        Value::Int(v) => Some(v),
        Value::Bool(b) => Some(i64::from(b)),
        _ => None,
    }
}

fn new_member(vm: &mut Vm, cls: HeapId, name: Option<&str>, value: Value) -> RunResult<Value> {
    let mut attrs = crate::types::AttrMap::default();
    let name = match name {
        Some(name) => vm.new_str(name)?,
        None => Value::None,
    };
    attrs.insert("_name_".to_owned(), name);
    attrs.insert("_value_".to_owned(), value);
    let id = vm.alloc(HeapData::Instance(Instance { class_id: cls, attrs }))?;
    Ok(Value::Ref(id))
}

/// Finds the member whose value equals `value`.
fn lookup_member(vm: &mut Vm, cls: HeapId, value: Value) -> RunResult<Option<Value>> {
    if let Ok(key) = vm.hash_key(value)
        && let Some(Value::Ref(map_id)) = own_attr(vm, cls, VALUE_MAP_ATTR)
        && let HeapData::Dict(map) = vm.heap.get(map_id)
    {
        return Ok(map.get(&key));
    }
    for member in members_of(vm, cls) {
        let Some(member_value) = member_attr(vm, member, "_value_") else { continue };
        if member_value.is(value) || vm.values_equal(member_value, value)? {
            return Ok(Some(member));
        }
    }
    Ok(None)
}

/// `_name_`: one underscore on each side, the next character in being a letter.
fn is_sunder(name: &str) -> bool {
    let b = name.as_bytes();
    b.len() > 2 && b[0] == b'_' && b[b.len() - 1] == b'_' && b[1] != b'_' && b[b.len() - 2] != b'_'
}

/// `__name__`.
fn is_dunder(name: &str) -> bool {
    let b = name.as_bytes();
    b.len() > 4 && name.starts_with("__") && name.ends_with("__") && b[2] != b'_' && b[b.len() - 3] != b'_'
}

/// `__x` in the body of `class_name`, mangled to `_ClassName__x`.
fn is_private(class_name: &str, name: &str) -> bool {
    let prefix = format!("_{}__", class_name.trim_start_matches('_'));
    name.len() > prefix.len() && name.starts_with(&prefix) && !name.ends_with("__")
}

/// Whether `namespace[name] = value` declares a member rather than a method or helper.
fn is_member_candidate(vm: &Vm, class_name: &str, name: &str, value: Value) -> bool {
    if is_sunder(name) || is_dunder(name) || is_private(class_name, name) {
        return false;
    }
    match value {
        Value::Ref(id) => !matches!(
            vm.heap.get(id),
            HeapData::Function(_)
                | HeapData::NativeFunction(_)
                | HeapData::BoundMethod(_)
                | HeapData::Class(_)
                | HeapData::Module(_)
                | HeapData::Property(_)
                | HeapData::ClassMethod(_)
                | HeapData::StaticMethod(_)
        ),
        _ => true,
    }
}

fn is_auto(vm: &mut Vm, value: Value) -> bool {
    let Ok(module) = vm.import("enum") else { return false };
    let Some(Value::Ref(auto_id)) = vm.global(module, "auto") else {
        return false;
    };
    matches!(value, Value::Ref(id) if matches!(vm.heap.get(id), HeapData::Instance(inst) if inst.class_id == auto_id))
}

/// The value `auto()` stands for, given every value assigned so far.
///
/// Enumerations count up from the last value; flags take the next power of two above
/// the highest value.
fn next_auto_value(vm: &Vm, is_flag: bool, previous: &[Value]) -> RunResult<Value> {
    if is_flag {
        let highest = previous.iter().filter_map(|v| v.as_int()).max().unwrap_or(0);
        if highest <= 0 {
            return Ok(Value::Int(1));
        }
        let shift = i64::BITS - highest.leading_zeros();
        return 1_i64
            .checked_shl(shift)
            .filter(|v| *v > 0)
            .map(Value::Int)
            .ok_or_else(|| ExcType::overflow_error("auto() flag value overflowed"));
    }
    match previous.last() {
        None => Ok(Value::Int(1)),
        Some(last) => match last.as_int().and_then(|v| v.checked_add(1)) {
            Some(next) => Ok(Value::Int(next)),
            None => Err(ExcType::type_error(format!(
                "unable to increment {}",
                vm.type_name(*last)
            ))),
        },
    }
}

// Enum

/// `Enum.__init_subclass__(cls)`: materializes the class body's members.
fn enum_init_subclass(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();

    let mro = vm.mro_of(cls);
    for &base in mro.iter().skip(1) {
        if !members_of(vm, base).is_empty() {
            return Err(ExcType::type_error(format!(
                "<enum '{}'> cannot extend <enum '{}'>",
                vm.class_display_name(cls),
                vm.class_display_name(base)
            )));
        }
    }

    let is_flag = is_flag_class(vm, cls);
    let candidates: Vec<(String, Value)> = vm
        .class_obj(cls)
        .map(|c| c.namespace.iter().map(|(k, v)| (k.clone(), *v)).collect())
        .unwrap_or_default();

    let class_name = vm.class_obj(cls).map(|c| c.name.clone()).unwrap_or_default();
    let mut assigned: Vec<Value> = Vec::new();
    let mut canonical: Vec<(Value, Value)> = Vec::new();
    let mut names = Vec::new();
    let mut member_map = Vec::new();
    let mut value_map = Vec::new();
    for (name, raw) in candidates {
        if !is_member_candidate(vm, &class_name, &name, raw) {
            continue;
        }
        let value = if is_auto(vm, raw) {
            next_auto_value(vm, is_flag, &assigned)?
        } else {
            raw
        };
        assigned.push(value);

        let mut alias_of = None;
        for &(member, existing) in &canonical {
            if existing.is(value) || vm.values_equal(existing, value)? {
                alias_of = Some(member);
                break;
            }
        }
        let member = match alias_of {
            Some(member) => member,
            None => {
                let member = new_member(vm, cls, Some(&name), value)?;
                canonical.push((member, value));
                names.push(vm.new_str(name.as_str())?);
                if vm.hash_key(value).is_ok() {
                    value_map.push((value, member));
                }
                member
            }
        };
        store_attr(vm, cls, &name, member);
        member_map.push((vm.new_str(name.as_str())?, member));
    }

    let names = vm.new_list(names)?;
    let member_map = vm.new_dict(member_map)?;
    let value_map = vm.new_dict(value_map)?;
    store_attr(vm, cls, MEMBER_NAMES_ATTR, names);
    store_attr(vm, cls, MEMBER_MAP_ATTR, member_map);
    store_attr(vm, cls, VALUE_MAP_ATTR, value_map);
    tracing::debug!(
        target: "pyrite::vm",
        class = %vm.class_display_name(cls),
        members = canonical.len(),
        "enum members created"
    );
    Ok(0)
}

fn member_receiver(ctx: &CallContext<'_>) -> RunResult<(Value, HeapId)> {
    let this = ctx.arg(0)?;
    let vm = ctx.vm_ref();
    match this {
        Value::Ref(id) if matches!(vm.heap.get(id), HeapData::Instance(_)) => Ok((this, vm.type_of(this))),
        _ => Err(ExcType::type_error(format!(
            "expected an enum member, got '{}'",
            vm.type_name(this)
        ))),
    }
}

/// `<Color.RED: 1>`; pseudo-members without a name show `<Perm: 0>`.
fn enum_repr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, cls) = member_receiver(ctx)?;
    let vm = ctx.vm();
    let class_name = vm.class_display_name(cls);
    let value = member_attr(vm, this, "_value_").unwrap_or(Value::None);
    let value = vm.repr_of(value)?;
    let text = match member_attr(vm, this, "_name_").and_then(|n| vm.str_value(n).map(str::to_owned)) {
        Some(name) => format!("<{class_name}.{name}: {value}>"),
        None => format!("<{class_name}: {value}>"),
    };
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

fn enum_str(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, cls) = member_receiver(ctx)?;
    let vm = ctx.vm();
    let class_name = vm.class_display_name(cls);
    let text = match member_attr(vm, this, "_name_").and_then(|n| vm.str_value(n).map(str::to_owned)) {
        Some(name) => format!("{class_name}.{name}"),
        None => {
            let value = member_attr(vm, this, "_value_").unwrap_or(Value::None);
            format!("{class_name}({})", vm.repr_of(value)?)
        }
    };
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

fn enum_name(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, _) = member_receiver(ctx)?;
    let name = member_attr(ctx.vm_ref(), this, "_name_").unwrap_or(Value::None);
    ctx.ret(name)
}

fn enum_value(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, _) = member_receiver(ctx)?;
    let value = member_attr(ctx.vm_ref(), this, "_value_").unwrap_or(Value::None);
    ctx.ret(value)
}

// EnumMeta

/// `Color(value)`: the member with that value, or a flag pseudo-member.
fn enum_meta_call(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_no_kwargs()?;
    let cls = ctx.arg_class(0)?;
    if ctx.arg_count() != 2 {
        return Err(ExcType::type_error(format!(
            "{}() takes exactly one value argument ({} given)",
            ctx.vm_ref().class_display_name(cls),
            ctx.arg_count().saturating_sub(1)
        )));
    }
    let value = ctx.arg(1)?;
    let vm = ctx.vm();
    if matches!(value, Value::Ref(id) if matches!(vm.heap.get(id), HeapData::Instance(_)))
        && vm.mro_of(vm.type_of(value)).contains(&cls)
    {
        return ctx.ret(value);
    }
    if let Some(member) = lookup_member(vm, cls, value)? {
        return ctx.ret(member);
    }
    if is_flag_class(vm, cls)
        && let Value::Int(bits) = value
    {
        let member = flag_member(vm, cls, bits)?;
        return ctx.ret(member);
    }
    Err(not_a_member(vm, cls, value)?)
}

fn not_a_member(vm: &mut Vm, cls: HeapId, value: Value) -> RunResult<RunError> {
    let repr = vm.repr_of(value)?;
    Ok(ExcType::value_error(format!(
        "{repr} is not a valid {}",
        vm.class_display_name(cls)
    )))
}

fn enum_meta_iter(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();
    let members = iteration_members(vm, cls);
    let iterator = vm.new_snapshot_iter(members)?;
    ctx.ret(iterator)
}

fn enum_meta_len(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let len = iteration_members(ctx.vm_ref(), cls).len();
    ctx.ret(Value::Int(len as i64))
}

fn enum_meta_bool(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.ret(Value::Bool(true))
}

/// `x in Color`: members of the class, or values some member has.
fn enum_meta_contains(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let value = ctx.arg(1)?;
    let vm = ctx.vm();
    let is_member = matches!(value, Value::Ref(id) if matches!(vm.heap.get(id), HeapData::Instance(_)))
        && vm.mro_of(vm.type_of(value)).contains(&cls);
    let found = is_member || lookup_member(vm, cls, value)?.is_some();
    ctx.ret(Value::Bool(found))
}

/// `Color['RED']`: lookup by name, aliases included.
fn enum_meta_getitem(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let name = ctx.arg(1)?;
    let vm = ctx.vm();
    let member = match own_attr(vm, cls, MEMBER_MAP_ATTR) {
        Some(map) => match vm.get_item(map, name) {
            Ok(member) => Some(member),
            Err(err) if vm.error_matches(&err, ExcType::KeyError) => None,
            Err(err) => return Err(err),
        },
        None => None,
    };
    match member {
        Some(member) => ctx.ret(member),
        None => Err(ExcType::key_error(vm.repr_of(name)?)),
    }
}

/// Members cannot be rebound once the class exists.
fn enum_meta_setattr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let name = ctx.arg_str(1)?;
    let value = ctx.arg(2)?;
    let vm = ctx.vm();
    let is_member = own_attr(vm, cls, MEMBER_MAP_ATTR)
        .and_then(|map| vm.dict_items(map))
        .is_some_and(|items| items.iter().any(|(k, _)| vm.str_value(*k) == Some(name.as_str())));
    if is_member {
        return Err(SimpleException::new_msg(ExcType::AttributeError, format!("cannot reassign member '{name}'")).into());
    }
    vm.class_set_attr(cls, &name, value)?;
    Ok(0)
}

fn enum_meta_repr(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();
    let text = format!("<enum '{}'>", vm.class_display_name(cls));
    let text = vm.new_str(text)?;
    ctx.ret(text)
}

/// `Color.__members__`: name to member, aliases included, as a fresh dict.
fn enum_meta_members(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();
    let items = own_attr(vm, cls, MEMBER_MAP_ATTR)
        .and_then(|map| vm.dict_items(map))
        .unwrap_or_default();
    let dict = vm.new_dict(items)?;
    ctx.ret(dict)
}

/// `unique(cls)`: rejects enumerations with aliases, returning the class otherwise.
fn unique(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let cls = ctx.arg_class(0)?;
    let vm = ctx.vm();
    let entries = own_attr(vm, cls, MEMBER_MAP_ATTR)
        .and_then(|map| vm.dict_items(map))
        .unwrap_or_default();
    let mut duplicates = Vec::new();
    for (name, member) in entries {
        let alias = vm.str_value(name).unwrap_or_default().to_owned();
        let canonical = member_attr(vm, member, "_name_")
            .and_then(|n| vm.str_value(n).map(str::to_owned))
            .unwrap_or_default();
        if alias != canonical {
            duplicates.push(format!("{alias} -> {canonical}"));
        }
    }
    if !duplicates.is_empty() {
        return Err(ExcType::value_error(format!(
            "duplicate values found in <enum '{}'>: {}",
            vm.class_display_name(cls),
            duplicates.join(", ")
        )));
    }
    ctx.ret(Value::Ref(cls))
}

// Flag

/// The member for `bits`, synthesizing and caching a pseudo-member when no named
/// member has that value.
fn flag_member(vm: &mut Vm, cls: HeapId, bits: i64) -> RunResult<Value> {
    if let Some(member) = lookup_member(vm, cls, Value::Int(bits))? {
        return Ok(member);
    }
    let members = members_of(vm, cls);
    let mask = members.iter().filter_map(|m| member_int(vm, *m)).fold(0, |acc, v| acc | v);
    if bits < 0 || bits & !mask != 0 {
        return Err(not_a_member(vm, cls, Value::Int(bits))?);
    }
    let name = if bits == 0 {
        None
    } else {
        let parts: Vec<String> = members
            .iter()
            .filter_map(|m| {
                let value = member_int(vm, *m)?;
                let name = member_attr(vm, *m, "_name_").and_then(|n| vm.str_value(n))?;
                (value.count_ones() == 1 && bits & value == value).then(|| name.to_owned())
            })
            .collect();
        Some(parts.join("|"))
    };
    let member = new_member(vm, cls, name.as_deref(), Value::Int(bits))?;
    if let Some(map) = own_attr(vm, cls, VALUE_MAP_ATTR) {
        vm.set_item(map, Value::Int(bits), member)?;
    }
    Ok(member)
}

/// Operands of a binary flag operator; `None` when `other` is not a member of the same class.
fn flag_operands(ctx: &CallContext<'_>) -> RunResult<Option<(HeapId, i64, i64)>> {
    let (this, cls) = member_receiver(ctx)?;
    let other = ctx.arg(1)?;
    let vm = ctx.vm_ref();
    if vm.type_of(other) != cls {
        return Ok(None);
    }
    match (member_int(vm, this), member_int(vm, other)) {
        (Some(a), Some(b)) => Ok(Some((cls, a, b))),
        _ => Err(ExcType::type_error("flag members must have integer values")),
    }
}

fn flag_binary(ctx: &mut CallContext<'_>, op: fn(i64, i64) -> i64) -> RunResult<usize> {
    let Some((cls, a, b)) = flag_operands(ctx)? else {
        return ctx.ret(Value::NotImplemented);
    };
    let member = flag_member(ctx.vm(), cls, op(a, b))?;
    ctx.ret(member)
}

fn flag_or(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    flag_binary(ctx, |a, b| a | b)
}

fn flag_and(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    flag_binary(ctx, |a, b| a & b)
}

fn flag_xor(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    flag_binary(ctx, |a, b| a ^ b)
}

/// `~flag`: the complement within the bits the class defines.
fn flag_invert(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, cls) = member_receiver(ctx)?;
    let vm = ctx.vm();
    let bits = member_int(vm, this).unwrap_or(0);
    let mask = members_of(vm, cls)
        .into_iter()
        .filter_map(|m| member_int(vm, m))
        .fold(0, |acc, v| acc | v);
    let member = flag_member(vm, cls, mask & !bits)?;
    ctx.ret(member)
}

fn flag_bool(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, _) = member_receiver(ctx)?;
    let bits = member_int(ctx.vm_ref(), this).unwrap_or(0);
    ctx.ret(Value::Bool(bits != 0))
}

/// `a in flags`: every bit of `a` is set in `flags`.
fn flag_contains(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, cls) = member_receiver(ctx)?;
    let other = ctx.arg(1)?;
    let vm = ctx.vm_ref();
    if vm.type_of(other) != cls {
        return Err(ExcType::type_error(format!(
            "unsupported operand type(s) for 'in': '{}' and '{}'",
            vm.type_name(other),
            vm.class_display_name(cls)
        )));
    }
    let bits = member_int(vm, this).unwrap_or(0);
    let needle = member_int(vm, other).unwrap_or(0);
    ctx.ret(Value::Bool(bits & needle == needle))
}

/// Single-bit members contained in a flag value, in definition order.
fn flag_components(vm: &Vm, this: Value, cls: HeapId) -> Vec<Value> {
    let bits = member_int(vm, this).unwrap_or(0);
    iteration_members(vm, cls)
        .into_iter()
        .filter(|m| member_int(vm, *m).is_some_and(|v| bits & v == v))
        .collect()
}

fn flag_iter(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, cls) = member_receiver(ctx)?;
    let vm = ctx.vm();
    let components = flag_components(vm, this, cls);
    let iterator = vm.new_snapshot_iter(components)?;
    ctx.ret(iterator)
}

fn flag_len(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let (this, cls) = member_receiver(ctx)?;
    let len = flag_components(ctx.vm_ref(), this, cls).len();
    ctx.ret(Value::Int(len as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_values_follow_the_previous_value() {
        let vm = Vm::new();
        assert!(matches!(next_auto_value(&vm, false, &[]), Ok(Value::Int(1))));
        assert!(matches!(
            next_auto_value(&vm, false, &[Value::Int(1), Value::Int(7)]),
            Ok(Value::Int(8))
        ));
        assert!(matches!(next_auto_value(&vm, true, &[]), Ok(Value::Int(1))));
        assert!(matches!(
            next_auto_value(&vm, true, &[Value::Int(1), Value::Int(2)]),
            Ok(Value::Int(4))
        ));
        assert!(matches!(next_auto_value(&vm, true, &[Value::Int(5)]), Ok(Value::Int(8))));
    }

    #[test]
    fn reserved_and_private_names_are_not_members() {
        let vm = Vm::new();
        let one = Value::Int(1);
        for name in ["_order_", "_ignore_", "__module__", "__qualname__", "_Color__secret", "__init__"] {
            assert!(!is_member_candidate(&vm, "Color", name, one), "{name}");
        }
        for name in ["RED", "_x", "_x__", "__x", "_Other__y", "_Color__dunder__", "_", "__"] {
            assert!(is_member_candidate(&vm, "Color", name, one), "{name}");
        }
    }
}
