mod common;

use common::{builtin, call, class_with, expect_err, module_attr, repr, string};
use pretty_assertions::assert_eq;
use pyrite::{ArgValues, ErrorKind, Value, Vm};

/// A class body with `name: int` annotations for `fields` plus `defaults`.
fn annotated(vm: &mut Vm, name: &str, bases: &[Value], fields: &[&str], defaults: &[(&str, Value)]) -> Value {
    let int = builtin(vm, "int");
    let mut annotations = Vec::new();
    for field in fields {
        annotations.push((vm.new_str(*field).unwrap(), int));
    }
    let annotations = vm.new_dict(annotations).unwrap();
    let mut attrs = vec![("__annotations__", annotations)];
    attrs.extend_from_slice(defaults);
    class_with(vm, name, bases, &attrs)
}

fn dataclass(vm: &mut Vm, cls: Value) -> Value {
    let decorator = module_attr(vm, "dataclasses", "dataclass");
    call(vm, decorator, ArgValues::one(cls))
}

/// `@dataclass class Point: x: int; y: int`
fn point(vm: &mut Vm) -> Value {
    let cls = annotated(vm, "Point", &[], &["x", "y"], &[]);
    dataclass(vm, cls)
}

#[test]
fn synthesized_init_repr_and_eq() {
    let mut vm = Vm::new();
    let point = point(&mut vm);

    let p = call(&mut vm, point, ArgValues::two(Value::Int(1), Value::Int(2)));
    assert_eq!(repr(&mut vm, p), "Point(x=1, y=2)");
    let q = call(&mut vm, point, ArgValues::one(Value::Int(1)).kwarg("y", Value::Int(2)));
    assert!(vm.values_equal(p, q).unwrap());
    let r = call(&mut vm, point, ArgValues::two(Value::Int(2), Value::Int(1)));
    assert!(!vm.values_equal(p, r).unwrap());

    // instances of unrelated classes never compare equal
    let other = annotated(&mut vm, "Other", &[], &["x", "y"], &[]);
    let other = dataclass(&mut vm, other);
    let o = call(&mut vm, other, ArgValues::two(Value::Int(1), Value::Int(2)));
    assert!(!vm.values_equal(p, o).unwrap());
}

#[test]
fn init_argument_errors() {
    let mut vm = Vm::new();
    let point = point(&mut vm);

    let result = vm.call(point, ArgValues::one(Value::Int(1)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.summary(),
        "TypeError: __init__() missing 1 required positional argument: 'y'"
    );
    assert_eq!(exc.kind(), ErrorKind::ArityMismatch);

    let result = vm.call(point, ArgValues::empty());
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.message(),
        Some("__init__() missing 2 required positional arguments: 'x' and 'y'")
    );

    let result = vm.call(point, ArgValues::positional([Value::Int(1), Value::Int(2), Value::Int(3)]));
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.message(),
        Some("__init__() takes 3 positional arguments but 4 were given")
    );

    let result = vm.call(point, ArgValues::one(Value::Int(1)).kwarg("x", Value::Int(1)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.message(), Some("__init__() got multiple values for argument 'x'"));
}

#[test]
fn defaults_and_inherited_fields() {
    let mut vm = Vm::new();
    // @dataclass class Config: host: int; port: int = 8080
    let config = annotated(&mut vm, "Config", &[], &["host", "port"], &[("port", Value::Int(8080))]);
    let config = dataclass(&mut vm, config);
    let c = call(&mut vm, config, ArgValues::one(Value::Int(1)));
    assert_eq!(repr(&mut vm, c), "Config(host=1, port=8080)");

    // @dataclass class Tls(Config): verify: int = 1
    let tls = annotated(&mut vm, "Tls", &[config], &["verify"], &[("verify", Value::Int(1))]);
    let tls = dataclass(&mut vm, tls);
    let t = call(&mut vm, tls, ArgValues::positional([Value::Int(5), Value::Int(443), Value::Int(0)]));
    assert_eq!(repr(&mut vm, t), "Tls(host=5, port=443, verify=0)");

    let fields = module_attr(&mut vm, "dataclasses", "fields");
    let names = call(&mut vm, fields, ArgValues::one(tls));
    let names: Vec<String> = vm
        .sequence_items(names)
        .unwrap()
        .into_iter()
        .map(|n| string(&vm, n))
        .collect();
    assert_eq!(names, ["host", "port", "verify"]);
}

#[test]
fn field_ordering_and_mutable_defaults_are_checked() {
    let mut vm = Vm::new();
    let bad = annotated(&mut vm, "Bad", &[], &["a", "b"], &[("a", Value::Int(0))]);
    let decorator = module_attr(&mut vm, "dataclasses", "dataclass");
    let result = vm.call(decorator, ArgValues::one(bad));
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.summary(),
        "TypeError: non-default argument 'b' follows default argument 'a'"
    );

    let list = vm.new_list(vec![]).unwrap();
    let shared = annotated(&mut vm, "Shared", &[], &["items"], &[("items", list)]);
    let result = vm.call(decorator, ArgValues::one(shared));
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.summary(),
        "ValueError: mutable default <class 'list'> for field items is not allowed: use default_factory"
    );
}

#[test]
fn frozen_instances_reject_assignment() {
    let mut vm = Vm::new();
    let decorator = module_attr(&mut vm, "dataclasses", "dataclass");
    let frozen = call(&mut vm, decorator, ArgValues::empty().kwarg("frozen", Value::Bool(true)));
    let cls = annotated(&mut vm, "Pin", &[], &["x"], &[]);
    let pin = call(&mut vm, frozen, ArgValues::one(cls));
    assert!(pin.is(cls));

    let p = call(&mut vm, pin, ArgValues::one(Value::Int(4)));
    assert_eq!(common::attr(&mut vm, p, "x"), Value::Int(4));

    let result = vm.set_attr(p, "x", Value::Int(5));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "FrozenInstanceError: cannot assign to field 'x'");
    let result = vm.del_attr(p, "x");
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.type_name(), "FrozenInstanceError");

    // a mutable dataclass cannot extend a frozen one
    let child = annotated(&mut vm, "Child", &[pin], &["y"], &[]);
    let result = vm.call(decorator, ArgValues::one(child));
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.summary(),
        "TypeError: cannot inherit non-frozen dataclass from a frozen one"
    );
}

#[test]
fn introspection_helpers() {
    let mut vm = Vm::new();
    let point = point(&mut vm);
    let p = call(&mut vm, point, ArgValues::two(Value::Int(3), Value::Int(4)));
    let is_dataclass = module_attr(&mut vm, "dataclasses", "is_dataclass");
    let asdict = module_attr(&mut vm, "dataclasses", "asdict");

    assert_eq!(call(&mut vm, is_dataclass, ArgValues::one(point)), Value::Bool(true));
    assert_eq!(call(&mut vm, is_dataclass, ArgValues::one(p)), Value::Bool(true));
    assert_eq!(call(&mut vm, is_dataclass, ArgValues::one(Value::Int(3))), Value::Bool(false));

    let dict = call(&mut vm, asdict, ArgValues::one(p));
    assert_eq!(repr(&mut vm, dict), "{'x': 3, 'y': 4}");
    let result = vm.call(asdict, ArgValues::one(point));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: asdict() should be called on dataclass instances");
}
