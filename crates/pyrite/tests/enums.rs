mod common;

use common::{attr, call, class_with, expect_err, module_attr, repr, string};
use pretty_assertions::assert_eq;
use pyrite::{ArgValues, Value, Vm};

/// ```text
/// class Color(Enum):
///     RED = 1
///     GREEN = 2
///     CRIMSON = 1
///     BLUE = auto()
/// ```
fn color(vm: &mut Vm) -> Value {
    let enum_class = module_attr(vm, "enum", "Enum");
    let auto = module_attr(vm, "enum", "auto");
    let auto = call(vm, auto, ArgValues::empty());
    class_with(
        vm,
        "Color",
        &[enum_class],
        &[
            ("RED", Value::Int(1)),
            ("GREEN", Value::Int(2)),
            ("CRIMSON", Value::Int(1)),
            ("BLUE", auto),
        ],
    )
}

/// `class Perm(Flag): R = 1; W = 2; X = 4`
fn perm(vm: &mut Vm) -> Value {
    let flag = module_attr(vm, "enum", "Flag");
    class_with(
        vm,
        "Perm",
        &[flag],
        &[("R", Value::Int(1)), ("W", Value::Int(2)), ("X", Value::Int(4))],
    )
}

fn member_name(vm: &mut Vm, member: Value) -> String {
    let name = attr(vm, member, "name");
    string(vm, name)
}

#[test]
fn members_are_instances_with_names_and_values() {
    let mut vm = Vm::new();
    let color = color(&mut vm);
    let red = attr(&mut vm, color, "RED");

    assert!(vm.is_instance(red, color).unwrap());
    assert_eq!(member_name(&mut vm, red), "RED");
    assert_eq!(attr(&mut vm, red, "value"), Value::Int(1));
    assert_eq!(repr(&mut vm, red), "<Color.RED: 1>");
    let text = vm.str_of(red).unwrap();
    assert_eq!(text, "Color.RED");
    assert_eq!(repr(&mut vm, color), "<enum 'Color'>");

    let blue = attr(&mut vm, color, "BLUE");
    assert_eq!(attr(&mut vm, blue, "value"), Value::Int(3));
}

#[test]
fn duplicate_values_become_aliases() {
    let mut vm = Vm::new();
    let color = color(&mut vm);
    let red = attr(&mut vm, color, "RED");
    let crimson = attr(&mut vm, color, "CRIMSON");
    assert!(crimson.is(red));

    let members = vm.collect_iter(color).unwrap();
    let names: Vec<String> = members.iter().map(|m| member_name(&mut vm, *m)).collect();
    assert_eq!(names, ["RED", "GREEN", "BLUE"]);
    assert_eq!(vm.len_of(color).unwrap(), 3);

    let alias = vm.new_str("CRIMSON").unwrap();
    let by_alias = vm.get_item(color, alias).unwrap();
    assert!(by_alias.is(red));
}

#[test]
fn lookup_by_value_and_by_name() {
    let mut vm = Vm::new();
    let color = color(&mut vm);
    let green = attr(&mut vm, color, "GREEN");

    let by_value = call(&mut vm, color, ArgValues::one(Value::Int(2)));
    assert!(by_value.is(green));
    let again = call(&mut vm, color, ArgValues::one(green));
    assert!(again.is(green));
    let name = vm.new_str("GREEN").unwrap();
    assert!(vm.get_item(color, name).unwrap().is(green));
    assert!(vm.contains(color, green).unwrap());

    let result = vm.call(color, ArgValues::one(Value::Int(5)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "ValueError: 5 is not a valid Color");

    let name = vm.new_str("PURPLE").unwrap();
    let result = vm.get_item(color, name);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "KeyError: 'PURPLE'");
}

#[test]
fn members_cannot_be_reassigned() {
    let mut vm = Vm::new();
    let color = color(&mut vm);

    let result = vm.set_attr(color, "RED", Value::Int(9));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "AttributeError: cannot reassign member 'RED'");

    // other class attributes stay writable
    vm.set_attr(color, "palette", Value::Int(1)).unwrap();
    assert_eq!(attr(&mut vm, color, "palette"), Value::Int(1));
}

#[test]
fn populated_enums_cannot_be_extended() {
    let mut vm = Vm::new();
    let color = color(&mut vm);
    let result = vm.create_class("MoreColor", &[color], pyrite::AttrMap::default(), None);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: <enum 'MoreColor'> cannot extend <enum 'Color'>");
}

#[test]
fn unique_rejects_aliases() {
    let mut vm = Vm::new();
    let unique = module_attr(&mut vm, "enum", "unique");
    let color = color(&mut vm);

    let result = vm.call(unique, ArgValues::one(color));
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.summary(),
        "ValueError: duplicate values found in <enum 'Color'>: CRIMSON -> RED"
    );

    let perm = perm(&mut vm);
    let checked = call(&mut vm, unique, ArgValues::one(perm));
    assert!(checked.is(perm));
}

#[test]
fn flag_algebra() {
    let mut vm = Vm::new();
    let perm = perm(&mut vm);
    let r = attr(&mut vm, perm, "R");
    let w = attr(&mut vm, perm, "W");

    let rw = vm.call_method(r, "__or__", ArgValues::one(w)).unwrap();
    assert_eq!(attr(&mut vm, rw, "value"), Value::Int(3));
    assert_eq!(repr(&mut vm, rw), "<Perm.R|W: 3>");
    // pseudo-members are cached
    let again = vm.call_method(w, "__or__", ArgValues::one(r)).unwrap();
    assert!(again.is(rw));
    assert!(call(&mut vm, perm, ArgValues::one(Value::Int(3))).is(rw));

    // (a | b) & a == a
    let masked = vm.call_method(rw, "__and__", ArgValues::one(r)).unwrap();
    assert!(masked.is(r));
    assert!(vm.contains(rw, w).unwrap());

    // ~R & W|R clears R
    let not_r = vm.call_method(r, "__invert__", ArgValues::empty()).unwrap();
    assert_eq!(member_name(&mut vm, not_r), "W|X");
    let cleared = vm.call_method(not_r, "__and__", ArgValues::one(rw)).unwrap();
    assert!(cleared.is(w));

    let empty = vm.call_method(r, "__xor__", ArgValues::one(r)).unwrap();
    assert!(!vm.truthy(empty).unwrap());
    assert_eq!(repr(&mut vm, empty), "<Perm: 0>");

    let components = vm.collect_iter(rw).unwrap();
    assert_eq!(components.len(), 2);
    assert!(components[0].is(r) && components[1].is(w));

    let result = vm.call(perm, ArgValues::one(Value::Int(8)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "ValueError: 8 is not a valid Perm");
}

#[test]
fn flag_auto_uses_powers_of_two() {
    let mut vm = Vm::new();
    let flag = module_attr(&mut vm, "enum", "Flag");
    let auto = module_attr(&mut vm, "enum", "auto");
    let (a, b, c) = (
        call(&mut vm, auto, ArgValues::empty()),
        call(&mut vm, auto, ArgValues::empty()),
        call(&mut vm, auto, ArgValues::empty()),
    );
    let mode = class_with(&mut vm, "Mode", &[flag], &[("A", a), ("B", b), ("C", c)]);

    let values: Vec<Value> = ["A", "B", "C"]
        .into_iter()
        .map(|name| {
            let member = attr(&mut vm, mode, name);
            attr(&mut vm, member, "value")
        })
        .collect();
    assert_eq!(values, [Value::Int(1), Value::Int(2), Value::Int(4)]);
}

#[test]
fn only_sunder_dunder_and_private_names_are_skipped() {
    let mut vm = Vm::new();
    let enum_class = module_attr(&mut vm, "enum", "Enum");
    let order = vm.new_str("RED _hidden").unwrap();
    // class Shade(Enum): RED = 1; _hidden = 2; _order_ = "..."; _Shade__secret = 3
    let shade = class_with(
        &mut vm,
        "Shade",
        &[enum_class],
        &[
            ("RED", Value::Int(1)),
            ("_hidden", Value::Int(2)),
            ("_order_", order),
            ("_Shade__secret", Value::Int(3)),
        ],
    );

    let members = vm.collect_iter(shade).unwrap();
    let names: Vec<String> = members.iter().map(|m| member_name(&mut vm, *m)).collect();
    assert_eq!(names, ["RED", "_hidden"]);
    let hidden = attr(&mut vm, shade, "_hidden");
    assert!(vm.is_instance(hidden, shade).unwrap());
    assert_eq!(attr(&mut vm, shade, "_Shade__secret"), Value::Int(3));
}
