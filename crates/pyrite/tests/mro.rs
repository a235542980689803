mod common;

use common::{builtin, class, expect_err, names};
use pretty_assertions::assert_eq;
use pyrite::{AttrMap, ErrorKind, Vm};

#[test]
fn diamond_linearization() {
    let mut vm = Vm::new();
    let a = class(&mut vm, "A", &[]);
    let b = class(&mut vm, "B", &[a]);
    let c = class(&mut vm, "C", &[a]);
    let d = class(&mut vm, "D", &[b, c]);

    let mro = vm.class_mro(d);
    assert_eq!(names(&mut vm, &mro), ["D", "B", "C", "A", "object"]);
}

#[test]
fn nested_multiple_inheritance() {
    let mut vm = Vm::new();
    let a = class(&mut vm, "A", &[]);
    let b = class(&mut vm, "B", &[]);
    let c = class(&mut vm, "C", &[]);
    let d = class(&mut vm, "D", &[]);
    let e = class(&mut vm, "E", &[]);
    let k1 = class(&mut vm, "K1", &[a, b, c]);
    let k2 = class(&mut vm, "K2", &[d, b, e]);
    let k3 = class(&mut vm, "K3", &[d, a]);
    let z = class(&mut vm, "Z", &[k1, k2, k3]);

    let mro = vm.class_mro(z);
    assert_eq!(
        names(&mut vm, &mro),
        ["Z", "K1", "K2", "K3", "D", "A", "B", "C", "E", "object"]
    );
}

#[test]
fn linearization_is_deterministic() {
    fn build(vm: &mut Vm) -> Vec<String> {
        let base = class(vm, "Base", &[]);
        let left = class(vm, "Left", &[base]);
        let right = class(vm, "Right", &[base]);
        let mixin = class(vm, "Mixin", &[]);
        let leaf = class(vm, "Leaf", &[left, mixin, right]);
        let mro = vm.class_mro(leaf);
        names(vm, &mro)
    }
    let first = build(&mut Vm::new());
    let second = build(&mut Vm::new());
    assert_eq!(first, ["Leaf", "Left", "Mixin", "Right", "Base", "object"]);
    assert_eq!(first, second);
}

#[test]
fn inconsistent_hierarchy_is_rejected() {
    let mut vm = Vm::new();
    let x = class(&mut vm, "X", &[]);
    let y = class(&mut vm, "Y", &[]);
    let a = class(&mut vm, "A", &[x, y]);
    let b = class(&mut vm, "B", &[y, x]);

    let result = vm.create_class("Z", &[a, b], AttrMap::default(), None);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.type_name(), "TypeError");
    assert_eq!(exc.kind(), ErrorKind::InconsistentHierarchy);
    assert!(
        exc.message()
            .is_some_and(|m| m.starts_with("Cannot create a consistent method resolution order (MRO)")),
        "{exc}"
    );
}

#[test]
fn duplicate_base_is_rejected() {
    let mut vm = Vm::new();
    let a = class(&mut vm, "A", &[]);

    let result = vm.create_class("B", &[a, a], AttrMap::default(), None);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: duplicate base class A");
}

#[test]
fn builtin_value_types_are_not_subclassable() {
    let mut vm = Vm::new();
    let int = builtin(&mut vm, "int");

    let result = vm.create_class("MyInt", &[int], AttrMap::default(), None);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: type 'int' is not an acceptable base type");
}

#[test]
fn most_derived_metaclass_wins() {
    let mut vm = Vm::new();
    let type_class = vm.type_class();
    let meta = class(&mut vm, "Meta", &[type_class]);
    let sub_meta = class(&mut vm, "SubMeta", &[meta]);

    let a = vm.create_class("A", &[], AttrMap::default(), Some(meta)).unwrap();
    let b = vm.create_class("B", &[], AttrMap::default(), Some(sub_meta)).unwrap();
    let c = class(&mut vm, "C", &[a, b]);

    let c_meta = vm.class_metaclass(c).unwrap();
    assert!(c_meta.is(sub_meta));
    let bases = vm.class_bases(c);
    assert_eq!(names(&mut vm, &bases), ["A", "B"]);
}

#[test]
fn unrelated_metaclasses_conflict() {
    let mut vm = Vm::new();
    let type_class = vm.type_class();
    let meta1 = class(&mut vm, "Meta1", &[type_class]);
    let meta2 = class(&mut vm, "Meta2", &[type_class]);
    let a = vm.create_class("A", &[], AttrMap::default(), Some(meta1)).unwrap();
    let b = vm.create_class("B", &[], AttrMap::default(), Some(meta2)).unwrap();

    let result = vm.create_class("C", &[a, b], AttrMap::default(), None);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.type_name(), "TypeError");
    assert!(exc.message().is_some_and(|m| m.starts_with("metaclass conflict")), "{exc}");
}

#[test]
fn subclass_relation_follows_mro() {
    let mut vm = Vm::new();
    let a = class(&mut vm, "A", &[]);
    let b = class(&mut vm, "B", &[a]);
    let unrelated = class(&mut vm, "Unrelated", &[]);
    let (a_id, b_id, unrelated_id) = (a.ref_id().unwrap(), b.ref_id().unwrap(), unrelated.ref_id().unwrap());

    assert!(vm.is_subclass(b_id, a_id).unwrap());
    assert!(vm.is_subclass(a_id, a_id).unwrap());
    assert!(!vm.is_subclass(a_id, b_id).unwrap());
    assert!(!vm.is_subclass(unrelated_id, a_id).unwrap());

    let instance = vm.call(b, pyrite::ArgValues::empty()).unwrap();
    assert!(vm.is_instance(instance, a).unwrap());
    let object = vm.object_class();
    assert!(vm.is_instance(instance, object).unwrap());
    assert!(!vm.is_instance(instance, unrelated).unwrap());
}
