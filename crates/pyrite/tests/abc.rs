mod common;

use common::{attr, builtin, call, class, class_with, expect_err, function, module_attr, names, string};
use pretty_assertions::assert_eq;
use pyrite::{ArgValues, CodeBuilder, ErrorKind, Opcode, Value, Vm};

/// `def <name>(self): return <text>`
fn returns_str(vm: &mut Vm, name: &str, text: &str) -> Value {
    let mut code = CodeBuilder::new(name).with_params(&["self"]);
    code.load_str(text).return_value();
    function(vm, code.build())
}

fn abstract_method(vm: &mut Vm, name: &str) -> Value {
    let abstractmethod = module_attr(vm, "abc", "abstractmethod");
    let func = returns_str(vm, name, "");
    call(vm, abstractmethod, ArgValues::one(func))
}

/// `class Animal(ABC): @abstractmethod def speak(self): ...`
/// `class Dog(Animal): def speak(self): return "woof"`
fn animals(vm: &mut Vm) -> (Value, Value) {
    let abc = module_attr(vm, "abc", "ABC");
    let speak = abstract_method(vm, "speak");
    let animal = class_with(vm, "Animal", &[abc], &[("speak", speak)]);
    let woof = returns_str(vm, "speak", "woof");
    let dog = class_with(vm, "Dog", &[animal], &[("speak", woof)]);
    (animal, dog)
}

#[test]
fn abstract_classes_refuse_instantiation() {
    let mut vm = Vm::new();
    let (animal, dog) = animals(&mut vm);

    assert_eq!(vm.abstract_methods(animal), ["speak"]);
    let speak = attr(&mut vm, animal, "speak");
    assert_eq!(attr(&mut vm, speak, "__isabstractmethod__"), Value::Bool(true));

    let result = vm.call(animal, ArgValues::empty());
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.kind(), ErrorKind::AbstractInstantiation);
    assert_eq!(
        exc.summary(),
        "TypeError: Can't instantiate abstract class Animal without an implementation for abstract method 'speak'"
    );

    assert!(vm.abstract_methods(dog).is_empty());
    let rex = call(&mut vm, dog, ArgValues::empty());
    let sound = vm.call_method(rex, "speak", ArgValues::empty()).unwrap();
    assert_eq!(string(&vm, sound), "woof");
}

#[test]
fn partially_implemented_subclasses_stay_abstract() {
    let mut vm = Vm::new();
    let abc = module_attr(&mut vm, "abc", "ABC");
    let (open, close) = (abstract_method(&mut vm, "open"), abstract_method(&mut vm, "close"));
    let resource = class_with(&mut vm, "Resource", &[abc], &[("open", open), ("close", close)]);
    let opened = returns_str(&mut vm, "open", "opened");
    let half = class_with(&mut vm, "Half", &[resource], &[("open", opened)]);

    assert_eq!(vm.abstract_methods(resource), ["close", "open"]);
    assert_eq!(vm.abstract_methods(half), ["close"]);
    let result = vm.call(half, ArgValues::empty());
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.message(),
        Some("Can't instantiate abstract class Half without an implementation for abstract method 'close'")
    );
}

#[test]
fn update_abstractmethods_sees_patched_classes() {
    let mut vm = Vm::new();
    let (_, dog) = animals(&mut vm);
    let fetch = abstract_method(&mut vm, "fetch");
    vm.set_attr(dog, "fetch", fetch).unwrap();

    let update = module_attr(&mut vm, "abc", "update_abstractmethods");
    let returned = call(&mut vm, update, ArgValues::one(dog));
    assert!(returned.is(dog));
    assert_eq!(vm.abstract_methods(dog), ["fetch"]);
}

#[test]
fn registered_virtual_subclasses() {
    let mut vm = Vm::new();
    let (animal, _) = animals(&mut vm);
    let robot = class(&mut vm, "Robot", &[]);
    let robot_id = robot.ref_id().unwrap();
    let animal_id = animal.ref_id().unwrap();
    let unit = call(&mut vm, robot, ArgValues::empty());

    assert!(!vm.is_subclass(robot_id, animal_id).unwrap());
    let registered = vm.call_method(animal, "register", ArgValues::one(robot)).unwrap();
    assert!(registered.is(robot));

    assert!(vm.is_subclass(robot_id, animal_id).unwrap());
    assert!(vm.is_instance(unit, animal).unwrap());
    let isinstance = builtin(&mut vm, "isinstance");
    assert_eq!(call(&mut vm, isinstance, ArgValues::two(unit, animal)), Value::Bool(true));
    // registration does not touch the MRO
    let mro = vm.class_mro(robot);
    assert_eq!(mro.len(), 2);

    let result = vm.call_method(animal, "register", ArgValues::one(Value::Int(3)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: Can only register classes");
}

#[test]
fn registration_on_a_subclass_reaches_its_bases() {
    let mut vm = Vm::new();
    let (animal, dog) = animals(&mut vm);
    let robot = class(&mut vm, "RoboDog", &[]);
    let (robot_id, animal_id) = (robot.ref_id().unwrap(), animal.ref_id().unwrap());

    vm.call_method(dog, "register", ArgValues::one(robot)).unwrap();
    assert!(vm.is_subclass(robot_id, animal_id).unwrap());
    let unit = call(&mut vm, robot, ArgValues::empty());
    assert!(vm.is_instance(unit, animal).unwrap());

    let subclasses = vm.call_method(animal, "__subclasses__", ArgValues::empty()).unwrap();
    let subclasses = vm.collect_iter(subclasses).unwrap();
    assert_eq!(names(&mut vm, &subclasses), ["Dog"]);
}

#[test]
fn subclass_hook_decides_structural_checks() {
    let mut vm = Vm::new();
    // @classmethod
    // def __subclasshook__(cls, C):
    //     if hasattr(C, "quack"): return True
    //     return NotImplemented
    let mut hook = CodeBuilder::new("__subclasshook__").with_params(&["cls", "C"]);
    let fallback = hook.new_label();
    hook.load_global("hasattr")
        .load_local("C")
        .load_str("quack")
        .call(2)
        .emit_jump(Opcode::PopJumpIfFalse, fallback)
        .emit(Opcode::LoadTrue)
        .return_value()
        .bind(fallback)
        .load_global("NotImplemented")
        .return_value();
    let hook = function(&mut vm, hook.build());
    let classmethod = builtin(&mut vm, "classmethod");
    let hook = call(&mut vm, classmethod, ArgValues::one(hook));
    let abc = module_attr(&mut vm, "abc", "ABC");
    let quacker = class_with(&mut vm, "Quacker", &[abc], &[("__subclasshook__", hook)]);

    let duck = class_with(&mut vm, "Duck", &[], &[("quack", Value::Int(1))]);
    let stone = class(&mut vm, "Stone", &[]);
    let (quacker_id, duck_id, stone_id) = (
        quacker.ref_id().unwrap(),
        duck.ref_id().unwrap(),
        stone.ref_id().unwrap(),
    );

    assert!(vm.is_subclass(duck_id, quacker_id).unwrap());
    assert!(!vm.is_subclass(stone_id, quacker_id).unwrap());
    let donald = call(&mut vm, duck, ArgValues::empty());
    assert!(vm.is_instance(donald, quacker).unwrap());
}
