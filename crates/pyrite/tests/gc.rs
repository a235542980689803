mod common;

use common::{attr, call, class, repr, run};
use pretty_assertions::assert_eq;
use pyrite::{
    ArgValues, CodeBuilder, CodeKind, GeneratorState, HostData, Opcode, ResourceLimits, Resumption, Value, Vm,
};

#[test]
fn unreachable_cycles_are_freed() {
    let mut vm = Vm::new();
    let baseline = vm.heap_stats().live_objects;

    // a = []; a.append(a), then dropped
    let cycle = vm.new_list(vec![]).unwrap();
    vm.call_method(cycle, "append", ArgValues::one(cycle)).unwrap();
    // two instances pointing at each other
    let node = class(&mut vm, "Node", &[]);
    let first = call(&mut vm, node, ArgValues::empty());
    let second = call(&mut vm, node, ArgValues::empty());
    vm.set_attr(first, "other", second).unwrap();
    vm.set_attr(second, "other", first).unwrap();

    let kept = vm.new_str("kept").unwrap();
    let kept_list = vm.new_list(vec![kept, Value::Int(1)]).unwrap();
    let before = vm.heap_stats();
    assert!(before.live_objects > baseline);
    let instances_before = before.by_kind.get("instance").copied().unwrap_or(0);
    assert!(instances_before >= 2);

    let freed = vm.collect_garbage(&[kept_list]);
    assert!(freed >= 4, "freed {freed}");

    let after = vm.heap_stats();
    assert_eq!(after.live_objects, before.live_objects - freed);
    let instances_after = after.by_kind.get("instance").copied().unwrap_or(0);
    assert!(instances_after + 2 <= instances_before);
    assert!(after.free_slots >= freed);
    // the root and everything it holds survive
    assert_eq!(repr(&mut vm, kept_list), "['kept', 1]");
}

#[test]
fn freed_slots_are_reused() {
    let mut vm = Vm::new();
    for i in 0..10 {
        vm.new_str(format!("garbage {i}")).unwrap();
    }
    vm.collect_garbage(&[]);
    let free = vm.heap_stats().free_slots;
    assert!(free >= 10);

    let reused = vm.new_str("fresh").unwrap();
    assert_eq!(vm.heap_stats().free_slots, free - 1);
    assert_eq!(vm.str_value(reused), Some("fresh"));
}

#[test]
fn modules_and_their_globals_are_roots() {
    let mut vm = Vm::new();
    // box = [1, 2]; Point = class Point
    let mut module = CodeBuilder::new("<module>");
    module
        .load_int(1)
        .load_int(2)
        .emit_u16(Opcode::BuildList, 2)
        .store_global("box")
        .load_none()
        .return_value();
    let module = run(&mut vm, module);
    let point = class(&mut vm, "Point", &[]);
    vm.set_attr(module, "Point", point).unwrap();

    vm.collect_garbage(&[]);

    let boxed = vm.global(module, "box").unwrap();
    assert_eq!(repr(&mut vm, boxed), "[1, 2]");
    let point = vm.global(module, "Point").unwrap();
    let name = attr(&mut vm, point, "__name__");
    assert_eq!(vm.str_value(name), Some("Point"));
}

#[derive(Debug)]
struct Registry {
    entries: Vec<Value>,
}

impl HostData for Registry {
    fn type_name(&self) -> &str {
        "Registry"
    }

    fn child_values(&self) -> Vec<Value> {
        self.entries.clone()
    }
}

#[test]
fn host_extensions_keep_their_children_alive() {
    let mut vm = Vm::new();
    let entry = vm.new_str("entry").unwrap();
    let registry = vm.new_host_extension(Box::new(Registry { entries: vec![entry] })).unwrap();

    vm.collect_garbage(&[registry]);

    let entries = vm.host_data::<Registry>(registry).map(|r| r.entries.clone()).unwrap();
    assert_eq!(vm.str_value(entries[0]), Some("entry"));
}

#[test]
fn periodic_collection_runs_when_the_host_asks() {
    let mut vm = Vm::with_limits(ResourceLimits::new().gc_interval(8));
    let keep = vm.new_str("keep").unwrap();
    let free_before = vm.heap_stats().free_slots;
    for i in 0..20 {
        vm.new_str(format!("temp {i}")).unwrap();
    }
    let mut module = CodeBuilder::new("<module>");
    module.load_none().return_value();
    run(&mut vm, module);
    // running a module never collects by itself
    assert_eq!(vm.heap_stats().free_slots, free_before);

    let freed = vm.collect_if_due(&[keep]).expect("interval elapsed");
    assert!(freed >= 20);
    assert_eq!(vm.str_value(keep), Some("keep"));
    // the counter restarts after a collection
    assert_eq!(vm.collect_if_due(&[keep]), None);
}

/// `def gen(): yield 1; yield 2`
fn two_yields() -> std::rc::Rc<pyrite::Code> {
    let mut code = CodeBuilder::new("gen").with_kind(CodeKind::Generator);
    code.load_int(1)
        .emit(Opcode::YieldValue)
        .emit(Opcode::Pop)
        .load_int(2)
        .emit(Opcode::YieldValue)
        .emit(Opcode::Pop)
        .load_none()
        .return_value();
    std::rc::Rc::new(code.build())
}

#[test]
fn host_held_values_survive_later_modules() {
    let mut vm = Vm::with_limits(ResourceLimits::new().gc_interval(1));
    let mut empty = CodeBuilder::new("<module>");
    empty.load_none().return_value();
    let home = run(&mut vm, empty);
    let generator = vm.create_generator(home, two_yields()).unwrap();
    assert_eq!(vm.send(generator, Value::None).unwrap(), Resumption::Yielded(Value::Int(1)));

    let mut other = CodeBuilder::new("<module>");
    other
        .load_int(1)
        .emit_u16(Opcode::BuildList, 1)
        .emit(Opcode::Pop)
        .load_none()
        .return_value();
    vm.run_module("other", std::rc::Rc::new(other.build())).unwrap();

    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Suspended));
    assert_eq!(vm.send(generator, Value::None).unwrap(), Resumption::Yielded(Value::Int(2)));
}

#[test]
fn pinned_values_are_roots() {
    let mut vm = Vm::new();
    let node = class(&mut vm, "Node", &[]);
    let instance = call(&mut vm, node, ArgValues::empty());
    let payload = vm.new_str("payload").unwrap();
    vm.set_attr(instance, "payload", payload).unwrap();
    vm.pin(instance);
    vm.pin(instance);

    vm.collect_garbage(&[]);
    assert!(vm.unpin(instance));
    vm.collect_garbage(&[]);
    let kept = attr(&mut vm, instance, "payload");
    assert_eq!(vm.str_value(kept), Some("payload"));

    assert!(!vm.unpin(instance));
    let before = vm.heap_stats().live_objects;
    let freed = vm.collect_garbage(&[]);
    assert!(freed >= 2, "freed {freed}");
    assert_eq!(vm.heap_stats().live_objects, before - freed);
}
