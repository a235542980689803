//! Helpers shared by the integration tests: VM setup, class creation and small code
//! objects assembled with `CodeBuilder`.
#![allow(dead_code)]

use std::rc::Rc;

use pyrite::{AttrMap, CodeBuilder, CollectStringPrint, Exception, MakeFunctionFlags, RunError, Value, Vm};

/// A VM whose `print` output is captured.
pub fn vm_with_output() -> (Vm, CollectStringPrint) {
    let print = CollectStringPrint::new();
    let vm = Vm::new().with_print(Box::new(print.clone()));
    (vm, print)
}

/// A builtin by name, e.g. `property` or `ValueError`.
pub fn builtin(vm: &mut Vm, name: &str) -> Value {
    let builtins = vm.import("builtins").expect("builtins module");
    vm.global(builtins, name)
        .unwrap_or_else(|| panic!("no builtin named {name}"))
}

/// A module-level name from a registered module, e.g. `("enum", "Enum")`.
pub fn module_attr(vm: &mut Vm, module: &str, name: &str) -> Value {
    let module_value = vm.import(module).unwrap_or_else(|_| panic!("module {module} not registered"));
    vm.global(module_value, name)
        .unwrap_or_else(|| panic!("{module} has no attribute {name}"))
}

/// `class name(*bases): pass`
pub fn class(vm: &mut Vm, name: &str, bases: &[Value]) -> Value {
    class_with(vm, name, bases, &[])
}

/// A class whose namespace holds `attrs`.
pub fn class_with(vm: &mut Vm, name: &str, bases: &[Value], attrs: &[(&str, Value)]) -> Value {
    let namespace: AttrMap = attrs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect();
    vm.create_class(name, bases, namespace, None)
        .unwrap_or_else(|err| panic!("creating {name} failed: {}", vm.to_exception(err)))
}

/// Turns a code object into a guest function by running `def` in a scratch module.
pub fn function(vm: &mut Vm, code: pyrite::Code) -> Value {
    let mut module = CodeBuilder::new("<module>");
    module
        .make_function(code, 0)
        .store_global("f")
        .load_none()
        .return_value();
    let module = run(vm, module);
    vm.global(module, "f").expect("function stored")
}

/// Like [`function`], with positional defaults.
pub fn function_with_defaults(vm: &mut Vm, code: pyrite::Code, defaults: &[i64]) -> Value {
    let mut module = CodeBuilder::new("<module>");
    for default in defaults {
        module.load_int(*default);
    }
    module
        .emit_u16(pyrite::Opcode::BuildTuple, defaults.len() as u16)
        .make_function(code, MakeFunctionFlags::DEFAULTS)
        .store_global("f")
        .load_none()
        .return_value();
    let module = run(vm, module);
    vm.global(module, "f").expect("function stored")
}

/// Runs a module body to completion, panicking with the traceback on failure.
pub fn run(vm: &mut Vm, module: CodeBuilder) -> Value {
    vm.run_module("test", Rc::new(module.build()))
        .unwrap_or_else(|exc| panic!("module raised:\n{exc}"))
}

/// Runs a module body that is expected to raise.
pub fn run_err(vm: &mut Vm, module: CodeBuilder) -> Exception {
    match vm.run_module("test", Rc::new(module.build())) {
        Ok(_) => panic!("module completed without raising"),
        Err(exc) => exc,
    }
}

/// Unwraps the error of a host-side call.
pub fn expect_err<T: std::fmt::Debug>(vm: &mut Vm, result: Result<T, RunError>) -> Exception {
    match result {
        Ok(value) => panic!("expected an error, got {value:?}"),
        Err(err) => vm.to_exception(err),
    }
}

/// Unwraps a host-side call, panicking with the guest traceback.
pub fn ok<T>(vm: &mut Vm, result: Result<T, RunError>) -> T {
    result.unwrap_or_else(|err| panic!("unexpected error:\n{}", vm.to_exception(err)))
}

pub fn string(vm: &Vm, value: Value) -> String {
    vm.str_value(value)
        .unwrap_or_else(|| panic!("not a str: {value:?}"))
        .to_owned()
}

pub fn repr(vm: &mut Vm, value: Value) -> String {
    let result = vm.repr_of(value);
    ok(vm, result)
}

pub fn attr(vm: &mut Vm, obj: Value, name: &str) -> Value {
    let result = vm.get_attr(obj, name);
    ok(vm, result)
}

pub fn call(vm: &mut Vm, callable: Value, args: pyrite::ArgValues) -> Value {
    let result = vm.call(callable, args);
    ok(vm, result)
}

/// `__name__` of each class.
pub fn names(vm: &mut Vm, classes: &[Value]) -> Vec<String> {
    classes
        .iter()
        .map(|&cls| {
            let name = attr(vm, cls, "__name__");
            string(vm, name)
        })
        .collect()
}
