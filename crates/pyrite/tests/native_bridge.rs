mod common;

use common::{attr, call, expect_err, run, run_err, string, vm_with_output};
use pretty_assertions::assert_eq;
use pyrite::{
    ArgValues, Arity, BinaryOp, CallContext, CodeBuilder, CodeKind, ErrorKind, GeneratorState, HostData, NativeMember,
    Object, Opcode, RunResult, Value, Vm,
};

fn add(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    ctx.check_no_kwargs()?;
    let sum = ctx.arg_int(0)? + ctx.arg_int(1)?;
    ctx.ret(Value::Int(sum))
}

/// `divmod`-like: pushes two results, which come back as a tuple.
fn split(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(2, Some(2))?;
    let (a, b) = (ctx.arg_int(0)?, ctx.arg_int(1)?);
    ctx.push(Value::Int(a / b));
    ctx.push(Value::Int(a % b));
    Ok(2)
}

fn greet(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    ctx.check_kwargs(&["punctuation"])?;
    let name = ctx.arg_str(0)?;
    let punctuation = match ctx.kwarg("punctuation") {
        Some(value) => ctx.vm_ref().str_value(value).unwrap_or("!").to_owned(),
        None => "!".to_owned(),
    };
    let text = ctx.vm().new_str(format!("hello {name}{punctuation}"))?;
    ctx.ret(text)
}

fn nothing(_ctx: &mut CallContext<'_>) -> RunResult<usize> {
    Ok(0)
}

fn explode(_ctx: &mut CallContext<'_>) -> RunResult<usize> {
    panic!("wires crossed");
}

fn build_math(vm: &mut Vm) -> Value {
    let mut module = vm.module_builder("mathx");
    module
        .function("add", Arity::exact(2), add)
        .function("split", Arity::exact(2), split)
        .function("greet", Arity::exact(1), greet)
        .function("nothing", Arity::exact(0), nothing)
        .function("explode", Arity::ANY, explode)
        .constant("answer", Value::Int(42));
    module.build()
}

#[test]
fn native_results_map_to_values() {
    let mut vm = Vm::new();
    let math = build_math(&mut vm);

    let add = vm.global(math, "add").unwrap();
    assert_eq!(call(&mut vm, add, ArgValues::two(Value::Int(2), Value::Int(3))), Value::Int(5));

    let split = vm.global(math, "split").unwrap();
    let pair = call(&mut vm, split, ArgValues::two(Value::Int(17), Value::Int(5)));
    assert_eq!(vm.sequence_items(pair).unwrap(), [Value::Int(3), Value::Int(2)]);

    let nothing = vm.global(math, "nothing").unwrap();
    assert!(call(&mut vm, nothing, ArgValues::empty()).is_none());
    assert_eq!(vm.global(math, "answer"), Some(Value::Int(42)));
}

#[test]
fn natives_validate_their_own_arguments() {
    let mut vm = Vm::new();
    let math = build_math(&mut vm);
    let add = vm.global(math, "add").unwrap();

    let result = vm.call(add, ArgValues::one(Value::Int(1)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: add() takes exactly 2 arguments (1 given)");
    assert_eq!(exc.kind(), ErrorKind::ArityMismatch);

    let text = vm.new_str("x").unwrap();
    let result = vm.call(add, ArgValues::two(Value::Int(1), text));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: add() argument 2 must be int, not str");

    let greet = vm.global(math, "greet").unwrap();
    let name = vm.new_str("bob").unwrap();
    let result = vm.call(greet, ArgValues::one(name).kwarg("volume", Value::Int(3)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: greet() got an unexpected keyword argument 'volume'");
}

#[test]
fn keyword_arguments_reach_natives() {
    let mut vm = Vm::new();
    let math = build_math(&mut vm);
    let greet = vm.global(math, "greet").unwrap();
    let name = vm.new_str("ada").unwrap();
    let question = vm.new_str("?").unwrap();

    let plain = call(&mut vm, greet, ArgValues::one(name));
    assert_eq!(string(&vm, plain), "hello ada!");
    let asked = call(&mut vm, greet, ArgValues::one(name).kwarg("punctuation", question));
    assert_eq!(string(&vm, asked), "hello ada?");
}

#[test]
fn panics_become_system_errors() {
    let mut vm = Vm::new();
    build_math(&mut vm);
    // import mathx; mathx.explode()
    let mut module = CodeBuilder::new("<module>");
    let mathx = module.name("mathx");
    module
        .emit_u16(Opcode::ImportName, mathx)
        .load_attr("explode")
        .call(0)
        .return_value();

    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "SystemError: native function panicked: wires crossed");

    // the VM is still usable afterwards
    // from mathx import add; result = add(20, 22)
    let mut module = CodeBuilder::new("<module>");
    let (mathx, add) = (module.name("mathx"), module.name("add"));
    module
        .emit_u16(Opcode::ImportName, mathx)
        .emit_u16(Opcode::ImportFrom, add)
        .store_global("add")
        .emit(Opcode::Pop)
        .load_global("add")
        .load_int(20)
        .load_int(22)
        .call(2)
        .store_global("result")
        .load_none()
        .return_value();
    let module = run(&mut vm, module);
    assert_eq!(vm.global(module, "result"), Some(Value::Int(42)));

    let mut missing = CodeBuilder::new("<module>");
    let (mathx, nope) = (missing.name("mathx"), missing.name("nope"));
    missing
        .emit_u16(Opcode::ImportName, mathx)
        .emit_u16(Opcode::ImportFrom, nope)
        .return_value();
    let exc = run_err(&mut vm, missing);
    assert_eq!(exc.summary(), "ImportError: cannot import name 'nope' from 'mathx'");
}

#[test]
fn importing_unknown_module_fails() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    let idx = module.name("nope");
    module.emit_u16(Opcode::ImportName, idx).return_value();

    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "ModuleNotFoundError: No module named 'nope'");
}

fn counter_init(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(2))?;
    let this = ctx.arg(0)?;
    let start = match ctx.arg_opt(1) {
        Some(_) => ctx.arg_int(1)?,
        None => 0,
    };
    ctx.vm().set_attr(this, "count", Value::Int(start))?;
    Ok(0)
}

fn counter_bump(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    let this = ctx.arg(0)?;
    let vm = ctx.vm();
    let count = vm.get_attr(this, "count")?.as_int().unwrap_or(0) + 1;
    vm.set_attr(this, "count", Value::Int(count))?;
    ctx.ret(Value::Int(count))
}

fn counter_doubled(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let this = ctx.arg(0)?;
    let count = ctx.vm().get_attr(this, "count")?.as_int().unwrap_or(0);
    ctx.ret(Value::Int(count * 2))
}

fn counter_describe(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.arg_class(0)?;
    let text = ctx.vm().new_str("counts things")?;
    ctx.ret(text)
}

const COUNTER_MEMBERS: &[NativeMember] = &[
    NativeMember::method("__init__", Arity::range(1, 2), counter_init),
    NativeMember::method("bump", Arity::exact(1), counter_bump),
    NativeMember::property("doubled", counter_doubled),
    NativeMember::class_method("describe", Arity::exact(1), counter_describe),
];

#[test]
fn native_classes_behave_like_guest_classes() {
    let mut vm = Vm::new();
    let counter = vm.new_native_class("Counter", &[], None, COUNTER_MEMBERS).unwrap();
    let obj = call(&mut vm, counter, ArgValues::one(Value::Int(5)));

    assert_eq!(vm.call_method(obj, "bump", ArgValues::empty()).unwrap(), Value::Int(6));
    assert_eq!(attr(&mut vm, obj, "doubled"), Value::Int(12));
    let description = vm.call_method(counter, "describe", ArgValues::empty()).unwrap();
    assert_eq!(string(&vm, description), "counts things");

    // guest code can subclass it
    let sub = common::class(&mut vm, "SubCounter", &[counter]);
    let child = call(&mut vm, sub, ArgValues::empty());
    assert_eq!(vm.call_method(child, "bump", ArgValues::empty()).unwrap(), Value::Int(1));
    assert!(vm.is_instance(child, counter).unwrap());
}

#[test]
fn builtins_are_visible_to_every_module() {
    let (mut vm, output) = vm_with_output();
    let add = vm.new_native_function("add", Arity::exact(2), add);
    vm.set_builtin("host_add", add);

    let mut module = CodeBuilder::new("<module>");
    module
        .load_global("print")
        .load_global("host_add")
        .load_int(1)
        .load_int(2)
        .call(2)
        .load_str("done")
        .call(2)
        .emit(Opcode::Pop)
        .load_none()
        .return_value();
    run(&mut vm, module);

    assert_eq!(output.output(), "3 done\n");
}

#[test]
fn objects_cross_the_boundary() {
    let mut vm = Vm::new();
    let input = Object::Dict(vec![
        (Object::from("name"), Object::from("widget")),
        (Object::from("sizes"), Object::from(vec![1_i64, 2, 3])),
        (Object::from("tag"), Object::Tuple(vec![Object::None, Object::Bool(true)])),
    ]);
    let value = vm.from_object(&input).unwrap();
    assert_eq!(vm.len_of(value).unwrap(), 3);
    assert_eq!(vm.to_object(value).unwrap(), input);
    assert_eq!(common::repr(&mut vm, value), input.to_string());

    // a list that contains itself
    let list = vm.new_list(vec![Value::Int(1)]).unwrap();
    let appended = vm.call_method(list, "append", ArgValues::one(list));
    common::ok(&mut vm, appended);
    assert_eq!(
        vm.to_object(list).unwrap(),
        Object::List(vec![Object::Int(1), Object::Repr("[...]".to_owned())])
    );

    let err = vm.from_object(&Object::Repr("<object>".to_owned())).unwrap_err();
    assert_eq!(err.type_name(), "TypeError");
}

#[derive(Debug)]
struct Handle {
    id: u32,
}

impl HostData for Handle {
    fn type_name(&self) -> &str {
        "Handle"
    }
}

#[test]
fn host_data_round_trips() {
    let mut vm = Vm::new();
    let handle = vm.new_host_extension(Box::new(Handle { id: 7 })).unwrap();

    assert_eq!(vm.host_data::<Handle>(handle).map(|h| h.id), Some(7));
    assert_eq!(vm.type_name(handle), "Handle");
    let not_handle = vm.new_str("x").unwrap();
    assert!(vm.host_data::<Handle>(not_handle).is_none());
}

/// Host data whose type name panics the first time it is asked for.
#[derive(Debug)]
struct Fuse {
    armed: std::cell::Cell<bool>,
}

impl HostData for Fuse {
    fn type_name(&self) -> &str {
        if self.armed.replace(false) {
            panic!("fuse blown");
        }
        "Fuse"
    }
}

fn fuse(vm: &mut Vm) -> Value {
    let armed = std::cell::Cell::new(true);
    vm.new_host_extension(Box::new(Fuse { armed })).unwrap()
}

/// Resumes its generator argument twice.
fn drive(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    let generator = ctx.arg(0)?;
    ctx.vm().send(generator, Value::None)?;
    ctx.vm().send(generator, Value::None)?;
    ctx.ret(Value::None)
}

#[test]
fn panics_release_running_generators() {
    let mut vm = Vm::new();
    let fuse = fuse(&mut vm);
    vm.set_builtin("fuse", fuse);
    let mut empty = CodeBuilder::new("<module>");
    empty.load_none().return_value();
    let home = run(&mut vm, empty);

    // yield 1; fuse + 1; yield 2
    let mut body = CodeBuilder::new("gen").with_kind(CodeKind::Generator);
    body.load_int(1)
        .emit(Opcode::YieldValue)
        .emit(Opcode::Pop)
        .load_global("fuse")
        .load_int(1)
        .binary(BinaryOp::Add)
        .emit(Opcode::YieldValue)
        .emit(Opcode::Pop)
        .load_none()
        .return_value();
    let generator = vm.create_generator(home, std::rc::Rc::new(body.build())).unwrap();

    let mut hostx = vm.module_builder("hostx");
    hostx.function("drive", Arity::exact(1), drive);
    let hostx = hostx.build();
    let drive = attr(&mut vm, hostx, "drive");
    let result = vm.call(drive, ArgValues::one(generator));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "SystemError: native function panicked: fuse blown");

    // the generator's frame went with the panic
    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Exhausted));
    let result = vm.send(generator, Value::None);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "StopIteration");
}

#[test]
fn panics_inside_repr_do_not_leave_it_guarded() {
    let mut vm = Vm::new();
    let fuse = fuse(&mut vm);
    let items = vm.new_list(vec![fuse]).unwrap();
    vm.set_builtin("items", items);

    // repr(items)
    let mut module = CodeBuilder::new("<module>");
    module.load_global("repr").load_global("items").call(1).return_value();
    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "SystemError: native function panicked: fuse blown");

    // a stale guard would print the list as `[...]`
    let text = vm.repr_of(items).unwrap();
    assert!(text.starts_with("[<Fuse object at "), "{text}");
}
