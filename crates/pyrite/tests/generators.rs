mod common;

use std::rc::Rc;

use common::{builtin, expect_err, run, string};
use pretty_assertions::assert_eq;
use pyrite::{
    BinaryOp, CodeBuilder, CodeKind, ErrorKind, ExcType, GeneratorState, Label, Opcode, Resumption, Value, Vm,
};

/// ```text
/// def gen():
///     x = yield 1
///     yield x * 2
///     return "done"
/// ```
fn echo_generator() -> pyrite::Code {
    let mut code = CodeBuilder::new("gen").with_kind(CodeKind::Generator);
    code.load_int(1)
        .emit(Opcode::YieldValue)
        .store_local("x")
        .load_local("x")
        .load_int(2)
        .binary(BinaryOp::Mul)
        .emit(Opcode::YieldValue)
        .emit(Opcode::Pop)
        .load_str("done")
        .return_value();
    code.build()
}

fn empty_module(vm: &mut Vm) -> Value {
    let mut module = CodeBuilder::new("<module>");
    module.load_none().return_value();
    run(vm, module)
}

#[test]
fn send_protocol() {
    let mut vm = Vm::new();
    let module = empty_module(&mut vm);
    let generator = vm.create_generator(module, Rc::new(echo_generator())).unwrap();
    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Created));

    // the first value is discarded
    let first = vm.send(generator, Value::Int(99)).unwrap();
    assert_eq!(first, Resumption::Yielded(Value::Int(1)));
    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Suspended));

    let second = vm.send(generator, Value::Int(21)).unwrap();
    assert_eq!(second.into_pair(), (Value::Int(42), false));

    let last = vm.send(generator, Value::None).unwrap();
    assert!(last.is_done());
    assert_eq!(string(&vm, last.value()), "done");
    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Exhausted));

    let result = vm.send(generator, Value::None);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.type_name(), "StopIteration");
    assert_eq!(exc.kind(), ErrorKind::StopIteration);
}

#[test]
fn for_loop_consumes_generator_function() {
    let mut vm = Vm::new();
    // def count(): yield 1; yield 2; yield 3
    let mut count = CodeBuilder::new("count").with_kind(CodeKind::Generator);
    for i in 1..=3 {
        count.load_int(i).emit(Opcode::YieldValue).emit(Opcode::Pop);
    }
    count.load_none().return_value();

    // total = 0
    // for v in count(): total = total + v
    let mut module = CodeBuilder::new("<module>");
    let (top, done): (Label, Label) = (module.new_label(), module.new_label());
    module
        .make_function(count.build(), 0)
        .store_global("count")
        .load_int(0)
        .store_global("total")
        .load_global("count")
        .call(0)
        .emit(Opcode::GetIter)
        .bind(top)
        .emit_jump(Opcode::ForIter, done)
        .load_global("total")
        .emit(Opcode::RotTwo)
        .binary(BinaryOp::Add)
        .store_global("total")
        .emit_jump(Opcode::Jump, top)
        .bind(done)
        .load_none()
        .return_value();
    let module = run(&mut vm, module);

    assert_eq!(vm.global(module, "total"), Some(Value::Int(6)));
}

#[test]
fn yield_from_forwards_sends_and_returns_result() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    // def inner(): x = yield "ready"; return x + 1
    let mut inner = CodeBuilder::new("inner").with_kind(CodeKind::Generator);
    inner
        .load_str("ready")
        .emit(Opcode::YieldValue)
        .load_int(1)
        .binary(BinaryOp::Add)
        .return_value();
    // def outer(): r = yield from inner(); yield r
    let mut outer = CodeBuilder::new("outer").with_kind(CodeKind::Generator);
    outer
        .load_global("inner")
        .call(0)
        .emit(Opcode::GetYieldFromIter)
        .load_none()
        .emit(Opcode::YieldFrom)
        .emit(Opcode::YieldValue)
        .emit(Opcode::Pop)
        .load_none()
        .return_value();
    module
        .make_function(inner.build(), 0)
        .store_global("inner")
        .make_function(outer.build(), 0)
        .store_global("outer")
        .load_none()
        .return_value();
    let module = run(&mut vm, module);

    let outer = vm.global(module, "outer").unwrap();
    let generator = vm.call(outer, pyrite::ArgValues::empty()).unwrap();
    let ready = vm.send(generator, Value::None).unwrap();
    assert_eq!(string(&vm, ready.value()), "ready");
    let forwarded = vm.send(generator, Value::Int(41)).unwrap();
    assert_eq!(forwarded, Resumption::Yielded(Value::Int(42)));
    let finished = vm.send(generator, Value::None).unwrap();
    assert_eq!(finished, Resumption::Returned(Value::None));
}

#[test]
fn await_chain_runs_to_completion() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    // async def inner(): return 5
    let mut inner = CodeBuilder::new("inner").with_kind(CodeKind::Coroutine);
    inner.load_int(5).return_value();
    // async def outer(): return (await inner()) + 1
    let mut outer = CodeBuilder::new("outer").with_kind(CodeKind::Coroutine);
    outer
        .load_global("inner")
        .call(0)
        .emit(Opcode::GetAwaitable)
        .load_none()
        .emit(Opcode::YieldFrom)
        .load_int(1)
        .binary(BinaryOp::Add)
        .return_value();
    module
        .make_function(inner.build(), 0)
        .store_global("inner")
        .make_function(outer.build(), 0)
        .store_global("outer")
        .load_none()
        .return_value();
    let module = run(&mut vm, module);

    let outer = vm.global(module, "outer").unwrap();
    let coroutine = vm.call(outer, pyrite::ArgValues::empty()).unwrap();
    assert_eq!(vm.run_coroutine(coroutine).unwrap(), Value::Int(6));
}

#[test]
fn throw_into_suspended_generator() {
    let mut vm = Vm::new();
    let module = empty_module(&mut vm);
    let generator = vm.create_generator(module, Rc::new(echo_generator())).unwrap();
    vm.send(generator, Value::None).unwrap();

    let error = vm.new_exception(ExcType::ValueError, Some("boom")).unwrap();
    let result = vm.throw(generator, error);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "ValueError: boom");
    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Exhausted));
}

#[test]
fn throw_into_unstarted_generator_skips_body() {
    let mut vm = Vm::new();
    let module = empty_module(&mut vm);
    let generator = vm.create_generator(module, Rc::new(echo_generator())).unwrap();

    let error = vm.exception_class(ExcType::KeyError);
    let result = vm.throw(generator, error);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.type_name(), "KeyError");
    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Exhausted));
}

#[test]
fn close_finishes_generator() {
    let mut vm = Vm::new();
    let module = empty_module(&mut vm);
    let generator = vm.create_generator(module, Rc::new(echo_generator())).unwrap();
    vm.send(generator, Value::None).unwrap();

    assert_eq!(vm.close(generator).unwrap(), Value::None);
    assert_eq!(vm.generator_state(generator), Some(GeneratorState::Exhausted));
    // closing again is a no-op
    assert_eq!(vm.close(generator).unwrap(), Value::None);
}

#[test]
fn close_rejects_generator_that_keeps_yielding() {
    let mut vm = Vm::new();
    let module = empty_module(&mut vm);
    // def stubborn():
    //     while True:
    //         try: yield 1
    //         except GeneratorExit: pass
    let mut code = CodeBuilder::new("stubborn").with_kind(CodeKind::Generator);
    let (top, start, end, handler) = (code.new_label(), code.new_label(), code.new_label(), code.new_label());
    code.bind(top)
        .bind(start)
        .load_int(1)
        .emit(Opcode::YieldValue)
        .emit(Opcode::Pop)
        .bind(end)
        .emit_jump(Opcode::Jump, top)
        .bind(handler)
        .emit(Opcode::Pop)
        .emit(Opcode::PopExcept)
        .emit_jump(Opcode::Jump, top);
    code.add_handler(start, end, handler, 0);
    let generator = vm.create_generator(module, Rc::new(code.build())).unwrap();
    vm.send(generator, Value::None).unwrap();

    let result = vm.close(generator);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "RuntimeError: generator ignored GeneratorExit");
}

#[test]
fn builtin_next_and_send_methods() {
    let mut vm = Vm::new();
    let module = empty_module(&mut vm);
    let generator = vm.create_generator(module, Rc::new(echo_generator())).unwrap();
    let next = builtin(&mut vm, "next");

    let first = vm.call(next, pyrite::ArgValues::one(generator)).unwrap();
    assert_eq!(first, Value::Int(1));
    let second = vm.call_method(generator, "send", pyrite::ArgValues::one(Value::Int(5))).unwrap();
    assert_eq!(second, Value::Int(10));

    // the guest-level send reports the return value through StopIteration
    let result = vm.call_method(generator, "send", pyrite::ArgValues::one(Value::None));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "StopIteration: done");

    let result = vm.call(next, pyrite::ArgValues::one(generator));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "StopIteration");
    let fallback = vm.call(next, pyrite::ArgValues::two(generator, Value::Int(0))).unwrap();
    assert_eq!(fallback, Value::Int(0));
}

#[test]
fn unstarted_generator_rejects_non_none_guest_send() {
    let mut vm = Vm::new();
    let module = empty_module(&mut vm);
    let generator = vm.create_generator(module, Rc::new(echo_generator())).unwrap();

    let result = vm.call_method(generator, "send", pyrite::ArgValues::one(Value::Int(1)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.summary(),
        "TypeError: can't send non-None value to a just-started generator"
    );
}
