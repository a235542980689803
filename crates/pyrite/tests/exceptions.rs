mod common;

use common::{attr, builtin, class, function, ok, run, run_err, string};
use pretty_assertions::assert_eq;
use pyrite::{BinaryOp, CodeBuilder, CompareOp, ErrorKind, ExcType, Opcode, ResourceLimits, Value, Vm};

/// Emits `try: <body> except <class_name> as e: <name> = e`.
///
/// Exceptions that do not match are re-raised.
fn try_except(module: &mut CodeBuilder, class_name: &str, store_as: &str, body: impl FnOnce(&mut CodeBuilder)) {
    let (start, end, handler, no_match, after) = (
        module.new_label(),
        module.new_label(),
        module.new_label(),
        module.new_label(),
        module.new_label(),
    );
    module.bind(start);
    body(module);
    module
        .bind(end)
        .emit_jump(Opcode::Jump, after)
        .bind(handler)
        .load_global(class_name)
        .emit(Opcode::CheckExcMatch)
        .emit_jump(Opcode::PopJumpIfFalse, no_match)
        .store_global(store_as)
        .emit(Opcode::PopExcept)
        .emit_jump(Opcode::Jump, after)
        .bind(no_match)
        .emit(Opcode::Reraise)
        .bind(after);
    module.add_handler(start, end, handler, 0);
}

/// `raise <class_name>(<message>)`
fn raise(module: &mut CodeBuilder, class_name: &str, message: &str) {
    module
        .load_global(class_name)
        .load_str(message)
        .call(1)
        .emit_u8(Opcode::Raise, 1);
}

#[test]
fn except_clause_catches_matching_class() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    try_except(&mut module, "LookupError", "caught", |m| raise(m, "KeyError", "missing"));
    module.load_none().return_value();
    let module = run(&mut vm, module);

    let caught = vm.global(module, "caught").unwrap();
    let key_error = vm.exception_class(ExcType::KeyError);
    assert!(vm.is_instance(caught, key_error).unwrap());
    let args = attr(&mut vm, caught, "args");
    let args = vm.sequence_items(args).unwrap();
    assert_eq!(string(&vm, args[0]), "missing");
}

#[test]
fn non_matching_handler_reraises() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    try_except(&mut module, "KeyError", "caught", |m| raise(m, "ValueError", "bad value"));
    module.load_none().return_value();

    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "ValueError: bad value");
    assert_eq!(exc.kind(), ErrorKind::Other);
}

#[test]
fn traceback_lists_frames_outermost_first() {
    let mut vm = Vm::new();
    // line 2: def divide(): return 1 / 0
    let mut divide = CodeBuilder::new("divide").with_filename("prog.py");
    divide
        .set_line(2)
        .load_int(1)
        .load_int(0)
        .binary(BinaryOp::TrueDiv)
        .return_value();
    let mut module = CodeBuilder::new("<module>").with_filename("prog.py");
    module
        .set_line(1)
        .make_function(divide.build(), 0)
        .store_global("divide")
        .set_line(4)
        .load_global("divide")
        .call(0)
        .return_value();

    let exc = run_err(&mut vm, module);
    assert_eq!(exc.kind(), ErrorKind::ZeroDivision);
    assert_eq!(
        exc.to_string(),
        "Traceback (most recent call last):\n  File \"prog.py\", line 4, in <module>\n  File \"prog.py\", line 2, in divide\nZeroDivisionError: division by zero"
    );
    assert_eq!(exc.exit_code(), 1);
}

#[test]
fn raise_from_sets_cause_and_handlers_set_context() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    // try: raise ValueError("outer") from KeyError("inner")
    // except ValueError as e: with_cause = e
    try_except(&mut module, "ValueError", "with_cause", |m| {
        m.load_global("ValueError")
            .load_str("outer")
            .call(1)
            .load_global("KeyError")
            .load_str("inner")
            .call(1)
            .emit_u8(Opcode::Raise, 2);
    });
    // try:
    //     try: raise KeyError("first")
    //     except: raise ValueError("second")
    // except ValueError as e: with_context = e
    try_except(&mut module, "ValueError", "with_context", |m| {
        let (start, end, handler) = (m.new_label(), m.new_label(), m.new_label());
        m.bind(start);
        raise(m, "KeyError", "first");
        m.bind(end).bind(handler).emit(Opcode::Pop);
        raise(m, "ValueError", "second");
        m.add_handler(start, end, handler, 0);
    });
    module.load_none().return_value();
    let module = run(&mut vm, module);

    let with_cause = vm.global(module, "with_cause").unwrap();
    let cause = attr(&mut vm, with_cause, "__cause__");
    assert_eq!(vm.type_name(cause), "KeyError");

    let with_context = vm.global(module, "with_context").unwrap();
    let context = attr(&mut vm, with_context, "__context__");
    assert_eq!(vm.type_name(context), "KeyError");
    let cause = attr(&mut vm, with_context, "__cause__");
    assert!(cause.is_none());
}

#[test]
fn user_defined_exception_classes() {
    let mut vm = Vm::new();
    let value_error = builtin(&mut vm, "ValueError");
    let app_error = class(&mut vm, "AppError", &[value_error]);
    vm.set_builtin("AppError", app_error);

    // caught through its builtin base
    let mut module = CodeBuilder::new("<module>");
    try_except(&mut module, "ValueError", "caught", |m| raise(m, "AppError", "app"));
    module.load_none().return_value();
    let module = run(&mut vm, module);
    let caught = vm.global(module, "caught").unwrap();
    assert_eq!(vm.type_name(caught), "AppError");

    // uncaught, it is reported under its own name
    let mut module = CodeBuilder::new("<module>");
    raise(&mut module, "AppError", "unhandled");
    module.load_none().return_value();
    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "AppError: unhandled");
    assert_eq!(exc.kind(), ErrorKind::UserRaised);
}

#[test]
fn called_functions_see_the_exception_their_caller_handles() {
    let mut vm = Vm::new();
    // def rethrow(): raise
    let mut rethrow = CodeBuilder::new("rethrow");
    rethrow.emit_u8(Opcode::Raise, 0).load_none().return_value();
    let rethrow = function(&mut vm, rethrow.build());
    vm.set_builtin("rethrow", rethrow);
    // def fail(): raise ValueError("helper")
    let mut fail = CodeBuilder::new("fail");
    raise(&mut fail, "ValueError", "helper");
    let fail = function(&mut vm, fail.build());
    vm.set_builtin("fail", fail);

    let mut module = CodeBuilder::new("<module>");
    // try:
    //     try: raise KeyError("original")
    //     except: original = <exc>; <helper>()
    // except <class> as e: <name> = e
    for (helper, class_name, store_as) in [("rethrow", "KeyError", "reraised"), ("fail", "ValueError", "chained")] {
        try_except(&mut module, class_name, store_as, |m| {
            let (start, end, handler) = (m.new_label(), m.new_label(), m.new_label());
            m.bind(start);
            raise(m, "KeyError", "original");
            m.bind(end)
                .bind(handler)
                .store_global("original")
                .load_global(helper)
                .call(0)
                .emit(Opcode::Pop);
            m.add_handler(start, end, handler, 0);
        });
    }
    module.load_none().return_value();
    let module = run(&mut vm, module);

    let reraised = vm.global(module, "reraised").unwrap();
    assert_eq!(vm.type_name(reraised), "KeyError");
    let chained = vm.global(module, "chained").unwrap();
    let context = attr(&mut vm, chained, "__context__");
    let original = vm.global(module, "original").unwrap();
    assert!(context.is(original));
}

#[test]
fn bare_raise_without_active_exception() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    module.emit_u8(Opcode::Raise, 0).load_none().return_value();

    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "RuntimeError: No active exception to reraise");
}

#[test]
fn undefined_names() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    module.load_global("nowhere").return_value();
    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "NameError: name 'nowhere' is not defined");

    // def f(): return x; x = 1
    let mut f = CodeBuilder::new("f");
    f.load_local("x").return_value().load_int(1).store_local("x");
    let mut module = CodeBuilder::new("<module>");
    module.make_function(f.build(), 0).call(0).return_value();
    let exc = run_err(&mut vm, module);
    assert_eq!(exc.type_name(), "UnboundLocalError");
}

#[test]
fn recursion_limit_escapes_handlers() {
    let mut vm = Vm::with_limits(ResourceLimits::new().max_recursion_depth(50));
    // def down(): return down()
    let mut down = CodeBuilder::new("down");
    down.load_global("down").call(0).return_value();
    let mut module = CodeBuilder::new("<module>");
    module.make_function(down.build(), 0).store_global("down");
    try_except(&mut module, "RecursionError", "caught", |m| {
        m.load_global("down").call(0).emit(Opcode::Pop);
    });
    module.load_none().return_value();

    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "RecursionError: maximum recursion depth exceeded");
}

#[test]
fn operation_limit_stops_infinite_loop() {
    let mut vm = Vm::with_limits(ResourceLimits::new().max_operations(1_000));
    let mut module = CodeBuilder::new("<module>");
    let top = module.new_label();
    module.bind(top).emit_jump(Opcode::Jump, top);

    let exc = run_err(&mut vm, module);
    assert_eq!(exc.type_name(), "TimeoutError");
}

#[test]
fn host_raised_exceptions_convert() {
    let mut vm = Vm::new();
    let exc = vm.new_exception(ExcType::IndexError, Some("out of range")).unwrap();
    let index_error = builtin(&mut vm, "IndexError");
    let lookup_error = builtin(&mut vm, "LookupError");
    assert!(vm.is_instance(exc, index_error).unwrap());
    assert!(vm.is_instance(exc, lookup_error).unwrap());

    let text = vm.str_of(exc);
    assert_eq!(ok(&mut vm, text), "out of range");
    let equal = vm.compare_op(Value::Int(1), Value::Int(1), CompareOp::Eq).unwrap();
    assert_eq!(equal, Value::Bool(true));
}
