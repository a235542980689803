mod common;

use common::{attr, call, class, class_with, expect_err, function, repr, run, run_err};
use pretty_assertions::assert_eq;
use pyrite::{ArgValues, BinaryOp, CodeBuilder, CompareOp, MakeFunctionFlags, Opcode, Value, Vm};

/// A guest function `name(*params)` whose body is emitted by `body`.
fn def(vm: &mut Vm, name: &str, params: &[&str], body: impl FnOnce(&mut CodeBuilder)) -> Value {
    let mut code = CodeBuilder::new(name).with_params(params);
    body(&mut code);
    function(vm, code.build())
}

/// `def name(*params): return <text>`
fn returns_str(vm: &mut Vm, name: &str, params: &[&str], text: &str) -> Value {
    def(vm, name, params, |c| {
        c.load_str(text).return_value();
    })
}

/// `log.append(<local>)`
fn log_local(code: &mut CodeBuilder, local: &str) {
    code.load_global("log")
        .load_attr("append")
        .load_local(local)
        .call(1)
        .emit(Opcode::Pop);
}

/// `log.append(<text>)`
fn log_str(code: &mut CodeBuilder, text: &str) {
    code.load_global("log")
        .load_attr("append")
        .load_str(text)
        .call(1)
        .emit(Opcode::Pop);
}

/// A fresh `log` list visible to every module.
fn install_log(vm: &mut Vm) -> Value {
    let log = vm.new_list(vec![]).unwrap();
    vm.set_builtin("log", log);
    log
}

/// Emits `with <manager_global> as entered: <body>`.
fn with_block(module: &mut CodeBuilder, manager_global: &str, body: impl FnOnce(&mut CodeBuilder)) {
    let (start, end, handler, after) = (
        module.new_label(),
        module.new_label(),
        module.new_label(),
        module.new_label(),
    );
    module
        .load_global(manager_global)
        .emit(Opcode::EnterWith)
        .store_global("entered")
        .bind(start);
    body(module);
    module
        .bind(end)
        .emit(Opcode::ExitWith)
        .emit_jump(Opcode::Jump, after)
        .bind(handler)
        .emit(Opcode::ExitWithExc)
        .bind(after);
    // the exit callable stays on the stack below the body
    module.add_handler(start, end, handler, 1);
}

/// ```text
/// class Manager:
///     def __enter__(self): log.append("enter"); return self
///     def __exit__(self, t, e, tb): log.append(e); return self.suppress
/// ```
fn manager_class(vm: &mut Vm) -> Value {
    let enter = def(vm, "__enter__", &["self"], |c| {
        log_str(c, "enter");
        c.load_local("self").return_value();
    });
    let exit = def(vm, "__exit__", &["self", "t", "e", "tb"], |c| {
        log_local(c, "e");
        c.load_local("self").load_attr("suppress").return_value();
    });
    class_with(vm, "Manager", &[], &[("__enter__", enter), ("__exit__", exit)])
}

fn manager(vm: &mut Vm, class: Value, suppress: bool) -> Value {
    let instance = call(vm, class, ArgValues::empty());
    vm.set_attr(instance, "suppress", Value::Bool(suppress)).unwrap();
    instance
}

#[test]
fn with_exits_on_normal_completion() {
    let mut vm = Vm::new();
    let log = install_log(&mut vm);
    let class = manager_class(&mut vm);
    let quiet = manager(&mut vm, class, false);
    vm.set_builtin("quiet", quiet);

    let mut module = CodeBuilder::new("<module>");
    with_block(&mut module, "quiet", |m| {
        m.load_int(1).store_global("x");
    });
    module.load_none().return_value();
    let module = run(&mut vm, module);

    assert!(vm.global(module, "entered").unwrap().is(quiet));
    assert_eq!(vm.global(module, "x"), Some(Value::Int(1)));
    assert_eq!(repr(&mut vm, log), "['enter', None]");
}

#[test]
fn with_exits_on_error_and_can_suppress() {
    let mut vm = Vm::new();
    let log = install_log(&mut vm);
    let class = manager_class(&mut vm);
    let loud = manager(&mut vm, class, false);
    let swallowing = manager(&mut vm, class, true);
    vm.set_builtin("loud", loud);
    vm.set_builtin("swallowing", swallowing);

    let mut module = CodeBuilder::new("<module>");
    with_block(&mut module, "loud", |m| {
        m.load_global("ValueError").load_str("boom").call(1).emit_u8(Opcode::Raise, 1);
    });
    module.load_none().return_value();
    let exc = run_err(&mut vm, module);
    assert_eq!(exc.summary(), "ValueError: boom");
    assert_eq!(repr(&mut vm, log), "['enter', ValueError('boom')]");

    let mut module = CodeBuilder::new("<module>");
    with_block(&mut module, "swallowing", |m| {
        m.load_global("KeyError").load_str("k").call(1).emit_u8(Opcode::Raise, 1);
    });
    module.load_int(1).store_global("after").load_none().return_value();
    let module = run(&mut vm, module);
    assert_eq!(vm.global(module, "after"), Some(Value::Int(1)));
    assert_eq!(
        repr(&mut vm, log),
        "['enter', ValueError('boom'), 'enter', KeyError('k')]"
    );
}

#[test]
fn special_methods_ignore_instance_attributes() {
    let mut vm = Vm::new();
    let plain = class(&mut vm, "CM", &[]);
    let cm = call(&mut vm, plain, ArgValues::empty());
    let enter = returns_str(&mut vm, "__enter__", &[], "from-instance");
    let exit = returns_str(&mut vm, "__exit__", &["t", "e", "tb"], "");
    vm.set_attr(cm, "__enter__", enter).unwrap();
    vm.set_attr(cm, "__exit__", exit).unwrap();
    let length = returns_str(&mut vm, "__len__", &[], "");
    vm.set_attr(cm, "__len__", length).unwrap();
    vm.set_builtin("cm", cm);

    let mut module = CodeBuilder::new("<module>");
    with_block(&mut module, "cm", |m| {
        m.load_int(1).store_global("x");
    });
    module.load_none().return_value();
    let exc = run_err(&mut vm, module);
    assert_eq!(
        exc.summary(),
        "TypeError: 'CM' object does not support the context manager protocol"
    );

    let result = vm.len_of(cm);
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: object of type 'CM' has no len()");

    // class Ten: def __get__(self, obj, owner): return 10
    let get = def(&mut vm, "__get__", &["self", "obj", "owner"], |c| {
        c.load_int(10).return_value();
    });
    let ten = class_with(&mut vm, "Ten", &[], &[("__get__", get)]);
    let descriptor = call(&mut vm, ten, ArgValues::empty());
    let shadow = def(&mut vm, "__get__", &["obj", "owner"], |c| {
        c.load_int(99).return_value();
    });
    vm.set_attr(descriptor, "__get__", shadow).unwrap();
    let holder = class_with(&mut vm, "Holder", &[], &[("value", descriptor)]);
    let instance = call(&mut vm, holder, ArgValues::empty());
    assert_eq!(attr(&mut vm, instance, "value"), Value::Int(10));
}

#[test]
fn finally_runs_while_an_exception_unwinds() {
    let mut vm = Vm::new();
    let log = install_log(&mut vm);

    // def work(fail):
    //     try:
    //         if fail: raise ValueError("x")
    //         log.append("body")
    //     finally:
    //         log.append("cleanup")
    let mut work = CodeBuilder::new("work").with_params(&["fail"]);
    let (start, end, handler, skip) = (work.new_label(), work.new_label(), work.new_label(), work.new_label());
    work.bind(start)
        .load_local("fail")
        .emit_jump(Opcode::PopJumpIfFalse, skip)
        .load_global("ValueError")
        .load_str("x")
        .call(1)
        .emit_u8(Opcode::Raise, 1)
        .bind(skip);
    log_str(&mut work, "body");
    work.bind(end);
    log_str(&mut work, "cleanup");
    work.load_none().return_value().bind(handler);
    log_str(&mut work, "cleanup");
    work.emit(Opcode::Reraise);
    work.add_handler(start, end, handler, 0);
    let work = function(&mut vm, work.build());

    call(&mut vm, work, ArgValues::one(Value::Bool(false)));
    assert_eq!(repr(&mut vm, log), "['body', 'cleanup']");

    let result = vm.call(work, ArgValues::one(Value::Bool(true)));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "ValueError: x");
    assert_eq!(repr(&mut vm, log), "['body', 'cleanup', 'cleanup']");
}

/// ```text
/// def counter():
///     count = 0
///     def bump():
///         nonlocal count
///         count += 1
///         return count
///     bump(); bump()
///     return (count, bump)
/// ```
fn counter(vm: &mut Vm) -> Value {
    let mut bump = CodeBuilder::new("bump");
    let count = bump.free_var("count");
    bump.emit_u16(Opcode::LoadDeref, count)
        .load_int(1)
        .binary(BinaryOp::Add)
        .emit_u16(Opcode::StoreDeref, count)
        .emit_u16(Opcode::LoadDeref, count)
        .return_value();

    let mut outer = CodeBuilder::new("counter");
    let cell = outer.cell_var("count");
    outer
        .load_int(0)
        .emit_u16(Opcode::StoreDeref, cell)
        .emit_u16(Opcode::LoadClosure, cell)
        .emit_u16(Opcode::BuildTuple, 1)
        .make_function(bump.build(), MakeFunctionFlags::CLOSURE)
        .store_local("bump");
    for _ in 0..2 {
        outer.load_local("bump").call(0).emit(Opcode::Pop);
    }
    outer
        .emit_u16(Opcode::LoadDeref, cell)
        .load_local("bump")
        .emit_u16(Opcode::BuildTuple, 2)
        .return_value();
    function(vm, outer.build())
}

#[test]
fn closures_share_cells_with_their_enclosing_frame() {
    let mut vm = Vm::new();
    let counter = counter(&mut vm);

    let first = call(&mut vm, counter, ArgValues::empty());
    let items = vm.sequence_items(first).unwrap();
    // the outer frame sees both increments made through the cell
    assert_eq!(items[0], Value::Int(2));
    let bump = items[1];
    assert_eq!(call(&mut vm, bump, ArgValues::empty()), Value::Int(3));

    // each call of the outer function gets a fresh cell
    let second = call(&mut vm, counter, ArgValues::empty());
    let items = vm.sequence_items(second).unwrap();
    assert_eq!(items[0], Value::Int(2));
    assert_eq!(call(&mut vm, bump, ArgValues::empty()), Value::Int(4));
}

#[test]
fn binary_operators_fall_back_to_reflected_methods() {
    let mut vm = Vm::new();
    // class Money: __add__ returns NotImplemented, __radd__ returns "Money.radd"
    let add = def(&mut vm, "__add__", &["self", "other"], |c| {
        c.load_global("NotImplemented").return_value();
    });
    let radd = returns_str(&mut vm, "__radd__", &["self", "other"], "Money.radd");
    let money = class_with(&mut vm, "Money", &[], &[("__add__", add), ("__radd__", radd)]);
    let coin = call(&mut vm, money, ArgValues::empty());

    let result = vm.binary_op(Value::Int(1), coin, BinaryOp::Add).unwrap();
    assert_eq!(vm.str_value(result), Some("Money.radd"));
    let result = vm.binary_op(coin, Value::Int(1), BinaryOp::Add);
    let exc = expect_err(&mut vm, result);
    assert_eq!(
        exc.summary(),
        "TypeError: unsupported operand type(s) for +: 'Money' and 'int'"
    );

    // a subclass overriding the reflected method gets the first try
    let base_add = returns_str(&mut vm, "__add__", &["self", "other"], "Base.add");
    let base_radd = returns_str(&mut vm, "__radd__", &["self", "other"], "Base.radd");
    let base = class_with(&mut vm, "Base", &[], &[("__add__", base_add), ("__radd__", base_radd)]);
    let derived_radd = returns_str(&mut vm, "__radd__", &["self", "other"], "Derived.radd");
    let derived = class_with(&mut vm, "Derived", &[base], &[("__radd__", derived_radd)]);
    let (b, d) = (
        call(&mut vm, base, ArgValues::empty()),
        call(&mut vm, derived, ArgValues::empty()),
    );
    let result = vm.binary_op(b, d, BinaryOp::Add).unwrap();
    assert_eq!(vm.str_value(result), Some("Derived.radd"));
    let result = vm.binary_op(d, b, BinaryOp::Add).unwrap();
    assert_eq!(vm.str_value(result), Some("Base.add"));
}

#[test]
fn user_equality_drives_comparisons_but_not_hashing() {
    let mut vm = Vm::new();
    // def __eq__(self, other): return self.x == other.x
    let eq = def(&mut vm, "__eq__", &["self", "other"], |c| {
        c.load_local("self")
            .load_attr("x")
            .load_local("other")
            .load_attr("x")
            .compare(CompareOp::Eq)
            .return_value();
    });
    let hash = def(&mut vm, "__hash__", &["self"], |c| {
        c.load_local("self").load_attr("x").return_value();
    });
    let point = class_with(&mut vm, "Point", &[], &[("__eq__", eq), ("__hash__", hash)]);
    let make = |vm: &mut Vm, x: i64| {
        let p = call(vm, point, ArgValues::empty());
        vm.set_attr(p, "x", Value::Int(x)).unwrap();
        p
    };
    let (a, b, c) = (make(&mut vm, 1), make(&mut vm, 1), make(&mut vm, 2));

    assert!(vm.values_equal(a, b).unwrap());
    assert!(!vm.values_equal(a, c).unwrap());
    assert_eq!(vm.compare_op(a, c, CompareOp::Ne).unwrap(), Value::Bool(true));
    let points = vm.new_list(vec![b]).unwrap();
    assert!(vm.contains(points, a).unwrap());

    // dict keys are structural: instances are rejected even with __hash__
    let dict = vm.new_dict(vec![]).unwrap();
    let result = vm.set_item(dict, a, Value::Int(1));
    let exc = expect_err(&mut vm, result);
    assert_eq!(exc.summary(), "TypeError: unhashable type: 'Point'");

    // numerically equal keys collapse into one entry
    let dict = vm
        .new_dict(vec![
            (Value::Int(1), Value::Int(10)),
            (Value::Float(1.0), Value::Int(20)),
            (Value::Bool(true), Value::Int(30)),
        ])
        .unwrap();
    assert_eq!(vm.len_of(dict).unwrap(), 1);
    assert_eq!(vm.get_item(dict, Value::Int(1)).unwrap(), Value::Int(30));
}

/// ```text
/// class Countdown:
///     def __iter__(self): return self
///     def __next__(self):
///         if self.n == 0: raise StopIteration
///         self.n -= 1
///         return self.n
/// ```
fn countdown_class(vm: &mut Vm) -> Value {
    let iter = def(vm, "__iter__", &["self"], |c| {
        c.load_local("self").return_value();
    });
    let next = def(vm, "__next__", &["self"], |c| {
        let more = c.new_label();
        c.load_local("self")
            .load_attr("n")
            .load_int(0)
            .compare(CompareOp::Eq)
            .emit_jump(Opcode::PopJumpIfFalse, more)
            .load_global("StopIteration")
            .call(0)
            .emit_u8(Opcode::Raise, 1)
            .bind(more)
            .load_local("self")
            .load_attr("n")
            .load_int(1)
            .binary(BinaryOp::Sub)
            .load_local("self")
            .store_attr("n")
            .load_local("self")
            .load_attr("n")
            .return_value();
    });
    class_with(vm, "Countdown", &[], &[("__iter__", iter), ("__next__", next)])
}

#[test]
fn iteration_goes_through_user_iter_and_next() {
    let mut vm = Vm::new();
    let countdown = countdown_class(&mut vm);
    let from_three = call(&mut vm, countdown, ArgValues::empty());
    vm.set_attr(from_three, "n", Value::Int(3)).unwrap();
    assert_eq!(
        vm.collect_iter(from_three).unwrap(),
        [Value::Int(2), Value::Int(1), Value::Int(0)]
    );

    let from_five = call(&mut vm, countdown, ArgValues::empty());
    vm.set_attr(from_five, "n", Value::Int(5)).unwrap();
    vm.set_builtin("numbers", from_five);
    // total = 0
    // for v in numbers: total = v + total
    let mut module = CodeBuilder::new("<module>");
    let (top, done) = (module.new_label(), module.new_label());
    module
        .load_int(0)
        .store_global("total")
        .load_global("numbers")
        .emit(Opcode::GetIter)
        .bind(top)
        .emit_jump(Opcode::ForIter, done)
        .load_global("total")
        .binary(BinaryOp::Add)
        .store_global("total")
        .emit_jump(Opcode::Jump, top)
        .bind(done)
        .load_none()
        .return_value();
    let module = run(&mut vm, module);
    assert_eq!(vm.global(module, "total"), Some(Value::Int(10)));
}
