mod common;

use std::{cell::RefCell, process::ExitCode, rc::Rc};

use common::vm_with_output;
use pretty_assertions::assert_eq;
use pyrite::{
    BinaryOp, Code, CodeBuilder, CodeKind, Constant, GeneratorState, Opcode, TraceEvent, Value, Vm, VmTracer,
    run::{self, LOAD_FAILURE_EXIT_CODE, RunFailure},
};

/// ```text
/// def square(n): return n * n
/// result = square(7)
/// print("square", result)
/// ```
fn program() -> Code {
    let mut square = CodeBuilder::new("square").with_filename("main.py").with_params(&["n"]);
    square
        .set_line(1)
        .load_local("n")
        .load_local("n")
        .binary(BinaryOp::Mul)
        .return_value();
    let mut module = CodeBuilder::new("<module>").with_filename("main.py");
    module
        .set_line(1)
        .make_function(square.build(), 0)
        .store_global("square")
        .set_line(2)
        .load_global("square")
        .load_int(7)
        .call(1)
        .store_global("result")
        .set_line(3)
        .load_global("print")
        .load_str("square")
        .load_global("result")
        .call(2)
        .emit(Opcode::Pop)
        .load_none()
        .return_value();
    module.build()
}

#[test]
fn code_objects_survive_the_wire_format() {
    let code = program();
    let bytes = code.to_bytes().unwrap();
    let decoded = Code::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, code);

    assert_eq!(decoded.name(), "<module>");
    assert_eq!(decoded.filename(), "main.py");
    let nested = decoded.constants().iter().find_map(|c| match c {
        Constant::Code(code) => Some(code.clone()),
        _ => None,
    });
    let nested = nested.expect("nested code object");
    assert_eq!(nested.name(), "square");
    assert_eq!(nested.signature().positional, 1);
}

#[test]
fn run_bytes_executes_main() {
    let (mut vm, output) = vm_with_output();
    let bytes = program().to_bytes().unwrap();

    let module = run::run_bytes(&mut vm, &bytes).unwrap();
    assert_eq!(vm.global(module, "result"), Some(Value::Int(49)));
    assert_eq!(output.output(), "square 49\n");
    // the main module is importable under its canonical name
    let main = vm.import(run::MAIN_MODULE).unwrap();
    assert!(main.is(module));
}

#[test]
fn corrupt_code_is_rejected_before_running() {
    let (mut vm, output) = vm_with_output();
    let mut bytes = program().to_bytes().unwrap();
    bytes.truncate(bytes.len() / 2);

    let failure = run::run_bytes(&mut vm, &bytes).unwrap_err();
    assert!(matches!(failure, RunFailure::Load(_)));
    assert_eq!(failure.exit_code(), LOAD_FAILURE_EXIT_CODE);
    assert!(failure.to_string().starts_with("failed to load code object"));
    assert_eq!(output.output(), "");
}

#[test]
fn uncaught_exceptions_map_to_exit_status() {
    let mut vm = Vm::new();
    let mut module = CodeBuilder::new("<module>");
    module.load_int(1).load_int(0).binary(BinaryOp::FloorDiv).return_value();
    let bytes = module.build().to_bytes().unwrap();

    let failure = run::run_bytes(&mut vm, &bytes).unwrap_err();
    let RunFailure::Raised(exc) = &failure else {
        panic!("expected a raised exception, got {failure}");
    };
    assert_eq!(exc.type_name(), "ZeroDivisionError");
    assert_eq!(failure.exit_code(), 1);
    assert!(failure.to_string().ends_with("ZeroDivisionError: integer division or modulo by zero"));

    let ok = program().to_bytes().unwrap();
    let (mut vm, _output) = vm_with_output();
    assert_eq!(run::run_main(&mut vm, &ok), ExitCode::SUCCESS);
}

/// Shares recorded events with the test after the VM takes ownership of the tracer.
#[derive(Debug, Default, Clone)]
struct SharedTracer(Rc<RefCell<Vec<TraceEvent>>>);

impl VmTracer for SharedTracer {
    fn on_call(&mut self, name: &str, depth: usize) {
        self.0.borrow_mut().push(TraceEvent::Call {
            name: name.to_owned(),
            depth,
        });
    }

    fn on_exception(&mut self, type_name: &str, depth: usize) {
        self.0.borrow_mut().push(TraceEvent::Exception {
            type_name: type_name.to_owned(),
            depth,
        });
    }

    fn on_generator_state(&mut self, name: &str, state: GeneratorState) {
        self.0.borrow_mut().push(TraceEvent::GeneratorState {
            name: name.to_owned(),
            state,
        });
    }

    fn on_class_created(&mut self, name: &str, mro_len: usize) {
        self.0.borrow_mut().push(TraceEvent::ClassCreated {
            name: name.to_owned(),
            mro_len,
        });
    }
}

#[test]
fn tracer_observes_execution() {
    let tracer = SharedTracer::default();
    let (vm, _output) = vm_with_output();
    let mut vm = vm.with_tracer(Box::new(tracer.clone()));

    let mut one = CodeBuilder::new("one").with_kind(CodeKind::Generator);
    one.load_int(1).emit(Opcode::YieldValue).emit(Opcode::Pop).load_none().return_value();
    let mut body = CodeBuilder::new("Empty");
    body.load_none().return_value();
    let mut module = CodeBuilder::new("<module>");
    module
        .make_function(body.build(), 0)
        .load_str("Empty")
        .build_class(0, 0)
        .emit(Opcode::Pop)
        .make_function(one.build(), 0)
        .call(0)
        .emit(Opcode::GetIter)
        .emit(Opcode::Pop)
        .load_int(1)
        .load_int(0)
        .binary(BinaryOp::TrueDiv)
        .return_value();
    let code = Rc::new(module.build());
    vm.run_module("traced", code).unwrap_err();

    let events = tracer.0.borrow();
    assert!(matches!(&events[0], TraceEvent::Call { name, depth: 1 } if name == "<module>"));
    assert!(events.contains(&TraceEvent::ClassCreated {
        name: "Empty".to_owned(),
        mro_len: 2,
    }));
    assert!(events.contains(&TraceEvent::GeneratorState {
        name: "one".to_owned(),
        state: GeneratorState::Created,
    }));
    assert!(events.contains(&TraceEvent::Exception {
        type_name: "ZeroDivisionError".to_owned(),
        depth: 1,
    }));
}
