use pretty_assertions::assert_eq;

use vm::{
    environment::Environment,
    parser::Reader,
    run::{boot, SourceFile},
    value::{consify, Value},
    vm::VmError,
    writer::ValuePrinter,
};

/// Read a whole buffer of instructions and run it as one stream
fn eval(env: &mut Environment, source: &str) -> Result<Option<Value>, VmError> {
    let mut reader = Reader::new(source, env);
    let forms = reader.parse_all()?;
    reader.expect_eof()?;
    env.run_body(consify(forms))
}

#[test]
fn arithmetic_through_globals() {
    let mut env = Environment::new();

    assert_eq!(
        eval(&mut env, "(get-global +) (push 3) (push 4) (call 2)").unwrap(),
        Some(Value::Integer(7))
    );

    // the top of the stack is the last argument
    assert_eq!(
        eval(&mut env, "(get-global -) (push 10) (push 4) (call 2)").unwrap(),
        Some(Value::Integer(6))
    );

    // an inner call leaves its result in argument position for the outer
    assert_eq!(
        eval(
            &mut env,
            "(get-global +) (push 1) (get-global +) (push 2) (push 3) (call 2) (call 2)",
        )
        .unwrap(),
        Some(Value::Integer(6))
    );
}

#[test]
fn closures_check_their_arity() {
    let mut env = Environment::new();
    eval(
        &mut env,
        "(closure 2 () ((get-global +) (access 0) (access 1) (call 2)))
         (set-global add2)",
    )
    .unwrap();

    let err = eval(&mut env, "(get-global add2) (push 1) (call 1)").unwrap_err();
    assert!(matches!(
        err,
        VmError::TooFewArguments {
            expected: 2,
            got: 1,
        }
    ));

    let err = eval(
        &mut env,
        "(get-global add2) (push 1) (push 2) (push 3) (call 3)",
    )
    .unwrap_err();
    assert!(matches!(
        err,
        VmError::TooManyArguments {
            expected: 2,
            got: 3,
        }
    ));

    assert_eq!(
        eval(&mut env, "(get-global add2) (push 1) (push 2) (call 2)").unwrap(),
        Some(Value::Integer(3))
    );
}

#[test]
fn rest_parameters_collect_surplus_arguments() {
    let mut env = Environment::new();
    eval(&mut env, "(closure 1 t ((access 1))) (set-global rest-of)").unwrap();

    // the rest parameter sits one slot after the last required one
    assert_eq!(
        eval(
            &mut env,
            "(get-global rest-of) (push 1) (push 2) (push 3) (call 3)",
        )
        .unwrap(),
        Some(consify(vec![Value::Integer(2), Value::Integer(3)]))
    );

    // no surplus makes it the empty list
    assert_eq!(
        eval(&mut env, "(get-global rest-of) (push 1) (call 1)").unwrap(),
        Some(Value::Nil)
    );

    eval(&mut env, "(closure 1 t ((access 0))) (set-global first-of)").unwrap();
    assert_eq!(
        eval(
            &mut env,
            "(get-global first-of) (push 1) (push 2) (push 3) (call 3)",
        )
        .unwrap(),
        Some(Value::Integer(1))
    );
}

#[test]
fn closures_capture_the_frame_that_made_them() {
    let mut env = Environment::new();
    eval(
        &mut env,
        "(closure 1 () ((closure 1 () ((get-global +) (access 0) (access 1) (call 2)))))
         (set-global make-adder)",
    )
    .unwrap();

    // the inner closure keeps a copy of [10] after make-adder returns
    eval(
        &mut env,
        "(get-global make-adder) (push 10) (call 1) (set-global add10)",
    )
    .unwrap();

    assert_eq!(
        eval(&mut env, "(get-global add10) (push 5) (call 1)").unwrap(),
        Some(Value::Integer(15))
    );
}

#[test]
fn if_selects_a_branch_by_truthiness() {
    let mut env = Environment::new();

    assert_eq!(
        eval(&mut env, "(push t) (if ((push 1)) ((push 2)))").unwrap(),
        Some(Value::Integer(1))
    );

    assert_eq!(
        eval(&mut env, "(push ()) (if ((push 1)) ((push 2)))").unwrap(),
        Some(Value::Integer(2))
    );

    // zero is not the false value
    assert_eq!(
        eval(&mut env, "(push 0) (if ((push 1)) ((push 2)))").unwrap(),
        Some(Value::Integer(1))
    );
}

#[test]
fn if_resumes_the_outer_stream_through_a_continuation() {
    let mut env = Environment::new();

    // the branch pushes 10, then the instructions after the if still run
    // in order, so the subtraction sees both arguments
    assert_eq!(
        eval(
            &mut env,
            "(get-global -) (push t) (if ((push 10)) ((push 20))) (push 5) (call 2)",
        )
        .unwrap(),
        Some(Value::Integer(5))
    );
}

#[test]
fn continuations_restore_the_frame_of_their_stream() {
    let mut env = Environment::new();
    eval(
        &mut env,
        "(closure 1 () ((access 0) (if ((push 1)) ((push 2))) (pop) (access 0)))
         (set-global echo)",
    )
    .unwrap();

    // after the branch returns, access still reads the closure's frame
    assert_eq!(
        eval(&mut env, "(get-global echo) (push 5) (call 1)").unwrap(),
        Some(Value::Integer(5))
    );
}

#[test]
fn apply_chains_unwrap_to_the_real_callee() {
    let mut env = Environment::new();

    assert_eq!(
        eval(
            &mut env,
            "(get-global apply) (get-global -) (push 10) (push 4) (call 3)",
        )
        .unwrap(),
        Some(Value::Integer(6))
    );

    assert_eq!(
        eval(
            &mut env,
            "(get-global apply) (get-global apply) (get-global -) (push 10) (push 4) (call 4)",
        )
        .unwrap(),
        Some(Value::Integer(6))
    );

    let err = eval(&mut env, "(get-global apply) (call 0)").unwrap_err();
    assert!(matches!(
        err,
        VmError::TooFewArguments {
            expected: 1,
            got: 0,
        }
    ));
}

#[test]
fn set_global_is_a_peek_not_a_pop() {
    let mut env = Environment::new();

    // the bound value is also the result of the stream
    assert_eq!(
        eval(&mut env, "(push 5) (set-global x)").unwrap(),
        Some(Value::Integer(5))
    );

    let x = env.intern("x");
    assert_eq!(env.get_global(x), Some(&Value::Integer(5)));
}

#[test]
fn global_rebinding_is_seen_by_later_lookups() {
    let mut env = Environment::new();
    eval(&mut env, "(closure 0 () ((get-global target))) (set-global fetch)").unwrap();

    eval(&mut env, "(push 1) (set-global target)").unwrap();
    assert_eq!(
        eval(&mut env, "(get-global fetch) (call 0)").unwrap(),
        Some(Value::Integer(1))
    );

    // the closure reads the table at call time, not at creation time
    eval(&mut env, "(push 2) (set-global target)").unwrap();
    assert_eq!(
        eval(&mut env, "(get-global fetch) (call 0)").unwrap(),
        Some(Value::Integer(2))
    );
}

#[test]
fn machine_errors_leave_earlier_bindings_intact() {
    let mut env = Environment::new();

    let err = eval(
        &mut env,
        "(push 42) (set-global kept) (get-global missing)",
    )
    .unwrap_err();
    assert!(matches!(err, VmError::UnboundGlobal { name } if name == "missing"));

    let kept = env.intern("kept");
    assert_eq!(env.get_global(kept), Some(&Value::Integer(42)));
}

#[test]
fn unknown_opcodes_are_rejected() {
    let mut env = Environment::new();

    let err = eval(&mut env, "(jump 3)").unwrap_err();
    assert!(matches!(err, VmError::UnrecognizedInstruction { opcode } if opcode == "jump"));
}

#[test]
fn malformed_instructions_are_rejected() {
    let mut env = Environment::new();

    assert!(matches!(
        eval(&mut env, "5").unwrap_err(),
        VmError::MalformedInstruction { .. }
    ));
    assert!(matches!(
        eval(&mut env, "(1 2)").unwrap_err(),
        VmError::MalformedInstruction { .. }
    ));
    assert!(matches!(
        eval(&mut env, "(push)").unwrap_err(),
        VmError::BadOperands { opcode: "push" }
    ));
    assert!(matches!(
        eval(&mut env, "(access x)").unwrap_err(),
        VmError::BadOperands { opcode: "access" }
    ));

    // two leftover values with no continuation between them
    assert!(matches!(
        eval(&mut env, "(push 1) (push 2)").unwrap_err(),
        VmError::ExpectedContinuation { .. }
    ));
}

#[test]
fn runtime_type_errors() {
    let mut env = Environment::new();

    assert!(matches!(
        eval(&mut env, "(get-global car) (push 5) (call 1)").unwrap_err(),
        VmError::NotAPair { .. }
    ));
    assert!(matches!(
        eval(&mut env, "(get-global +) (push 1) (push x) (call 2)").unwrap_err(),
        VmError::NotAnInteger { .. }
    ));
    assert!(matches!(
        eval(&mut env, "(push 1) (call 0)").unwrap_err(),
        VmError::CannotCallNonFunction { .. }
    ));
    assert!(matches!(
        eval(&mut env, "(access 0)").unwrap_err(),
        VmError::AccessOutOfRange { index: 0, len: 0 }
    ));
    assert!(matches!(
        eval(&mut env, "(pop)").unwrap_err(),
        VmError::StackUnderflow
    ));
}

#[test]
fn list_builtins() {
    let mut env = Environment::new();

    assert_eq!(
        eval(&mut env, "(get-global cons) (push 1) (push ()) (call 2)").unwrap(),
        Some(consify(vec![Value::Integer(1)]))
    );

    assert_eq!(
        eval(
            &mut env,
            "(get-global car) (get-global cons) (push 1) (push 2) (call 2) (call 1)",
        )
        .unwrap(),
        Some(Value::Integer(1))
    );

    assert_eq!(
        eval(
            &mut env,
            "(get-global cdr) (get-global cons) (push 1) (push 2) (call 2) (call 1)",
        )
        .unwrap(),
        Some(Value::Integer(2))
    );
}

#[test]
fn predicates_and_equality() {
    let mut env = Environment::new();

    let result = eval(&mut env, "(get-global symbol?) (push a) (call 1)").unwrap();
    let t = Value::Symbol(env.intern("t"));
    assert_eq!(result, Some(t.clone()));

    assert_eq!(
        eval(&mut env, "(get-global symbol?) (push 5) (call 1)").unwrap(),
        Some(Value::Nil)
    );

    assert_eq!(
        eval(&mut env, "(get-global cons?) (push (1 2)) (call 1)").unwrap(),
        Some(t.clone())
    );
    assert_eq!(
        eval(&mut env, "(get-global atom?) (push (1 2)) (call 1)").unwrap(),
        Some(Value::Nil)
    );
    assert_eq!(
        eval(&mut env, "(get-global atom?) (push ()) (call 1)").unwrap(),
        Some(t.clone())
    );

    // equality on lists is structural
    assert_eq!(
        eval(&mut env, "(get-global eq?) (push (1 2)) (push (1 2)) (call 2)").unwrap(),
        Some(t)
    );
    assert_eq!(
        eval(&mut env, "(get-global eq?) (push a) (push b) (call 2)").unwrap(),
        Some(Value::Nil)
    );
}

#[test]
fn integer_builtins_check_overflow() {
    let mut env = Environment::new();

    let err = env
        .call_global("+", vec![Value::Integer(i64::MAX), Value::Integer(1)])
        .unwrap_err();
    assert!(matches!(err, VmError::IntegerOverflow { op: "+" }));

    let err = env
        .call_global("-", vec![Value::Integer(i64::MIN), Value::Integer(1)])
        .unwrap_err();
    assert!(matches!(err, VmError::IntegerOverflow { op: "-" }));
}

#[test]
fn host_calls_by_global_name() {
    let mut env = Environment::new();

    assert_eq!(
        env.call_global("+", vec![Value::Integer(20), Value::Integer(22)])
            .unwrap(),
        Value::Integer(42)
    );

    // loaded closures are reachable the same way as built ins
    eval(
        &mut env,
        "(closure 1 () ((get-global +) (access 0) (access 0) (call 2)))
         (set-global double-it)",
    )
    .unwrap();
    assert_eq!(
        env.call_global("double-it", vec![Value::Integer(21)]).unwrap(),
        Value::Integer(42)
    );
}

#[test]
fn hosts_can_register_and_override_globals() {
    let mut env = Environment::new();

    env.register_native("halve", |_env, args| match args {
        [Value::Integer(n)] => Ok(Value::Integer(n / 2)),
        _ => Err(VmError::TooFewArguments {
            expected: 1,
            got: args.len(),
        }),
    });
    assert_eq!(
        eval(&mut env, "(get-global halve) (push 42) (call 1)").unwrap(),
        Some(Value::Integer(21))
    );

    // built in bindings are not special, they can be replaced too
    env.register_native("+", |_env, _args| Ok(Value::Integer(0)));
    assert_eq!(
        env.call_global("+", vec![Value::Integer(3), Value::Integer(4)])
            .unwrap(),
        Value::Integer(0)
    );
}

#[test]
fn empty_programs_produce_no_value() {
    let mut env = Environment::new();

    assert_eq!(eval(&mut env, "").unwrap(), None);
    assert_eq!(eval(&mut env, "(push 1) (pop)").unwrap(), None);
    assert!(matches!(
        env.run_expr(Value::Nil).unwrap_err(),
        VmError::NoResult
    ));
}

#[test]
fn bound_closures_display_their_name() {
    let mut env = Environment::new();
    eval(&mut env, "(closure 0 () ()) (set-global noop)").unwrap();

    let noop = env.intern("noop");
    let value = env.get_global(noop).unwrap().clone();
    assert_eq!(
        ValuePrinter::new(&value, &env).to_string(),
        "#<closure noop>"
    );

    let plus = env.intern("+");
    let value = env.get_global(plus).unwrap().clone();
    assert_eq!(ValuePrinter::new(&value, &env).to_string(), "#<native +>");
}

#[test]
fn boot_loads_sources_in_order() {
    let sources = vec![
        SourceFile {
            path: Some("base.sexp".to_string()),
            content: "(push 20) (set-global base)".to_string(),
        },
        SourceFile {
            path: None,
            content: "(get-global +) (get-global base) (push 22) (call 2) (set-global answer)"
                .to_string(),
        },
    ];

    let mut env = boot(sources).unwrap();
    let answer = env.intern("answer");
    assert_eq!(env.get_global(answer), Some(&Value::Integer(42)));
}

#[test]
fn boot_reports_which_source_failed() {
    let sources = vec![SourceFile {
        path: Some("bad.sexp".to_string()),
        content: "(get-global missing)".to_string(),
    }];

    let err = boot(sources).unwrap_err();
    assert!(format!("{:#}", err).contains("while loading bad.sexp"));
}
