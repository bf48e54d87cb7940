use crate::{environment::Environment, value::Value, vm::VmError, writer::show};

/// Install the fixed built-in global set into an environment.  Hosts can
/// override any of these later through the same table.
pub(crate) fn install(env: &mut Environment) {
    let apply = env.intern("apply");
    env.set_global(apply, Value::Apply);

    env.register_native("cons", cons);
    env.register_native("car", car);
    env.register_native("cdr", cdr);
    env.register_native("symbol?", is_symbol);
    env.register_native("cons?", is_cons);
    env.register_native("atom?", is_atom);
    env.register_native("eq?", is_eq);
    env.register_native("+", add);
    env.register_native("-", sub);
}

/// Native functions check their own argument counts, the machine performs
/// no checking on their behalf
fn exact_args(args: &[Value], count: usize) -> Result<(), VmError> {
    if args.len() < count {
        Err(VmError::TooFewArguments {
            expected: count,
            got: args.len(),
        })
    } else if args.len() > count {
        Err(VmError::TooManyArguments {
            expected: count,
            got: args.len(),
        })
    } else {
        Ok(())
    }
}

fn cons(_env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    exact_args(args, 2)?;
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn car(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    exact_args(args, 1)?;
    match &args[0] {
        Value::Pair(pair) => Ok(pair.car.clone()),
        other => Err(VmError::NotAPair {
            found: show(other, env),
        }),
    }
}

fn cdr(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    exact_args(args, 1)?;
    match &args[0] {
        Value::Pair(pair) => Ok(pair.cdr.clone()),
        other => Err(VmError::NotAPair {
            found: show(other, env),
        }),
    }
}

fn is_symbol(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    exact_args(args, 1)?;
    Ok(Value::from_bool(matches!(args[0], Value::Symbol(_)), env))
}

fn is_cons(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    exact_args(args, 1)?;
    Ok(Value::from_bool(matches!(args[0], Value::Pair(_)), env))
}

fn is_atom(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    exact_args(args, 1)?;
    Ok(Value::from_bool(!matches!(args[0], Value::Pair(_)), env))
}

fn is_eq(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    exact_args(args, 2)?;
    Ok(Value::from_bool(args[0] == args[1], env))
}

fn add(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    let (x, y) = two_integers(args, env)?;
    x.checked_add(y)
        .map(Value::Integer)
        .ok_or(VmError::IntegerOverflow { op: "+" })
}

fn sub(env: &mut Environment, args: &[Value]) -> Result<Value, VmError> {
    let (x, y) = two_integers(args, env)?;
    x.checked_sub(y)
        .map(Value::Integer)
        .ok_or(VmError::IntegerOverflow { op: "-" })
}

fn two_integers(args: &[Value], env: &Environment) -> Result<(i64, i64), VmError> {
    exact_args(args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Integer(x), Value::Integer(y)) => Ok((*x, *y)),
        (Value::Integer(_), other) | (other, _) => Err(VmError::NotAnInteger {
            found: show(other, env),
        }),
    }
}
