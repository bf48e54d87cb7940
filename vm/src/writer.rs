use std::fmt::{self, Display};

use thiserror::Error;

use crate::{environment::Environment, value::Value};

/// Error produced when serializing a value that has no textual form
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} values cannot be written")]
pub struct WriteError {
    kind: &'static str,
}

/// Serialize a value into the textual form the reader accepts back.
/// Closures, native functions, continuations and the apply marker have no
/// textual form and produce an error.
pub fn write_value(value: &Value, env: &Environment) -> Result<String, WriteError> {
    let mut out = String::new();
    write_into(&mut out, value, env)?;
    Ok(out)
}

fn write_into(out: &mut String, value: &Value, env: &Environment) -> Result<(), WriteError> {
    match value {
        Value::Nil => out.push_str("()"),
        Value::Symbol(sym) => out.push_str(env.resolve(*sym)),
        Value::Integer(n) => out.push_str(&n.to_string()),

        Value::String(text) => {
            out.push('"');
            out.push_str(text);
            out.push('"');
        }

        Value::Pair(pair) => {
            out.push('(');
            write_into(out, &pair.car, env)?;

            let mut rest = &pair.cdr;
            loop {
                match rest {
                    Value::Nil => break,
                    Value::Pair(next) => {
                        out.push(' ');
                        write_into(out, &next.car, env)?;
                        rest = &next.cdr;
                    }
                    tail => {
                        out.push_str(" . ");
                        write_into(out, tail, env)?;
                        break;
                    }
                }
            }

            out.push(')');
        }

        Value::Closure(_) => return Err(WriteError { kind: "closure" }),
        Value::Native(_) => return Err(WriteError { kind: "native function" }),
        Value::Apply => return Err(WriteError { kind: "apply marker" }),
        Value::Cont(_) => return Err(WriteError { kind: "continuation" }),
    }

    Ok(())
}

/// Print a human readable version of a value, interpreting its symbols in
/// an environment.  Values the writer rejects render as #<...> summaries,
/// so this form is for error messages and interactive echo, not for
/// output the reader has to accept back.
pub struct ValuePrinter<'a> {
    value: &'a Value,
    env: &'a Environment,
}

impl<'a> ValuePrinter<'a> {
    pub fn new(value: &'a Value, env: &'a Environment) -> Self {
        Self { value, env }
    }
}

impl<'a> Display for ValuePrinter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.value {
            Value::Nil => write!(f, "()"),
            Value::Symbol(sym) => write!(f, "{}", self.env.resolve(*sym)),
            Value::Integer(n) => write!(f, "{}", n),
            Value::String(text) => write!(f, "\"{}\"", text),

            Value::Pair(pair) => {
                write!(f, "({}", ValuePrinter::new(&pair.car, self.env))?;

                let mut rest = &pair.cdr;
                loop {
                    match rest {
                        Value::Nil => break,
                        Value::Pair(next) => {
                            write!(f, " {}", ValuePrinter::new(&next.car, self.env))?;
                            rest = &next.cdr;
                        }
                        tail => {
                            write!(f, " . {}", ValuePrinter::new(tail, self.env))?;
                            break;
                        }
                    }
                }

                write!(f, ")")
            }

            Value::Closure(closure) => match closure.name.get() {
                Some(name) => write!(f, "#<closure {}>", self.env.resolve(name)),
                None => write!(f, "#<closure>"),
            },
            Value::Native(native) => write!(f, "#<native {}>", native.name),
            Value::Apply => write!(f, "#<apply>"),
            Value::Cont(_) => write!(f, "#<continuation>"),
        }
    }
}

/// Convenience for building error messages that mention a value
pub(crate) fn show(value: &Value, env: &Environment) -> String {
    ValuePrinter::new(value, env).to_string()
}
