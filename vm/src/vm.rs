use std::{convert::TryFrom, rc::Rc};

use thiserror::Error;

use crate::{
    environment::Environment,
    instruction::Instruction,
    parser::ParseError,
    value::{consify, Closure, Cont, ImproperListError, Value},
    writer::{show, WriteError},
};

/// Errors raised while a program is running.  Any of these ends the
/// current run, the environment and its global table stay intact for the
/// next one.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("too few arguments to function, expected {expected} got {got}")]
    TooFewArguments { expected: usize, got: usize },

    #[error("too many arguments to function, expected {expected} got {got}")]
    TooManyArguments { expected: usize, got: usize },

    #[error("unbound global `{name}`")]
    UnboundGlobal { name: String },

    #[error("not a pair: {found}")]
    NotAPair { found: String },

    #[error("not an integer: {found}")]
    NotAnInteger { found: String },

    #[error("not a string: {found}")]
    NotAString { found: String },

    #[error("integer overflow in {op}")]
    IntegerOverflow { op: &'static str },

    #[error("environment index {index} out of range, frame holds {len} values")]
    AccessOutOfRange { index: i64, len: usize },

    #[error("cannot call non-function: {found}")]
    CannotCallNonFunction { found: String },

    #[error("instruction is not a list: {found}")]
    MalformedInstruction { found: String },

    #[error("wrong operands for `{opcode}` instruction")]
    BadOperands { opcode: &'static str },

    #[error("unrecognized instruction `{opcode}`")]
    UnrecognizedInstruction { opcode: String },

    #[error(transparent)]
    ImproperList(#[from] ImproperListError),

    #[error("value stack underflow")]
    StackUnderflow,

    #[error("expected a continuation under the result, found {found}")]
    ExpectedContinuation { found: String },

    #[error("program finished without producing a value")]
    NoResult,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One execution of an instruction stream.  All resumption state lives on
/// the data stack as continuation values, so the run loop never recurses
/// into itself and nesting depth is limited by the heap, not the native
/// call stack.
#[derive(Debug)]
pub struct Vm<'a> {
    env: &'a mut Environment,

    /// Remaining instructions of the current stream
    instrs: Value,

    /// The value stack, top is the last element
    data: Vec<Value>,

    /// The current environment frame, indexed positionally by `access`
    frame: Vec<Value>,
}

impl<'a> Vm<'a> {
    pub fn new(env: &'a mut Environment, instrs: Value) -> Self {
        Self {
            env,
            instrs,
            data: Vec::with_capacity(0),
            frame: Vec::with_capacity(0),
        }
    }

    /// Run to completion, returning the final stack value if one exists
    pub fn run(mut self) -> Result<Option<Value>, VmError> {
        while !self.is_done() {
            self.step()?;
        }
        Ok(self.data.pop())
    }

    /// Done when no instructions remain and at most one value is left on
    /// the stack.  An empty stream with a deeper stack still has work to
    /// do, see [`Vm::step`].
    fn is_done(&self) -> bool {
        matches!(self.instrs, Value::Nil) && self.data.len() <= 1
    }

    fn step(&mut self) -> Result<(), VmError> {
        match self.instrs.clone() {
            // stream exhausted: hand the produced value to the saved
            // continuation underneath it
            Value::Nil => {
                let value = self.pop()?;
                match self.pop()? {
                    Value::Cont(cont) => {
                        self.instrs = cont.instrs.clone();
                        self.frame = cont.frame.clone();
                        self.data.push(value);
                    }
                    other => {
                        return Err(VmError::ExpectedContinuation {
                            found: show(&other, self.env),
                        })
                    }
                }
            }

            Value::Pair(pair) => {
                self.instrs = pair.cdr.clone();
                self.step_instr(&pair.car)?;
            }

            other => {
                return Err(VmError::MalformedInstruction {
                    found: show(&other, self.env),
                })
            }
        }

        Ok(())
    }

    fn step_instr(&mut self, instr: &Value) -> Result<(), VmError> {
        match Instruction::decode(instr, self.env)? {
            Instruction::Push(value) => self.data.push(value),

            Instruction::Pop => {
                self.pop()?;
            }

            Instruction::Access(index) => {
                let value = usize::try_from(index)
                    .ok()
                    .and_then(|idx| self.frame.get(idx))
                    .cloned()
                    .ok_or(VmError::AccessOutOfRange {
                        index,
                        len: self.frame.len(),
                    })?;
                self.data.push(value);
            }

            Instruction::Closure {
                arity,
                has_rest,
                code,
            } => {
                // the frame is copied so the closure never observes what
                // happens to it afterwards
                let closure = Closure::new(arity, has_rest, code, self.frame.clone());
                self.data.push(Value::Closure(Rc::new(closure)));
            }

            Instruction::Call(count) => {
                if self.data.len() < count + 1 {
                    return Err(VmError::StackUnderflow);
                }
                let args = self.data.split_off(self.data.len() - count);
                let func = self.pop()?;
                self.call(func, args)?;
            }

            Instruction::If {
                then_branch,
                else_branch,
            } => {
                let branch = if self.pop()?.is_truthy() {
                    then_branch
                } else {
                    else_branch
                };
                self.push_cont();
                self.instrs = branch;
            }

            Instruction::GetGlobal(sym) => {
                let value = self
                    .env
                    .get_global(sym)
                    .cloned()
                    .ok_or_else(|| VmError::UnboundGlobal {
                        name: self.env.resolve(sym).to_string(),
                    })?;
                self.data.push(value);
            }

            Instruction::SetGlobal(sym) => {
                // a peek, not a pop: the assignment leaves its value as
                // its own result
                let value = self.data.last().cloned().ok_or(VmError::StackUnderflow)?;
                self.env.set_global(sym, value);
            }
        }

        Ok(())
    }

    /// Invoke a callee on arguments collected in push order, the last
    /// argument was the top of the stack.  The apply marker never runs,
    /// its first argument becomes the callee and the rest stay as
    /// arguments, repeated so a chain of applies behaves like one direct
    /// call.
    fn call(&mut self, mut func: Value, mut args: Vec<Value>) -> Result<(), VmError> {
        while matches!(func, Value::Apply) {
            if args.is_empty() {
                return Err(VmError::TooFewArguments {
                    expected: 1,
                    got: 0,
                });
            }
            func = args.remove(0);
        }

        match func {
            Value::Closure(closure) => self.call_closure(closure, args),

            Value::Native(native) => {
                let result = (native.func)(self.env, &args)?;
                self.data.push(result);
                Ok(())
            }

            other => Err(VmError::CannotCallNonFunction {
                found: show(&other, self.env),
            }),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, mut args: Vec<Value>) -> Result<(), VmError> {
        let arity = closure.arity as usize;

        if args.len() < arity {
            return Err(VmError::TooFewArguments {
                expected: arity,
                got: args.len(),
            });
        }
        if !closure.has_rest && args.len() > arity {
            return Err(VmError::TooManyArguments {
                expected: arity,
                got: args.len(),
            });
        }

        // the new frame is the positional arguments, then the surplus
        // collected into one list if there is a rest parameter, then the
        // captured environment
        let mut frame = if closure.has_rest {
            let rest = args.split_off(arity);
            args.push(consify(rest));
            args
        } else {
            args
        };
        frame.extend(closure.env.iter().cloned());

        self.push_cont();
        self.instrs = closure.code.clone();
        self.frame = frame;
        Ok(())
    }

    /// Save the rest of the current stream as a continuation.  An empty
    /// stream has nothing left to resume, so nothing is pushed for it.
    fn push_cont(&mut self) {
        if matches!(self.instrs, Value::Nil) {
            return;
        }
        self.data.push(Value::Cont(Rc::new(Cont {
            instrs: self.instrs.clone(),
            frame: self.frame.clone(),
        })));
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.data.pop().ok_or(VmError::StackUnderflow)
    }
}
