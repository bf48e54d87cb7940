use std::convert::TryFrom;

use lasso::Spur;

use crate::{environment::Environment, value::Value, vm::VmError, writer::show};

/// A single decoded instruction.  Instructions are stored as ordinary
/// lists whose head is an opcode symbol, decoding happens at the moment
/// the machine steps onto one, so a malformed instruction deep inside a
/// branch is only an error if it is reached.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Push(Value),
    Pop,
    Access(i64),
    Closure {
        arity: u32,
        has_rest: bool,
        code: Value,
    },
    Call(usize),
    If {
        then_branch: Value,
        else_branch: Value,
    },
    GetGlobal(Spur),
    SetGlobal(Spur),
}

impl Instruction {
    /// Decode one instruction from its list form
    pub fn decode(instr: &Value, env: &Environment) -> Result<Instruction, VmError> {
        let pair = match instr {
            Value::Pair(pair) => pair,
            _ => {
                return Err(VmError::MalformedInstruction {
                    found: show(instr, env),
                })
            }
        };

        let opcode = match &pair.car {
            Value::Symbol(sym) => *sym,
            _ => {
                return Err(VmError::MalformedInstruction {
                    found: show(instr, env),
                })
            }
        };

        let operands = pair.cdr.list_to_vec()?;

        let instruction = match env.resolve(opcode) {
            "push" => match operands.as_slice() {
                [value] => Instruction::Push(value.clone()),
                _ => return Err(bad_operands("push")),
            },

            "pop" => match operands.as_slice() {
                [] => Instruction::Pop,
                _ => return Err(bad_operands("pop")),
            },

            "access" => match operands.as_slice() {
                [Value::Integer(n)] => Instruction::Access(*n),
                _ => return Err(bad_operands("access")),
            },

            "closure" => match operands.as_slice() {
                [Value::Integer(arity), has_rest, code] => Instruction::Closure {
                    arity: u32::try_from(*arity).map_err(|_| bad_operands("closure"))?,
                    // the flag is an ordinary value tested for truthiness
                    has_rest: has_rest.is_truthy(),
                    code: code.clone(),
                },
                _ => return Err(bad_operands("closure")),
            },

            "call" => match operands.as_slice() {
                [Value::Integer(n)] => {
                    Instruction::Call(usize::try_from(*n).map_err(|_| bad_operands("call"))?)
                }
                _ => return Err(bad_operands("call")),
            },

            "if" => match operands.as_slice() {
                [then_branch, else_branch] => Instruction::If {
                    then_branch: then_branch.clone(),
                    else_branch: else_branch.clone(),
                },
                _ => return Err(bad_operands("if")),
            },

            "get-global" => match operands.as_slice() {
                [Value::Symbol(sym)] => Instruction::GetGlobal(*sym),
                _ => return Err(bad_operands("get-global")),
            },

            "set-global" => match operands.as_slice() {
                [Value::Symbol(sym)] => Instruction::SetGlobal(*sym),
                _ => return Err(bad_operands("set-global")),
            },

            opcode => {
                return Err(VmError::UnrecognizedInstruction {
                    opcode: opcode.to_string(),
                })
            }
        };

        Ok(instruction)
    }
}

fn bad_operands(opcode: &'static str) -> VmError {
    VmError::BadOperands { opcode }
}
