use std::{cell::Cell, fmt, rc::Rc};

use lasso::Spur;
use thiserror::Error;

use crate::{environment::Environment, vm::VmError};

/// Error produced when iterating a chain whose final cdr is neither a pair
/// nor the empty list
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("improper list: chain does not end in ()")]
pub struct ImproperListError;

/// A runtime value.  Programs and data share this one representation, an
/// instruction is an ordinary list whose head is an opcode symbol.
#[derive(Debug, Clone)]
pub enum Value {
    /// The empty list, also the only false value
    Nil,

    /// Interned symbol, equal iff the names are equal
    Symbol(Spur),

    Integer(i64),

    String(Rc<str>),

    Pair(Rc<Pair>),

    Closure(Rc<Closure>),

    Native(Rc<NativeFn>),

    /// Sentinel bound to the global `apply`, intercepted by the call
    /// protocol instead of being invoked directly
    Apply,

    /// Saved resumption state.  Lives on the data stack underneath the
    /// value that will be handed back to it.
    Cont(Rc<Cont>),
}

/// A cons cell
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

/// A function value: an instruction stream plus a copy of the environment
/// frame that was current when the closure was created.  The copy means
/// nothing that happens to the creating frame afterwards is visible to
/// the closure.
#[derive(Debug)]
pub struct Closure {
    pub arity: u32,
    pub has_rest: bool,
    pub code: Value,
    pub env: Vec<Value>,

    /// Name hint stamped by set-global, only used for display
    pub name: Cell<Option<Spur>>,
}

impl Closure {
    pub fn new(arity: u32, has_rest: bool, code: Value, env: Vec<Value>) -> Self {
        Self {
            arity,
            has_rest,
            code,
            env,
            name: Cell::new(None),
        }
    }
}

/// A saved continuation: the instruction stream and environment frame to
/// restore once the value above it on the stack has been produced
#[derive(Debug)]
pub struct Cont {
    pub instrs: Value,
    pub frame: Vec<Value>,
}

/// A host function callable from running programs.  The function validates
/// its own argument count and types, the machine passes whatever was on
/// the stack straight through.
pub struct NativeFn {
    pub name: String,
    pub func: Box<dyn Fn(&mut Environment, &[Value]) -> Result<Value, VmError>>,
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

impl Value {
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    /// The empty list is the only false value, everything else including
    /// 0 and "" counts as true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil)
    }

    /// The conventional boolean results: the symbol `t` or the empty list
    pub fn from_bool(value: bool, env: &mut Environment) -> Value {
        if value {
            Value::Symbol(env.intern("t"))
        } else {
            Value::Nil
        }
    }

    /// Iterate the elements of a proper list.  The final item is an error
    /// if the chain ends in anything other than ().
    pub fn iter_list(&self) -> ListIter<'_> {
        ListIter { rest: Some(self) }
    }

    /// Collect a proper list into a vector, failing on dotted chains
    pub fn list_to_vec(&self) -> Result<Vec<Value>, ImproperListError> {
        self.iter_list().map(|e| e.map(Value::clone)).collect()
    }
}

impl PartialEq for Value {
    /// Structural equality for data, identity for closures, natives and
    /// continuations
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);

        // the cdr spine is walked iteratively so list length is not
        // limited by the native stack
        loop {
            match (a, b) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if Rc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.car != y.car {
                        return false;
                    }
                    a = &x.cdr;
                    b = &y.cdr;
                }
                (Value::Nil, Value::Nil) => return true,
                (Value::Symbol(x), Value::Symbol(y)) => return x == y,
                (Value::Integer(x), Value::Integer(y)) => return x == y,
                (Value::String(x), Value::String(y)) => return x == y,
                (Value::Closure(x), Value::Closure(y)) => return Rc::ptr_eq(x, y),
                (Value::Native(x), Value::Native(y)) => return Rc::ptr_eq(x, y),
                (Value::Cont(x), Value::Cont(y)) => return Rc::ptr_eq(x, y),
                (Value::Apply, Value::Apply) => return true,
                _ => return false,
            }
        }
    }
}

/// Build a list from a sequence of values, the first element becomes the
/// head of the chain
pub fn consify<I>(values: I) -> Value
where
    I: IntoIterator<Item = Value>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut list = Value::Nil;
    for value in values.into_iter().rev() {
        list = Value::cons(value, list);
    }
    list
}

/// Iterator over a proper list, see [`Value::iter_list`]
#[derive(Debug, Clone)]
pub struct ListIter<'a> {
    rest: Option<&'a Value>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = Result<&'a Value, ImproperListError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rest.take()? {
            Value::Pair(pair) => {
                self.rest = Some(&pair.cdr);
                Some(Ok(&pair.car))
            }
            Value::Nil => None,
            _ => Some(Err(ImproperListError)),
        }
    }
}
