use std::{collections::HashMap, rc::Rc};

use lasso::{Capacity, Rodeo, Spur};

use crate::{
    builtins,
    value::{consify, NativeFn, Value},
    vm::{Vm, VmError},
};

/// Shared state of one machine instance: the symbol interner and the
/// global binding table.  Distinct instances never share bindings, the
/// table lives as long as the instance and spans every run made against
/// it.
#[derive(Debug)]
pub struct Environment {
    symbols: Rodeo,
    globals: HashMap<Spur, Value>,
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Self {
            symbols: Rodeo::with_capacity(Capacity::minimal()),
            globals: HashMap::with_capacity(0),
        };
        builtins::install(&mut env);
        env
    }

    pub fn intern(&mut self, name: &str) -> Spur {
        self.symbols.get_or_intern(name)
    }

    pub fn resolve(&self, sym: Spur) -> &str {
        self.symbols.resolve(&sym)
    }

    pub fn get_global(&self, sym: Spur) -> Option<&Value> {
        self.globals.get(&sym)
    }

    /// The names of every bound global, for diagnostics
    pub fn global_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.globals.keys().map(move |sym| self.symbols.resolve(sym))
    }

    /// Bind a global name.  Rebinding is allowed and every later lookup
    /// observes the newest value.  A closure being bound picks the name
    /// up as a display hint.
    pub fn set_global(&mut self, sym: Spur, value: Value) {
        if let Value::Closure(closure) = &value {
            closure.name.set(Some(sym));
        }
        self.globals.insert(sym, value);
    }

    /// Register a host function as a global binding, overriding any
    /// existing binding of the same name
    pub fn register_native<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Environment, &[Value]) -> Result<Value, VmError> + 'static,
    {
        let sym = self.intern(name);
        let native = NativeFn {
            name: name.to_string(),
            func: Box::new(func),
        };
        self.globals.insert(sym, Value::Native(Rc::new(native)));
    }

    /// Run an instruction stream to completion.  The stream may finish
    /// with an empty stack, which is normal for whole-file top levels.
    pub fn run_body(&mut self, instrs: Value) -> Result<Option<Value>, VmError> {
        Vm::new(self, instrs).run()
    }

    /// Run an instruction stream that has to produce a value
    pub fn run_expr(&mut self, instrs: Value) -> Result<Value, VmError> {
        self.run_body(instrs)?.ok_or(VmError::NoResult)
    }

    /// Call a globally bound function by name.  Builds the stream
    /// `(get-global f) (push arg)... (call n)` and runs it, which is the
    /// host side of the machine's own calling convention.
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value, VmError> {
        let get_global = self.intern("get-global");
        let push = self.intern("push");
        let call = self.intern("call");
        let func = self.intern(name);

        let count = args.len();
        let mut instrs = vec![consify(vec![
            Value::Symbol(get_global),
            Value::Symbol(func),
        ])];
        for arg in args {
            instrs.push(consify(vec![Value::Symbol(push), arg]));
        }
        instrs.push(consify(vec![
            Value::Symbol(call),
            Value::Integer(count as i64),
        ]));

        self.run_expr(consify(instrs))
    }
}
