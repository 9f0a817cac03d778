//! Runtime values, tables, and lexical scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::ast::FnDef;
use super::builtins::Builtin;
use super::error::{Result, ScriptError};

pub type TableRef = Rc<RefCell<Table>>;
pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Table(TableRef),
    Func(Rc<Closure>),
    Builtin(Builtin),
}

/// A guest function plus the scope it closed over.
pub struct Closure {
    pub def: Rc<FnDef>,
    pub env: ScopeRef,
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn table(t: Table) -> Value {
        Value::Table(Rc::new(RefCell::new(t)))
    }

    /// Everything but nil and false.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Func(_) | Value::Builtin(_) => "function",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Func(_) | Value::Builtin(_))
    }

    /// Display form: numbers drop a trailing `.0`, everything else prints the
    /// obvious way.
    pub fn display(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => fmt_num(*n),
            Value::Str(s) => s.to_string(),
            Value::Table(t) => format!("table: {:p}", Rc::as_ptr(t)),
            Value::Func(f) => format!("function: {}", f.def.name),
            Value::Builtin(b) => format!("function: builtin '{}'", b.name()),
        }
    }
}

impl PartialEq for Value {
    /// Tables and functions compare by identity, everything else by value.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

pub fn fmt_num(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Table keys: integers and strings. Fractional numeric keys are rejected at
/// the point of use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    pub fn from_value(v: &Value, line: u32) -> Result<Key> {
        match v {
            Value::Num(n) if n.fract() == 0.0 => Ok(Key::Int(*n as i64)),
            Value::Num(_) => Err(ScriptError::runtime(
                line,
                "table index must be an integer or a string",
            )),
            Value::Str(s) => Ok(Key::Str(s.to_string())),
            other => Err(ScriptError::runtime(
                line,
                format!("cannot index a table with a {}", other.type_name()),
            )),
        }
    }
}

#[derive(Default)]
pub struct Table {
    map: HashMap<Key, Value>,
}

impl Table {
    pub fn get(&self, key: &Key) -> Value {
        self.map.get(key).cloned().unwrap_or(Value::Nil)
    }

    /// Setting nil removes the entry, so `#` and iteration agree with Lua
    /// habits.
    pub fn set(&mut self, key: Key, value: Value) {
        if let Value::Nil = value {
            self.map.remove(&key);
        } else {
            self.map.insert(key, value);
        }
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        self.set(Key::Str(key.to_string()), value);
    }

    /// Border of the array part: the count of consecutive integer keys
    /// from 1.
    pub fn len(&self) -> i64 {
        let mut n = 0;
        while self.map.contains_key(&Key::Int(n + 1)) {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// One lexical scope level. Globals are the chain root.
pub struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: None,
        }))
    }

    pub fn child(parent: ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(parent),
        }))
    }

    /// Walk the chain for a name.
    pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
        let mut current = Some(scope.clone());
        while let Some(s) = current {
            let s = s.borrow();
            if let Some(v) = s.vars.get(name) {
                return Some(v.clone());
            }
            current = s.parent.clone();
        }
        None
    }

    /// Assign to the nearest scope that already has the name; otherwise the
    /// name becomes a global.
    pub fn assign(scope: &ScopeRef, name: &str, value: Value) {
        let mut current = scope.clone();
        loop {
            if current.borrow().vars.contains_key(name) {
                current.borrow_mut().vars.insert(name.to_string(), value);
                return;
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => {
                    // the chain root is the globals table
                    current.borrow_mut().vars.insert(name.to_string(), value);
                    return;
                }
            }
        }
    }

    /// Declare in this scope, shadowing outer bindings.
    pub fn declare(scope: &ScopeRef, name: &str, value: Value) {
        scope.borrow_mut().vars.insert(name.to_string(), value);
    }
}

// --- argument helpers shared by builtin implementations ---

pub fn arg_num(args: &[Value], i: usize, what: &str) -> Result<f64> {
    match args.get(i) {
        Some(Value::Num(n)) => Ok(*n),
        other => Err(bad_arg(i, what, "number", other)),
    }
}

pub fn arg_int(args: &[Value], i: usize, what: &str) -> Result<i64> {
    Ok(arg_num(args, i, what)? as i64)
}

pub fn opt_int(args: &[Value], i: usize, default: i64) -> i64 {
    match args.get(i) {
        Some(Value::Num(n)) => *n as i64,
        _ => default,
    }
}

pub fn arg_str(args: &[Value], i: usize, what: &str) -> Result<Rc<str>> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.clone()),
        other => Err(bad_arg(i, what, "string", other)),
    }
}

pub fn opt_bool(args: &[Value], i: usize, default: bool) -> bool {
    match args.get(i) {
        Some(v) if !matches!(v, Value::Nil) => v.truthy(),
        _ => default,
    }
}

fn bad_arg(i: usize, what: &str, wanted: &str, got: Option<&Value>) -> ScriptError {
    ScriptError::Runtime {
        line: 0,
        message: format!(
            "bad argument #{} to '{}' ({} expected, got {})",
            i + 1,
            what,
            wanted,
            got.map(|v| v.type_name()).unwrap_or("no value")
        ),
    }
}
