//! Tree-walking interpreter with step counting for the watchdog.

use std::collections::HashMap;
use std::rc::Rc;

use super::ast::*;
use super::builtins::{Builtin, HostApi};
use super::candy;
use super::error::{Result, ScriptError};
use super::parser;
use super::value::*;
use super::watchdog::{Watchdog, CHECK_INTERVAL};
use crate::time::Clock;

/// Guest recursion cap; keeps a runaway script away from the host stack.
const MAX_CALL_DEPTH: usize = 200;

enum Flow {
    Normal,
    Break,
    Return(Value),
}

pub struct Interp<C: Clock> {
    globals: ScopeRef,
    /// `require` cache: module name -> the value its body returned.
    modules: HashMap<String, Value>,
    steps: u64,
    depth: usize,
    pub watchdog: Watchdog<C>,
}

impl<C: Clock> Interp<C> {
    pub fn new(watchdog: Watchdog<C>) -> Self {
        let mut interp = Self {
            globals: Scope::root(),
            modules: HashMap::new(),
            steps: 0,
            depth: 0,
            watchdog,
        };
        interp.install_builtins();
        interp
    }

    /// Throw away the whole guest environment: globals, module cache, step
    /// counters. The watchdog (and its clock) survive.
    pub fn reset(&mut self) {
        self.globals = Scope::root();
        self.modules.clear();
        self.steps = 0;
        self.depth = 0;
        self.install_builtins();
    }

    fn install_builtins(&mut self) {
        for b in Builtin::globals() {
            Scope::declare(&self.globals, b.name(), Value::Builtin(*b));
        }
        let mut fs = Table::default();
        for b in Builtin::fs_table() {
            fs.set_str(b.name(), Value::Builtin(*b));
        }
        Scope::declare(&self.globals, "fs", Value::table(fs));
    }

    pub fn global(&self, name: &str) -> Value {
        Scope::lookup(&self.globals, name).unwrap_or(Value::Nil)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        Scope::declare(&self.globals, name, value);
    }

    pub fn has_callable_global(&self, name: &str) -> bool {
        self.global(name).is_callable()
    }

    /// Execute a top-level chunk; its `return` value (if any) comes back.
    pub fn run_chunk(&mut self, block: &Block, host: &mut dyn HostApi) -> Result<Value> {
        let scope = Scope::child(self.globals.clone());
        match self.exec_block(block, &scope, host)? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::Nil),
        }
    }

    pub fn call_global(
        &mut self,
        name: &str,
        args: Vec<Value>,
        host: &mut dyn HostApi,
    ) -> Result<Value> {
        let callee = self.global(name);
        self.call(callee, args, host, 0)
    }

    fn step(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps % CHECK_INTERVAL == 0 {
            self.watchdog.check()?;
        }
        Ok(())
    }

    fn exec_block(&mut self, block: &Block, scope: &ScopeRef, host: &mut dyn HostApi) -> Result<Flow> {
        for stat in block {
            match self.exec_stat(stat, scope, host)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stat(&mut self, stat: &Stat, scope: &ScopeRef, host: &mut dyn HostApi) -> Result<Flow> {
        self.step()?;
        let line = stat.line;
        match &stat.kind {
            StatKind::Local(names, exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for e in exprs {
                    values.push(self.eval(e, scope, host, line)?);
                }
                for (i, name) in names.iter().enumerate() {
                    Scope::declare(scope, name, values.get(i).cloned().unwrap_or(Value::Nil));
                }
                Ok(Flow::Normal)
            }
            StatKind::LocalFunction(name, def) => {
                // declare first so the body can call itself
                Scope::declare(scope, name, Value::Nil);
                let closure = Value::Func(Rc::new(Closure {
                    def: def.clone(),
                    env: scope.clone(),
                }));
                Scope::declare(scope, name, closure);
                Ok(Flow::Normal)
            }
            StatKind::Assign(targets, exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for e in exprs {
                    values.push(self.eval(e, scope, host, line)?);
                }
                for (i, target) in targets.iter().enumerate() {
                    let value = values.get(i).cloned().unwrap_or(Value::Nil);
                    self.assign(target, value, scope, host, line)?;
                }
                Ok(Flow::Normal)
            }
            StatKind::Call(e) => {
                self.eval(e, scope, host, line)?;
                Ok(Flow::Normal)
            }
            StatKind::Do(body) => {
                let inner = Scope::child(scope.clone());
                self.exec_block(body, &inner, host)
            }
            StatKind::If(arms, otherwise) => {
                for (cond, body) in arms {
                    if self.eval(cond, scope, host, line)?.truthy() {
                        let inner = Scope::child(scope.clone());
                        return self.exec_block(body, &inner, host);
                    }
                }
                if let Some(body) = otherwise {
                    let inner = Scope::child(scope.clone());
                    return self.exec_block(body, &inner, host);
                }
                Ok(Flow::Normal)
            }
            StatKind::While(cond, body) => {
                loop {
                    self.step()?;
                    if !self.eval(cond, scope, host, line)?.truthy() {
                        return Ok(Flow::Normal);
                    }
                    let inner = Scope::child(scope.clone());
                    match self.exec_block(body, &inner, host)? {
                        Flow::Normal => {}
                        Flow::Break => return Ok(Flow::Normal),
                        ret => return Ok(ret),
                    }
                }
            }
            StatKind::Repeat(body, cond) => {
                loop {
                    self.step()?;
                    let inner = Scope::child(scope.clone());
                    match self.exec_block(body, &inner, host)? {
                        Flow::Normal => {}
                        Flow::Break => return Ok(Flow::Normal),
                        ret => return Ok(ret),
                    }
                    // the until-condition sees the body's locals
                    if self.eval(cond, &inner, host, line)?.truthy() {
                        return Ok(Flow::Normal);
                    }
                }
            }
            StatKind::NumericFor {
                var,
                start,
                stop,
                step,
                body,
            } => {
                let start = self.eval_num(start, scope, host, line, "'for' initial value")?;
                let stop = self.eval_num(stop, scope, host, line, "'for' limit")?;
                let step = match step {
                    Some(e) => self.eval_num(e, scope, host, line, "'for' step")?,
                    None => 1.0,
                };
                if step == 0.0 {
                    return Err(ScriptError::runtime(line, "'for' step is zero"));
                }
                let mut i = start;
                while (step > 0.0 && i <= stop) || (step < 0.0 && i >= stop) {
                    self.step()?;
                    let inner = Scope::child(scope.clone());
                    Scope::declare(&inner, var, Value::Num(i));
                    match self.exec_block(body, &inner, host)? {
                        Flow::Normal => {}
                        Flow::Break => return Ok(Flow::Normal),
                        ret => return Ok(ret),
                    }
                    i += step;
                }
                Ok(Flow::Normal)
            }
            StatKind::Return(e) => {
                let value = match e {
                    Some(e) => self.eval(e, scope, host, line)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            StatKind::Break => Ok(Flow::Break),
        }
    }

    fn assign(
        &mut self,
        target: &LValue,
        value: Value,
        scope: &ScopeRef,
        host: &mut dyn HostApi,
        line: u32,
    ) -> Result<()> {
        match target {
            LValue::Var(name) => {
                Scope::assign(scope, name, value);
                Ok(())
            }
            LValue::Field(base, name) => {
                let base = self.eval(base, scope, host, line)?;
                match base {
                    Value::Table(t) => {
                        t.borrow_mut().set(Key::Str(name.clone()), value);
                        Ok(())
                    }
                    other => Err(ScriptError::runtime(
                        line,
                        format!("attempt to index a {} value", other.type_name()),
                    )),
                }
            }
            LValue::Index(base, key) => {
                let base = self.eval(base, scope, host, line)?;
                let key = self.eval(key, scope, host, line)?;
                match base {
                    Value::Table(t) => {
                        let key = Key::from_value(&key, line)?;
                        t.borrow_mut().set(key, value);
                        Ok(())
                    }
                    other => Err(ScriptError::runtime(
                        line,
                        format!("attempt to index a {} value", other.type_name()),
                    )),
                }
            }
        }
    }

    fn eval_num(
        &mut self,
        e: &Expr,
        scope: &ScopeRef,
        host: &mut dyn HostApi,
        line: u32,
        what: &str,
    ) -> Result<f64> {
        match self.eval(e, scope, host, line)? {
            Value::Num(n) => Ok(n),
            other => Err(ScriptError::runtime(
                line,
                format!("{} must be a number, got {}", what, other.type_name()),
            )),
        }
    }

    fn eval(
        &mut self,
        expr: &Expr,
        scope: &ScopeRef,
        host: &mut dyn HostApi,
        line: u32,
    ) -> Result<Value> {
        self.step()?;
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::True => Ok(Value::Bool(true)),
            Expr::False => Ok(Value::Bool(false)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Var(name) => Ok(Scope::lookup(scope, name).unwrap_or(Value::Nil)),
            Expr::Field(base, name) => {
                let base = self.eval(base, scope, host, line)?;
                match base {
                    Value::Table(t) => Ok(t.borrow().get(&Key::Str(name.clone()))),
                    other => Err(ScriptError::runtime(
                        line,
                        format!(
                            "attempt to index a {} value (field '{}')",
                            other.type_name(),
                            name
                        ),
                    )),
                }
            }
            Expr::Index(base, key) => {
                let base = self.eval(base, scope, host, line)?;
                let key = self.eval(key, scope, host, line)?;
                match base {
                    Value::Table(t) => {
                        let key = Key::from_value(&key, line)?;
                        Ok(t.borrow().get(&key))
                    }
                    other => Err(ScriptError::runtime(
                        line,
                        format!("attempt to index a {} value", other.type_name()),
                    )),
                }
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee, scope, host, line)?;
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(a, scope, host, line)?);
                }
                self.call(callee, values, host, line)
            }
            Expr::Function(def) => Ok(Value::Func(Rc::new(Closure {
                def: def.clone(),
                env: scope.clone(),
            }))),
            Expr::Table(fields) => {
                let mut table = Table::default();
                let mut auto = 1i64;
                for (key, value_expr) in fields {
                    let value = self.eval(value_expr, scope, host, line)?;
                    let key = match key {
                        TableKey::Auto => {
                            let k = Key::Int(auto);
                            auto += 1;
                            k
                        }
                        TableKey::Named(name) => Key::Str(name.clone()),
                        TableKey::Computed(e) => {
                            let v = self.eval(e, scope, host, line)?;
                            Key::from_value(&v, line)?
                        }
                    };
                    table.set(key, value);
                }
                Ok(Value::table(table))
            }
            Expr::UnOp(op, operand) => {
                let v = self.eval(operand, scope, host, line)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!v.truthy())),
                    UnOp::Neg => match v {
                        Value::Num(n) => Ok(Value::Num(-n)),
                        other => Err(ScriptError::runtime(
                            line,
                            format!(
                                "attempt to perform arithmetic on a {} value",
                                other.type_name()
                            ),
                        )),
                    },
                    UnOp::Len => match v {
                        Value::Str(s) => Ok(Value::Num(s.len() as f64)),
                        Value::Table(t) => Ok(Value::Num(t.borrow().len() as f64)),
                        other => Err(ScriptError::runtime(
                            line,
                            format!("attempt to get length of a {} value", other.type_name()),
                        )),
                    },
                }
            }
            Expr::BinOp(op, lhs, rhs) => self.eval_binop(*op, lhs, rhs, scope, host, line),
        }
    }

    fn eval_binop(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        scope: &ScopeRef,
        host: &mut dyn HostApi,
        line: u32,
    ) -> Result<Value> {
        // and/or short-circuit and yield the deciding operand
        if op == BinOp::And {
            let l = self.eval(lhs, scope, host, line)?;
            return if l.truthy() {
                self.eval(rhs, scope, host, line)
            } else {
                Ok(l)
            };
        }
        if op == BinOp::Or {
            let l = self.eval(lhs, scope, host, line)?;
            return if l.truthy() {
                Ok(l)
            } else {
                self.eval(rhs, scope, host, line)
            };
        }

        let l = self.eval(lhs, scope, host, line)?;
        let r = self.eval(rhs, scope, host, line)?;
        match op {
            BinOp::Eq => Ok(Value::Bool(l == r)),
            BinOp::Ne => Ok(Value::Bool(l != r)),
            BinOp::Concat => match (&l, &r) {
                (Value::Num(_) | Value::Str(_), Value::Num(_) | Value::Str(_)) => {
                    Ok(Value::str(format!("{}{}", l.display(), r.display())))
                }
                _ => Err(ScriptError::runtime(
                    line,
                    format!(
                        "attempt to concatenate a {} value",
                        if matches!(l, Value::Num(_) | Value::Str(_)) {
                            r.type_name()
                        } else {
                            l.type_name()
                        }
                    ),
                )),
            },
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
                let (a, b) = match (&l, &r) {
                    (Value::Num(a), Value::Num(b)) => (*a, *b),
                    _ => {
                        let offender = if matches!(l, Value::Num(_)) { &r } else { &l };
                        return Err(ScriptError::runtime(
                            line,
                            format!(
                                "attempt to perform arithmetic on a {} value",
                                offender.type_name()
                            ),
                        ));
                    }
                };
                let n = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Mod => a - (a / b).floor() * b,
                    BinOp::Pow => a.powf(b),
                    _ => unreachable!(),
                };
                Ok(Value::Num(n))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ord = match (&l, &r) {
                    (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => {
                        return Err(ScriptError::runtime(
                            line,
                            format!("attempt to compare {} with {}", l.type_name(), r.type_name()),
                        ));
                    }
                };
                let Some(ord) = ord else {
                    return Ok(Value::Bool(false)); // NaN comparisons
                };
                let result = match op {
                    BinOp::Lt => ord.is_lt(),
                    BinOp::Le => ord.is_le(),
                    BinOp::Gt => ord.is_gt(),
                    BinOp::Ge => ord.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            BinOp::And | BinOp::Or => unreachable!(),
        }
    }

    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        host: &mut dyn HostApi,
        line: u32,
    ) -> Result<Value> {
        self.step()?;
        match callee {
            Value::Func(closure) => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(ScriptError::runtime(line, "stack overflow"));
                }
                self.depth += 1;
                let scope = Scope::child(closure.env.clone());
                for (i, param) in closure.def.params.iter().enumerate() {
                    Scope::declare(&scope, param, args.get(i).cloned().unwrap_or(Value::Nil));
                }
                let result = self.exec_block(&closure.def.body, &scope, host);
                self.depth -= 1;
                match result? {
                    Flow::Return(v) => Ok(v),
                    _ => Ok(Value::Nil),
                }
            }
            Value::Builtin(b) => self.call_builtin(b, args, host, line),
            other => Err(ScriptError::runtime(
                line,
                format!("attempt to call a {} value", other.type_name()),
            )),
        }
    }

    fn call_builtin(
        &mut self,
        b: Builtin,
        args: Vec<Value>,
        host: &mut dyn HostApi,
        line: u32,
    ) -> Result<Value> {
        let result = match b {
            Builtin::Require => match arg_str(&args, 0, "require") {
                Ok(name) => return self.require(&name, host),
                Err(e) => Err(e),
            },
            Builtin::Tostr => Ok(Value::str(
                args.first().cloned().unwrap_or(Value::Nil).display(),
            )),
            Builtin::Tonum => Ok(match args.first() {
                Some(Value::Num(n)) => Value::Num(*n),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Num)
                    .unwrap_or(Value::Nil),
                _ => Value::Nil,
            }),
            Builtin::Flr => Ok(Value::Num(arg_num(&args, 0, "flr")?.floor())),
            Builtin::Abs => Ok(Value::Num(arg_num(&args, 0, "abs")?.abs())),
            Builtin::Sqrt => Ok(Value::Num(arg_num(&args, 0, "sqrt")?.sqrt())),
            Builtin::Sin => Ok(Value::Num(arg_num(&args, 0, "sin")?.sin())),
            Builtin::Cos => Ok(Value::Num(arg_num(&args, 0, "cos")?.cos())),
            Builtin::Min => Ok(Value::Num(
                arg_num(&args, 0, "min")?.min(arg_num(&args, 1, "min")?),
            )),
            Builtin::Max => Ok(Value::Num(
                arg_num(&args, 0, "max")?.max(arg_num(&args, 1, "max")?),
            )),
            Builtin::Time => Ok(Value::Num(self.watchdog.now_ms() / 1000.0)),
            _ => host.builtin(b, &args),
        };
        // argument errors are raised without position info; stamp the call
        // site on them
        result.map_err(|e| match e {
            ScriptError::Runtime { line: 0, message } => ScriptError::Runtime { line, message },
            other => other,
        })
    }

    /// Resolve, load, and cache a module. The body runs once; later requires
    /// return the cached value.
    pub fn require(&mut self, name: &str, host: &mut dyn HostApi) -> Result<Value> {
        if let Some(cached) = self.modules.get(name) {
            return Ok(cached.clone());
        }
        let mut path = name.replace('.', "/");
        if !path.ends_with(".mns") {
            path.push_str(".mns");
        }
        let source = host.module_source(&path)?;
        let processed = candy::process(&source);
        let block = parser::parse(&processed)
            .map_err(|e| ScriptError::Module(format!("error loading '{}': {}", path, e)))?;
        let value = match self.run_chunk(&block, host)? {
            // a module that returns nothing still loaded successfully
            Value::Nil => Value::Bool(true),
            v => v,
        };
        self.modules.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Clock;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Advances one millisecond every time it is read, so watchdog behavior
    /// is deterministic.
    struct TickClock(Cell<f64>);

    impl Clock for TickClock {
        fn now_ms(&self) -> f64 {
            let v = self.0.get();
            self.0.set(v + 1.0);
            v
        }
    }

    #[derive(Default)]
    struct TestHost {
        modules: HashMap<String, String>,
        logged: Vec<String>,
    }

    impl HostApi for TestHost {
        fn builtin(&mut self, b: Builtin, args: &[Value]) -> Result<Value> {
            match b {
                Builtin::Log => {
                    self.logged
                        .push(args.first().cloned().unwrap_or(Value::Nil).display());
                    Ok(Value::Nil)
                }
                _ => Ok(Value::Nil),
            }
        }

        fn module_source(&mut self, path: &str) -> Result<String> {
            self.modules
                .get(path)
                .cloned()
                .ok_or_else(|| ScriptError::Module(format!("module not found: {}", path)))
        }
    }

    fn interp() -> Interp<TickClock> {
        Interp::new(Watchdog::new(TickClock(Cell::new(0.0)), false, 200.0))
    }

    fn run(interp: &mut Interp<TickClock>, host: &mut TestHost, src: &str) -> Result<Value> {
        let block = parser::parse(&candy::process(src)).expect("parse");
        interp.run_chunk(&block, host)
    }

    fn eval_global(src: &str, global: &str) -> Value {
        let mut i = interp();
        let mut host = TestHost::default();
        run(&mut i, &mut host, src).expect("run");
        i.global(global)
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_global("x = 1 + 2 * 3", "x"), Value::Num(7.0));
        assert_eq!(eval_global("x = (1 + 2) * 3", "x"), Value::Num(9.0));
        assert_eq!(eval_global("x = 2 ^ 3 ^ 2", "x"), Value::Num(512.0));
        assert_eq!(eval_global("x = -7 % 3", "x"), Value::Num(2.0));
    }

    #[test]
    fn strings_concat_and_compare() {
        assert_eq!(eval_global("s = 'a' .. 1 .. 'b'", "s"), Value::str("a1b"));
        assert_eq!(eval_global("b = 'abc' < 'abd'", "b"), Value::Bool(true));
    }

    #[test]
    fn control_flow_runs() {
        let src = "
            total = 0
            for i = 1, 10 do
                if i % 2 == 0 then
                    total = total + i
                end
            end
        ";
        assert_eq!(eval_global(src, "total"), Value::Num(30.0));
    }

    #[test]
    fn while_and_break() {
        let src = "
            n = 0
            while true do
                n = n + 1
                if n >= 5 then break end
            end
        ";
        assert_eq!(eval_global(src, "n"), Value::Num(5.0));
    }

    #[test]
    fn repeat_sees_body_locals_in_the_condition() {
        let src = "
            count = 0
            repeat
                local done = count >= 3
                count = count + 1
            until done
        ";
        assert_eq!(eval_global(src, "count"), Value::Num(4.0));
    }

    #[test]
    fn functions_close_over_locals() {
        let src = "
            local function counter()
                local n = 0
                return function()
                    n = n + 1
                    return n
                end
            end
            local c = counter()
            c()
            c()
            result = c()
        ";
        assert_eq!(eval_global(src, "result"), Value::Num(3.0));
    }

    #[test]
    fn recursion_works_and_overflow_is_caught() {
        let src = "
            function fib(n)
                if n < 2 then return n end
                return fib(n - 1) + fib(n - 2)
            end
            f = fib(12)
        ";
        assert_eq!(eval_global(src, "f"), Value::Num(144.0));

        let mut i = interp();
        let mut host = TestHost::default();
        let err = run(&mut i, &mut host, "function f() return f() end\nf()").unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { ref message, .. } if message.contains("stack overflow")));
    }

    #[test]
    fn tables_index_and_length() {
        let src = "
            t = { 10, 20, lives = 3, [9] = 'x' }
            a = t[1]
            b = t.lives
            t.lives = t.lives - 1
            c = t.lives
            n = #t
        ";
        let mut i = interp();
        let mut host = TestHost::default();
        run(&mut i, &mut host, src).unwrap();
        assert_eq!(i.global("a"), Value::Num(10.0));
        assert_eq!(i.global("b"), Value::Num(3.0));
        assert_eq!(i.global("c"), Value::Num(2.0));
        assert_eq!(i.global("n"), Value::Num(2.0));
    }

    #[test]
    fn calling_nil_reports_the_line() {
        let mut i = interp();
        let mut host = TestHost::default();
        let err = run(&mut i, &mut host, "x = 1\nmissing()").unwrap_err();
        match err {
            ScriptError::Runtime { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("attempt to call a nil value"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sugar_processed_source_executes() {
        let src = "
            hp = 10
            hp -= 3 // damage
            hp++
            ok = hp != 8
        ";
        let mut i = interp();
        let mut host = TestHost::default();
        run(&mut i, &mut host, src).unwrap();
        assert_eq!(i.global("hp"), Value::Num(8.0));
        assert_eq!(i.global("ok"), Value::Bool(false));
    }

    #[test]
    fn require_caches_by_name() {
        let mut i = interp();
        let mut host = TestHost::default();
        host.modules.insert(
            "lib/counter.mns".to_string(),
            "loads = (loads or 0) + 1\nreturn { loads = loads }".to_string(),
        );
        let src = "
            local a = require('lib.counter')
            local b = require('lib.counter')
            same = a == b
            count = a.loads
        ";
        run(&mut i, &mut host, src).unwrap();
        // identical cached value, body ran exactly once
        assert_eq!(i.global("same"), Value::Bool(true));
        assert_eq!(i.global("count"), Value::Num(1.0));
    }

    #[test]
    fn valueless_module_caches_as_true() {
        let mut i = interp();
        let mut host = TestHost::default();
        host.modules
            .insert("setup.mns".to_string(), "ready = true".to_string());
        run(&mut i, &mut host, "ok = require('setup')").unwrap();
        assert_eq!(i.global("ok"), Value::Bool(true));
    }

    #[test]
    fn missing_module_names_the_path() {
        let mut i = interp();
        let mut host = TestHost::default();
        let err = run(&mut i, &mut host, "require('gone')").unwrap_err();
        assert!(matches!(err, ScriptError::Module(ref m) if m.contains("gone.mns")));
    }

    #[test]
    fn watchdog_cuts_an_unbounded_loop() {
        // the tick clock advances 1 ms per reading; 200 ms budget
        let mut i = Interp::new(Watchdog::new(TickClock(Cell::new(0.0)), true, 200.0));
        i.watchdog.begin_window();
        let mut host = TestHost::default();
        let err = run(&mut i, &mut host, "while true do end").unwrap_err();
        assert!(matches!(err, ScriptError::Timeout { .. }));
    }

    #[test]
    fn reset_clears_globals_and_module_cache() {
        let mut i = interp();
        let mut host = TestHost::default();
        host.modules
            .insert("m.mns".to_string(), "hits = (hits or 0) + 1".to_string());
        run(&mut i, &mut host, "require('m')\nstate = 1").unwrap();
        assert_eq!(i.global("state"), Value::Num(1.0));
        i.reset();
        assert_eq!(i.global("state"), Value::Nil);
        // builtins are back after a reset
        assert!(i.has_callable_global("peek"));
        // and the module body runs again on the next require
        run(&mut i, &mut host, "require('m')\nh = hits").unwrap();
        assert_eq!(i.global("h"), Value::Num(1.0));
    }

    #[test]
    fn host_log_builtin_receives_the_message() {
        let mut i = interp();
        let mut host = TestHost::default();
        run(&mut i, &mut host, "log('hello ' .. 2)").unwrap();
        assert_eq!(host.logged, vec!["hello 2".to_string()]);
    }
}
