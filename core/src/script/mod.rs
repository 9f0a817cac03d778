//! Guest-script execution: syntax sugar, compilation, module loading, the
//! CPU-budget watchdog, and the crash-safe lifecycle-hook surface.

pub mod ast;
pub mod builtins;
pub mod candy;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;
pub mod watchdog;

pub use builtins::{Builtin, HostApi};
pub use error::ScriptError;
pub use value::{Table, Value};

use log::debug;

use crate::error::ScriptFailure;
use crate::time::Clock;
use interp::Interp;
use watchdog::Watchdog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Unloaded,
    Compiled,
    Initialized,
    Faulted,
}

/// The optional guest lifecycle callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Init,
    Update,
    Draw,
}

impl Hook {
    pub fn global_name(self) -> &'static str {
        match self {
            Hook::Init => "_init",
            Hook::Update => "_update",
            Hook::Draw => "_draw",
        }
    }
}

/// Which hooks the loaded program actually defines. Resolved once per load;
/// per-frame dispatch never probes globals by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet {
    pub init: bool,
    pub update: bool,
    pub draw: bool,
}

impl HookSet {
    pub fn has(self, hook: Hook) -> bool {
        match hook {
            Hook::Init => self.init,
            Hook::Update => self.update,
            Hook::Draw => self.draw,
        }
    }
}

/// One guest execution environment per machine.
pub struct ScriptSandbox<C: Clock> {
    interp: Interp<C>,
    state: SandboxState,
    hooks: HookSet,
}

impl<C: Clock> ScriptSandbox<C> {
    pub fn new(clock: C, watchdog_enabled: bool, budget_ms: f64) -> Self {
        Self {
            interp: Interp::new(Watchdog::new(clock, watchdog_enabled, budget_ms)),
            state: SandboxState::Unloaded,
            hooks: HookSet::default(),
        }
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn hooks(&self) -> HookSet {
        self.hooks
    }

    /// Read a global out of the guest environment (diagnostics, tests).
    pub fn global(&self, name: &str) -> Value {
        self.interp.global(name)
    }

    /// Preprocess, compile, and run a program chunk. A compile error aborts
    /// the load and mutates nothing else; a runtime fault during the body
    /// leaves the sandbox faulted.
    pub fn load(
        &mut self,
        source: &str,
        name: &str,
        host: &mut dyn HostApi,
    ) -> Result<(), ScriptFailure> {
        let processed = candy::process(source);
        let block = parser::parse(&processed).map_err(|e| ScriptFailure::Compile {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        debug!("loaded chunk '{}'", name);
        self.state = SandboxState::Compiled;

        self.interp.watchdog.begin_window();
        if let Err(e) = self.interp.run_chunk(&block, host) {
            self.state = SandboxState::Faulted;
            return Err(to_failure(e));
        }

        self.hooks = HookSet {
            init: self.interp.has_callable_global(Hook::Init.global_name()),
            update: self.interp.has_callable_global(Hook::Update.global_name()),
            draw: self.interp.has_callable_global(Hook::Draw.global_name()),
        };
        self.state = SandboxState::Initialized;
        Ok(())
    }

    /// Invoke a lifecycle hook under a fresh CPU-budget window. A hook the
    /// program never defined is a successful no-op, not an error.
    pub fn call_hook(
        &mut self,
        hook: Hook,
        args: Vec<Value>,
        host: &mut dyn HostApi,
    ) -> Result<(), ScriptFailure> {
        if !self.hooks.has(hook) {
            return Ok(());
        }
        self.interp.watchdog.begin_window();
        match self.interp.call_global(hook.global_name(), args, host) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.state = SandboxState::Faulted;
                Err(to_failure(e))
            }
        }
    }

    /// Throw the guest environment away (globals, module cache, hook set).
    /// Guest RAM belongs to the machine and is left alone.
    pub fn reset(&mut self) {
        self.interp.reset();
        self.state = SandboxState::Unloaded;
        self.hooks = HookSet::default();
    }
}

fn to_failure(e: ScriptError) -> ScriptFailure {
    match e {
        ScriptError::Timeout { budget_ms } => ScriptFailure::Timeout { budget_ms },
        other => ScriptFailure::Runtime(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::WallClock;
    use super::error::Result;

    #[derive(Default)]
    struct NullHost;

    impl HostApi for NullHost {
        fn builtin(&mut self, _b: Builtin, _args: &[Value]) -> Result<Value> {
            Ok(Value::Nil)
        }

        fn module_source(&mut self, path: &str) -> Result<String> {
            Err(ScriptError::Module(format!("module not found: {}", path)))
        }
    }

    fn sandbox() -> ScriptSandbox<WallClock> {
        ScriptSandbox::new(WallClock::default(), true, 200.0)
    }

    #[test]
    fn load_resolves_the_hook_set_once() {
        let mut sb = sandbox();
        let mut host = NullHost;
        sb.load("function _init() end\nfunction _draw() end", "main", &mut host)
            .unwrap();
        assert_eq!(sb.state(), SandboxState::Initialized);
        assert!(sb.hooks().init);
        assert!(!sb.hooks().update);
        assert!(sb.hooks().draw);
    }

    #[test]
    fn a_missing_hook_is_a_silent_no_op() {
        let mut sb = sandbox();
        let mut host = NullHost;
        sb.load("x = 1", "main", &mut host).unwrap();
        assert!(sb.call_hook(Hook::Update, Vec::new(), &mut host).is_ok());
        assert_eq!(sb.state(), SandboxState::Initialized);
    }

    #[test]
    fn compile_errors_leave_the_sandbox_untouched() {
        let mut sb = sandbox();
        let mut host = NullHost;
        sb.load("before = 41", "main", &mut host).unwrap();
        let err = sb.load("if without then", "broken", &mut host).unwrap_err();
        match err {
            ScriptFailure::Compile { name, .. } => assert_eq!(name, "broken"),
            other => panic!("unexpected {:?}", other),
        }
        // the previous environment is still intact
        assert_eq!(sb.global("before"), Value::Num(41.0));
    }

    #[test]
    fn a_faulting_hook_marks_the_sandbox() {
        let mut sb = sandbox();
        let mut host = NullHost;
        sb.load("function _update() boom() end", "main", &mut host)
            .unwrap();
        let err = sb
            .call_hook(Hook::Update, Vec::new(), &mut host)
            .unwrap_err();
        assert!(matches!(err, ScriptFailure::Runtime(_)));
        assert_eq!(sb.state(), SandboxState::Faulted);
    }

    #[test]
    fn hook_arguments_reach_the_guest() {
        let mut sb = sandbox();
        let mut host = NullHost;
        sb.load("function _update(dt) last_dt = dt end", "main", &mut host)
            .unwrap();
        sb.call_hook(Hook::Update, vec![Value::Num(0.016)], &mut host)
            .unwrap();
        assert_eq!(sb.global("last_dt"), Value::Num(0.016));
    }

    #[test]
    fn reset_returns_to_unloaded() {
        let mut sb = sandbox();
        let mut host = NullHost;
        sb.load("function _update() end", "main", &mut host).unwrap();
        sb.reset();
        assert_eq!(sb.state(), SandboxState::Unloaded);
        assert_eq!(sb.hooks(), HookSet::default());
        assert_eq!(sb.global("_update"), Value::Nil);
    }
}
