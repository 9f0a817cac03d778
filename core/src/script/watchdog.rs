//! CPU-budget watchdog for guest calls.
//!
//! The interpreter calls `check` every fixed number of executed steps, so
//! enforcement granularity is "every K instructions": a runaway call is cut
//! off within one check interval past the millisecond budget, and a single
//! long host call cannot be interrupted at all.

use log::warn;

use super::error::ScriptError;
use crate::time::Clock;

/// Steps between budget checks.
pub const CHECK_INTERVAL: u64 = 1000;

pub struct Watchdog<C: Clock> {
    clock: C,
    enabled: bool,
    budget_ms: f64,
    window_start: f64,
}

impl<C: Clock> Watchdog<C> {
    pub fn new(clock: C, enabled: bool, budget_ms: f64) -> Self {
        let window_start = clock.now_ms();
        Self {
            clock,
            enabled,
            budget_ms,
            window_start,
        }
    }

    /// Start a fresh budget window; called at the top of every lifecycle
    /// call.
    pub fn begin_window(&mut self) {
        self.window_start = self.clock.now_ms();
    }

    pub fn check(&self) -> Result<(), ScriptError> {
        if !self.enabled {
            return Ok(());
        }
        let elapsed = self.clock.now_ms() - self.window_start;
        if elapsed > self.budget_ms {
            warn!("guest call exceeded its {:.0} ms budget", self.budget_ms);
            return Err(ScriptError::Timeout {
                budget_ms: self.budget_ms as u64,
            });
        }
        Ok(())
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }
}
