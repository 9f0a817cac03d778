//! The machine: owns the bus and the sandbox, drives the per-frame cycle,
//! and holds the crash/reboot lifecycle.

use log::{error, info};

use crate::bus::Bus;
use crate::config::MachineConfig;
use crate::error::MachineError;
use crate::fs::FileSystem;
use crate::inputs::InputSnapshot;
use crate::palette::PaletteIndexMap;
use crate::renderer::{DrawMode, Surface, SurfaceId};
use crate::script::{Hook, ScriptSandbox, Value};
use crate::time::{Clock, WallClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Booting,
    Running,
    Faulted,
}

pub struct Machine<C: Clock = WallClock> {
    bus: Bus,
    sandbox: ScriptSandbox<C>,
    state: MachineState,
    fault: Option<String>,
    pending_input: InputSnapshot,
    boot_script: String,
}

impl Machine<WallClock> {
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        Self::with_clock(config, WallClock::default())
    }
}

impl<C: Clock> Machine<C> {
    pub fn with_clock(config: MachineConfig, clock: C) -> Result<Self, MachineError> {
        let fs = match &config.bundled_root {
            Some(bundled) => FileSystem::with_bundled(&config.overlay_root, bundled)?,
            None => FileSystem::new(&config.overlay_root)?,
        };
        let bus = Bus::new(&config, fs);
        let sandbox = ScriptSandbox::new(clock, config.watchdog_enabled, config.cpu_budget_ms);
        Ok(Self {
            bus,
            sandbox,
            state: MachineState::Booting,
            fault: None,
            pending_input: InputSnapshot::default(),
            boot_script: config.boot_script,
        })
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn is_faulted(&self) -> bool {
        self.state == MachineState::Faulted
    }

    pub fn fault_message(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Load and initialize the boot program. Any failure lands the machine
    /// in the fault state with the message captured.
    pub fn boot(&mut self) {
        self.state = MachineState::Booting;
        self.fault = None;
        // the redirection table starts (and restarts) as identity
        PaletteIndexMap::reset(&mut self.bus.mem, self.bus.palette.len());

        let Some(source) = self.bus.fs.read(&self.boot_script) else {
            self.trigger_fault(format!("boot script not found: {}", self.boot_script));
            return;
        };
        if let Err(e) = self.sandbox.load(&source, &self.boot_script, &mut self.bus) {
            self.trigger_fault(e.to_string());
            return;
        }
        if let Err(e) = self.sandbox.call_hook(Hook::Init, Vec::new(), &mut self.bus) {
            self.trigger_fault(e.to_string());
            return;
        }
        self.state = MachineState::Running;
        info!("booted {}", self.boot_script);
    }

    /// Discard the fault and the guest environment, then boot again. Guest
    /// RAM persists across the reboot; only the palette redirection table is
    /// re-identified by `boot`.
    pub fn reboot(&mut self) {
        info!("reboot requested");
        self.sandbox.reset();
        self.boot();
    }

    /// Hand the machine this frame's input; it takes effect at the next
    /// `update`.
    pub fn set_input_snapshot(&mut self, snap: InputSnapshot) {
        self.pending_input = snap;
    }

    pub fn update(&mut self, dt: f32) {
        self.bus.input.latch(self.pending_input);
        if self.state == MachineState::Faulted {
            // a faulted machine only listens for the reboot chord
            if self.bus.input.reboot_requested() {
                self.reboot();
            }
            return;
        }
        self.bus.snapshot_input();
        if let Err(e) =
            self.sandbox
                .call_hook(Hook::Update, vec![Value::Num(dt as f64)], &mut self.bus)
        {
            self.trigger_fault(e.to_string());
        }
    }

    pub fn render(&mut self) {
        if self.state == MachineState::Faulted {
            let message = self.fault.clone().unwrap_or_default();
            self.bus.fault_screen(&message);
            return;
        }
        self.bus.set_target(SurfaceId::Os);
        let backdrop = self.bus.palette.color_at(16);
        self.bus.renderer.clear(backdrop, &self.bus.sheets);
        if let Err(e) = self.sandbox.call_hook(Hook::Draw, Vec::new(), &mut self.bus) {
            // close whatever the crashed draw left open; the fault screen
            // takes over next frame
            self.bus.end_frame();
            self.trigger_fault(e.to_string());
            return;
        }
        self.bus.end_frame();
    }

    fn trigger_fault(&mut self, message: String) {
        error!("=== guest fault ===\n{}", message);
        self.state = MachineState::Faulted;
        self.fault = Some(message);
    }

    // --- host-facing surface ---

    /// Finished pixels for upload; the host picks which surface to present.
    pub fn surface(&self, id: SurfaceId) -> &Surface {
        self.bus.renderer.surface(id)
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.bus.renderer.mode()
    }

    pub fn set_active_sheet(&mut self, index: usize) {
        if index < self.bus.sheets.len() {
            self.bus.active_sheet = index;
        }
    }

    pub fn save_sprite_sheet(&mut self, path: &str) -> bool {
        self.bus.save_sheet(path)
    }

    /// Direct access for the shell (asset pokes, inspectors).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }
}
