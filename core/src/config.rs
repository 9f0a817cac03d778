//! Machine construction parameters.

use std::path::PathBuf;

/// Everything the host decides before the machine comes up: surface sizes,
/// memory geometry, watchdog policy, and where the filesystem roots live.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub title: String,

    /// Hi-res desktop surface.
    pub os_width: u32,
    pub os_height: u32,

    /// Lo-res game surface.
    pub game_width: u32,
    pub game_height: u32,

    /// 64 KiB banks; the standard machine uses one.
    pub memory_banks: usize,

    pub watchdog_enabled: bool,
    pub cpu_budget_ms: f64,

    /// Program loaded by `boot`, resolved through the filesystem roots.
    pub boot_script: String,

    /// Sprite sheet asset decoded at construction.
    pub sprite_sheet: String,

    /// Writable store; created if missing.
    pub overlay_root: PathBuf,

    /// Read-only bundled assets, checked after the overlay.
    pub bundled_root: Option<PathBuf>,
}

impl MachineConfig {
    /// The standard workstation profile: 1080p desktop, 240x136 game screen,
    /// 64 KiB of RAM, 200 ms CPU budget per guest call.
    pub fn workstation(overlay_root: impl Into<PathBuf>) -> Self {
        Self {
            title: "Minnow Workstation".to_string(),
            os_width: 1920,
            os_height: 1080,
            game_width: 240,
            game_height: 136,
            memory_banks: 1,
            watchdog_enabled: true,
            cpu_budget_ms: 200.0,
            boot_script: "system/boot.mns".to_string(),
            sprite_sheet: "sprites.png".to_string(),
            overlay_root: overlay_root.into(),
            bundled_root: None,
        }
    }

    pub fn with_bundled_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.bundled_root = Some(root.into());
        self
    }
}
