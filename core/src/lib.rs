//! Core of the Minnow fantasy console.
//!
//! A machine is 64 KiB of memory-mapped guest RAM, a 32-color palette with a
//! guest-writable redirection table, 8x8 sprite sheets, a dual-surface
//! software renderer, and a sandboxed script interpreter kept honest by a
//! CPU-budget watchdog. The host pumps [`machine::Machine::update`] and
//! [`machine::Machine::render`] once per frame and uploads the finished
//! surface pixels however it likes; everything else stays inside.

pub mod bus;
pub mod config;
pub mod error;
pub mod font;
pub mod fs;
pub mod inputs;
pub mod machine;
pub mod memory;
pub mod palette;
pub mod renderer;
pub mod script;
pub mod sprites;
pub mod time;

pub use config::MachineConfig;
pub use error::{MachineError, ScriptFailure};
pub use inputs::InputSnapshot;
pub use machine::{Machine, MachineState};
pub use renderer::SurfaceId;
