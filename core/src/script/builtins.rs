//! The fixed set of primitives a guest script is given.
//!
//! Pure helpers (math, string conversion) are evaluated inside the
//! interpreter; everything that touches hardware goes through [`HostApi`],
//! which the machine's bus implements. The capabilities are resolved at
//! environment construction time; there is no runtime name probing.

use super::error::Result;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    // memory
    Peek,
    Poke,
    Peek2,
    Poke2,
    Memcpy,
    Memset,
    Bank,

    // graphics
    Cls,
    Rect,
    Line,
    Circ,
    Print,
    Spr,
    Sspr,
    Map,
    Mget,
    Mset,
    Sget,
    Sset,
    RefreshSprites,
    Sheet,
    Target,
    DrawGame,
    SaveSprites,
    SpriteSheetOk,

    // input
    Btn,
    Btnp,
    Mouse,

    // filesystem (exposed under the `fs` table)
    FsList,
    FsRead,
    FsWrite,
    FsExists,

    // misc host services
    Log,
    Time,
    Rnd,

    // handled inside the interpreter
    Require,
    Tostr,
    Tonum,
    Flr,
    Abs,
    Min,
    Max,
    Sqrt,
    Sin,
    Cos,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        use Builtin::*;
        match self {
            Peek => "peek",
            Poke => "poke",
            Peek2 => "peek2",
            Poke2 => "poke2",
            Memcpy => "memcpy",
            Memset => "memset",
            Bank => "bank",
            Cls => "cls",
            Rect => "rect",
            Line => "line",
            Circ => "circ",
            Print => "print",
            Spr => "spr",
            Sspr => "sspr",
            Map => "map",
            Mget => "mget",
            Mset => "mset",
            Sget => "sget",
            Sset => "sset",
            RefreshSprites => "refresh_sprites",
            Sheet => "sheet",
            Target => "target",
            DrawGame => "draw_game",
            SaveSprites => "save_sprites",
            SpriteSheetOk => "sprite_sheet_ok",
            Btn => "btn",
            Btnp => "btnp",
            Mouse => "mouse",
            FsList => "list",
            FsRead => "read",
            FsWrite => "write",
            FsExists => "exists",
            Log => "log",
            Time => "time",
            Rnd => "rnd",
            Require => "require",
            Tostr => "tostr",
            Tonum => "tonum",
            Flr => "flr",
            Abs => "abs",
            Min => "min",
            Max => "max",
            Sqrt => "sqrt",
            Sin => "sin",
            Cos => "cos",
        }
    }

    /// Globals installed by name. The `Fs*` entries are absent here; they
    /// live inside the `fs` table instead.
    pub fn globals() -> &'static [Builtin] {
        use Builtin::*;
        &[
            Peek, Poke, Peek2, Poke2, Memcpy, Memset, Bank, Cls, Rect, Line, Circ, Print, Spr,
            Sspr, Map, Mget, Mset, Sget, Sset, RefreshSprites, Sheet, Target, DrawGame,
            SaveSprites, SpriteSheetOk, Btn, Btnp, Mouse, Log, Time, Rnd, Require, Tostr, Tonum,
            Flr, Abs, Min, Max, Sqrt, Sin, Cos,
        ]
    }

    pub fn fs_table() -> &'static [Builtin] {
        use Builtin::*;
        &[FsList, FsRead, FsWrite, FsExists]
    }
}

/// What the hardware offers the interpreter. Implemented by the machine's
/// bus; tests substitute lightweight fakes.
pub trait HostApi {
    /// Execute a hardware-facing builtin.
    fn builtin(&mut self, b: Builtin, args: &[Value]) -> Result<Value>;

    /// Fetch module source text for `require`; the error message names the
    /// path that failed.
    fn module_source(&mut self, path: &str) -> Result<String>;
}
