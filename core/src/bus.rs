//! The bus bundles every passive subsystem (RAM, palette, sheets, renderer,
//! input, filesystem) behind one struct, and implements the primitive set
//! the interpreter calls through.

use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::MachineConfig;
use crate::fs::FileSystem;
use crate::inputs::InputState;
use crate::memory::{VirtualMemory, MAP_BASE, MAP_WIDTH};
use crate::palette::{Color, PaletteIndexMap, PaletteTable};
use crate::renderer::{Renderer, SurfaceId};
use crate::script::error::Result;
use crate::script::value::{arg_int, arg_str, opt_bool, opt_int, Table, Value};
use crate::script::{Builtin, HostApi, ScriptError};
use crate::sprites::{SpriteSheet, CELL, SHEET_EDGE};

pub struct Bus {
    pub mem: VirtualMemory,
    pub palette: PaletteTable,
    pub sheets: Vec<SpriteSheet>,
    pub active_sheet: usize,
    pub renderer: Renderer,
    pub input: InputState,
    pub fs: FileSystem,
    rng: SmallRng,
}

impl Bus {
    pub fn new(config: &MachineConfig, fs: FileSystem) -> Self {
        let sheet = match fs.read_bytes(&config.sprite_sheet) {
            Some(bytes) => match SpriteSheet::from_png(&bytes) {
                Ok(sheet) => {
                    info!(
                        "loaded sprite sheet '{}' ({}x{})",
                        config.sprite_sheet,
                        sheet.width(),
                        sheet.height()
                    );
                    sheet
                }
                Err(e) => {
                    warn!("bad sprite sheet '{}': {}", config.sprite_sheet, e);
                    SpriteSheet::blank(SHEET_EDGE, SHEET_EDGE)
                }
            },
            None => SpriteSheet::blank(SHEET_EDGE, SHEET_EDGE),
        };

        let mut mem = VirtualMemory::new(config.memory_banks);
        let palette = PaletteTable::default();
        PaletteIndexMap::reset(&mut mem, palette.len());

        Self {
            mem,
            palette,
            sheets: vec![sheet],
            active_sheet: 0,
            renderer: Renderer::new(
                config.os_width,
                config.os_height,
                config.game_width,
                config.game_height,
            ),
            input: InputState::default(),
            fs,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Resolve a logical color through the memory-mapped redirection table,
    /// then the palette.
    pub fn pen(&self, logical: i64) -> Color {
        let physical = PaletteIndexMap::resolve(&self.mem, self.palette.len(), logical);
        self.palette.color_at(physical)
    }

    /// Mirror the latched input snapshot into guest RAM.
    pub fn snapshot_input(&mut self) {
        let Bus { input, mem, .. } = self;
        input.write_region(mem);
    }

    // --- tile grid over the MAP region ---

    /// The horizontal coordinate is bounds-checked; the vertical one is not.
    /// A bad row simply degrades through the RAM contract.
    pub fn mget(&self, tx: i64, ty: i64) -> i64 {
        if tx < 0 || tx >= MAP_WIDTH {
            return 0;
        }
        self.mem.peek(MAP_BASE + ty * MAP_WIDTH + tx) as i64
    }

    pub fn mset(&mut self, tx: i64, ty: i64, id: i64) {
        if tx < 0 || tx >= MAP_WIDTH {
            return;
        }
        self.mem.poke(MAP_BASE + ty * MAP_WIDTH + tx, id);
    }

    // --- sprite sheet pixels ---

    /// Read a sheet pixel as a palette index (nearest color).
    pub fn sget(&self, x: i64, y: i64) -> i64 {
        let [r, g, b, _] = self.sheets[self.active_sheet].pixel(x, y);
        self.palette.nearest_index(r, g, b)
    }

    /// Write a sheet pixel from a logical color. Invisible until the sheet
    /// texture is refreshed.
    pub fn sset(&mut self, x: i64, y: i64, logical: i64) {
        let rgba = self.pen(logical).to_rgba();
        self.sheets[self.active_sheet].set_pixel(x, y, rgba);
    }

    /// Draw a rectangle of tiles from the grid; tile 0 is the empty cell.
    pub fn draw_tile_region(&mut self, cel_x: i64, cel_y: i64, sx: i64, sy: i64, w: i64, h: i64) {
        for y in 0..h.max(0) {
            for x in 0..w.max(0) {
                let id = self.mget(cel_x + x, cel_y + y);
                if id == 0 {
                    continue;
                }
                self.renderer.draw_sprite(
                    &self.sheets,
                    self.active_sheet,
                    id,
                    (sx + x * CELL as i64) as i32,
                    (sy + y * CELL as i64) as i32,
                    false,
                    false,
                );
            }
        }
    }

    pub fn set_target(&mut self, id: SurfaceId) {
        self.renderer.set_target(id, &self.sheets);
    }

    pub fn end_frame(&mut self) {
        self.renderer.end_drawing(&self.sheets);
    }

    /// Encode the active sheet's backing buffer and store it in the overlay.
    pub fn save_sheet(&mut self, path: &str) -> bool {
        match self.sheets[self.active_sheet].to_png() {
            Ok(png) => self.fs.write_bytes(path, &png),
            Err(e) => {
                warn!("failed to encode sprite sheet: {}", e);
                false
            }
        }
    }

    /// Fixed-layout fault display, physical palette colors only so a guest
    /// palette swap cannot garble it.
    pub fn fault_screen(&mut self, message: &str) {
        self.set_target(SurfaceId::Os);
        self.renderer.clear(Color::rgb(0x33, 0x00, 0x00), &self.sheets);
        let banner = self.palette.color_at(10);
        let body = self.palette.color_at(7);
        let dim = self.palette.color_at(6);
        self.renderer.text("** SYSTEM FAULT **", 16, 16, banner);
        let mut y = 40;
        for line in message.lines().take(8) {
            self.renderer.text(line, 16, y, body);
            y += 12;
        }
        self.renderer
            .text("press the reboot key to restart", 16, y + 12, dim);
        self.end_frame();
    }
}

impl HostApi for Bus {
    fn builtin(&mut self, b: Builtin, args: &[Value]) -> Result<Value> {
        use Builtin::*;
        match b {
            // memory
            Peek => Ok(Value::Num(
                self.mem.peek(arg_int(args, 0, "peek")?) as f64
            )),
            Poke => {
                self.mem
                    .poke(arg_int(args, 0, "poke")?, arg_int(args, 1, "poke")?);
                Ok(Value::Nil)
            }
            Peek2 => Ok(Value::Num(
                self.mem.peek16(arg_int(args, 0, "peek2")?) as f64
            )),
            Poke2 => {
                self.mem
                    .poke16(arg_int(args, 0, "poke2")?, arg_int(args, 1, "poke2")?);
                Ok(Value::Nil)
            }
            Memcpy => {
                self.mem.copy(
                    arg_int(args, 0, "memcpy")?,
                    arg_int(args, 1, "memcpy")?,
                    arg_int(args, 2, "memcpy")?,
                );
                Ok(Value::Nil)
            }
            Memset => {
                self.mem.fill(
                    arg_int(args, 0, "memset")?,
                    arg_int(args, 1, "memset")?,
                    arg_int(args, 2, "memset")?,
                );
                Ok(Value::Nil)
            }
            Bank => {
                self.mem.select_bank(arg_int(args, 0, "bank")?);
                Ok(Value::Nil)
            }

            // graphics
            Cls => {
                let color = self.pen(opt_int(args, 0, 0));
                self.renderer.clear(color, &self.sheets);
                Ok(Value::Nil)
            }
            Rect => {
                let color = self.pen(arg_int(args, 4, "rect")?);
                self.renderer.rect(
                    arg_int(args, 0, "rect")? as i32,
                    arg_int(args, 1, "rect")? as i32,
                    arg_int(args, 2, "rect")? as i32,
                    arg_int(args, 3, "rect")? as i32,
                    color,
                    &self.sheets,
                );
                Ok(Value::Nil)
            }
            Line => {
                let color = self.pen(arg_int(args, 4, "line")?);
                self.renderer.line(
                    arg_int(args, 0, "line")? as i32,
                    arg_int(args, 1, "line")? as i32,
                    arg_int(args, 2, "line")? as i32,
                    arg_int(args, 3, "line")? as i32,
                    color,
                    &self.sheets,
                );
                Ok(Value::Nil)
            }
            Circ => {
                let color = self.pen(arg_int(args, 3, "circ")?);
                self.renderer.circle(
                    arg_int(args, 0, "circ")? as i32,
                    arg_int(args, 1, "circ")? as i32,
                    arg_int(args, 2, "circ")? as i32,
                    color,
                    opt_bool(args, 4, false),
                    &self.sheets,
                );
                Ok(Value::Nil)
            }
            Print => {
                let text = args.first().cloned().unwrap_or(Value::Nil).display();
                let color = self.pen(opt_int(args, 3, 7));
                self.renderer.text(
                    &text,
                    arg_int(args, 1, "print")? as i32,
                    arg_int(args, 2, "print")? as i32,
                    color,
                );
                Ok(Value::Nil)
            }
            Spr => {
                self.renderer.draw_sprite(
                    &self.sheets,
                    self.active_sheet,
                    arg_int(args, 0, "spr")?,
                    arg_int(args, 1, "spr")? as i32,
                    arg_int(args, 2, "spr")? as i32,
                    opt_bool(args, 3, false),
                    opt_bool(args, 4, false),
                );
                Ok(Value::Nil)
            }
            Sspr => {
                self.renderer.draw_sprite_region(
                    &self.sheets,
                    self.active_sheet,
                    arg_int(args, 0, "sspr")? as i32,
                    arg_int(args, 1, "sspr")? as i32,
                    arg_int(args, 2, "sspr")? as i32,
                    arg_int(args, 3, "sspr")? as i32,
                    arg_int(args, 4, "sspr")? as i32,
                    arg_int(args, 5, "sspr")? as i32,
                    arg_int(args, 6, "sspr")? as i32,
                    arg_int(args, 7, "sspr")? as i32,
                );
                Ok(Value::Nil)
            }
            Map => {
                self.draw_tile_region(
                    arg_int(args, 0, "map")?,
                    arg_int(args, 1, "map")?,
                    arg_int(args, 2, "map")?,
                    arg_int(args, 3, "map")?,
                    arg_int(args, 4, "map")?,
                    arg_int(args, 5, "map")?,
                );
                Ok(Value::Nil)
            }
            Mget => Ok(Value::Num(self.mget(
                arg_int(args, 0, "mget")?,
                arg_int(args, 1, "mget")?,
            ) as f64)),
            Mset => {
                self.mset(
                    arg_int(args, 0, "mset")?,
                    arg_int(args, 1, "mset")?,
                    arg_int(args, 2, "mset")?,
                );
                Ok(Value::Nil)
            }
            Sget => Ok(Value::Num(self.sget(
                arg_int(args, 0, "sget")?,
                arg_int(args, 1, "sget")?,
            ) as f64)),
            Sset => {
                self.sset(
                    arg_int(args, 0, "sset")?,
                    arg_int(args, 1, "sset")?,
                    arg_int(args, 2, "sset")?,
                );
                Ok(Value::Nil)
            }
            RefreshSprites => {
                self.sheets[self.active_sheet].refresh();
                Ok(Value::Nil)
            }
            Sheet => {
                let index = arg_int(args, 0, "sheet")?;
                if index >= 0 && (index as usize) < self.sheets.len() {
                    self.active_sheet = index as usize;
                }
                Ok(Value::Nil)
            }
            Target => {
                let name = arg_str(args, 0, "target")?;
                self.set_target(SurfaceId::from_name(&name));
                Ok(Value::Nil)
            }
            DrawGame => {
                self.renderer.draw_game(
                    arg_int(args, 0, "draw_game")? as i32,
                    arg_int(args, 1, "draw_game")? as i32,
                    arg_int(args, 2, "draw_game")? as i32,
                    arg_int(args, 3, "draw_game")? as i32,
                );
                Ok(Value::Nil)
            }
            SaveSprites => {
                let path = arg_str(args, 0, "save_sprites")?;
                Ok(Value::Bool(self.save_sheet(&path)))
            }
            SpriteSheetOk => Ok(Value::Bool(!self.sheets.is_empty())),

            // input
            Btn => Ok(Value::Bool(self.input.btn(arg_int(args, 0, "btn")?))),
            Btnp => Ok(Value::Bool(self.input.btnp(arg_int(args, 0, "btnp")?))),
            Mouse => {
                let (x, y) = self.input.pointer();
                let mut t = Table::default();
                t.set_str("x", Value::Num(x as f64));
                t.set_str("y", Value::Num(y as f64));
                t.set_str("left", Value::Bool(self.input.pointer_left()));
                t.set_str("right", Value::Bool(self.input.pointer_right()));
                t.set_str("click", Value::Bool(self.input.pointer_clicked()));
                t.set_str("scroll", Value::Num(self.input.scroll() as f64));
                Ok(Value::table(t))
            }

            // filesystem
            FsList => {
                let path = match args.first() {
                    Some(Value::Str(s)) => s.to_string(),
                    _ => String::new(),
                };
                let mut t = Table::default();
                for (i, name) in self.fs.list(&path).into_iter().enumerate() {
                    t.set(
                        crate::script::value::Key::Int(i as i64 + 1),
                        Value::str(name),
                    );
                }
                Ok(Value::table(t))
            }
            FsRead => {
                let path = arg_str(args, 0, "read")?;
                Ok(match self.fs.read(&path) {
                    Some(text) => Value::str(text),
                    None => Value::Nil,
                })
            }
            FsWrite => {
                let path = arg_str(args, 0, "write")?;
                let content = arg_str(args, 1, "write")?;
                Ok(Value::Bool(self.fs.write(&path, &content)))
            }
            FsExists => {
                let path = arg_str(args, 0, "exists")?;
                Ok(Value::Bool(self.fs.exists(&path)))
            }

            // misc
            Log => {
                let message = args.first().cloned().unwrap_or(Value::Nil).display();
                info!(target: "guest", "{}", message);
                Ok(Value::Nil)
            }
            Rnd => {
                let range = match args.first() {
                    Some(Value::Num(n)) if *n > 0.0 => *n,
                    _ => 1.0,
                };
                Ok(Value::Num(self.rng.gen::<f64>() * range))
            }

            // resolved inside the interpreter; never dispatched here
            Require | Tostr | Tonum | Flr | Abs | Min | Max | Sqrt | Sin | Cos | Time => {
                Err(ScriptError::Module(format!(
                    "'{}' is interpreter-internal",
                    b.name()
                )))
            }
        }
    }

    fn module_source(&mut self, path: &str) -> Result<String> {
        self.fs.read(path).ok_or_else(|| {
            ScriptError::Module(format!(
                "module not found: '{}' (checked disk and system roots)",
                path
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PALETTE_MAP_BASE;

    fn bus() -> (tempfile::TempDir, Bus) {
        let dir = tempfile::tempdir().unwrap();
        let config = MachineConfig::workstation(dir.path());
        let fs = FileSystem::new(dir.path()).unwrap();
        let bus = Bus::new(&config, fs);
        (dir, bus)
    }

    #[test]
    fn tile_grid_round_trips_and_clamps_horizontally() {
        let (_dir, mut b) = bus();
        b.mset(5, 5, 9);
        assert_eq!(b.mget(5, 5), 9);
        assert_eq!(b.mget(-1, 5), 0);
        assert_eq!(b.mget(MAP_WIDTH, 5), 0);
        b.mset(-1, 5, 77);
        assert_eq!(b.mget(0, 5), 0);
        // the backing region is plain RAM
        assert_eq!(b.mem.peek(MAP_BASE + 5 * MAP_WIDTH + 5), 9);
    }

    #[test]
    fn pen_routes_through_the_redirection_table() {
        let (_dir, mut b) = bus();
        assert_eq!(b.pen(8), b.palette.color_at(8));
        b.mem.poke(PALETTE_MAP_BASE + 8, 3);
        assert_eq!(b.pen(8), b.palette.color_at(3));
    }

    #[test]
    fn sheet_pixels_quantize_on_read() {
        let (_dir, mut b) = bus();
        b.sset(2, 2, 8);
        assert_eq!(b.sget(2, 2), 8);
        // unwritten pixels are transparent black -> index 0
        assert_eq!(b.sget(0, 0), 0);
    }

    #[test]
    fn builtin_dispatch_reads_and_writes_memory() {
        let (_dir, mut b) = bus();
        b.builtin(Builtin::Poke, &[Value::Num(0x100 as f64), Value::Num(300.0)])
            .unwrap();
        let v = b.builtin(Builtin::Peek, &[Value::Num(0x100 as f64)]).unwrap();
        assert_eq!(v, Value::Num(44.0));
    }

    #[test]
    fn mouse_builtin_builds_a_snapshot_table() {
        let (_dir, mut b) = bus();
        let mut snap = crate::inputs::InputSnapshot::default();
        snap.pointer_x = 12;
        snap.pointer_left = true;
        b.input.latch(snap);
        let Value::Table(t) = b.builtin(Builtin::Mouse, &[]).unwrap() else {
            panic!("mouse() must return a table");
        };
        use crate::script::value::Key;
        assert_eq!(t.borrow().get(&Key::Str("x".into())), Value::Num(12.0));
        assert_eq!(t.borrow().get(&Key::Str("left".into())), Value::Bool(true));
    }

    #[test]
    fn bad_arguments_surface_as_script_errors() {
        let (_dir, mut b) = bus();
        assert!(b.builtin(Builtin::Poke, &[Value::str("addr")]).is_err());
        assert!(b.builtin(Builtin::Target, &[Value::Num(1.0)]).is_err());
    }
}
