//! Dual-surface software renderer.
//!
//! Two off-screen surfaces exist: the hi-res "os" surface and the lo-res
//! "game" surface; exactly one is bound at a time. Primitives never touch
//! pixels directly: sprite/text draws queue quads on the batched path and
//! shape draws queue on the immediate path, and the draw-mode state machine
//! decides when a queue has to be flushed because the two paths (or two
//! different shape kinds) cannot interleave inside one open bracket.

use log::warn;

use crate::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::palette::Color;
use crate::sprites::{SpriteSheet, CELL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceId {
    Os,
    Game,
}

impl SurfaceId {
    /// Guest-facing name resolution; anything that is not "game" binds the
    /// os surface.
    pub fn from_name(name: &str) -> SurfaceId {
        if name == "game" {
            SurfaceId::Game
        } else {
            SurfaceId::Os
        }
    }
}

/// The clip installed on a draw path when a surface is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub width: i32,
    pub height: i32,
}

/// Fixed-size RGBA8 render target, y = 0 at the top row. Pixels are stored
/// as little-endian-packed words so the byte view for texture upload is a
/// plain reinterpretation.
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Surface {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 rows, ready for a texture upload.
    pub fn pixels(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return [0, 0, 0, 0];
        }
        self.pixels[(y as u32 * self.width + x as u32) as usize].to_le_bytes()
    }

    fn fill(&mut self, color: Color) {
        self.pixels.fill(u32::from_le_bytes(color.to_rgba()));
    }

    fn put(&mut self, x: i32, y: i32, clip: Projection, rgba: [u8; 4]) {
        if rgba[3] == 0 {
            return;
        }
        if x < 0 || y < 0 || x >= clip.width || y >= clip.height {
            return;
        }
        if x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        self.pixels[(y as u32 * self.width + x as u32) as usize] = u32::from_le_bytes(rgba);
    }
}

/// The shape path can hold one primitive kind per open bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Filled,
    Outline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Idle,
    BatchOpen,
    ShapesOpen(ShapeKind),
}

enum Shape {
    Rect {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        color: Color,
    },
    Line {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: Color,
    },
    Circle {
        x: i32,
        y: i32,
        r: i32,
        color: Color,
    },
}

enum QuadSrc {
    Sheet {
        sheet: usize,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        flip_x: bool,
        flip_y: bool,
    },
    Glyph {
        ch: char,
        color: Color,
    },
    GameSurface,
}

struct Quad {
    src: QuadSrc,
    dx: i32,
    dy: i32,
    dw: i32,
    dh: i32,
}

pub struct Renderer {
    os: Surface,
    game: Surface,
    target: SurfaceId,
    mode: DrawMode,
    batch: Vec<Quad>,
    batch_projection: Projection,
    shapes: Vec<Shape>,
    shape_projection: Projection,
}

impl Renderer {
    pub fn new(os_width: u32, os_height: u32, game_width: u32, game_height: u32) -> Self {
        let os = Surface::new(os_width, os_height);
        let projection = Projection {
            width: os_width as i32,
            height: os_height as i32,
        };
        Self {
            os,
            game: Surface::new(game_width, game_height),
            target: SurfaceId::Os,
            mode: DrawMode::Idle,
            batch: Vec::new(),
            batch_projection: projection,
            shapes: Vec::new(),
            shape_projection: projection,
        }
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    pub fn target(&self) -> SurfaceId {
        self.target
    }

    pub fn surface(&self, id: SurfaceId) -> &Surface {
        match id {
            SurfaceId::Os => &self.os,
            SurfaceId::Game => &self.game,
        }
    }

    /// Flush whatever is open, unbind the current surface, bind the requested
    /// one and install its projection on both draw paths.
    pub fn set_target(&mut self, id: SurfaceId, sheets: &[SpriteSheet]) {
        self.end_drawing(sheets);
        self.target = id;
        let bound = self.surface(id);
        let projection = Projection {
            width: bound.width() as i32,
            height: bound.height() as i32,
        };
        self.batch_projection = projection;
        self.shape_projection = projection;
    }

    /// Close any open mode; called at end of frame and before target swaps.
    pub fn end_drawing(&mut self, sheets: &[SpriteSheet]) {
        match self.mode {
            DrawMode::Idle => {}
            DrawMode::BatchOpen => self.flush_batch(sheets),
            DrawMode::ShapesOpen(_) => self.flush_shapes(),
        }
        self.mode = DrawMode::Idle;
    }

    // opening the batch only ever flushes the shape path, which needs no
    // sheet access
    fn begin_batch(&mut self) {
        if let DrawMode::ShapesOpen(_) = self.mode {
            self.flush_shapes();
        }
        self.mode = DrawMode::BatchOpen;
    }

    fn begin_shapes(&mut self, kind: ShapeKind, sheets: &[SpriteSheet]) {
        match self.mode {
            DrawMode::BatchOpen => self.flush_batch(sheets),
            DrawMode::ShapesOpen(open) if open != kind => self.flush_shapes(),
            _ => {}
        }
        self.mode = DrawMode::ShapesOpen(kind);
    }

    // --- primitives ---

    /// Clear the bound surface. Forces both paths closed first, so the clear
    /// cannot be overdrawn by an earlier queued primitive.
    pub fn clear(&mut self, color: Color, sheets: &[SpriteSheet]) {
        self.end_drawing(sheets);
        match self.target {
            SurfaceId::Os => self.os.fill(color),
            SurfaceId::Game => self.game.fill(color),
        }
    }

    pub fn rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color, sheets: &[SpriteSheet]) {
        self.begin_shapes(ShapeKind::Filled, sheets);
        self.shapes.push(Shape::Rect { x, y, w, h, color });
    }

    pub fn line(
        &mut self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: Color,
        sheets: &[SpriteSheet],
    ) {
        self.begin_shapes(ShapeKind::Outline, sheets);
        self.shapes.push(Shape::Line {
            x1,
            y1,
            x2,
            y2,
            color,
        });
    }

    pub fn circle(
        &mut self,
        x: i32,
        y: i32,
        r: i32,
        color: Color,
        filled: bool,
        sheets: &[SpriteSheet],
    ) {
        let kind = if filled {
            ShapeKind::Filled
        } else {
            ShapeKind::Outline
        };
        self.begin_shapes(kind, sheets);
        self.shapes.push(Shape::Circle { x, y, r, color });
    }

    /// Queue a text run on the batch path using the built-in font.
    pub fn text(&mut self, s: &str, x: i32, y: i32, color: Color) {
        self.begin_batch();
        let mut pen_x = x;
        for ch in s.chars() {
            self.batch.push(Quad {
                src: QuadSrc::Glyph { ch, color },
                dx: pen_x,
                dy: y,
                dw: GLYPH_WIDTH,
                dh: GLYPH_HEIGHT,
            });
            pen_x += GLYPH_WIDTH;
        }
    }

    /// Queue one 8x8 sprite cell. Ids off the sheet draw nothing.
    pub fn draw_sprite(
        &mut self,
        sheets: &[SpriteSheet],
        sheet: usize,
        id: i64,
        x: i32,
        y: i32,
        flip_x: bool,
        flip_y: bool,
    ) {
        let Some(origin) = sheets.get(sheet).and_then(|s| s.cell_origin(id)) else {
            return;
        };
        self.begin_batch();
        self.batch.push(Quad {
            src: QuadSrc::Sheet {
                sheet,
                sx: origin.0 as i32,
                sy: origin.1 as i32,
                sw: CELL as i32,
                sh: CELL as i32,
                flip_x,
                flip_y,
            },
            dx: x,
            dy: y,
            dw: CELL as i32,
            dh: CELL as i32,
        });
    }

    /// Queue an arbitrary sheet region stretched to a destination rectangle.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_sprite_region(
        &mut self,
        sheets: &[SpriteSheet],
        sheet: usize,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        dx: i32,
        dy: i32,
        dw: i32,
        dh: i32,
    ) {
        if sheets.get(sheet).is_none() || sw <= 0 || sh <= 0 || dw <= 0 || dh <= 0 {
            return;
        }
        self.begin_batch();
        self.batch.push(Quad {
            src: QuadSrc::Sheet {
                sheet,
                sx,
                sy,
                sw,
                sh,
                flip_x: false,
                flip_y: false,
            },
            dx,
            dy,
            dw,
            dh,
        });
    }

    /// Queue the finished game surface as a quad on the current target; used
    /// by the desktop script to put the game screen in a window.
    pub fn draw_game(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.begin_batch();
        self.batch.push(Quad {
            src: QuadSrc::GameSurface,
            dx: x,
            dy: y,
            dw: w,
            dh: h,
        });
    }

    // --- flushing / rasterization ---

    fn flush_batch(&mut self, sheets: &[SpriteSheet]) {
        let clip = self.batch_projection;
        let quads = std::mem::take(&mut self.batch);
        let (target, game) = match self.target {
            SurfaceId::Os => (&mut self.os, Some(&self.game)),
            SurfaceId::Game => (&mut self.game, None),
        };
        for quad in &quads {
            match &quad.src {
                QuadSrc::Glyph { ch, color } => {
                    let rows = font::glyph(*ch);
                    for (row, bits) in rows.iter().enumerate() {
                        for col in 0..GLYPH_WIDTH {
                            if bits & (1 << col) != 0 {
                                target.put(
                                    quad.dx + col,
                                    quad.dy + row as i32,
                                    clip,
                                    color.to_rgba(),
                                );
                            }
                        }
                    }
                }
                QuadSrc::Sheet {
                    sheet,
                    sx,
                    sy,
                    sw,
                    sh,
                    flip_x,
                    flip_y,
                } => {
                    let Some(sheet) = sheets.get(*sheet) else {
                        continue;
                    };
                    for py in 0..quad.dh {
                        for px in 0..quad.dw {
                            let mut u = px * sw / quad.dw;
                            let mut v = py * sh / quad.dh;
                            if *flip_x {
                                u = sw - 1 - u;
                            }
                            if *flip_y {
                                v = sh - 1 - v;
                            }
                            let rgba = sheet.texel((sx + u) as i64, (sy + v) as i64);
                            target.put(quad.dx + px, quad.dy + py, clip, rgba);
                        }
                    }
                }
                QuadSrc::GameSurface => {
                    let Some(game) = game else {
                        warn!("cannot draw the game surface onto itself");
                        continue;
                    };
                    let (gw, gh) = (game.width() as i32, game.height() as i32);
                    if quad.dw <= 0 || quad.dh <= 0 {
                        continue;
                    }
                    for py in 0..quad.dh {
                        for px in 0..quad.dw {
                            let u = px * gw / quad.dw;
                            let v = py * gh / quad.dh;
                            let rgba = game.pixel(u, v);
                            target.put(quad.dx + px, quad.dy + py, clip, rgba);
                        }
                    }
                }
            }
        }
    }

    fn flush_shapes(&mut self) {
        let clip = self.shape_projection;
        let shapes = std::mem::take(&mut self.shapes);
        let filled = matches!(self.mode, DrawMode::ShapesOpen(ShapeKind::Filled));
        let target = match self.target {
            SurfaceId::Os => &mut self.os,
            SurfaceId::Game => &mut self.game,
        };
        for shape in &shapes {
            match *shape {
                Shape::Rect { x, y, w, h, color } => {
                    if filled {
                        for py in y..y + h {
                            for px in x..x + w {
                                target.put(px, py, clip, color.to_rgba());
                            }
                        }
                    } else {
                        raster_line(target, clip, x, y, x + w - 1, y, color);
                        raster_line(target, clip, x, y + h - 1, x + w - 1, y + h - 1, color);
                        raster_line(target, clip, x, y, x, y + h - 1, color);
                        raster_line(target, clip, x + w - 1, y, x + w - 1, y + h - 1, color);
                    }
                }
                Shape::Line {
                    x1,
                    y1,
                    x2,
                    y2,
                    color,
                } => raster_line(target, clip, x1, y1, x2, y2, color),
                Shape::Circle { x, y, r, color } => {
                    if filled {
                        raster_circle_filled(target, clip, x, y, r, color);
                    } else {
                        raster_circle_outline(target, clip, x, y, r, color);
                    }
                }
            }
        }
    }
}

fn raster_line(target: &mut Surface, clip: Projection, x1: i32, y1: i32, x2: i32, y2: i32, color: Color) {
    // Bresenham
    let (mut x, mut y) = (x1, y1);
    let dx = (x2 - x1).abs();
    let dy = -(y2 - y1).abs();
    let sx = if x1 < x2 { 1 } else { -1 };
    let sy = if y1 < y2 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        target.put(x, y, clip, color.to_rgba());
        if x == x2 && y == y2 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn raster_circle_filled(target: &mut Surface, clip: Projection, cx: i32, cy: i32, r: i32, color: Color) {
    if r < 0 {
        return;
    }
    for dy in -r..=r {
        let half = isqrt(r * r - dy * dy);
        for dx in -half..=half {
            target.put(cx + dx, cy + dy, clip, color.to_rgba());
        }
    }
}

fn raster_circle_outline(target: &mut Surface, clip: Projection, cx: i32, cy: i32, r: i32, color: Color) {
    if r < 0 {
        return;
    }
    // midpoint circle, 8-way symmetry
    let mut x = r;
    let mut y = 0;
    let mut err = 1 - r;
    while x >= y {
        for (px, py) in [
            (cx + x, cy + y),
            (cx - x, cy + y),
            (cx + x, cy - y),
            (cx - x, cy - y),
            (cx + y, cy + x),
            (cx - y, cy + x),
            (cx + y, cy - x),
            (cx - y, cy - x),
        ] {
            target.put(px, py, clip, color.to_rgba());
        }
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

fn isqrt(v: i32) -> i32 {
    if v <= 0 {
        return 0;
    }
    let mut r = (v as f64).sqrt() as i32;
    while (r + 1) * (r + 1) <= v {
        r += 1;
    }
    while r * r > v {
        r -= 1;
    }
    r
}
