//! Sprite sheets: a decoded image partitioned into 8x8 cells.
//!
//! The sheet keeps two copies of its pixels: the editable backing buffer and
//! the texture the renderer samples. Edits stay invisible until `refresh`
//! copies the backing buffer over, the same way a pixmap edit only shows up
//! after it is re-uploaded to the GPU.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};
use log::warn;

use crate::error::MachineError;

/// Cell edge in pixels; sprite ids address 8x8 cells in row-major order.
pub const CELL: u32 = 8;

/// Default sheet edge when no image is loaded.
pub const SHEET_EDGE: u32 = 128;

pub struct SpriteSheet {
    width: u32,
    height: u32,
    pixels: Vec<u8>,  // RGBA backing buffer, edited by sset
    texture: Vec<u8>, // cached copy the renderer samples
}

impl SpriteSheet {
    /// An all-transparent sheet.
    pub fn blank(width: u32, height: u32) -> Self {
        let len = (width * height * 4) as usize;
        Self {
            width,
            height,
            pixels: vec![0; len],
            texture: vec![0; len],
        }
    }

    /// Decode a PNG into a sheet. The texture starts in sync with the
    /// backing buffer.
    pub fn from_png(bytes: &[u8]) -> Result<Self, MachineError> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        let pixels = decoded.into_raw();
        Ok(Self {
            width,
            height,
            texture: pixels.clone(),
            pixels,
        })
    }

    /// Encode the backing buffer (not the cached texture) as a PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, MachineError> {
        let img = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .expect("backing buffer matches sheet dimensions");
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cells_per_row(&self) -> u32 {
        self.width / CELL
    }

    pub fn cell_count(&self) -> u32 {
        self.cells_per_row() * (self.height / CELL)
    }

    /// Top-left pixel of a sprite cell, or None for an id off the sheet.
    pub fn cell_origin(&self, id: i64) -> Option<(u32, u32)> {
        if id < 0 || id as u32 >= self.cell_count() {
            return None;
        }
        let per_row = self.cells_per_row();
        let id = id as u32;
        Some(((id % per_row) * CELL, (id / per_row) * CELL))
    }

    /// Read a backing-buffer pixel. Out of range reads transparent black.
    pub fn pixel(&self, x: i64, y: i64) -> [u8; 4] {
        match self.offset(x, y) {
            Some(o) => self.pixels[o..o + 4].try_into().unwrap(),
            None => [0, 0, 0, 0],
        }
    }

    /// Write a backing-buffer pixel. Out of range is dropped.
    pub fn set_pixel(&mut self, x: i64, y: i64, rgba: [u8; 4]) {
        match self.offset(x, y) {
            Some(o) => self.pixels[o..o + 4].copy_from_slice(&rgba),
            None => warn!("sprite pixel write out of bounds: ({}, {})", x, y),
        }
    }

    /// Sample the cached texture. Out of range reads transparent black.
    pub fn texel(&self, x: i64, y: i64) -> [u8; 4] {
        match self.offset(x, y) {
            Some(o) => self.texture[o..o + 4].try_into().unwrap(),
            None => [0, 0, 0, 0],
        }
    }

    /// Re-upload the backing buffer into the sampled texture.
    pub fn refresh(&mut self) {
        self.texture.copy_from_slice(&self.pixels);
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(((y as u32 * self.width + x as u32) * 4) as usize)
    }
}
