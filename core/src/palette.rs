//! Fixed indexed color set plus the memory-mapped redirection table.

use crate::memory::{VirtualMemory, PALETTE_MAP_BASE, PALETTE_MAP_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xFF }
    }

    const fn hex(rgb: u32) -> Self {
        Self::rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
    }

    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

// The stock 32-color system palette.
// Rows: backgrounds, accents, interface grays, vibrant extras.
const SYSTEM_PALETTE: [Color; 32] = [
    Color::hex(0x000000), // 0: black
    Color::hex(0x1D2B53), // 1: dark blue
    Color::hex(0x7E2553), // 2: dark purple
    Color::hex(0x008751), // 3: dark green
    Color::hex(0xAB5236), // 4: brown
    Color::hex(0x5F574F), // 5: dark gray
    Color::hex(0xC2C3C7), // 6: light gray
    Color::hex(0xFFF1E8), // 7: white
    Color::hex(0xFF004D), // 8: red
    Color::hex(0xFFA300), // 9: orange
    Color::hex(0xFFEC27), // 10: yellow
    Color::hex(0x00E436), // 11: green
    Color::hex(0x29ADFF), // 12: blue
    Color::hex(0x83769C), // 13: indigo
    Color::hex(0xFF77A8), // 14: pink
    Color::hex(0xFFCCAA), // 15: peach
    Color::hex(0x29222E), // 16: deep charcoal
    Color::hex(0x3D3447), // 17: darker gray
    Color::hex(0x564D61), // 18: medium gray
    Color::hex(0x746D7F), // 19: blue-gray
    Color::hex(0x8F929E), // 20: steel
    Color::hex(0xA5B4C4), // 21: highlight
    Color::hex(0x58929A), // 22: muted teal
    Color::hex(0x285C66), // 23: dark teal
    Color::hex(0x8A2735), // 24: dark red
    Color::hex(0xD44E31), // 25: burnt orange
    Color::hex(0xE09F36), // 26: gold
    Color::hex(0x94C93D), // 27: lime
    Color::hex(0x3D6E70), // 28: slate
    Color::hex(0x4B692F), // 29: olive
    Color::hex(0x37233B), // 30: deep violet
    Color::hex(0xE37868), // 31: salmon
];

/// Ordered list of colors, immutable once the machine is up. Index lookup
/// always succeeds by wrapping.
pub struct PaletteTable {
    colors: Vec<Color>,
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self::new(SYSTEM_PALETTE.to_vec())
    }
}

impl PaletteTable {
    /// A palette always has at least one color.
    pub fn new(colors: Vec<Color>) -> Self {
        assert!(!colors.is_empty(), "palette must not be empty");
        Self { colors }
    }

    pub fn len(&self) -> i64 {
        self.colors.len() as i64
    }

    /// `colors[index mod N]`; negative indexes wrap the same way.
    pub fn color_at(&self, index: i64) -> Color {
        let n = self.colors.len() as i64;
        self.colors[index.rem_euclid(n) as usize]
    }

    /// Nearest palette slot by squared RGB distance, alpha ignored. Ties keep
    /// the first (lowest) index, so palette colors round-trip exactly.
    pub fn nearest_index(&self, r: u8, g: u8, b: u8) -> i64 {
        let mut best = 0usize;
        let mut best_dist = i64::MAX;
        for (i, c) in self.colors.iter().enumerate() {
            let dr = r as i64 - c.r as i64;
            let dg = g as i64 - c.g as i64;
            let db = b as i64 - c.b as i64;
            let dist = dr * dr + dg * dg + db * db;
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best as i64
    }
}

/// The logical-to-physical palette redirection table lives in guest RAM so
/// scripts can animate palette swaps with plain pokes.
pub struct PaletteIndexMap;

impl PaletteIndexMap {
    /// Write the identity mapping for an `n`-color palette.
    pub fn reset(mem: &mut VirtualMemory, n: i64) {
        let n = n.min(PALETTE_MAP_SIZE);
        for i in 0..n {
            mem.poke(PALETTE_MAP_BASE + i, i);
        }
    }

    /// Map a logical color index to the physical palette slot stored in RAM.
    pub fn resolve(mem: &VirtualMemory, n: i64, logical: i64) -> i64 {
        mem.peek(PALETTE_MAP_BASE + logical.rem_euclid(n.max(1))) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_wraps() {
        let palette = PaletteTable::default();
        assert_eq!(palette.color_at(35), palette.color_at(3));
        assert_eq!(palette.color_at(-1), palette.color_at(31));
    }

    #[test]
    fn palette_colors_round_trip_through_quantization() {
        let palette = PaletteTable::default();
        for k in 0..palette.len() {
            let c = palette.color_at(k);
            assert_eq!(palette.nearest_index(c.r, c.g, c.b), k, "index {}", k);
        }
    }

    #[test]
    fn quantization_tie_break_is_table_order() {
        let palette = PaletteTable::new(vec![
            Color::rgb(10, 0, 0),
            Color::rgb(30, 0, 0),
            Color::rgb(30, 0, 0), // duplicate; must never win
        ]);
        assert_eq!(palette.nearest_index(20, 0, 0), 0);
        assert_eq!(palette.nearest_index(29, 0, 0), 1);
    }

    #[test]
    fn index_map_defaults_to_identity_and_is_pokeable() {
        let mut mem = VirtualMemory::new(1);
        PaletteIndexMap::reset(&mut mem, 32);
        for i in 0..32 {
            assert_eq!(PaletteIndexMap::resolve(&mem, 32, i), i);
        }
        // a guest palette swap
        mem.poke(PALETTE_MAP_BASE + 7, 8);
        assert_eq!(PaletteIndexMap::resolve(&mem, 32, 7), 8);
        // logical index wraps over the table size
        assert_eq!(PaletteIndexMap::resolve(&mem, 32, 39), 8);
    }
}
