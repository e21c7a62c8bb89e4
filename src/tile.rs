use hashbrown::{hash_map::Entry, HashMap};
use serde::{Deserialize, Serialize};

use crate::color::ColorIdx;

pub const TILE_SIZE: usize = 8;
pub const TILE_BYTES: usize = 32; // 4bpp, 8x8

pub type TileIdx = u32; // Slot in a tile arena

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tile {
    pub pixels: [[ColorIdx; TILE_SIZE]; TILE_SIZE],
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Flip {
    pub const ALL: [Flip; 4] = [Flip::None, Flip::Horizontal, Flip::Vertical, Flip::Both];

    pub fn from_bits(h: bool, v: bool) -> Self {
        match (h, v) {
            (false, false) => Flip::None,
            (true, false) => Flip::Horizontal,
            (false, true) => Flip::Vertical,
            (true, true) => Flip::Both,
        }
    }

    pub fn h(self) -> bool {
        matches!(self, Flip::Horizontal | Flip::Both)
    }

    pub fn v(self) -> bool {
        matches!(self, Flip::Vertical | Flip::Both)
    }

    pub fn apply_to_pixels(
        self,
        mut pixels: [[ColorIdx; TILE_SIZE]; TILE_SIZE],
    ) -> [[ColorIdx; TILE_SIZE]; TILE_SIZE] {
        if self.h() {
            for row in pixels.iter_mut() {
                row.reverse();
            }
        }
        if self.v() {
            pixels.reverse();
        }
        pixels
    }

    pub fn apply_to_tile(self, tile: Tile) -> Tile {
        Tile {
            pixels: self.apply_to_pixels(tile.pixels),
        }
    }
}

pub struct FlipVariants {
    pub horizontal: Tile,
    pub vertical: Tile,
    pub both: Tile,
}

impl Tile {
    pub const BLANK: Tile = Tile {
        pixels: [[0; TILE_SIZE]; TILE_SIZE],
    };

    /// Decode 32 bytes of packed 4bpp data, high nibble first.
    pub fn decode(bytes: &[u8; TILE_BYTES]) -> Self {
        let mut pixels = [[0; TILE_SIZE]; TILE_SIZE];
        for (i, &b) in bytes.iter().enumerate() {
            let y = i / 4;
            let x = (i % 4) * 2;
            pixels[y][x] = b >> 4;
            pixels[y][x + 1] = b & 0x0F;
        }
        Tile { pixels }
    }

    /// Pack into 32 bytes. Indices above 15 lose their high bits.
    pub fn encode(&self) -> [u8; TILE_BYTES] {
        let mut out = [0; TILE_BYTES];
        for (i, b) in out.iter_mut().enumerate() {
            let row = &self.pixels[i / 4];
            let x = (i % 4) * 2;
            *b = (row[x] & 0x0F) << 4 | (row[x + 1] & 0x0F);
        }
        out
    }

    pub fn flip_variants(&self) -> FlipVariants {
        FlipVariants {
            horizontal: Flip::Horizontal.apply_to_tile(*self),
            vertical: Flip::Vertical.apply_to_tile(*self),
            both: Flip::Both.apply_to_tile(*self),
        }
    }

    pub fn is_blank(&self) -> bool {
        *self == Tile::BLANK
    }
}

/// Append-only tile storage with flip-aware deduplication.
///
/// Every stored tile is registered under all four of its orientations. A
/// lookup key is only ever inserted once, so a candidate resolves to the
/// lowest slot that matches, and within that slot to the first orientation in
/// `Flip::ALL` order.
#[derive(Clone, Debug, Default)]
pub struct TileArena {
    tiles: Vec<Tile>,
    lookup: HashMap<Tile, (TileIdx, Flip)>,
}

impl TileArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena with the blank tile already in slot 0.
    pub fn with_blank() -> Self {
        let mut arena = Self::new();
        arena.push(Tile::BLANK);
        arena
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn find(&self, tile: &Tile) -> Option<(TileIdx, Flip)> {
        self.lookup.get(tile).copied()
    }

    /// Store a tile unconditionally and return its slot.
    pub fn push(&mut self, tile: Tile) -> TileIdx {
        let idx = self.tiles.len() as TileIdx;
        self.tiles.push(tile);
        for flip in Flip::ALL {
            if let Entry::Vacant(e) = self.lookup.entry(flip.apply_to_tile(tile)) {
                e.insert((idx, flip));
            }
        }
        idx
    }

    /// Resolve `tile` to an existing slot (plus the flip that reproduces it),
    /// appending it when nothing matches.
    pub fn intern(&mut self, tile: Tile) -> (TileIdx, Flip) {
        match self.find(&tile) {
            Some(found) => found,
            None => (self.push(tile), Flip::None),
        }
    }

    pub fn into_tiles(self) -> Vec<Tile> {
        self.tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile() -> Tile {
        let mut t = Tile::BLANK;
        for y in 0..8 {
            for x in 0..8 {
                t.pixels[y][x] = ((y * 8 + x) % 16) as u8;
            }
        }
        t.pixels[0][0] = 9;
        t
    }

    #[test]
    fn decode_reads_high_nibble_first() {
        let mut bytes = [0u8; TILE_BYTES];
        bytes[0] = 0x12;
        bytes[3] = 0xAB;
        bytes[31] = 0xF0;
        let t = Tile::decode(&bytes);
        assert_eq!(t.pixels[0][0], 1);
        assert_eq!(t.pixels[0][1], 2);
        assert_eq!(t.pixels[0][6], 0xA);
        assert_eq!(t.pixels[0][7], 0xB);
        assert_eq!(t.pixels[7][6], 0xF);
        assert_eq!(t.pixels[7][7], 0);
        assert_eq!(t.encode(), bytes);
    }

    #[test]
    fn encode_masks_out_of_range_indices() {
        let mut t = Tile::BLANK;
        t.pixels[0][0] = 0x13;
        t.pixels[0][1] = 0xFF;
        let bytes = t.encode();
        assert_eq!(bytes[0], 0x3F);
        let back = Tile::decode(&bytes);
        assert_eq!(back.pixels[0][0], 3);
        assert_eq!(back.pixels[0][1], 15);
    }

    #[test]
    fn flips_are_self_inverse() {
        let t = sample_tile();
        let v = t.flip_variants();
        assert_eq!(v.horizontal.flip_variants().horizontal, t);
        assert_eq!(v.vertical.flip_variants().vertical, t);
        assert_eq!(v.both, v.horizontal.flip_variants().vertical);
        assert_eq!(v.horizontal.pixels[0][7], t.pixels[0][0]);
        assert_eq!(v.vertical.pixels[7][0], t.pixels[0][0]);
        assert_eq!(v.both.pixels[7][7], t.pixels[0][0]);
        assert_eq!(t.pixels[0][0], 9);
    }

    #[test]
    fn flip_bits() {
        for flip in Flip::ALL {
            assert_eq!(Flip::from_bits(flip.h(), flip.v()), flip);
        }
    }

    #[test]
    fn arena_matches_flipped_twin() {
        let t = sample_tile();
        let mut arena = TileArena::with_blank();
        assert_eq!(arena.intern(t), (1, Flip::None));
        assert_eq!(arena.intern(Flip::Both.apply_to_tile(t)), (1, Flip::Both));
        assert_eq!(
            arena.intern(Flip::Vertical.apply_to_tile(t)),
            (1, Flip::Vertical)
        );
        assert_eq!(arena.intern(Tile::BLANK), (0, Flip::None));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn arena_prefers_unflipped_orientation() {
        // Horizontally symmetric: every orientation collapses onto two keys.
        let mut t = Tile::BLANK;
        t.pixels[0][0] = 1;
        t.pixels[0][7] = 1;
        let mut arena = TileArena::new();
        arena.push(t);
        assert_eq!(arena.find(&t), Some((0, Flip::None)));
        assert_eq!(
            arena.find(&Flip::Vertical.apply_to_tile(t)),
            Some((0, Flip::Vertical))
        );
    }

    #[test]
    fn arena_prefers_lowest_slot() {
        let t = sample_tile();
        let mut arena = TileArena::new();
        arena.push(t);
        arena.push(t);
        assert_eq!(arena.find(&t), Some((0, Flip::None)));
        assert_eq!(arena.len(), 2);
    }
}
