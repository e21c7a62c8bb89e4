//! The console-native tile/map container ("JIM").
//!
//! Layout (all multi-byte fields big-endian, no padding):
//!
//! | offset          | size           | contents                              |
//! |-----------------|----------------|---------------------------------------|
//! | 0               | 4              | offset of the palette table           |
//! | 4               | 4              | offset of the map                     |
//! | 8               | 2              | tile count N                          |
//! | 10              | 32 * N         | 4bpp tiles                            |
//! | palette offset  | 128            | 4 palettes * 16 hardware color words  |
//! | map offset      | 4 + 2 * w * h  | width, height, then row-major cells   |
//!
//! There is no magic number or checksum; parsing is a best-effort structural
//! decode.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    bytes::Reader,
    color::{decode_hardware_color, encode_hardware_color, Color},
    error::{EncodeError, ParseError},
    tile::{Flip, Tile, TileIdx, TILE_BYTES},
};

pub const NUM_PALETTES: usize = 4;
pub const PALETTE_SIZE: usize = 16;
pub const HEADER_SIZE: usize = 10;
pub const PALETTE_TABLE_SIZE: usize = NUM_PALETTES * PALETTE_SIZE * 2;
pub const MAX_TILE_IDX: TileIdx = 0x7FF;

pub type Palette = [Color; PALETTE_SIZE];
pub type PaletteIdx = u8; // Index into the document's palettes (0-3)

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MapCell {
    pub tile_idx: TileIdx,
    pub palette: PaletteIdx,
    pub flip: Flip,
    pub priority: bool,
}

impl MapCell {
    /// Unpack a cell word: `P PP V H TTTTTTTTTTT` from bit 15 down.
    pub fn from_word(w: u16) -> Self {
        Self {
            tile_idx: (w & 0x7FF) as TileIdx,
            palette: ((w >> 13) & 3) as PaletteIdx,
            flip: Flip::from_bits((w >> 11) & 1 == 1, (w >> 12) & 1 == 1),
            priority: (w >> 15) & 1 == 1,
        }
    }

    /// Pack into a cell word. Tile indices past 11 bits are cut off.
    pub fn to_word(&self) -> u16 {
        (self.priority as u16) << 15
            | ((self.palette as u16) & 3) << 13
            | (self.flip.v() as u16) << 12
            | (self.flip.h() as u16) << 11
            | (self.tile_idx & MAX_TILE_IDX) as u16
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeDocument {
    pub palettes: [Palette; NUM_PALETTES],
    pub tiles: Vec<Tile>,
    pub map_width: u16,
    pub map_height: u16,
    pub map: Vec<MapCell>,
}

impl Default for NativeDocument {
    fn default() -> Self {
        Self {
            palettes: [[Color::BLACK; PALETTE_SIZE]; NUM_PALETTES],
            tiles: vec![],
            map_width: 0,
            map_height: 0,
            map: vec![],
        }
    }
}

impl NativeDocument {
    pub fn get_cell(&self, x: u16, y: u16) -> Option<&MapCell> {
        if x >= self.map_width || y >= self.map_height {
            return None;
        }
        self.map
            .get(y as usize * self.map_width as usize + x as usize)
    }

    /// The tile a cell points at, as stored (unflipped). Dangling indices
    /// read as the blank tile.
    pub fn tile(&self, idx: TileIdx) -> Tile {
        self.tiles.get(idx as usize).copied().unwrap_or(Tile::BLANK)
    }

    /// All 64 colors, bank by bank.
    pub fn flat_palette(&self) -> Vec<Color> {
        self.palettes.iter().flatten().copied().collect()
    }
}

/// What to do with tile indices that do not fit the 11-bit cell field.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileIndexOverflow {
    /// Keep the low 11 bits, as older tools did.
    #[default]
    Truncate,
    Error,
}

pub fn parse_native(bytes: &[u8]) -> Result<NativeDocument, ParseError> {
    let rom = Reader::new(bytes);
    let palette_offset = rom.read_u32_be(0)? as usize;
    let map_offset = rom.read_u32_be(4)? as usize;
    let tile_cnt = rom.read_u16_be(8)? as usize;

    let mut tiles = Vec::with_capacity(tile_cnt);
    for i in 0..tile_cnt {
        let data = rom.read_n(HEADER_SIZE + i * TILE_BYTES, TILE_BYTES)?;
        let mut packed = [0; TILE_BYTES];
        packed.copy_from_slice(data);
        tiles.push(Tile::decode(&packed));
    }

    let mut palettes = [[Color::BLACK; PALETTE_SIZE]; NUM_PALETTES];
    for (p, palette) in palettes.iter_mut().enumerate() {
        for (i, color) in palette.iter_mut().enumerate() {
            let addr = palette_offset + (p * PALETTE_SIZE + i) * 2;
            *color = decode_hardware_color(rom.read_u16_be(addr)?);
        }
    }

    let map_width = rom.read_u16_be(map_offset)?;
    let map_height = rom.read_u16_be(map_offset + 2)?;
    let cell_cnt = map_width as usize * map_height as usize;
    // One bounds check for the whole grid keeps the error offset meaningful.
    let cells = rom.read_n(map_offset + 4, cell_cnt * 2)?;
    let map = cells
        .chunks_exact(2)
        .map(|w| MapCell::from_word(u16::from_be_bytes([w[0], w[1]])))
        .collect();

    info!(
        "Parsed native document: {} tiles, {}x{} map",
        tiles.len(),
        map_width,
        map_height
    );
    Ok(NativeDocument {
        palettes,
        tiles,
        map_width,
        map_height,
        map,
    })
}

/// Like [`parse_native`], but also rejects headers whose offsets overlap the
/// sections that precede them.
pub fn parse_native_strict(bytes: &[u8]) -> Result<NativeDocument, ParseError> {
    let rom = Reader::new(bytes);
    let palette_offset = rom.read_u32_be(0)? as usize;
    let map_offset = rom.read_u32_be(4)? as usize;
    let tile_cnt = rom.read_u16_be(8)? as usize;
    let tiles_end = HEADER_SIZE + tile_cnt * TILE_BYTES;
    if palette_offset < tiles_end {
        return Err(ParseError::Implausible(format!(
            "palette offset 0x{palette_offset:X} overlaps tile table ending at 0x{tiles_end:X}"
        )));
    }
    if map_offset < palette_offset + PALETTE_TABLE_SIZE {
        return Err(ParseError::Implausible(format!(
            "map offset 0x{map_offset:X} overlaps palette table at 0x{palette_offset:X}"
        )));
    }
    parse_native(bytes)
}

/// Serialize, truncating oversized tile indices.
pub fn serialize_native(doc: &NativeDocument) -> Vec<u8> {
    let overflow = doc
        .map
        .iter()
        .filter(|c| c.tile_idx > MAX_TILE_IDX)
        .count();
    if overflow > 0 {
        warn!("{overflow} map cell(s) reference tiles past index {MAX_TILE_IDX}; truncating");
    }
    if doc.tiles.len() > u16::MAX as usize {
        warn!(
            "{} tiles exceed the 16-bit tile count; header will be wrong",
            doc.tiles.len()
        );
    }
    write_native(doc)
}

pub fn serialize_native_with(
    doc: &NativeDocument,
    policy: TileIndexOverflow,
) -> Result<Vec<u8>, EncodeError> {
    match policy {
        TileIndexOverflow::Truncate => Ok(serialize_native(doc)),
        TileIndexOverflow::Error => {
            if doc.tiles.len() > u16::MAX as usize {
                return Err(EncodeError::TooManyTiles {
                    count: doc.tiles.len(),
                });
            }
            if let Some((cell, c)) = doc
                .map
                .iter()
                .enumerate()
                .find(|(_, c)| c.tile_idx > MAX_TILE_IDX)
            {
                return Err(EncodeError::TileIndexOverflow {
                    cell,
                    tile_idx: c.tile_idx,
                });
            }
            Ok(write_native(doc))
        }
    }
}

fn write_native(doc: &NativeDocument) -> Vec<u8> {
    let tile_cnt = doc.tiles.len();
    let palette_offset = HEADER_SIZE + TILE_BYTES * tile_cnt;
    let map_offset = palette_offset + PALETTE_TABLE_SIZE;
    let cell_cnt = doc.map_width as usize * doc.map_height as usize;
    let total = map_offset + 4 + 2 * cell_cnt;

    let mut out = Vec::with_capacity(total);
    out.extend((palette_offset as u32).to_be_bytes());
    out.extend((map_offset as u32).to_be_bytes());
    out.extend((tile_cnt as u16).to_be_bytes());
    for tile in &doc.tiles {
        out.extend(tile.encode());
    }
    for color in doc.palettes.iter().flatten() {
        out.extend(encode_hardware_color(*color).to_be_bytes());
    }
    out.extend(doc.map_width.to_be_bytes());
    out.extend(doc.map_height.to_be_bytes());
    for i in 0..cell_cnt {
        let cell = doc.map.get(i).copied().unwrap_or_default();
        out.extend(cell.to_word().to_be_bytes());
    }
    debug_assert_eq!(out.len(), total);
    out
}
