use itertools::iproduct;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    native::{NativeDocument, PALETTE_SIZE},
    tile::{Tile, TILE_SIZE},
};

/// Which colors an export carries: the flattened 64-color table, or a single
/// 16-color bank.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i8)]
pub enum PaletteSelector {
    #[default]
    All = -1,
    Bank0 = 0,
    Bank1 = 1,
    Bank2 = 2,
    Bank3 = 3,
}

impl PaletteSelector {
    pub fn from_index(idx: i8) -> Option<Self> {
        match idx {
            -1 => Some(PaletteSelector::All),
            0 => Some(PaletteSelector::Bank0),
            1 => Some(PaletteSelector::Bank1),
            2 => Some(PaletteSelector::Bank2),
            3 => Some(PaletteSelector::Bank3),
            _ => None,
        }
    }

    pub fn bank(self) -> Option<usize> {
        match self {
            PaletteSelector::All => None,
            b => Some(b as i8 as usize),
        }
    }

    /// Output index for a 4-bit tile pixel drawn with palette `palette`.
    pub fn pixel_index(self, palette: u8, px: u8) -> u8 {
        let px = px & 0x0F;
        match self {
            PaletteSelector::All => (palette & 3) * PALETTE_SIZE as u8 + px,
            _ => px,
        }
    }
}

/// Indexed canvas produced by composing tiles.
pub struct IndexedImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl IndexedImage {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    fn draw_tile(&mut self, tx: usize, ty: usize, tile: &Tile, index: impl Fn(u8) -> u8) {
        for (py, row) in tile.pixels.iter().enumerate() {
            let base = (ty * TILE_SIZE + py) * self.width + tx * TILE_SIZE;
            for (px, &c) in row.iter().enumerate() {
                self.pixels[base + px] = index(c);
            }
        }
    }
}

/// Lay out the map, applying each cell's flips. Dangling tile indices draw as
/// blank.
pub fn compose_map(doc: &NativeDocument, selector: PaletteSelector) -> IndexedImage {
    let (w, h) = (doc.map_width as usize, doc.map_height as usize);
    let mut image = IndexedImage::new(w * TILE_SIZE, h * TILE_SIZE);
    for (ty, tx) in iproduct!(0..h, 0..w) {
        let Some(cell) = doc.get_cell(tx as u16, ty as u16) else {
            continue;
        };
        let tile = cell.flip.apply_to_tile(doc.tile(cell.tile_idx));
        image.draw_tile(tx, ty, &tile, |c| selector.pixel_index(cell.palette, c));
    }
    image
}

/// Lay out the tile arena unflipped, `columns` tiles per row.
///
/// With the flattened palette, a tile is drawn in the bank of the first map
/// cell that references it (bank 0 when nothing does).
pub fn compose_tileset(
    doc: &NativeDocument,
    selector: PaletteSelector,
    columns: usize,
) -> IndexedImage {
    let columns = columns.max(1);
    let rows = doc.tiles.len().div_ceil(columns);
    let mut tile_palette = vec![None; doc.tiles.len()];
    for cell in &doc.map {
        if let Some(slot) = tile_palette.get_mut(cell.tile_idx as usize) {
            slot.get_or_insert(cell.palette);
        }
    }

    let mut image = IndexedImage::new(columns * TILE_SIZE, rows * TILE_SIZE);
    for (i, tile) in doc.tiles.iter().enumerate() {
        let palette = tile_palette[i].unwrap_or(0);
        image.draw_tile(i % columns, i / columns, tile, |c| {
            selector.pixel_index(palette, c)
        });
    }
    image
}

/// RGBA8 raster of the map. Index 0 of every palette is fully transparent.
pub fn render_rgba(doc: &NativeDocument) -> (usize, usize, Vec<u8>) {
    let image = compose_map(doc, PaletteSelector::All);
    let colors = doc.flat_palette();
    let mut data = Vec::with_capacity(image.pixels.len() * 4);
    for &idx in &image.pixels {
        if idx as usize % PALETTE_SIZE == 0 {
            data.extend([0, 0, 0, 0]);
        } else {
            let c = colors[idx as usize];
            data.extend([c.r, c.g, c.b, 255]);
        }
    }
    (image.width, image.height, data)
}
