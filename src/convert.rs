use anyhow::{ensure, Context, Result};
use itertools::{iproduct, Itertools};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    color::{nearest_index, Color, ColorIdx},
    native::{MapCell, NativeDocument, PaletteIdx, NUM_PALETTES, PALETTE_SIZE},
    render::{compose_map, compose_tileset, PaletteSelector},
    sprite::{serialize_sprite_document, SpriteDocument},
    tile::{Flip, Tile, TileArena, TILE_SIZE},
};

/// One 8x8 block after palette selection, before deduplication.
struct Block {
    tile: Tile,
    palette: PaletteIdx,
    dropped: usize,
}

fn map_size(width: usize, height: usize) -> Result<(u16, u16)> {
    let map_w = width.div_ceil(TILE_SIZE);
    let map_h = height.div_ceil(TILE_SIZE);
    ensure!(
        map_w <= u16::MAX as usize && map_h <= u16::MAX as usize,
        "image {width}x{height} is too large for a tile map"
    );
    Ok((map_w as u16, map_h as u16))
}

/// Normalize every block in parallel, then intern the tiles one at a time in
/// scan order so slot numbering never depends on scheduling.
fn pack_blocks(
    palettes: [[Color; PALETTE_SIZE]; NUM_PALETTES],
    map_w: u16,
    map_h: u16,
    deduplicate: bool,
    normalize: impl Fn(usize, usize) -> Block + Sync,
) -> NativeDocument {
    let coords = iproduct!(0..map_h as usize, 0..map_w as usize).collect_vec();
    let blocks: Vec<Block> = coords
        .par_iter()
        .map(|&(by, bx)| normalize(bx, by))
        .collect();

    let dropped: usize = blocks.iter().map(|b| b.dropped).sum();
    if dropped > 0 {
        debug!("{dropped} pixel(s) fell outside their block's palette and became index 0");
    }

    let mut arena = TileArena::with_blank();
    let map = blocks
        .into_iter()
        .map(|block| {
            let (tile_idx, flip) = if deduplicate {
                arena.intern(block.tile)
            } else {
                (arena.push(block.tile), Flip::None)
            };
            MapCell {
                tile_idx,
                palette: block.palette,
                flip,
                priority: false,
            }
        })
        .collect();

    NativeDocument {
        palettes,
        tiles: arena.into_tiles(),
        map_width: map_w,
        map_height: map_h,
        map,
    }
}

/// Convert an indexed sprite into tiles and a map.
///
/// The first 64 source colors become the four native palettes (snapped to
/// hardware levels). Each block takes the 16-color bank holding most of its
/// non-zero pixels; pixels from any other bank become index 0.
pub fn sprite_to_native(doc: &SpriteDocument, deduplicate: bool) -> Result<NativeDocument> {
    let (width, height) = (doc.width as usize, doc.height as usize);
    ensure!(
        doc.pixels.len() == width * height,
        "sprite holds {} pixels, expected {}x{}",
        doc.pixels.len(),
        width,
        height
    );
    let (map_w, map_h) = map_size(width, height)?;

    let mut palettes = [[Color::BLACK; PALETTE_SIZE]; NUM_PALETTES];
    for (p, palette) in palettes.iter_mut().enumerate() {
        for (i, color) in palette.iter_mut().enumerate() {
            let src = doc.palette.get(p * PALETTE_SIZE + i).copied();
            *color = src.unwrap_or(Color::BLACK).to_hardware();
        }
    }

    let native = pack_blocks(palettes, map_w, map_h, deduplicate, |bx, by| {
        let mut src = [[0u8; TILE_SIZE]; TILE_SIZE];
        let mut tally = [0usize; NUM_PALETTES];
        for (y, x) in iproduct!(0..TILE_SIZE, 0..TILE_SIZE) {
            let idx = doc.pixel(bx * TILE_SIZE + x, by * TILE_SIZE + y);
            src[y][x] = idx;
            let bank = idx as usize / PALETTE_SIZE;
            if idx != 0 && bank < NUM_PALETTES {
                tally[bank] += 1;
            }
        }

        let mut best = 0;
        for bank in 1..NUM_PALETTES {
            if tally[bank] > tally[best] {
                best = bank;
            }
        }

        let mut tile = Tile::BLANK;
        let mut dropped = 0;
        for (y, x) in iproduct!(0..TILE_SIZE, 0..TILE_SIZE) {
            let idx = src[y][x] as usize;
            if idx / PALETTE_SIZE == best {
                tile.pixels[y][x] = (idx % PALETTE_SIZE) as ColorIdx;
            } else if idx != 0 {
                dropped += 1;
            }
        }
        Block {
            tile,
            palette: best as PaletteIdx,
            dropped,
        }
    });

    info!(
        "Converted {}x{} sprite into {}x{} map with {} tiles",
        width,
        height,
        native.map_width,
        native.map_height,
        native.tiles.len()
    );
    Ok(native)
}

/// Re-quantize an RGBA raster against the palettes of `existing`.
///
/// Each block picks the palette with the smallest summed squared distance
/// (first palette wins ties), and each pixel its nearest entry in that
/// palette. Fully transparent pixels map to index 0 at no cost.
pub fn reimport_raster(
    existing: &NativeDocument,
    pixels: &[[u8; 4]],
    width: usize,
    height: usize,
) -> Result<NativeDocument> {
    ensure!(
        pixels.len() == width * height,
        "raster holds {} pixels, expected {}x{}",
        pixels.len(),
        width,
        height
    );
    let (map_w, map_h) = map_size(width, height)?;

    let palettes = existing.palettes;
    let native = pack_blocks(palettes, map_w, map_h, true, |bx, by| {
        let mut best: Option<(u64, usize, Tile)> = None;
        for (p, palette) in palettes.iter().enumerate() {
            let mut tile = Tile::BLANK;
            let mut total = 0u64;
            for (y, x) in iproduct!(0..TILE_SIZE, 0..TILE_SIZE) {
                let (sx, sy) = (bx * TILE_SIZE + x, by * TILE_SIZE + y);
                if sx >= width || sy >= height {
                    continue;
                }
                let [r, g, b, a] = pixels[sy * width + sx];
                if a == 0 {
                    continue;
                }
                let (idx, dist) = nearest_index(palette, Color::new(r, g, b));
                tile.pixels[y][x] = idx;
                total += dist as u64;
            }
            if best.as_ref().map_or(true, |(d, _, _)| total < *d) {
                best = Some((total, p, tile));
            }
        }
        let (_, palette, tile) = best.unwrap_or((0, 0, Tile::BLANK));
        Block {
            tile,
            palette: palette as PaletteIdx,
            dropped: 0,
        }
    });

    info!(
        "Re-imported {}x{} raster into {} tiles",
        width,
        height,
        native.tiles.len()
    );
    Ok(native)
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    #[default]
    Map,
    Tileset,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub mode: ExportMode,
    pub palette: PaletteSelector,
    pub transparent_on_zero: bool,
    pub tileset_columns: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            mode: ExportMode::Map,
            palette: PaletteSelector::All,
            transparent_on_zero: true,
            tileset_columns: 16,
        }
    }
}

pub fn native_to_sprite(doc: &NativeDocument, options: &ExportOptions) -> Result<SpriteDocument> {
    let image = match options.mode {
        ExportMode::Map => compose_map(doc, options.palette),
        ExportMode::Tileset => compose_tileset(doc, options.palette, options.tileset_columns),
    };
    ensure!(
        image.width <= u16::MAX as usize && image.height <= u16::MAX as usize,
        "exported image {}x{} is too large",
        image.width,
        image.height
    );
    let palette = match options.palette.bank() {
        Some(bank) => doc.palettes[bank].to_vec(),
        None => doc.flat_palette(),
    };
    Ok(SpriteDocument {
        width: image.width as u16,
        height: image.height as u16,
        palette,
        pixels: image.pixels,
    })
}

pub fn export_native_to_sprite(doc: &NativeDocument, options: &ExportOptions) -> Result<Vec<u8>> {
    let sprite = native_to_sprite(doc, options)?;
    serialize_sprite_document(&sprite, options.transparent_on_zero)
        .context("compressing cel pixels")
}
