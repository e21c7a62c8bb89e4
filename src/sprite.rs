//! Layered sprite documents (the Aseprite binary format), restricted to what
//! the converter needs: 8-bit indexed color, first frame only.
//!
//! Every multi-byte field is little-endian. The file starts with a 128-byte
//! header, followed by frames; each frame has a 16-byte header and a list of
//! chunks (`u32` length including the 6-byte chunk header, `u16` type).

use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use log::{debug, info, warn};

use crate::{bytes::Reader, color::Color, error::ParseError};

pub const FILE_MAGIC: u16 = 0xA5E0;
pub const FRAME_MAGIC: u16 = 0xF1FA;
pub const CHUNK_LAYER: u16 = 0x2004;
pub const CHUNK_CEL: u16 = 0x2005;
pub const CHUNK_PALETTE: u16 = 0x2019;
pub const CEL_COMPRESSED_IMAGE: u16 = 2;
pub const DEPTH_INDEXED: u16 = 8;
pub const MAX_COLORS: usize = 256;

const FILE_HEADER_SIZE: usize = 128;
const FRAME_HEADER_SIZE: usize = 16;
const CHUNK_HEADER_SIZE: usize = 6;
const PALETTE_ENTRY_HAS_NAME: u16 = 1;
const LAYER_NAME: &str = "Layer 1";

/// First frame of an indexed sprite, flattened into one canvas.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpriteDocument {
    pub width: u16,
    pub height: u16,
    pub palette: Vec<Color>,
    pub pixels: Vec<u8>,
}

impl SpriteDocument {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            palette: vec![],
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        if x >= self.width as usize || y >= self.height as usize {
            return 0;
        }
        self.pixels
            .get(y * self.width as usize + x)
            .copied()
            .unwrap_or(0)
    }
}

fn expect_magic(
    rom: &Reader,
    offset: usize,
    expected: u16,
    what: &'static str,
) -> Result<(), ParseError> {
    let found = rom.read_u16_le(offset)?;
    if found != expected {
        return Err(ParseError::BadMagic {
            what,
            offset,
            expected,
            found,
        });
    }
    Ok(())
}

pub fn parse_sprite_document(bytes: &[u8]) -> Result<SpriteDocument, ParseError> {
    let rom = Reader::new(bytes);
    expect_magic(&rom, 4, FILE_MAGIC, "file")?;
    let width = rom.read_u16_le(8)?;
    let height = rom.read_u16_le(10)?;
    let depth = rom.read_u16_le(12)?;
    if depth != DEPTH_INDEXED {
        return Err(ParseError::UnsupportedDepth(depth));
    }

    let frame = FILE_HEADER_SIZE;
    expect_magic(&rom, frame + 4, FRAME_MAGIC, "frame")?;
    let old_chunk_cnt = rom.read_u16_le(frame + 6)?;
    let chunk_cnt = match old_chunk_cnt {
        0 | 0xFFFF => rom.read_u32_le(frame + 12)? as usize,
        n => n as usize,
    };

    let mut doc = SpriteDocument::new(width, height);
    let mut addr = frame + FRAME_HEADER_SIZE;
    for _ in 0..chunk_cnt {
        let len = rom.read_u32_le(addr)? as usize;
        let chunk_type = rom.read_u16_le(addr + 4)?;
        if len < CHUNK_HEADER_SIZE {
            return Err(ParseError::Implausible(format!(
                "chunk at 0x{addr:X} has length {len}"
            )));
        }
        let body = rom.read_n(addr + CHUNK_HEADER_SIZE, len - CHUNK_HEADER_SIZE)?;
        match chunk_type {
            CHUNK_PALETTE => read_palette_chunk(&Reader::new(body), &mut doc.palette)?,
            CHUNK_CEL => read_cel_chunk(&Reader::new(body), &mut doc)?,
            t => debug!("Skipping chunk type 0x{t:04X} at 0x{addr:X}"),
        }
        addr += len;
    }

    info!(
        "Parsed sprite document: {}x{}, {} colors",
        width,
        height,
        doc.palette.len()
    );
    Ok(doc)
}

fn read_palette_chunk(chunk: &Reader, palette: &mut Vec<Color>) -> Result<(), ParseError> {
    let first = chunk.read_u32_le(4)? as usize;
    let last = chunk.read_u32_le(8)? as usize;
    let mut addr = 20;
    for idx in first..=last {
        let flags = chunk.read_u16_le(addr)?;
        let rgba = chunk.read_n(addr + 2, 4)?;
        addr += 6;
        if flags & PALETTE_ENTRY_HAS_NAME != 0 {
            let name_len = chunk.read_u16_le(addr)? as usize;
            addr += 2 + name_len;
        }
        if idx >= MAX_COLORS {
            continue;
        }
        if palette.len() <= idx {
            palette.resize(idx + 1, Color::BLACK);
        }
        palette[idx] = Color::new(rgba[0], rgba[1], rgba[2]);
    }
    Ok(())
}

fn read_cel_chunk(chunk: &Reader, doc: &mut SpriteDocument) -> Result<(), ParseError> {
    let cel_type = chunk.read_u16_le(7)?;
    if cel_type != CEL_COMPRESSED_IMAGE {
        debug!("Skipping cel of type {cel_type}");
        return Ok(());
    }
    let x = chunk.read_i16_le(2)? as i32;
    let y = chunk.read_i16_le(4)? as i32;
    let w = chunk.read_u16_le(16)? as usize;
    let h = chunk.read_u16_le(18)? as usize;
    let data = chunk.read_n(20, chunk.len().saturating_sub(20))?;

    // The declared size bounds the inflated output, not the payload length.
    let mut cel_pixels = Vec::with_capacity((w * h).min(data.len().saturating_mul(4)));
    if let Err(e) = ZlibDecoder::new(data)
        .take((w * h) as u64)
        .read_to_end(&mut cel_pixels)
    {
        warn!("Skipping cel at ({x}, {y}): decompression failed: {e}");
        return Ok(());
    }
    if cel_pixels.len() < w * h {
        warn!(
            "Cel at ({x}, {y}) holds {} of {} pixels",
            cel_pixels.len(),
            w * h
        );
    }

    let canvas_w = doc.width as i32;
    let canvas_h = doc.height as i32;
    for (i, &p) in cel_pixels.iter().take(w * h).enumerate() {
        let px = x + (i % w) as i32;
        let py = y + (i / w) as i32;
        if px < 0 || py < 0 || px >= canvas_w || py >= canvas_h {
            continue;
        }
        doc.pixels[(py * canvas_w + px) as usize] = p;
    }
    Ok(())
}

fn chunk(chunk_type: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHUNK_HEADER_SIZE + body.len());
    out.extend(((CHUNK_HEADER_SIZE + body.len()) as u32).to_le_bytes());
    out.extend(chunk_type.to_le_bytes());
    out.extend(body);
    out
}

fn palette_chunk(palette: &[Color], transparent_on_zero: bool) -> Vec<u8> {
    let mut body = vec![];
    body.extend((palette.len() as u32).to_le_bytes());
    body.extend(0u32.to_le_bytes());
    body.extend((palette.len() as u32 - 1).to_le_bytes());
    body.extend([0; 8]);
    for (i, c) in palette.iter().enumerate() {
        let alpha = if transparent_on_zero && i % 16 == 0 {
            0
        } else {
            255
        };
        body.extend(0u16.to_le_bytes());
        body.extend([c.r, c.g, c.b, alpha]);
    }
    chunk(CHUNK_PALETTE, &body)
}

fn layer_chunk() -> Vec<u8> {
    let mut body = vec![];
    body.extend(3u16.to_le_bytes()); // visible | editable
    body.extend(0u16.to_le_bytes()); // normal image layer
    body.extend(0u16.to_le_bytes()); // child level
    body.extend([0; 4]); // default size (ignored)
    body.extend(0u16.to_le_bytes()); // blend mode: normal
    body.push(255);
    body.extend([0; 3]);
    body.extend((LAYER_NAME.len() as u16).to_le_bytes());
    body.extend(LAYER_NAME.as_bytes());
    chunk(CHUNK_LAYER, &body)
}

fn cel_chunk(doc: &SpriteDocument) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&doc.pixels)?;
    let compressed = encoder.finish()?;

    let mut body = vec![];
    body.extend(0u16.to_le_bytes()); // layer
    body.extend(0i16.to_le_bytes());
    body.extend(0i16.to_le_bytes());
    body.push(255);
    body.extend(CEL_COMPRESSED_IMAGE.to_le_bytes());
    body.extend(0i16.to_le_bytes()); // z-index
    body.extend([0; 5]);
    body.extend(doc.width.to_le_bytes());
    body.extend(doc.height.to_le_bytes());
    body.extend(compressed);
    Ok(chunk(CHUNK_CEL, &body))
}

/// Wrap finished chunks into a single-frame file.
fn assemble(width: u16, height: u16, color_cnt: u16, chunks: &[Vec<u8>]) -> Vec<u8> {
    let chunk_bytes: usize = chunks.iter().map(Vec::len).sum();
    let frame_size = FRAME_HEADER_SIZE + chunk_bytes;
    let file_size = FILE_HEADER_SIZE + frame_size;

    let mut out = Vec::with_capacity(file_size);
    out.extend((file_size as u32).to_le_bytes());
    out.extend(FILE_MAGIC.to_le_bytes());
    out.extend(1u16.to_le_bytes()); // frames
    out.extend(width.to_le_bytes());
    out.extend(height.to_le_bytes());
    out.extend(DEPTH_INDEXED.to_le_bytes());
    out.extend(1u32.to_le_bytes()); // layer opacity is valid
    out.extend(100u16.to_le_bytes()); // speed (deprecated)
    out.extend([0; 8]);
    out.push(0); // transparent index
    out.extend([0; 3]);
    out.extend(color_cnt.to_le_bytes());
    out.extend([1, 1]); // pixel ratio
    out.extend(0i16.to_le_bytes());
    out.extend(0i16.to_le_bytes());
    out.extend(16u16.to_le_bytes());
    out.extend(16u16.to_le_bytes());
    out.resize(FILE_HEADER_SIZE, 0);

    out.extend((frame_size as u32).to_le_bytes());
    out.extend(FRAME_MAGIC.to_le_bytes());
    out.extend((chunks.len().min(0xFFFF) as u16).to_le_bytes());
    out.extend(100u16.to_le_bytes()); // duration (ms)
    out.extend([0; 2]);
    out.extend((chunks.len() as u32).to_le_bytes());
    for c in chunks {
        out.extend(c);
    }
    debug_assert_eq!(out.len(), file_size);
    out
}

/// Write `doc` as a one-frame, one-layer, one-cel sprite. With
/// `transparent_on_zero`, every palette slot that starts a 16-color bank gets
/// alpha 0.
pub fn serialize_sprite_document(
    doc: &SpriteDocument,
    transparent_on_zero: bool,
) -> std::io::Result<Vec<u8>> {
    let mut chunks = vec![];
    if !doc.palette.is_empty() {
        chunks.push(palette_chunk(&doc.palette, transparent_on_zero));
    }
    chunks.push(layer_chunk());
    chunks.push(cel_chunk(doc)?);
    Ok(assemble(
        doc.width,
        doc.height,
        doc.palette.len() as u16,
        &chunks,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u16, height: u16) -> SpriteDocument {
        let mut doc = SpriteDocument::new(width, height);
        doc.palette = (0..64)
            .map(|i| Color::new(i * 4, 255 - i, (i % 8) * 36))
            .collect();
        for (i, p) in doc.pixels.iter_mut().enumerate() {
            *p = (i * 7 % 64) as u8;
        }
        doc
    }

    fn compressed_cel(x: i16, y: i16, w: u16, h: u16, pixels: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(pixels).unwrap();
        let data = encoder.finish().unwrap();
        let mut body = vec![];
        body.extend(0u16.to_le_bytes());
        body.extend(x.to_le_bytes());
        body.extend(y.to_le_bytes());
        body.push(255);
        body.extend(CEL_COMPRESSED_IMAGE.to_le_bytes());
        body.extend([0; 7]);
        body.extend(w.to_le_bytes());
        body.extend(h.to_le_bytes());
        body.extend(data);
        chunk(CHUNK_CEL, &body)
    }

    #[test]
    fn round_trip_preserves_pixels_and_palette() {
        let doc = checker(20, 13);
        let bytes = serialize_sprite_document(&doc, true).unwrap();
        assert_eq!(&bytes[4..6], &[0xE0, 0xA5]);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize, bytes.len());
        let parsed = parse_sprite_document(&bytes).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn transparent_slots_get_zero_alpha() {
        let doc = checker(8, 8);
        let bytes = serialize_sprite_document(&doc, true).unwrap();
        // First chunk is the palette; entries start 26 bytes into it.
        let entries = FILE_HEADER_SIZE + FRAME_HEADER_SIZE + 26;
        let alpha = |i: usize| bytes[entries + i * 6 + 5];
        assert_eq!(alpha(0), 0);
        assert_eq!(alpha(1), 255);
        assert_eq!(alpha(16), 0);
        assert_eq!(alpha(48), 0);
        assert_eq!(alpha(63), 255);

        let opaque = serialize_sprite_document(&doc, false).unwrap();
        assert_eq!(opaque[entries + 5], 255);
    }

    #[test]
    fn rejects_bad_magic_and_depth() {
        let mut bytes = serialize_sprite_document(&checker(8, 8), false).unwrap();
        let mut bad_file = bytes.clone();
        bad_file[4] = 0;
        assert!(matches!(
            parse_sprite_document(&bad_file),
            Err(ParseError::BadMagic { what: "file", .. })
        ));

        let mut bad_frame = bytes.clone();
        bad_frame[FILE_HEADER_SIZE + 4] = 0;
        assert!(matches!(
            parse_sprite_document(&bad_frame),
            Err(ParseError::BadMagic { what: "frame", .. })
        ));

        bytes[12] = 32;
        assert_eq!(
            parse_sprite_document(&bytes),
            Err(ParseError::UnsupportedDepth(32))
        );
        assert!(matches!(
            parse_sprite_document(&bytes[..60]),
            Err(ParseError::UnsupportedDepth(32))
        ));
        assert!(matches!(
            parse_sprite_document(&bytes[..10]),
            Err(ParseError::Truncated { .. })
        ));
    }

    #[test]
    fn cels_are_clipped_to_canvas() {
        let pixels: Vec<u8> = (1..=16).collect();
        let chunks = [
            compressed_cel(-2, -1, 4, 4, &pixels),
            compressed_cel(3, 3, 4, 4, &pixels),
        ];
        let bytes = assemble(4, 4, 0, &chunks);
        let doc = parse_sprite_document(&bytes).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            7, 8, 0, 0,
            11, 12, 0, 0,
            15, 16, 0, 0,
            0, 0, 0, 1,
        ];
        assert_eq!(doc.pixels, expected);
    }

    #[test]
    fn cel_inflation_stops_at_declared_size() {
        let mut payload = vec![0u8; 1 << 20];
        payload[0] = 7;
        let bytes = assemble(1, 1, 0, &[compressed_cel(0, 0, 1, 1, &payload)]);
        let doc = parse_sprite_document(&bytes).unwrap();
        assert_eq!(doc.pixels, vec![7]);

        // A 2x2 cel on a 4x4 canvas; the rest of the stream never lands.
        let payload = vec![5u8; 64 * 1024];
        let bytes = assemble(4, 4, 0, &[compressed_cel(1, 1, 2, 2, &payload)]);
        let doc = parse_sprite_document(&bytes).unwrap();
        assert_eq!(doc.pixels.iter().filter(|&&p| p == 5).count(), 4);
        assert_eq!(doc.pixel(2, 2), 5);
        assert_eq!(doc.pixel(3, 3), 0);
    }

    #[test]
    fn corrupt_cel_is_skipped() {
        let mut broken = compressed_cel(0, 0, 2, 2, &[5, 5, 5, 5]);
        let n = broken.len();
        broken[26..n].fill(0xAB);
        let good = compressed_cel(1, 1, 1, 1, &[9]);
        let bytes = assemble(2, 2, 0, &[broken, good]);
        let doc = parse_sprite_document(&bytes).unwrap();
        assert_eq!(doc.pixels, vec![0, 0, 0, 9]);
    }

    #[test]
    fn palette_names_and_high_slots() {
        let mut body = vec![];
        body.extend(3u32.to_le_bytes());
        body.extend(255u32.to_le_bytes());
        body.extend(257u32.to_le_bytes());
        body.extend([0; 8]);
        body.extend(PALETTE_ENTRY_HAS_NAME.to_le_bytes());
        body.extend([10, 20, 30, 255]);
        body.extend(3u16.to_le_bytes());
        body.extend(b"red");
        for _ in 0..2 {
            body.extend(0u16.to_le_bytes());
            body.extend([1, 2, 3, 255]);
        }
        let bytes = assemble(1, 1, 0, &[chunk(CHUNK_PALETTE, &body)]);
        let doc = parse_sprite_document(&bytes).unwrap();
        assert_eq!(doc.palette.len(), 256);
        assert_eq!(doc.palette[255], Color::new(10, 20, 30));
        assert_eq!(doc.palette[0], Color::BLACK);
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let junk = chunk(0x2007, &[1, 2, 3, 4, 5]);
        let bytes = assemble(1, 1, 0, &[junk, compressed_cel(0, 0, 1, 1, &[4])]);
        assert_eq!(parse_sprite_document(&bytes).unwrap().pixels, vec![4]);
    }

    #[test]
    fn chunk_count_falls_back_to_new_field() {
        let mut bytes = assemble(1, 1, 0, &[compressed_cel(0, 0, 1, 1, &[6])]);
        bytes[FILE_HEADER_SIZE + 6..FILE_HEADER_SIZE + 8].fill(0);
        assert_eq!(parse_sprite_document(&bytes).unwrap().pixels, vec![6]);
    }

    #[test]
    fn undersized_chunk_is_implausible() {
        let mut bytes = assemble(1, 1, 0, &[chunk(0x2007, &[])]);
        let at = FILE_HEADER_SIZE + FRAME_HEADER_SIZE;
        bytes[at..at + 4].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            parse_sprite_document(&bytes),
            Err(ParseError::Implausible(_))
        ));
    }
}
