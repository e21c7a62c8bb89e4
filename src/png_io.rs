// PNG reading/writing for the raster side of the converter.
use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{bail, Context, Result};
use log::info;
use png::{BitDepth, ColorType, Transformations};

/// Decoded image as RGBA pixels, row-major.
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[u8; 4]>,
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder.read_info().context("reading PNG header")?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).context("decoding PNG frame")?;
    let buf = &buf[..frame.buffer_size()];
    let (width, height) = (frame.width as usize, frame.height as usize);
    let stride = frame.line_size;

    let channels = match frame.color_type {
        ColorType::Grayscale => 1,
        ColorType::GrayscaleAlpha => 2,
        ColorType::Rgb => 3,
        ColorType::Rgba => 4,
        ColorType::Indexed => bail!("indexed PNG was not expanded"),
    };

    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        let row = &buf[y * stride..y * stride + width * channels];
        for px in row.chunks_exact(channels) {
            pixels.push(match *px {
                [v] => [v, v, v, 255],
                [v, a] => [v, v, v, a],
                [r, g, b] => [r, g, b, 255],
                [r, g, b, a] => [r, g, b, a],
                _ => unreachable!(),
            });
        }
    }
    Ok(RgbaImage {
        width,
        height,
        pixels,
    })
}

pub fn read_png(path: &Path) -> Result<RgbaImage> {
    info!("Reading {}", path.display());
    let bytes = std::fs::read(path)?;
    decode_png(&bytes).with_context(|| format!("invalid PNG {}", path.display()))
}

pub fn write_png(path: &Path, width: usize, height: usize, rgba: &[u8]) -> Result<()> {
    info!("Writing {}", path.display());
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width as u32, height as u32);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let rgba = [
            255, 0, 0, 255, 0, 255, 0, 0, //
            0, 0, 255, 128, 10, 20, 30, 255,
        ];
        write_png(&path, 2, 2, &rgba).unwrap();
        let image = read_png(&path).unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.pixels[1], [0, 255, 0, 0]);
        assert_eq!(image.pixels[3], [10, 20, 30, 255]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_png(b"not a png").is_err());
    }
}
