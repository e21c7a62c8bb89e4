//! Conversion between the console-native tile/map format (JIM) and indexed
//! sprite documents.

pub mod bytes;
pub mod color;
pub mod config;
pub mod convert;
pub mod error;
pub mod native;
pub mod png_io;
pub mod render;
pub mod sprite;
pub mod tile;

pub use color::{decode_hardware_color, encode_hardware_color, Color};
pub use convert::{
    export_native_to_sprite, native_to_sprite, reimport_raster, sprite_to_native, ExportMode,
    ExportOptions,
};
pub use error::{EncodeError, ParseError};
pub use native::{
    parse_native, parse_native_strict, serialize_native, serialize_native_with, MapCell,
    NativeDocument, TileIndexOverflow,
};
pub use render::{render_rgba, PaletteSelector};
pub use sprite::{parse_sprite_document, serialize_sprite_document, SpriteDocument};
pub use tile::{Flip, Tile, TileArena};
