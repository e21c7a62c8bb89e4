use thiserror::Error;

/// Structural failure while decoding one of the binary containers.
///
/// `Truncated` and `Implausible` are kept apart so callers can decide how
/// strict to be: the former means the buffer simply ran out, the latter that
/// the header fields contradict the fixed layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("buffer too short: need {needed} byte(s) at offset 0x{offset:X}, buffer is {len} bytes")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("bad {what} magic at offset 0x{offset:X}: expected 0x{expected:04X}, found 0x{found:04X}")]
    BadMagic {
        what: &'static str,
        offset: usize,
        expected: u16,
        found: u16,
    },

    #[error("unsupported color depth {0} (only 8-bit indexed is supported)")]
    UnsupportedDepth(u16),

    #[error("structurally implausible: {0}")]
    Implausible(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("map cell {cell}: tile index {tile_idx} does not fit in 11 bits")]
    TileIndexOverflow { cell: usize, tile_idx: u32 },

    #[error("{count} tiles do not fit in the 16-bit tile count")]
    TooManyTiles { count: usize },
}
