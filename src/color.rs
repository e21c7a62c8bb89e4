use serde::{Deserialize, Serialize};

pub type ColorValue = u8; // Channel value (0-255)
pub type ColorIdx = u8; // Index into a 16-color palette (0-15)

/// Distance between adjacent hardware levels (8 levels per channel).
pub const LEVEL_STEP: u8 = 36;
pub const MAX_LEVEL: u16 = 7;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: ColorValue,
    pub g: ColorValue,
    pub b: ColorValue,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn new(r: ColorValue, g: ColorValue, b: ColorValue) -> Self {
        Self { r, g, b }
    }

    /// Squared Euclidean distance in RGB space.
    pub fn distance_sq(self, other: Color) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }

    /// Snap to the hardware grid (rounding every channel down).
    pub fn to_hardware(self) -> Color {
        decode_hardware_color(encode_hardware_color(self))
    }

    pub fn is_hardware_level(self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|&c| c % LEVEL_STEP == 0 && (c / LEVEL_STEP) as u16 <= MAX_LEVEL)
    }
}

// Word layout: ----BBB-GGG-RRR-
const RED_SHIFT: u16 = 1;
const GREEN_SHIFT: u16 = 5;
const BLUE_SHIFT: u16 = 9;

pub fn decode_hardware_color(word: u16) -> Color {
    let level = |shift: u16| ((word >> shift) & MAX_LEVEL) as u8 * LEVEL_STEP;
    Color {
        r: level(RED_SHIFT),
        g: level(GREEN_SHIFT),
        b: level(BLUE_SHIFT),
    }
}

pub fn encode_hardware_color(c: Color) -> u16 {
    let field = |v: ColorValue| std::cmp::min(v as u16 / LEVEL_STEP as u16, MAX_LEVEL);
    field(c.r) << RED_SHIFT | field(c.g) << GREEN_SHIFT | field(c.b) << BLUE_SHIFT
}

/// Index of the closest palette entry. Ties go to the lowest index.
pub fn nearest_index(palette: &[Color], c: Color) -> (ColorIdx, u32) {
    let mut best = (0, u32::MAX);
    for (i, &p) in palette.iter().enumerate() {
        let d = p.distance_sq(c);
        if d < best.1 {
            best = (i as ColorIdx, d);
        }
    }
    best
}
