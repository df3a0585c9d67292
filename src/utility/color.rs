use serde_derive::{Deserialize, Serialize};

/// Color tag carried by obstacles. The engine never interprets it - it only
/// stores the three channels and hands them to whoever draws the scene.
#[derive(Default, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }
}
