use serde::{Deserialize, Serialize};

/// Colour adjustments applied by the material after sampling.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Colorimetry {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Colorimetry {
    pub const fn new(brightness: f32, contrast: f32, saturation: f32) -> Self {
        Self {
            brightness,
            contrast,
            saturation,
        }
    }
}

impl Default for Colorimetry {
    fn default() -> Self {
        Self::new(0.0, 1.0, 1.0)
    }
}

/// Per-layer display state pushed to every node's material.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerStyle {
    pub visible: bool,
    pub opacity: f32,
    pub colorimetry: Colorimetry,
    /// Only terrain within this elevation range shows the layer.
    pub elevation_range: Option<(f32, f32)>,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            visible: true,
            opacity: 1.0,
            colorimetry: Colorimetry::default(),
            elevation_range: None,
        }
    }
}
