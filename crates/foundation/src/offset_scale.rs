use serde::{Deserialize, Serialize};

/// Affine UV mapping from a child texture region into an ancestor's texture.
///
/// `uv_parent = offset + uv_child * scale`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OffsetScale {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl OffsetScale {
    pub const IDENTITY: OffsetScale = OffsetScale {
        offset_x: 0.0,
        offset_y: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
    };

    pub fn new(offset_x: f64, offset_y: f64, scale_x: f64, scale_y: f64) -> Self {
        Self {
            offset_x,
            offset_y,
            scale_x,
            scale_y,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn apply_uv(&self, uv: [f64; 2]) -> [f64; 2] {
        [
            self.offset_x + uv[0] * self.scale_x,
            self.offset_y + uv[1] * self.scale_y,
        ]
    }

    /// Mapping equivalent to applying `self` first, then `outer`.
    pub fn combine(&self, outer: &OffsetScale) -> OffsetScale {
        OffsetScale {
            offset_x: outer.offset_x + self.offset_x * outer.scale_x,
            offset_y: outer.offset_y + self.offset_y * outer.scale_y,
            scale_x: self.scale_x * outer.scale_x,
            scale_y: self.scale_y * outer.scale_y,
        }
    }
}

impl Default for OffsetScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}
