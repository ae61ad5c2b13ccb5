use std::collections::BTreeSet;

use foundation::extent::Extent;
use foundation::ids::NodeId;
use foundation::math::StableF64;
use foundation::time::Time;
use gpu::{MinMax, Mesh, Texture};

/// Upper bound of the subdivision depth the z-order mapping spans.
const MAX_DEPTH_LOG2: f64 = 25.0;

/// Draw order for an image of the given width: finer images get a larger
/// value and are drawn in front of coarser ones.
pub(crate) fn z_order(width: f64) -> f64 {
    if width <= 0.0 || !width.is_finite() {
        return 1.0;
    }
    ((MAX_DEPTH_LOG2 - width.log2()) / (2.0 * MAX_DEPTH_LOG2)).clamp(0.0, 1.0)
}

/// One source image placed in the composer's space.
#[derive(Debug)]
pub(crate) struct Image {
    /// Placement in the composer's target CRS.
    pub extent: Extent,
    pub texture: Texture,
    pub mesh: Mesh,
    pub reprojected: bool,
    pub owners: BTreeSet<NodeId>,
    pub min_max: Option<MinMax>,
    pub always_visible: bool,
    pub z: f64,
    pub sequence: u64,
    pub first_drawn: Option<Time>,
}

impl Image {
    pub fn is_orphan(&self) -> bool {
        self.owners.is_empty() && !self.always_visible
    }

    /// Fade-in opacity at `now`; records the first draw time.
    pub fn opacity(&mut self, now: Time, fade_duration_s: f64) -> f32 {
        let first = *self.first_drawn.get_or_insert(now);
        if fade_duration_s <= 0.0 {
            return 1.0;
        }
        (now.since(first) / fade_duration_s).clamp(0.0, 1.0) as f32
    }

    /// Draw order: coarse before fine, older before newer.
    pub fn draw_key(&self) -> (StableF64, u64) {
        (StableF64(self.z), self.sequence)
    }
}
