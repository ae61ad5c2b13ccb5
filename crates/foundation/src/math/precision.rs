//! Precision policies.
//!
//! Transform math runs in `f64`; geometry buffers hold `f32`. Extents of
//! projected tiles sit millions of units from the origin, so positions are
//! stored relative to a per-mesh origin before the cast. Float keys that
//! feed ordering go through `StableF64`.

use core::cmp::Ordering;

use super::Vec2;

/// CPU-authoritative precision type.
pub type HighPrecision = f64;

/// Single-precision vertex offset, as written to geometry buffers.
pub type RelativeF32 = [f32; 2];

/// Origin-relative precision model.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OriginRelative {
    pub origin: Vec2,
}

impl OriginRelative {
    pub fn new(origin: Vec2) -> Self {
        Self { origin }
    }

    /// Narrow a world-space point to an origin-relative `f32` offset.
    #[inline]
    pub fn to_f32(self, world: Vec2) -> RelativeF32 {
        let d = world - self.origin;
        [d.x as f32, d.y as f32]
    }

    /// Widen an offset back to world space.
    #[inline]
    pub fn to_world(self, offset: RelativeF32) -> Vec2 {
        Vec2::new(
            self.origin.x + f64::from(offset[0]),
            self.origin.y + f64::from(offset[1]),
        )
    }
}

/// A float with a deterministic total ordering: `-0.0 == 0.0` and all NaNs
/// compare equal.
#[derive(Debug, Copy, Clone, Default)]
pub struct StableF64(pub HighPrecision);

impl StableF64 {
    fn canonical(self) -> f64 {
        if self.0 == 0.0 {
            0.0
        } else if self.0.is_nan() {
            f64::NAN
        } else {
            self.0
        }
    }
}

impl PartialEq for StableF64 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StableF64 {}

impl PartialOrd for StableF64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StableF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().total_cmp(&other.canonical())
    }
}
