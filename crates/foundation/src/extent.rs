use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounds::Aabb2;
use crate::crs::Crs;
use crate::math::{Projection, Vec2};
use crate::offset_scale::OffsetScale;

/// Number of samples taken along each edge when reprojecting an extent.
const EDGE_SAMPLES: usize = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtentError {
    #[error("extent bounds are inverted: west={west} east={east} south={south} north={north}")]
    Inverted {
        west: f64,
        east: f64,
        south: f64,
        north: f64,
    },
    #[error("extent bounds must be finite numbers")]
    NotFinite,
    #[error("cannot reproject extent from {from} to {to}")]
    Projection { from: Crs, to: Crs },
}

/// Axis-aligned rectangle in a named CRS.
///
/// Extents are immutable values; every operation returns a new extent.
/// Comparisons between extents in different CRSes never match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    crs: Crs,
    bounds: Aabb2,
}

impl Extent {
    pub fn new(crs: Crs, west: f64, east: f64, south: f64, north: f64) -> Result<Self, ExtentError> {
        if ![west, east, south, north].iter().all(|v| v.is_finite()) {
            return Err(ExtentError::NotFinite);
        }
        if west > east || south > north {
            return Err(ExtentError::Inverted {
                west,
                east,
                south,
                north,
            });
        }
        Ok(Self {
            crs,
            bounds: Aabb2::new([west, south], [east, north]),
        })
    }

    pub fn from_bounds(crs: Crs, bounds: Aabb2) -> Result<Self, ExtentError> {
        Self::new(crs, bounds.min[0], bounds.max[0], bounds.min[1], bounds.max[1])
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn bounds(&self) -> &Aabb2 {
        &self.bounds
    }

    pub fn west(&self) -> f64 {
        self.bounds.min[0]
    }

    pub fn east(&self) -> f64 {
        self.bounds.max[0]
    }

    pub fn south(&self) -> f64 {
        self.bounds.min[1]
    }

    pub fn north(&self) -> f64 {
        self.bounds.max[1]
    }

    pub fn width(&self) -> f64 {
        self.bounds.width()
    }

    pub fn height(&self) -> f64 {
        self.bounds.height()
    }

    pub fn dimensions(&self) -> Vec2 {
        Vec2::new(self.width(), self.height())
    }

    pub fn center(&self) -> Vec2 {
        let [x, y] = self.bounds.center();
        Vec2::new(x, y)
    }

    pub fn intersects_extent(&self, other: &Extent) -> bool {
        self.crs == other.crs && self.bounds.intersects(&other.bounds)
    }

    /// Overlapping region, if the extents share a CRS and intersect.
    pub fn intersect(&self, other: &Extent) -> Option<Extent> {
        if self.crs != other.crs {
            return None;
        }
        let bounds = self.bounds.intersection(&other.bounds)?;
        Some(Extent {
            crs: self.crs.clone(),
            bounds,
        })
    }

    pub fn union(&self, other: &Extent) -> Option<Extent> {
        if self.crs != other.crs {
            return None;
        }
        Some(Extent {
            crs: self.crs.clone(),
            bounds: self.bounds.union(&other.bounds),
        })
    }

    /// True if `self` lies within `other` (with `epsilon` slack per edge).
    pub fn is_inside(&self, other: &Extent, epsilon: f64) -> bool {
        self.crs == other.crs && self.bounds.is_inside(&other.bounds, epsilon)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.bounds.contains_point([x, y])
    }

    /// Grows every edge by the given absolute amounts.
    pub fn with_margin(&self, x: f64, y: f64) -> Extent {
        Extent {
            crs: self.crs.clone(),
            bounds: Aabb2::new(
                [self.bounds.min[0] - x, self.bounds.min[1] - y],
                [self.bounds.max[0] + x, self.bounds.max[1] + y],
            ),
        }
    }

    /// Grows every edge by `ratio` of the extent's own dimensions.
    pub fn with_relative_margin(&self, ratio: f64) -> Extent {
        self.with_margin(self.width() * ratio, self.height() * ratio)
    }

    /// Pitch mapping this extent's UV space into `parent`'s UV space.
    ///
    /// UV `(0, 0)` is the north-west corner, `v` grows southward.
    pub fn offset_to_parent(&self, parent: &Extent) -> OffsetScale {
        let pw = parent.width();
        let ph = parent.height();
        if pw <= 0.0 || ph <= 0.0 {
            return OffsetScale::IDENTITY;
        }
        OffsetScale::new(
            (self.west() - parent.west()) / pw,
            (parent.north() - self.north()) / ph,
            self.width() / pw,
            self.height() / ph,
        )
    }

    /// Re-expresses this extent in `crs`.
    ///
    /// Edges are sampled rather than only the corners, so the result bounds
    /// curved images of straight edges.
    pub fn as_crs(&self, crs: &Crs, projection: &dyn Projection) -> Result<Extent, ExtentError> {
        if &self.crs == crs {
            return Ok(self.clone());
        }
        let err = || ExtentError::Projection {
            from: self.crs.clone(),
            to: crs.clone(),
        };

        let mut points = Vec::with_capacity(4 * (EDGE_SAMPLES + 1));
        for i in 0..=EDGE_SAMPLES {
            let t = i as f64 / EDGE_SAMPLES as f64;
            let x = self.west() + t * self.width();
            let y = self.south() + t * self.height();
            points.push([x, self.south()]);
            points.push([x, self.north()]);
            points.push([self.west(), y]);
            points.push([self.east(), y]);
        }

        let mut projected = Vec::with_capacity(points.len());
        for [x, y] in points {
            let (px, py) = projection
                .transform(&self.crs, crs, x, y)
                .ok_or_else(err)?;
            projected.push([px, py]);
        }
        let bounds = Aabb2::from_points(projected).ok_or_else(err)?;
        Extent::from_bounds(crs.clone(), bounds)
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}, {}, {}, {}]",
            self.crs,
            self.west(),
            self.east(),
            self.south(),
            self.north()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Extent, ExtentError};
    use crate::crs::Crs;
    use crate::math::WebMercator;

    fn ext(w: f64, e: f64, s: f64, n: f64) -> Extent {
        Extent::new(Crs::web_mercator(), w, e, s, n).unwrap()
    }

    #[test]
    fn rejects_inverted_and_non_finite_bounds() {
        assert!(matches!(
            Extent::new(Crs::wgs84(), 1.0, 0.0, 0.0, 1.0),
            Err(ExtentError::Inverted { .. })
        ));
        assert_eq!(
            Extent::new(Crs::wgs84(), f64::NAN, 0.0, 0.0, 1.0),
            Err(ExtentError::NotFinite)
        );
    }

    #[test]
    fn inner_extent_is_inside_and_intersects() {
        let outer = ext(0.0, 100.0, 0.0, 100.0);
        let inner = ext(10.0, 20.0, 30.0, 40.0);
        assert!(inner.is_inside(&outer, 0.0));
        assert!(outer.intersects_extent(&inner));
        assert!(!outer.is_inside(&inner, 0.0));
    }

    #[test]
    fn different_crs_never_intersects() {
        let a = ext(0.0, 1.0, 0.0, 1.0);
        let b = Extent::new(Crs::wgs84(), 0.0, 1.0, 0.0, 1.0).unwrap();
        assert!(!a.intersects_extent(&b));
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn offset_to_parent_maps_child_into_parent_uv() {
        let parent = ext(0.0, 100.0, 0.0, 100.0);
        // North-east quadrant.
        let child = ext(50.0, 100.0, 50.0, 100.0);
        let pitch = child.offset_to_parent(&parent);
        assert_eq!(pitch.offset_x, 0.5);
        assert_eq!(pitch.offset_y, 0.0);
        assert_eq!(pitch.scale_x, 0.5);
        assert_eq!(pitch.scale_y, 0.5);
        assert!(parent.offset_to_parent(&parent).is_identity());
    }

    #[test]
    fn margins_grow_every_edge() {
        let e = ext(0.0, 10.0, 0.0, 20.0);
        let m = e.with_relative_margin(0.1);
        assert_eq!((m.west(), m.east(), m.south(), m.north()), (-1.0, 11.0, -2.0, 22.0));
        let m = e.with_margin(1.0, 2.0);
        assert_eq!((m.width(), m.height()), (12.0, 24.0));
    }

    #[test]
    fn reprojection_round_trips_within_tolerance() {
        let geo = Extent::new(Crs::wgs84(), -10.0, 10.0, -5.0, 5.0).unwrap();
        let merc = geo.as_crs(&Crs::web_mercator(), &WebMercator).unwrap();
        assert_eq!(merc.crs(), &Crs::web_mercator());
        let back = merc.as_crs(&Crs::wgs84(), &WebMercator).unwrap();
        assert!((back.west() - geo.west()).abs() < 1e-9);
        assert!((back.north() - geo.north()).abs() < 1e-9);
    }

    #[test]
    fn extent_deserializes_from_json() {
        let e: Extent = serde_json::from_str(
            r#"{"crs":"EPSG:3857","bounds":{"min":[0.0,0.0],"max":[1.0,2.0]}}"#,
        )
        .unwrap();
        assert_eq!(e, ext(0.0, 1.0, 0.0, 2.0));
    }
}
