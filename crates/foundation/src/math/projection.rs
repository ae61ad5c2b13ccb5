use crate::crs::Crs;

use super::geodesy::{lon_lat_to_mercator, mercator_to_lon_lat};

/// Point transform between coordinate reference systems.
///
/// Implementations are expected to run in double precision. `None` means the
/// pair of CRSes is unsupported or the point has no image in `to`.
pub trait Projection {
    fn transform(&self, from: &Crs, to: &Crs, x: f64, y: f64) -> Option<(f64, f64)>;
}

/// Built-in transforms between `EPSG:4326` and `EPSG:3857`.
#[derive(Debug, Copy, Clone, Default)]
pub struct WebMercator;

impl Projection for WebMercator {
    fn transform(&self, from: &Crs, to: &Crs, x: f64, y: f64) -> Option<(f64, f64)> {
        if from == to {
            return Some((x, y));
        }
        let out = match (from.name(), to.name()) {
            (Crs::WGS84, Crs::WEB_MERCATOR) => lon_lat_to_mercator(x, y),
            (Crs::WEB_MERCATOR, Crs::WGS84) => mercator_to_lon_lat(x, y),
            _ => return None,
        };
        (out.0.is_finite() && out.1.is_finite()).then_some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{Projection, WebMercator};
    use crate::crs::Crs;

    #[test]
    fn identity_for_same_crs() {
        let p = WebMercator;
        assert_eq!(
            p.transform(&Crs::new("EPSG:2154"), &Crs::new("EPSG:2154"), 3.0, 4.0),
            Some((3.0, 4.0))
        );
    }

    #[test]
    fn unsupported_pairs_fail() {
        let p = WebMercator;
        assert!(
            p.transform(&Crs::new("EPSG:2154"), &Crs::wgs84(), 3.0, 4.0)
                .is_none()
        );
    }

    #[test]
    fn origin_maps_to_origin() {
        let p = WebMercator;
        let (x, y) = p
            .transform(&Crs::wgs84(), &Crs::web_mercator(), 0.0, 0.0)
            .unwrap();
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
    }
}
