use std::time::Duration;

use foundation::extent::Extent;
use gpu::{DEFAULT_POOL_CAPACITY, MinMax};
use serde::{Deserialize, Serialize};

use crate::composer::{DEFAULT_MESH_SEGMENTS, NoDataOptions};
use crate::interpretation::Interpretation;
use crate::layer::LayerError;
use crate::symbology::LayerStyle;

/// Layer configuration. Every field has a default, so hosts can load
/// partial JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerOptions {
    pub name: Option<String>,
    /// Crops the source; takes precedence over the source's own extent.
    pub extent: Option<Extent>,
    pub interpretation: Interpretation,
    pub no_data: NoDataOptions,
    /// Multiplies the texture size requested by nodes.
    pub resolution_factor: f64,
    pub fade_duration_s: f64,
    /// Delay before a fetch honours cancellation and hits the network.
    pub debounce_ms: u64,
    /// Lattice subdivisions used when reprojecting images.
    pub mesh_segments: u32,
    /// Idle render targets kept per size bucket.
    pub pool_capacity: usize,
    /// Extra border around each target, in pixels.
    pub margin_px: u32,
    /// Extra border around each target, relative to its size.
    pub margin_ratio: f64,
    /// Elevation only: fetch a coarse full-extent image to learn the range.
    pub preload_root: bool,
    /// Elevation only: known value range, skips the root fetch.
    pub min_max: Option<MinMax>,
    pub style: LayerStyle,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            name: None,
            extent: None,
            interpretation: Interpretation::raw(),
            no_data: NoDataOptions::default(),
            resolution_factor: 1.0,
            fade_duration_s: 0.0,
            debounce_ms: 200,
            mesh_segments: DEFAULT_MESH_SEGMENTS,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            margin_px: 4,
            margin_ratio: 0.05,
            preload_root: true,
            min_max: None,
            style: LayerStyle::default(),
        }
    }
}

impl LayerOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<(), LayerError> {
        let invalid = |what: &str| Err(LayerError::InvalidOptions(what.to_string()));
        if !(self.resolution_factor.is_finite() && self.resolution_factor > 0.0) {
            return invalid("resolution_factor must be a positive number");
        }
        if !(self.margin_ratio.is_finite() && self.margin_ratio >= 0.0) {
            return invalid("margin_ratio must be a non-negative number");
        }
        if !(self.fade_duration_s.is_finite() && self.fade_duration_s >= 0.0) {
            return invalid("fade_duration_s must be a non-negative number");
        }
        if self.mesh_segments == 0 {
            return invalid("mesh_segments must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.style.opacity) {
            return invalid("opacity must be within [0, 1]");
        }
        if let Some(d) = self.no_data.max_search_distance {
            if d.is_nan() || d < 0.0 {
                return invalid("no_data.max_search_distance must be non-negative");
            }
        }
        if let Some(mm) = self.min_max {
            if !(mm.min.is_finite() && mm.max.is_finite() && mm.min <= mm.max) {
                return invalid("min_max must be a finite, ordered range");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use foundation::crs::Crs;
    use gpu::MinMax;
    use pretty_assertions::assert_eq;

    use super::LayerOptions;
    use crate::interpretation::InterpretationMode;

    #[test]
    fn defaults_validate() {
        let o = LayerOptions::default();
        assert_eq!(o.validate(), Ok(()));
        assert_eq!(o.debounce().as_millis(), 200);
        assert_eq!(o.pool_capacity, 16);
        assert_eq!(o.mesh_segments, 8);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{
            "name": "dem",
            "extent": { "crs": "EPSG:3857", "bounds": { "min": [0, 0], "max": [10, 20] } },
            "interpretation": { "mode": "scale_to_min_max", "min": 0, "max": 4000 },
            "no_data": { "replace_no_data": true, "value": -9999 },
            "min_max": { "min": 0, "max": 4000 }
        }"#;
        let o: LayerOptions = serde_json::from_str(json).unwrap();
        assert_eq!(o.name.as_deref(), Some("dem"));
        let extent = o.extent.as_ref().unwrap();
        assert_eq!(extent.crs(), &Crs::web_mercator());
        assert_eq!(extent.height(), 20.0);
        assert_eq!(
            o.interpretation.mode(),
            InterpretationMode::ScaleToMinMax { min: 0.0, max: 4000.0 }
        );
        assert!(o.no_data.replace_no_data);
        assert_eq!(o.no_data.value, Some(-9999.0));
        assert_eq!(o.min_max, Some(MinMax::new(0.0, 4000.0)));
        assert_eq!(o.margin_px, 4);
        assert_eq!(o.validate(), Ok(()));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let o = LayerOptions {
            resolution_factor: 0.0,
            ..LayerOptions::default()
        };
        assert!(o.validate().is_err());

        let o = LayerOptions {
            min_max: Some(MinMax::new(5.0, 1.0)),
            ..LayerOptions::default()
        };
        assert!(o.validate().is_err());
    }
}
