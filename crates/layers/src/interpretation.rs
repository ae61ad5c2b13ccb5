use std::fmt;

use gpu::Pixel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InterpretationError {
    #[error("interpretation bounds must be finite numbers (got min={min}, max={max})")]
    NonFiniteBounds { min: f32, max: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InterpretationMode {
    /// Values are used as-is.
    #[default]
    Raw,
    /// Each colour channel is mapped from `[min, max]` to `[0, 1]`.
    ScaleToMinMax { min: f32, max: f32 },
    /// The first channel is mapped from `[min, max]` to an 8-bit grey level.
    #[serde(rename = "compress_to_8bit")]
    CompressTo8Bit { min: f32, max: f32 },
}

/// How raw source pixels are turned into displayable values.
///
/// A pure descriptor: the compositor realizes it once per image when the
/// image is added.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "InterpretationDef", into = "InterpretationDef")]
pub struct Interpretation {
    mode: InterpretationMode,
    negate_values: bool,
}

#[derive(Serialize, Deserialize)]
struct InterpretationDef {
    #[serde(flatten)]
    mode: InterpretationMode,
    #[serde(default)]
    negate_values: bool,
}

impl TryFrom<InterpretationDef> for Interpretation {
    type Error = InterpretationError;

    fn try_from(def: InterpretationDef) -> Result<Self, Self::Error> {
        let base = match def.mode {
            InterpretationMode::Raw => Interpretation::raw(),
            InterpretationMode::ScaleToMinMax { min, max } => {
                Interpretation::scale_to_min_max(min, max)?
            }
            InterpretationMode::CompressTo8Bit { min, max } => {
                Interpretation::compress_to_8bit(min, max)?
            }
        };
        Ok(base.with_negated_values(def.negate_values))
    }
}

impl From<Interpretation> for InterpretationDef {
    fn from(i: Interpretation) -> Self {
        Self {
            mode: i.mode,
            negate_values: i.negate_values,
        }
    }
}

fn check_bounds(min: f32, max: f32) -> Result<(), InterpretationError> {
    if min.is_finite() && max.is_finite() {
        Ok(())
    } else {
        Err(InterpretationError::NonFiniteBounds { min, max })
    }
}

impl Interpretation {
    pub const RAW: Interpretation = Interpretation {
        mode: InterpretationMode::Raw,
        negate_values: false,
    };

    pub fn raw() -> Self {
        Self::RAW
    }

    pub fn scale_to_min_max(min: f32, max: f32) -> Result<Self, InterpretationError> {
        check_bounds(min, max)?;
        Ok(Self {
            mode: InterpretationMode::ScaleToMinMax { min, max },
            negate_values: false,
        })
    }

    pub fn compress_to_8bit(min: f32, max: f32) -> Result<Self, InterpretationError> {
        check_bounds(min, max)?;
        Ok(Self {
            mode: InterpretationMode::CompressTo8Bit { min, max },
            negate_values: false,
        })
    }

    pub fn with_negated_values(self, negate_values: bool) -> Self {
        Self {
            negate_values,
            ..self
        }
    }

    pub fn mode(&self) -> InterpretationMode {
        self.mode
    }

    pub fn negate_values(&self) -> bool {
        self.negate_values
    }

    pub fn is_default(&self) -> bool {
        self.mode == InterpretationMode::Raw && !self.negate_values
    }

    /// Transforms one pixel. Invalid pixels (alpha 0) are returned unchanged.
    pub fn apply(&self, pixel: Pixel) -> Pixel {
        if pixel[3] <= 0.0 {
            return pixel;
        }
        let sign = if self.negate_values { -1.0 } else { 1.0 };
        let [r, g, b, a] = pixel;
        match self.mode {
            InterpretationMode::Raw => [r * sign, g * sign, b * sign, a],
            InterpretationMode::ScaleToMinMax { min, max } => {
                let s = |c: f32| normalize(c * sign, min, max);
                [s(r), s(g), s(b), a]
            }
            InterpretationMode::CompressTo8Bit { min, max } => {
                let grey = (normalize(r * sign, min, max) * 255.0).round() / 255.0;
                [grey, grey, grey, a]
            }
        }
    }
}

fn normalize(v: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range <= 0.0 {
        return 0.0;
    }
    ((v - min) / range).clamp(0.0, 1.0)
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            InterpretationMode::Raw => write!(f, "Raw")?,
            InterpretationMode::ScaleToMinMax { min, max } => {
                write!(f, "Scale to min/max [{min}, {max}]")?
            }
            InterpretationMode::CompressTo8Bit { min, max } => {
                write!(f, "Compress to 8 bits [{min}, {max}]")?
            }
        }
        if self.negate_values {
            write!(f, " (negated)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Interpretation, InterpretationError, InterpretationMode};

    #[test]
    fn only_plain_raw_is_default() {
        assert!(Interpretation::raw().is_default());
        assert!(!Interpretation::raw().with_negated_values(true).is_default());
        assert!(!Interpretation::scale_to_min_max(0.0, 1.0).unwrap().is_default());
    }

    #[test]
    fn non_finite_bounds_are_rejected() {
        assert!(matches!(
            Interpretation::scale_to_min_max(f32::NAN, 1.0),
            Err(InterpretationError::NonFiniteBounds { max, .. }) if max == 1.0
        ));
        assert!(Interpretation::compress_to_8bit(0.0, f32::INFINITY).is_err());
    }

    #[test]
    fn scaling_maps_range_to_unit_interval() {
        let i = Interpretation::scale_to_min_max(100.0, 300.0).unwrap();
        assert_eq!(i.apply([100.0, 200.0, 400.0, 1.0]), [0.0, 0.5, 1.0, 1.0]);

        let i = i.with_negated_values(true);
        assert_eq!(i.apply([-200.0, -100.0, 0.0, 1.0]), [0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn compression_produces_grey_levels() {
        let i = Interpretation::compress_to_8bit(0.0, 1000.0).unwrap();
        let [r, g, b, a] = i.apply([500.0, 0.0, 0.0, 1.0]);
        assert_eq!((r, g, b, a), (128.0 / 255.0, 128.0 / 255.0, 128.0 / 255.0, 1.0));
    }

    #[test]
    fn invalid_pixels_are_untouched() {
        let i = Interpretation::raw().with_negated_values(true);
        assert_eq!(i.apply([5.0, 5.0, 5.0, 0.0]), [5.0, 5.0, 5.0, 0.0]);
    }

    #[test]
    fn display_is_human_readable() {
        let i = Interpretation::compress_to_8bit(0.0, 255.0)
            .unwrap()
            .with_negated_values(true);
        assert_eq!(i.to_string(), "Compress to 8 bits [0, 255] (negated)");
    }

    #[test]
    fn deserializes_from_tagged_json() {
        let ok: Interpretation =
            serde_json::from_str(r#"{"mode":"scale_to_min_max","min":0,"max":10}"#).unwrap();
        assert_eq!(ok.mode(), InterpretationMode::ScaleToMinMax { min: 0.0, max: 10.0 });
        assert!(!ok.negate_values());

        let raw: Interpretation = serde_json::from_str(r#"{"mode":"raw","negate_values":true}"#).unwrap();
        assert!(raw.negate_values());

        assert!(serde_json::from_str::<Interpretation>(r#"{"mode":"compress_to_8bit"}"#).is_err());
    }
}
