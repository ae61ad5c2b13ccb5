use std::rc::Rc;

use gpu::{DataType, GpuError, Texture};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Linear RGB, channels in `[0, 1]`.
pub type Color = [f32; 3];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColorMapError {
    #[error("a color map needs at least one color")]
    Empty,
    #[error("opacity has {opacity} entries but there are {colors} colors")]
    OpacityLengthMismatch { colors: usize, opacity: usize },
    #[error("invalid color map range [{min}, {max}], min must be below max")]
    InvalidRange { min: f32, max: f32 },
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Which scalar the gradient is applied to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMapMode {
    #[default]
    Elevation,
    Slope,
    Aspect,
}

/// 1D gradient mapping a scalar range to colors.
///
/// Sampling is nearest-neighbour over the color sequence. The lookup texture
/// is built lazily and cached until the colors or opacities change.
#[derive(Debug, Clone)]
pub struct ColorMap {
    colors: Vec<Color>,
    opacity: Option<Vec<f32>>,
    min: f32,
    max: f32,
    mode: ColorMapMode,
    lut: Option<Rc<Texture>>,
}

impl ColorMap {
    pub fn new(
        colors: Vec<Color>,
        min: f32,
        max: f32,
        mode: ColorMapMode,
    ) -> Result<Self, ColorMapError> {
        if colors.is_empty() {
            return Err(ColorMapError::Empty);
        }
        check_range(min, max)?;
        Ok(Self {
            colors,
            opacity: None,
            min,
            max,
            mode,
            lut: None,
        })
    }

    pub fn with_opacity(mut self, opacity: Vec<f32>) -> Result<Self, ColorMapError> {
        self.set_opacity(Some(opacity))?;
        Ok(self)
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn set_colors(&mut self, colors: Vec<Color>) -> Result<(), ColorMapError> {
        if colors.is_empty() {
            return Err(ColorMapError::Empty);
        }
        if let Some(opacity) = &self.opacity {
            check_lengths(colors.len(), opacity.len())?;
        }
        self.colors = colors;
        self.lut = None;
        Ok(())
    }

    pub fn opacity(&self) -> Option<&[f32]> {
        self.opacity.as_deref()
    }

    pub fn set_opacity(&mut self, opacity: Option<Vec<f32>>) -> Result<(), ColorMapError> {
        if let Some(opacity) = &opacity {
            check_lengths(self.colors.len(), opacity.len())?;
        }
        self.opacity = opacity;
        self.lut = None;
        Ok(())
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn set_range(&mut self, min: f32, max: f32) -> Result<(), ColorMapError> {
        check_range(min, max)?;
        self.min = min;
        self.max = max;
        Ok(())
    }

    pub fn mode(&self) -> ColorMapMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ColorMapMode) {
        self.mode = mode;
    }

    fn index_of(&self, value: f32) -> usize {
        let last = self.colors.len() - 1;
        if value.is_nan() {
            return 0;
        }
        let t = (value.clamp(self.min, self.max) - self.min) / (self.max - self.min);
        ((t * last as f32).round() as usize).min(last)
    }

    /// Color at `value`; values outside `[min, max]` clamp to the end colors.
    pub fn sample(&self, value: f32) -> Color {
        self.colors[self.index_of(value)]
    }

    pub fn sample_opacity(&self, value: f32) -> f32 {
        match &self.opacity {
            Some(opacity) => opacity[self.index_of(value)],
            None => 1.0,
        }
    }

    /// One-row lookup texture, one texel per color.
    pub fn lut(&mut self) -> Result<Rc<Texture>, ColorMapError> {
        if let Some(lut) = &self.lut {
            return Ok(lut.clone());
        }
        let pixels = self
            .colors
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let a = self.opacity.as_ref().map_or(1.0, |o| o[i]);
                [c[0], c[1], c[2], a]
            })
            .collect();
        let lut = Rc::new(Texture::from_pixels(
            self.colors.len() as u32,
            1,
            DataType::U8,
            pixels,
        )?);
        self.lut = Some(lut.clone());
        Ok(lut)
    }

    pub fn has_cached_lut(&self) -> bool {
        self.lut.is_some()
    }

    /// Frees the cached lookup texture. Calling it again is a no-op.
    pub fn dispose(&mut self) {
        self.lut = None;
    }
}

fn check_lengths(colors: usize, opacity: usize) -> Result<(), ColorMapError> {
    if colors == opacity {
        Ok(())
    } else {
        Err(ColorMapError::OpacityLengthMismatch { colors, opacity })
    }
}

fn check_range(min: f32, max: f32) -> Result<(), ColorMapError> {
    if min.is_finite() && max.is_finite() && min < max {
        Ok(())
    } else {
        Err(ColorMapError::InvalidRange { min, max })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::{ColorMap, ColorMapError, ColorMapMode};

    const RED: [f32; 3] = [1.0, 0.0, 0.0];
    const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
    const BLUE: [f32; 3] = [0.0, 0.0, 1.0];

    fn ramp() -> ColorMap {
        ColorMap::new(vec![RED, GREEN, BLUE], 0.0, 100.0, ColorMapMode::Elevation).unwrap()
    }

    #[test]
    fn bounds_sample_to_end_colors_and_clamp() {
        let cm = ramp();
        assert_eq!(cm.sample(0.0), RED);
        assert_eq!(cm.sample(100.0), BLUE);
        assert_eq!(cm.sample(-50.0), RED);
        assert_eq!(cm.sample(1e6), BLUE);
    }

    #[test]
    fn sampling_rounds_to_nearest_color() {
        let cm = ramp();
        assert_eq!(cm.sample(24.0), RED);
        assert_eq!(cm.sample(26.0), GREEN);
        assert_eq!(cm.sample(74.0), GREEN);
        assert_eq!(cm.sample(76.0), BLUE);
    }

    #[test]
    fn opacity_defaults_to_one() {
        let cm = ramp();
        assert_eq!(cm.sample_opacity(50.0), 1.0);
        let cm = cm.with_opacity(vec![0.0, 0.5, 1.0]).unwrap();
        assert_eq!(cm.sample_opacity(50.0), 0.5);
    }

    #[test]
    fn mismatched_opacity_is_an_error() {
        assert_eq!(
            ramp().with_opacity(vec![1.0]).unwrap_err(),
            ColorMapError::OpacityLengthMismatch {
                colors: 3,
                opacity: 1
            }
        );
        let mut cm = ramp().with_opacity(vec![1.0; 3]).unwrap();
        assert!(cm.set_colors(vec![RED]).is_err());
        assert_eq!(cm.colors().len(), 3);
    }

    #[test]
    fn lut_is_cached_until_colors_change() {
        let mut cm = ramp();
        let a = cm.lut().unwrap();
        let b = cm.lut().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.width(), 3);
        assert_eq!(a.get(2, 0), [0.0, 0.0, 1.0, 1.0]);

        cm.set_colors(vec![GREEN, RED]).unwrap();
        assert!(!cm.has_cached_lut());
        assert_eq!(cm.lut().unwrap().width(), 2);

        cm.dispose();
        cm.dispose();
        assert!(!cm.has_cached_lut());
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(ColorMap::new(vec![RED], 10.0, 0.0, ColorMapMode::Slope).is_err());
        assert!(ColorMap::new(vec![], 0.0, 1.0, ColorMapMode::Slope).is_err());
    }

    #[test]
    fn empty_range_is_rejected() {
        assert_eq!(
            ColorMap::new(vec![RED, BLUE], 5.0, 5.0, ColorMapMode::Elevation).unwrap_err(),
            ColorMapError::InvalidRange { min: 5.0, max: 5.0 }
        );
        let mut cm = ramp();
        assert!(cm.set_range(42.0, 42.0).is_err());
        assert_eq!((cm.min(), cm.max()), (0.0, 100.0));
        assert_eq!(cm.sample(100.0), BLUE);
    }
}
