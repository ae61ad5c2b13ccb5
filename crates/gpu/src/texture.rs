use serde::{Deserialize, Serialize};

use crate::GpuError;

/// Storage precision of a texture's channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataType {
    /// Normalized 8-bit channels (colour imagery).
    #[default]
    U8,
    /// Raw 32-bit float channels (elevation and other scalar data).
    F32,
}

impl DataType {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            DataType::U8 => 4,
            DataType::F32 => 16,
        }
    }

    /// Value actually stored when `v` is written to a channel of this type.
    #[inline]
    pub fn store(self, v: f32) -> f32 {
        match self {
            DataType::U8 => (v.clamp(0.0, 1.0) * 255.0).round() / 255.0,
            DataType::F32 => v,
        }
    }
}

/// Value range of a scalar texture.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f32,
    pub max: f32,
}

impl MinMax {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn union(self, other: MinMax) -> MinMax {
        MinMax::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Union of all ranges, or `None` if there are none.
    pub fn union_all(ranges: impl IntoIterator<Item = MinMax>) -> Option<MinMax> {
        ranges.into_iter().reduce(MinMax::union)
    }
}

/// RGBA pixel with `f32` channels; alpha 0 marks an invalid (no-data) pixel.
pub type Pixel = [f32; 4];

/// A 2D texture.
///
/// Pixels are row-major with row 0 on the north edge; UV `(0, 0)` is the
/// north-west corner. Scalar data lives in the red channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    data_type: DataType,
    pixels: Vec<Pixel>,
    min_max: Option<MinMax>,
}

impl Texture {
    /// Fully transparent texture.
    pub fn new(width: u32, height: u32, data_type: DataType) -> Result<Self, GpuError> {
        Self::solid(width, height, data_type, [0.0; 4])
    }

    pub fn solid(
        width: u32,
        height: u32,
        data_type: DataType,
        color: Pixel,
    ) -> Result<Self, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::ZeroSize { width, height });
        }
        let color = color.map(|c| data_type.store(c));
        Ok(Self {
            width,
            height,
            data_type,
            pixels: vec![color; width as usize * height as usize],
            min_max: None,
        })
    }

    pub fn from_pixels(
        width: u32,
        height: u32,
        data_type: DataType,
        pixels: Vec<Pixel>,
    ) -> Result<Self, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::ZeroSize { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(GpuError::PixelCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        let pixels = pixels
            .into_iter()
            .map(|p| p.map(|c| data_type.store(c)))
            .collect();
        Ok(Self {
            width,
            height,
            data_type,
            pixels,
            min_max: None,
        })
    }

    /// 8-bit RGBA bytes, as decoded from PNG/JPEG tiles.
    pub fn from_rgba8(width: u32, height: u32, bytes: &[u8]) -> Result<Self, GpuError> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(GpuError::PixelCountMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]].map(|b| f32::from(b) / 255.0))
            .collect();
        Self::from_pixels(width, height, DataType::U8, pixels)
    }

    /// Scalar grid (e.g. a DEM). Non-finite samples are marked invalid.
    ///
    /// No-data sentinels are left as-is; the compositor masks them.
    pub fn from_values(width: u32, height: u32, values: &[f32]) -> Result<Self, GpuError> {
        let pixels = values
            .iter()
            .map(|&v| {
                if v.is_finite() {
                    [v, v, v, 1.0]
                } else {
                    [0.0; 4]
                }
            })
            .collect();
        Self::from_pixels(width, height, DataType::F32, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len() * self.data_type.bytes_per_pixel()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn min_max(&self) -> Option<MinMax> {
        self.min_max
    }

    pub fn set_min_max(&mut self, min_max: Option<MinMax>) {
        self.min_max = min_max;
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Pixel {
        self.pixels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, pixel: Pixel) {
        let i = self.index(x, y);
        let dt = self.data_type;
        self.pixels[i] = pixel.map(|c| dt.store(c));
    }

    /// Nearest-neighbour sample; UVs outside `[0, 1]` clamp to the border.
    pub fn sample_nearest(&self, u: f64, v: f64) -> Pixel {
        let x = ((u * f64::from(self.width)).floor() as i64).clamp(0, i64::from(self.width) - 1);
        let y = ((v * f64::from(self.height)).floor() as i64).clamp(0, i64::from(self.height) - 1);
        self.get(x as u32, y as u32)
    }

    pub fn clear(&mut self, color: Pixel) {
        let dt = self.data_type;
        let color = color.map(|c| dt.store(c));
        self.pixels.fill(color);
        self.min_max = None;
    }

    /// Mirrors rows so the first row becomes the last.
    pub fn flip_y(&mut self) {
        let w = self.width as usize;
        let h = self.height as usize;
        for y in 0..h / 2 {
            let (top, bottom) = self.pixels.split_at_mut((h - 1 - y) * w);
            top[y * w..(y + 1) * w].swap_with_slice(&mut bottom[..w]);
        }
    }

    /// Range of the red channel over valid pixels, skipping `no_data`.
    pub fn value_range(&self, no_data: Option<f32>) -> Option<MinMax> {
        self.pixels
            .iter()
            .filter(|p| p[3] > 0.0 && p[0].is_finite() && Some(p[0]) != no_data)
            .map(|p| MinMax::new(p[0], p[0]))
            .reduce(MinMax::union)
    }

    pub fn count_valid(&self) -> usize {
        self.pixels.iter().filter(|p| p[3] > 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::{DataType, MinMax, Texture};
    use crate::GpuError;

    #[test]
    fn zero_sized_textures_are_rejected() {
        assert_eq!(
            Texture::new(0, 4, DataType::U8),
            Err(GpuError::ZeroSize {
                width: 0,
                height: 4
            })
        );
    }

    #[test]
    fn u8_storage_is_quantized() {
        let mut t = Texture::new(1, 1, DataType::U8).unwrap();
        t.set(0, 0, [0.5, 2.0, -1.0, 1.0]);
        assert_eq!(t.get(0, 0), [128.0 / 255.0, 1.0, 0.0, 1.0]);

        let mut t = Texture::new(1, 1, DataType::F32).unwrap();
        t.set(0, 0, [1234.5, 0.0, 0.0, 1.0]);
        assert_eq!(t.get(0, 0)[0], 1234.5);
    }

    #[test]
    fn value_range_skips_no_data_and_invalid_pixels() {
        let t = Texture::from_values(2, 2, &[-9999.0, 10.0, f32::NAN, 30.0]).unwrap();
        assert_eq!(t.value_range(Some(-9999.0)), Some(MinMax::new(10.0, 30.0)));
        assert_eq!(t.value_range(None), Some(MinMax::new(-9999.0, 30.0)));
    }

    #[test]
    fn flip_y_mirrors_rows() {
        let mut t = Texture::from_values(1, 3, &[1.0, 2.0, 3.0]).unwrap();
        t.flip_y();
        let col: Vec<f32> = t.pixels().iter().map(|p| p[0]).collect();
        assert_eq!(col, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn nearest_sampling_clamps_to_border() {
        let t = Texture::from_values(2, 1, &[1.0, 2.0]).unwrap();
        assert_eq!(t.sample_nearest(0.0, 0.5)[0], 1.0);
        assert_eq!(t.sample_nearest(1.0, 0.5)[0], 2.0);
        assert_eq!(t.sample_nearest(-3.0, 9.0)[0], 1.0);
    }

    #[test]
    fn rgba8_bytes_are_normalized() {
        let t = Texture::from_rgba8(1, 1, &[255, 0, 51, 255]).unwrap();
        assert_eq!(t.get(0, 0), [1.0, 0.0, 0.2, 1.0]);
        assert!(Texture::from_rgba8(1, 1, &[0, 0, 0]).is_err());
    }
}
