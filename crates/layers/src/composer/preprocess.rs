use gpu::Texture;

use crate::interpretation::Interpretation;

/// Per-image pixel pass run once when an image enters the composer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Preprocessing {
    pub flip_y: bool,
    pub no_data: Option<f32>,
    pub interpretation: Interpretation,
}

impl Preprocessing {
    pub fn is_needed(&self) -> bool {
        self.flip_y || self.no_data.is_some() || !self.interpretation.is_default()
    }

    /// Flips, masks the no-data sentinel (alpha 0), then interprets.
    pub fn apply(&self, texture: &mut Texture) {
        if self.flip_y {
            texture.flip_y();
        }
        if self.no_data.is_none() && self.interpretation.is_default() {
            return;
        }
        for y in 0..texture.height() {
            for x in 0..texture.width() {
                let mut p = texture.get(x, y);
                if self.no_data == Some(p[0]) {
                    p[3] = 0.0;
                }
                texture.set(x, y, self.interpretation.apply(p));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gpu::Texture;

    use super::Preprocessing;
    use crate::interpretation::Interpretation;

    #[test]
    fn sentinel_pixels_become_invalid_before_interpretation() {
        let mut t = Texture::from_values(2, 1, &[-9999.0, 50.0]).unwrap();
        let pass = Preprocessing {
            flip_y: false,
            no_data: Some(-9999.0),
            interpretation: Interpretation::scale_to_min_max(0.0, 100.0).unwrap(),
        };
        assert!(pass.is_needed());
        pass.apply(&mut t);
        assert_eq!(t.get(0, 0)[3], 0.0);
        assert_eq!(t.get(1, 0), [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn default_pass_is_skipped() {
        let pass = Preprocessing {
            flip_y: false,
            no_data: None,
            interpretation: Interpretation::raw(),
        };
        assert!(!pass.is_needed());
    }
}
