use std::collections::VecDeque;

use crate::texture::Texture;

/// Replaces invalid pixels (alpha 0) with the value of the nearest valid
/// pixel, if one lies within `max_distance_px`.
///
/// Nearest is resolved with a multi-source breadth-first sweep over the
/// 8-neighbourhood, then filtered by Euclidean distance. Filled pixels get
/// `alpha` as their alpha channel, so an alpha of 0 keeps them invalid for
/// display while giving samplers a sensible value at the border.
///
/// Returns the number of pixels that were filled.
pub fn fill_no_data(texture: &mut Texture, max_distance_px: f64, alpha: f32) -> usize {
    let w = texture.width() as usize;
    let h = texture.height() as usize;
    let mut nearest: Vec<Option<usize>> = vec![None; w * h];
    let mut queue = VecDeque::new();

    for (i, p) in texture.pixels().iter().enumerate() {
        if p[3] > 0.0 {
            nearest[i] = Some(i);
            queue.push_back(i);
        }
    }
    if queue.is_empty() || queue.len() == w * h {
        return 0;
    }

    while let Some(i) = queue.pop_front() {
        let (x, y) = ((i % w) as i64, (i / w) as i64);
        for dy in -1..=1_i64 {
            for dx in -1..=1_i64 {
                let (nx, ny) = (x + dx, y + dy);
                if (dx == 0 && dy == 0) || nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if nearest[n].is_none() {
                    nearest[n] = nearest[i];
                    queue.push_back(n);
                }
            }
        }
    }

    let max_d2 = max_distance_px * max_distance_px;
    let mut filled = 0;
    for (i, source) in nearest.iter().enumerate() {
        let Some(s) = *source else { continue };
        if s == i {
            continue;
        }
        let dx = (i % w) as f64 - (s % w) as f64;
        let dy = (i / w) as f64 - (s / w) as f64;
        if dx * dx + dy * dy > max_d2 {
            continue;
        }
        let src = texture.pixels()[s];
        texture.set((i % w) as u32, (i / w) as u32, [src[0], src[1], src[2], alpha]);
        filled += 1;
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::fill_no_data;
    use crate::texture::Texture;

    #[test]
    fn fills_holes_with_nearest_value() {
        let nan = f32::NAN;
        let mut t = Texture::from_values(3, 1, &[1.0, nan, nan]).unwrap();
        let n = fill_no_data(&mut t, f64::INFINITY, 1.0);
        assert_eq!(n, 2);
        assert_eq!(t.get(1, 0), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(t.get(2, 0)[0], 1.0);
    }

    #[test]
    fn respects_search_distance() {
        let nan = f32::NAN;
        let mut t = Texture::from_values(4, 1, &[5.0, nan, nan, nan]).unwrap();
        let n = fill_no_data(&mut t, 2.0, 1.0);
        assert_eq!(n, 2);
        assert_eq!(t.get(2, 0)[0], 5.0);
        assert_eq!(t.get(3, 0)[3], 0.0);
    }

    #[test]
    fn filled_pixels_keep_requested_alpha() {
        let nan = f32::NAN;
        let mut t = Texture::from_values(2, 1, &[5.0, nan]).unwrap();
        fill_no_data(&mut t, 10.0, 0.0);
        assert_eq!(t.get(1, 0), [5.0, 5.0, 5.0, 0.0]);
        assert_eq!(t.count_valid(), 1);
    }

    #[test]
    fn empty_or_full_textures_are_untouched() {
        let nan = f32::NAN;
        let mut empty = Texture::from_values(2, 1, &[nan, nan]).unwrap();
        assert_eq!(fill_no_data(&mut empty, 10.0, 1.0), 0);
        let mut full = Texture::from_values(2, 1, &[1.0, 2.0]).unwrap();
        assert_eq!(fill_no_data(&mut full, 10.0, 1.0), 0);
    }
}
