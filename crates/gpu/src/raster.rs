use foundation::bounds::Aabb2;

use crate::mesh::Mesh;
use crate::texture::Texture;

/// Tolerance on barycentric weights so pixels centred on an edge are covered.
const EDGE_EPSILON: f64 = 1e-9;

/// One textured mesh to draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem<'a> {
    pub mesh: &'a Mesh,
    pub texture: &'a Texture,
    pub opacity: f32,
}

/// Rasterizes `items` into `target`, which covers `view` in world space.
///
/// Items are drawn in slice order (painter's algorithm) with source-over
/// blending; the caller sorts back-to-front. Sampling is nearest-neighbour
/// and coverage is tested at pixel centres.
pub fn draw(target: &mut Texture, view: &Aabb2, items: &[DrawItem<'_>]) {
    let w = f64::from(target.width());
    let h = f64::from(target.height());
    let (vw, vh) = (view.width(), view.height());
    if vw <= 0.0 || vh <= 0.0 {
        return;
    }
    let to_pixel = |x: f64, y: f64| -> [f64; 2] {
        [(x - view.min[0]) / vw * w, (view.max[1] - y) / vh * h]
    };

    for item in items {
        if item.opacity <= 0.0 || !item.mesh.bounds().intersects(view) {
            continue;
        }
        for tri in item.mesh.triangles() {
            let p = tri.map(|v| {
                let world = item.mesh.world_position(v);
                to_pixel(world.x, world.y)
            });
            let uv = tri.map(|v| item.mesh.uv(v));
            fill_triangle(target, p, uv, item.texture, item.opacity);
        }
    }
}

#[inline]
fn edge(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn fill_triangle(
    target: &mut Texture,
    p: [[f64; 2]; 3],
    uv: [[f32; 2]; 3],
    texture: &Texture,
    opacity: f32,
) {
    let area = edge(p[0], p[1], p[2]);
    if area.abs() < f64::EPSILON {
        return;
    }

    let min_x = p.iter().map(|v| v[0]).fold(f64::INFINITY, f64::min);
    let max_x = p.iter().map(|v| v[0]).fold(f64::NEG_INFINITY, f64::max);
    let min_y = p.iter().map(|v| v[1]).fold(f64::INFINITY, f64::min);
    let max_y = p.iter().map(|v| v[1]).fold(f64::NEG_INFINITY, f64::max);

    let tw = i64::from(target.width());
    let th = i64::from(target.height());
    let x0 = ((min_x - 0.5).floor() as i64).max(0);
    let x1 = ((max_x - 0.5).ceil() as i64).min(tw - 1);
    let y0 = ((min_y - 0.5).floor() as i64).max(0);
    let y1 = ((max_y - 0.5).ceil() as i64).min(th - 1);

    for py in y0..=y1 {
        for px in x0..=x1 {
            let c = [px as f64 + 0.5, py as f64 + 0.5];
            let w0 = edge(p[1], p[2], c) / area;
            let w1 = edge(p[2], p[0], c) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 < -EDGE_EPSILON || w1 < -EDGE_EPSILON || w2 < -EDGE_EPSILON {
                continue;
            }
            let u = w0 * f64::from(uv[0][0]) + w1 * f64::from(uv[1][0]) + w2 * f64::from(uv[2][0]);
            let v = w0 * f64::from(uv[0][1]) + w1 * f64::from(uv[1][1]) + w2 * f64::from(uv[2][1]);
            let src = texture.sample_nearest(u, v);
            let a = src[3] * opacity;
            if a <= 0.0 {
                continue;
            }
            let (x, y) = (px as u32, py as u32);
            let dst = target.get(x, y);
            let out = [
                src[0] * a + dst[0] * (1.0 - a),
                src[1] * a + dst[1] * (1.0 - a),
                src[2] * a + dst[2] * (1.0 - a),
                a + dst[3] * (1.0 - a),
            ];
            target.set(x, y, out);
        }
    }
}
