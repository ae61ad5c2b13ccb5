use foundation::bounds::Aabb2;
use foundation::math::{OriginRelative, RelativeF32, Vec2};

/// Textured triangle mesh placed in a planar world space.
///
/// Vertex positions are stored as `f32` offsets from an `f64` origin; all
/// coordinate math happens in `f64` before the final narrowing.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    frame: OriginRelative,
    positions: Vec<RelativeF32>,
    uvs: Vec<[f32; 2]>,
    triangles: Vec<[u32; 3]>,
    bounds: Aabb2,
}

impl Mesh {
    /// Two-triangle quad covering `bounds`, texture north-up.
    pub fn rectangle(bounds: &Aabb2) -> Mesh {
        let frame = OriginRelative::new(Vec2::new(bounds.min[0], bounds.min[1]));
        let corners = [
            (bounds.min[0], bounds.max[1], [0.0, 0.0]),
            (bounds.max[0], bounds.max[1], [1.0, 0.0]),
            (bounds.min[0], bounds.min[1], [0.0, 1.0]),
            (bounds.max[0], bounds.min[1], [1.0, 1.0]),
        ];
        Mesh {
            frame,
            positions: corners
                .iter()
                .map(|&(x, y, _)| frame.to_f32(Vec2::new(x, y)))
                .collect(),
            uvs: corners.iter().map(|&(_, _, uv)| uv).collect(),
            triangles: vec![[0, 2, 1], [1, 2, 3]],
            bounds: *bounds,
        }
    }

    /// Subdivided plane over `bounds` whose vertices are individually moved
    /// by `transform`.
    ///
    /// Returns `None` if any vertex has no image under `transform`. UVs keep
    /// the source lattice, so the texture is warped along with the vertices.
    pub fn lattice(
        bounds: &Aabb2,
        segments: u32,
        mut transform: impl FnMut(f64, f64) -> Option<(f64, f64)>,
    ) -> Option<Mesh> {
        let segments = segments.max(1);
        let stride = segments + 1;
        let mut world = Vec::with_capacity((stride * stride) as usize);
        let mut uvs = Vec::with_capacity(world.capacity());

        for j in 0..=segments {
            let v = f64::from(j) / f64::from(segments);
            let y = bounds.max[1] - v * bounds.height();
            for i in 0..=segments {
                let u = f64::from(i) / f64::from(segments);
                let x = bounds.min[0] + u * bounds.width();
                let (tx, ty) = transform(x, y)?;
                world.push([tx, ty]);
                uvs.push([u as f32, v as f32]);
            }
        }

        let warped = Aabb2::from_points(world.iter().copied())?;
        let frame = OriginRelative::new(Vec2::new(warped.min[0], warped.min[1]));
        let positions = world
            .iter()
            .map(|&[x, y]| frame.to_f32(Vec2::new(x, y)))
            .collect();

        let mut triangles = Vec::with_capacity((segments * segments * 2) as usize);
        for j in 0..segments {
            for i in 0..segments {
                let a = j * stride + i;
                let b = a + 1;
                let c = a + stride;
                let d = c + 1;
                triangles.push([a, c, b]);
                triangles.push([b, c, d]);
            }
        }

        Some(Mesh {
            frame,
            positions,
            uvs,
            triangles,
            bounds: warped,
        })
    }

    /// World-space bounds of the (possibly warped) geometry.
    pub fn bounds(&self) -> &Aabb2 {
        &self.bounds
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn world_position(&self, vertex: u32) -> Vec2 {
        self.frame.to_world(self.positions[vertex as usize])
    }

    pub fn uv(&self, vertex: u32) -> [f32; 2] {
        self.uvs[vertex as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::Mesh;
    use foundation::bounds::Aabb2;

    #[test]
    fn rectangle_has_two_triangles() {
        let m = Mesh::rectangle(&Aabb2::new([0.0, 0.0], [2.0, 1.0]));
        assert_eq!(m.vertex_count(), 4);
        assert_eq!(m.triangles().len(), 2);
        assert_eq!(m.world_position(0).y, 1.0);
        assert_eq!(m.uv(0), [0.0, 0.0]);
    }

    #[test]
    fn lattice_has_segments_squared_cells() {
        let b = Aabb2::new([0.0, 0.0], [8.0, 8.0]);
        let m = Mesh::lattice(&b, 8, |x, y| Some((x * 2.0, y))).unwrap();
        assert_eq!(m.vertex_count(), 81);
        assert_eq!(m.triangles().len(), 128);
        assert_eq!(*m.bounds(), Aabb2::new([0.0, 0.0], [16.0, 8.0]));
    }

    #[test]
    fn lattice_fails_when_a_vertex_cannot_be_transformed() {
        let b = Aabb2::new([0.0, 0.0], [1.0, 1.0]);
        assert!(Mesh::lattice(&b, 4, |x, y| (x < 1.0).then_some((x, y))).is_none());
    }
}
