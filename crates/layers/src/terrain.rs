use gpu::{DataType, MinMax};

use crate::layer::LayerId;
use crate::node::{TextureBinding, TileMaterial, TileNode};
use crate::source::Source;
use crate::symbology::LayerStyle;
use crate::variant::LayerStrategy;

/// Heights for the terrain mesh.
///
/// Keeps a layer-wide value range, seeded from configuration or a
/// low-resolution root image and widened as finer tiles arrive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElevationLayer {
    min_max: Option<MinMax>,
}

impl ElevationLayer {
    pub fn new(min_max: Option<MinMax>) -> Self {
        Self { min_max }
    }

    pub fn min_max(&self) -> Option<MinMax> {
        self.min_max
    }

    /// Widens the layer-wide range. Returns `true` if it changed.
    pub fn refine(&mut self, range: MinMax) -> bool {
        let next = match self.min_max {
            Some(current) => current.union(range),
            None => range,
        };
        let changed = self.min_max != Some(next);
        self.min_max = Some(next);
        changed
    }

    pub fn reset(&mut self, min_max: Option<MinMax>) {
        self.min_max = min_max;
    }
}

impl LayerStrategy for ElevationLayer {
    fn data_type(&self, _source: &dyn Source) -> DataType {
        DataType::F32
    }

    fn compute_min_max(&self) -> bool {
        true
    }

    fn register_node(&mut self, _layer: LayerId, _material: &mut dyn TileMaterial) {}

    fn update_material(&mut self, layer: LayerId, material: &mut dyn TileMaterial, style: &LayerStyle) {
        material.set_layer_visibility(layer, style.visible);
    }

    fn apply_texture_to_node(
        &mut self,
        layer: LayerId,
        node: &mut dyn TileNode,
        binding: TextureBinding,
        min_max: Option<MinMax>,
    ) {
        if let Some(material) = node.material() {
            material.set_elevation_texture(layer, Some(binding), min_max);
        }
        if let Some(range) = min_max {
            node.set_vertical_bounds(range.min, range.max);
        }
    }

    fn apply_empty_texture_to_node(&mut self, layer: LayerId, node: &mut dyn TileNode) {
        if let Some(material) = node.material() {
            material.set_elevation_texture(layer, None, None);
        }
    }
}
