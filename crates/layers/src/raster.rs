use gpu::{DataType, MinMax};

use crate::layer::LayerId;
use crate::node::{TextureBinding, TileMaterial, TileNode};
use crate::source::Source;
use crate::symbology::LayerStyle;
use crate::variant::LayerStrategy;

/// Imagery draped over the terrain, stacked with other color layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorLayer;

impl LayerStrategy for ColorLayer {
    fn data_type(&self, source: &dyn Source) -> DataType {
        source.data_type()
    }

    fn register_node(&mut self, layer: LayerId, material: &mut dyn TileMaterial) {
        if !material.has_color_layer(layer) {
            material.push_color_layer(layer);
        }
    }

    fn update_material(&mut self, layer: LayerId, material: &mut dyn TileMaterial, style: &LayerStyle) {
        material.set_layer_opacity(layer, style.opacity);
        material.set_layer_visibility(layer, style.visible);
        material.set_layer_colorimetry(layer, style.colorimetry);
        material.set_layer_elevation_range(layer, style.elevation_range);
    }

    fn apply_texture_to_node(
        &mut self,
        layer: LayerId,
        node: &mut dyn TileNode,
        binding: TextureBinding,
        _min_max: Option<MinMax>,
    ) {
        if let Some(material) = node.material() {
            material.set_color_texture(layer, Some(binding));
        }
    }

    fn apply_empty_texture_to_node(&mut self, layer: LayerId, node: &mut dyn TileNode) {
        if let Some(material) = node.material() {
            material.remove_color_layer(layer);
        }
    }
}
