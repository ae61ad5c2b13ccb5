use gpu::{DataType, MinMax};

use crate::layer::LayerId;
use crate::mask::MaskLayer;
use crate::node::{TextureBinding, TileMaterial, TileNode};
use crate::raster::ColorLayer;
use crate::source::Source;
use crate::symbology::LayerStyle;
use crate::terrain::ElevationLayer;

/// What differs between layer kinds. The fetch/compose pipeline itself is
/// shared and lives in [`Layer`](crate::layer::Layer).
pub trait LayerStrategy {
    /// Pixel format of the layer's render targets.
    fn data_type(&self, source: &dyn Source) -> DataType;

    /// Whether composited textures track their value range.
    fn compute_min_max(&self) -> bool {
        false
    }

    /// First contact with a node's material.
    fn register_node(&mut self, layer: LayerId, material: &mut dyn TileMaterial);

    /// Pushes display state; runs on every update, frozen or not.
    fn update_material(&mut self, layer: LayerId, material: &mut dyn TileMaterial, style: &LayerStyle);

    fn apply_texture_to_node(
        &mut self,
        layer: LayerId,
        node: &mut dyn TileNode,
        binding: TextureBinding,
        min_max: Option<MinMax>,
    );

    /// The layer has nothing to show on this node.
    fn apply_empty_texture_to_node(&mut self, layer: LayerId, node: &mut dyn TileNode);
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerVariant {
    Color(ColorLayer),
    Elevation(ElevationLayer),
    Mask(MaskLayer),
}

impl LayerVariant {
    pub fn strategy(&self) -> &dyn LayerStrategy {
        match self {
            LayerVariant::Color(l) => l,
            LayerVariant::Elevation(l) => l,
            LayerVariant::Mask(l) => l,
        }
    }

    pub fn strategy_mut(&mut self) -> &mut dyn LayerStrategy {
        match self {
            LayerVariant::Color(l) => l,
            LayerVariant::Elevation(l) => l,
            LayerVariant::Mask(l) => l,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LayerVariant::Color(_) => "color",
            LayerVariant::Elevation(_) => "elevation",
            LayerVariant::Mask(_) => "mask",
        }
    }
}
