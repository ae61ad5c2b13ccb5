use std::rc::Rc;

use foundation::offset_scale::OffsetScale;
use gpu::{DataType, GpuError, MinMax, Texture};
use serde::{Deserialize, Serialize};

use crate::layer::LayerId;
use crate::node::{TextureBinding, TileMaterial, TileNode};
use crate::source::Source;
use crate::symbology::LayerStyle;
use crate::variant::LayerStrategy;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaskMode {
    /// Opaque mask pixels keep the map visible.
    #[default]
    Normal,
    /// Opaque mask pixels hide the map.
    Inverted,
}

/// Alpha mask over the whole map.
///
/// A mask never detaches from a material: where it has no data it binds a
/// neutral 1x1 texture instead.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskLayer {
    mode: MaskMode,
    empty: Rc<Texture>,
}

impl MaskLayer {
    pub fn new(mode: MaskMode) -> Result<Self, GpuError> {
        let neutral = match mode {
            MaskMode::Normal => [1.0; 4],
            MaskMode::Inverted => [0.0; 4],
        };
        Ok(Self {
            mode,
            empty: Rc::new(Texture::solid(1, 1, DataType::U8, neutral)?),
        })
    }

    pub fn mode(&self) -> MaskMode {
        self.mode
    }

    pub fn empty_texture(&self) -> &Rc<Texture> {
        &self.empty
    }

    fn empty_binding(&self) -> TextureBinding {
        TextureBinding {
            texture: self.empty.clone(),
            pitch: OffsetScale::IDENTITY,
        }
    }
}

impl LayerStrategy for MaskLayer {
    fn data_type(&self, _source: &dyn Source) -> DataType {
        DataType::U8
    }

    fn register_node(&mut self, layer: LayerId, material: &mut dyn TileMaterial) {
        material.set_mask_texture(layer, self.empty_binding(), self.mode);
    }

    fn update_material(&mut self, layer: LayerId, material: &mut dyn TileMaterial, style: &LayerStyle) {
        material.set_layer_opacity(layer, style.opacity);
        material.set_layer_visibility(layer, style.visible);
    }

    fn apply_texture_to_node(
        &mut self,
        layer: LayerId,
        node: &mut dyn TileNode,
        binding: TextureBinding,
        _min_max: Option<MinMax>,
    ) {
        if let Some(material) = node.material() {
            material.set_mask_texture(layer, binding, self.mode);
        }
    }

    fn apply_empty_texture_to_node(&mut self, layer: LayerId, node: &mut dyn TileNode) {
        let binding = self.empty_binding();
        if let Some(material) = node.material() {
            material.set_mask_texture(layer, binding, self.mode);
        }
    }
}
