use std::fmt;
use std::rc::Rc;

use foundation::extent::Extent;
use foundation::ids::NodeId;
use foundation::offset_scale::OffsetScale;
use gpu::{MinMax, Texture};

use crate::color_map::ColorMapMode;
use crate::layer::LayerId;
use crate::mask::MaskMode;
use crate::symbology::Colorimetry;
use crate::update_state::LayerUpdateState;

/// A texture handed to a material, with the pitch locating the node inside
/// the texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub texture: Rc<Texture>,
    pub pitch: OffsetScale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorMapBinding {
    pub lut: Rc<Texture>,
    pub min: f32,
    pub max: f32,
    pub mode: ColorMapMode,
}

/// Shader-side state of a tile, as far as layers are concerned.
pub trait TileMaterial {
    fn push_color_layer(&mut self, layer: LayerId);
    fn remove_color_layer(&mut self, layer: LayerId);
    fn has_color_layer(&self, layer: LayerId) -> bool;
    fn index_of_color_layer(&self, layer: LayerId) -> Option<usize>;

    /// `None` shows nothing for the layer.
    fn set_color_texture(&mut self, layer: LayerId, binding: Option<TextureBinding>);
    fn set_elevation_texture(
        &mut self,
        layer: LayerId,
        binding: Option<TextureBinding>,
        min_max: Option<MinMax>,
    );
    fn set_mask_texture(&mut self, layer: LayerId, binding: TextureBinding, mode: MaskMode);

    fn set_layer_opacity(&mut self, layer: LayerId, opacity: f32);
    fn set_layer_visibility(&mut self, layer: LayerId, visible: bool);
    fn set_layer_elevation_range(&mut self, layer: LayerId, range: Option<(f32, f32)>);
    fn set_layer_colorimetry(&mut self, layer: LayerId, colorimetry: Colorimetry);
    fn set_layer_color_map(&mut self, layer: LayerId, color_map: Option<ColorMapBinding>);
}

/// Called once when a node goes away.
pub struct DisposeListener {
    layer: LayerId,
    on_dispose: Box<dyn FnOnce(NodeId)>,
}

impl DisposeListener {
    pub fn new(layer: LayerId, on_dispose: impl FnOnce(NodeId) + 'static) -> Self {
        Self {
            layer,
            on_dispose: Box::new(on_dispose),
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn notify(self, node: NodeId) {
        (self.on_dispose)(node)
    }
}

impl fmt::Debug for DisposeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeListener")
            .field("layer", &self.layer)
            .finish()
    }
}

/// A tile of the host's terrain/map mesh.
pub trait TileNode {
    fn id(&self) -> NodeId;
    fn extent(&self) -> Extent;
    /// Texture size in pixels the node wants for each layer.
    fn texture_size(&self) -> (u32, u32);
    fn level(&self) -> u32;
    fn is_visible(&self) -> bool;
    fn is_disposed(&self) -> bool;
    fn material(&mut self) -> Option<&mut dyn TileMaterial>;
    fn layer_update_state(&mut self, layer: LayerId) -> &mut LayerUpdateState;
    /// The host must call every registered listener when it disposes the node.
    fn add_dispose_listener(&mut self, listener: DisposeListener);
    /// Vertical extent of the node's geometry, fed by elevation layers.
    fn set_vertical_bounds(&mut self, _min: f32, _max: f32) {}
}
