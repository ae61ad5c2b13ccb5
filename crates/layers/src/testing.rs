//! In-memory source and tile node used by the layer tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use foundation::crs::Crs;
use foundation::extent::Extent;
use foundation::ids::NodeId;
use gpu::{DataType, MinMax, Texture};
use tracing_subscriber::EnvFilter;

use crate::color_map::ColorMapMode;
use crate::layer::LayerId;
use crate::mask::MaskMode;
use crate::node::{ColorMapBinding, DisposeListener, TextureBinding, TileMaterial, TileNode};
use crate::source::{AdjustedExtent, ImageQuery, ImageRequest, ImageResult, Source, SourceError};
use crate::symbology::Colorimetry;
use crate::update_state::LayerUpdateState;

/// Routes layer logs to the test harness; set `RUST_LOG` to see them.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn wgs84(w: f64, e: f64, s: f64, n: f64) -> Extent {
    Extent::new(Crs::wgs84(), w, e, s, n).unwrap()
}

/// Counters shared between a test and the source it handed to a layer.
#[derive(Debug, Default)]
pub(crate) struct FetchStats {
    queries: Cell<u32>,
    started: Cell<u32>,
    failures_left: Cell<u32>,
    revision: Cell<u64>,
}

impl FetchStats {
    pub fn queries(&self) -> u32 {
        self.queries.get()
    }

    pub fn started(&self) -> u32 {
        self.started.get()
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_left.set(count);
    }

    pub fn bump_revision(&self) {
        self.revision.set(self.revision.get() + 1);
    }
}

#[derive(Debug, Clone)]
struct FakeImage {
    id: String,
    extent: Extent,
    texture: Texture,
}

/// Serves fixed images: every image intersecting the query is needed.
#[derive(Debug)]
pub(crate) struct FakeSource {
    crs: Crs,
    extent: Option<Extent>,
    data_type: DataType,
    images: Vec<FakeImage>,
    pixel_exact: bool,
    stats: Rc<FetchStats>,
}

impl FakeSource {
    pub fn new(extent: Option<Extent>) -> Self {
        Self {
            crs: Crs::wgs84(),
            extent,
            data_type: DataType::U8,
            images: Vec::new(),
            pixel_exact: false,
            stats: Rc::new(FetchStats::default()),
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_image(mut self, id: &str, extent: Extent, texture: Texture) -> Self {
        self.images.push(FakeImage {
            id: id.to_string(),
            extent,
            texture,
        });
        self
    }

    /// Pads requested extents by exactly `margin_px` source pixels instead
    /// of letting the layer estimate a margin.
    pub fn pixel_exact(mut self) -> Self {
        self.pixel_exact = true;
        self
    }

    pub fn stats(&self) -> Rc<FetchStats> {
        self.stats.clone()
    }
}

impl Source for FakeSource {
    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn extent(&self) -> Option<Extent> {
        self.extent.clone()
    }

    fn adjust_extent_and_pixel_size(
        &self,
        extent: &Extent,
        width: u32,
        height: u32,
        margin_px: u32,
    ) -> Option<AdjustedExtent> {
        if !self.pixel_exact {
            return None;
        }
        let margin = f64::from(margin_px);
        let px_x = extent.width() / f64::from(width);
        let px_y = extent.height() / f64::from(height);
        Some(AdjustedExtent {
            extent: extent.with_margin(px_x * margin, px_y * margin),
            width: width + 2 * margin_px,
            height: height + 2 * margin_px,
        })
    }

    fn get_images(&self, query: ImageQuery) -> Vec<ImageRequest> {
        let stats = &self.stats;
        stats.queries.set(stats.queries.get() + 1);
        self.images
            .iter()
            .filter(|image| image.extent.intersects_extent(&query.extent))
            .cloned()
            .map(|image| {
                let stats = self.stats.clone();
                let signal = query.signal.clone();
                ImageRequest::new(image.id.clone(), move || async move {
                    stats.started.set(stats.started.get() + 1);
                    if signal.is_aborted() {
                        return Err(SourceError::Aborted);
                    }
                    let failures = stats.failures_left.get();
                    if failures > 0 {
                        stats.failures_left.set(failures - 1);
                        return Err(SourceError::Fetch(format!("{} unavailable", image.id)));
                    }
                    Ok(ImageResult {
                        id: image.id,
                        extent: image.extent,
                        texture: image.texture,
                        min_max: None,
                    })
                })
            })
            .collect()
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn revision(&self) -> u64 {
        self.stats.revision.get()
    }
}

/// Records everything layers push to a tile's material.
#[derive(Debug, Default)]
pub(crate) struct FakeMaterial {
    pub color_layers: Vec<LayerId>,
    pub color_textures: HashMap<LayerId, Option<TextureBinding>>,
    pub elevation: Option<(Option<TextureBinding>, Option<MinMax>)>,
    pub mask: Option<(TextureBinding, MaskMode)>,
    pub opacity: HashMap<LayerId, f32>,
    pub visibility: HashMap<LayerId, bool>,
    pub elevation_range: HashMap<LayerId, Option<(f32, f32)>>,
    pub colorimetry: HashMap<LayerId, Colorimetry>,
    pub color_map: HashMap<LayerId, Option<ColorMapBinding>>,
}

impl FakeMaterial {
    pub fn color_texture(&self, layer: LayerId) -> Option<&TextureBinding> {
        self.color_textures.get(&layer).and_then(Option::as_ref)
    }

    pub fn color_map_mode(&self, layer: LayerId) -> Option<ColorMapMode> {
        self.color_map
            .get(&layer)
            .and_then(Option::as_ref)
            .map(|binding| binding.mode)
    }
}

impl TileMaterial for FakeMaterial {
    fn push_color_layer(&mut self, layer: LayerId) {
        self.color_layers.push(layer);
    }

    fn remove_color_layer(&mut self, layer: LayerId) {
        self.color_layers.retain(|l| *l != layer);
        self.color_textures.remove(&layer);
    }

    fn has_color_layer(&self, layer: LayerId) -> bool {
        self.color_layers.contains(&layer)
    }

    fn index_of_color_layer(&self, layer: LayerId) -> Option<usize> {
        self.color_layers.iter().position(|l| *l == layer)
    }

    fn set_color_texture(&mut self, layer: LayerId, binding: Option<TextureBinding>) {
        self.color_textures.insert(layer, binding);
    }

    fn set_elevation_texture(
        &mut self,
        _layer: LayerId,
        binding: Option<TextureBinding>,
        min_max: Option<MinMax>,
    ) {
        self.elevation = Some((binding, min_max));
    }

    fn set_mask_texture(&mut self, _layer: LayerId, binding: TextureBinding, mode: MaskMode) {
        self.mask = Some((binding, mode));
    }

    fn set_layer_opacity(&mut self, layer: LayerId, opacity: f32) {
        self.opacity.insert(layer, opacity);
    }

    fn set_layer_visibility(&mut self, layer: LayerId, visible: bool) {
        self.visibility.insert(layer, visible);
    }

    fn set_layer_elevation_range(&mut self, layer: LayerId, range: Option<(f32, f32)>) {
        self.elevation_range.insert(layer, range);
    }

    fn set_layer_colorimetry(&mut self, layer: LayerId, colorimetry: Colorimetry) {
        self.colorimetry.insert(layer, colorimetry);
    }

    fn set_layer_color_map(&mut self, layer: LayerId, color_map: Option<ColorMapBinding>) {
        self.color_map.insert(layer, color_map);
    }
}

#[derive(Debug)]
pub(crate) struct FakeNode {
    pub id: NodeId,
    pub extent: Extent,
    pub size: (u32, u32),
    pub level: u32,
    pub visible: bool,
    pub disposed: bool,
    pub material: Option<FakeMaterial>,
    pub states: HashMap<LayerId, LayerUpdateState>,
    pub listeners: Vec<DisposeListener>,
    pub vertical_bounds: Option<(f32, f32)>,
}

impl FakeNode {
    pub fn new(id: u64, level: u32, extent: Extent) -> Self {
        Self {
            id: NodeId(id),
            extent,
            size: (16, 16),
            level,
            visible: true,
            disposed: false,
            material: Some(FakeMaterial::default()),
            states: HashMap::new(),
            listeners: Vec::new(),
            vertical_bounds: None,
        }
    }

    pub fn recorded(&self) -> &FakeMaterial {
        self.material.as_ref().unwrap()
    }

    pub fn state(&self, layer: LayerId) -> &LayerUpdateState {
        &self.states[&layer]
    }

    /// Marks the node disposed and fires its listeners, as a host would.
    pub fn dispose(&mut self) {
        self.disposed = true;
        let id = self.id;
        for listener in self.listeners.drain(..) {
            listener.notify(id);
        }
    }
}

impl TileNode for FakeNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn extent(&self) -> Extent {
        self.extent.clone()
    }

    fn texture_size(&self) -> (u32, u32) {
        self.size
    }

    fn level(&self) -> u32 {
        self.level
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn material(&mut self) -> Option<&mut dyn TileMaterial> {
        self.material
            .as_mut()
            .map(|material| material as &mut dyn TileMaterial)
    }

    fn layer_update_state(&mut self, layer: LayerId) -> &mut LayerUpdateState {
        self.states.entry(layer).or_default()
    }

    fn add_dispose_listener(&mut self, listener: DisposeListener) {
        self.listeners.push(listener);
    }

    fn set_vertical_bounds(&mut self, min: f32, max: f32) {
        self.vertical_bounds = Some((min, max));
    }
}
