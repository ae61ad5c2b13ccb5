//! The per-layer orchestrator.
//!
//! A [`Layer`] owns a source, a composer and one [`Target`] per tile node
//! it paints. Each `update` call drives a single node's target through
//! `Pending -> Processing -> Complete`; fetches run as local tasks and their
//! results are applied at the start of the next update.

mod fetch;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use foundation::extent::{Extent, ExtentError};
use foundation::ids::NodeId;
use foundation::time::Time;
use gpu::{DataType, GpuError, MinMax, RenderTarget, RenderTargetPool};
use runtime::{ChangeNotifier, EventBus, OperationCounter};
use serde::{Deserialize, Serialize};
use streaming::{AbortController, RequestQueue};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

use crate::color_map::{ColorMap, ColorMapError};
use crate::composer::{ComposerError, ComposerOptions, CopySource, LayerComposer, RenderResult};
use crate::context::{Context, Instance};
use crate::mask::{MaskLayer, MaskMode};
use crate::node::{ColorMapBinding, DisposeListener, TextureBinding, TileNode};
use crate::options::LayerOptions;
use crate::raster::ColorLayer;
use crate::source::{AdjustedExtent, ImageQuery, ImageResult, Source, SourceError};
use crate::symbology::{Colorimetry, LayerStyle};
use crate::target::{Settled, Target, TargetState, find_loaded_ancestor};
use crate::terrain::ElevationLayer;
use crate::update_state::UpdateStatus;
use crate::variant::LayerVariant;
use fetch::{FetchFailure, FetchJob, FetchOutcome, HostWaker, InboxMessage, OperationGuard};

/// Long side, in pixels, of the image used to learn an elevation range.
pub const ROOT_IMAGE_SIZE: u32 = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerError {
    #[error("layer has been disposed")]
    Disposed,
    #[error("layer is already initialized")]
    AlreadyInitialized,
    #[error("invalid layer options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Composer(#[from] ComposerError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Extent(#[from] ExtentError),
    #[error(transparent)]
    ColorMap(#[from] ColorMapError),
}

/// Emitted only when a value actually changes.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerEvent {
    OpacityChanged(f32),
    VisibilityChanged(bool),
    ElevationRangeChanged(Option<(f32, f32)>),
    ColorimetryChanged(Colorimetry),
    MinMaxChanged(MinMax),
    Cleared,
    Disposed,
}

/// State that only exists once the layer knows its instance.
struct Runtime {
    composer: LayerComposer,
    pool: RenderTargetPool,
    queue: RequestQueue,
    notifier: ChangeNotifier,
    data_type: DataType,
}

pub struct Layer {
    id: LayerId,
    name: String,
    variant: LayerVariant,
    source: Box<dyn Source>,
    source_revision: u64,
    options: LayerOptions,
    style: LayerStyle,
    color_map: Option<ColorMap>,
    targets: BTreeMap<NodeId, Target>,
    /// Nodes carrying this layer's dispose listener; survives `clear`.
    watched: BTreeSet<NodeId>,
    runtime: Option<Runtime>,
    operations: Rc<RefCell<OperationCounter>>,
    events: EventBus<LayerEvent>,
    inbox_tx: UnboundedSender<InboxMessage>,
    inbox: UnboundedReceiver<InboxMessage>,
    root_generation: u64,
    root_abort: Option<AbortController>,
    ready: bool,
    frozen: bool,
    disposed: bool,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.variant.kind())
            .field("targets", &self.targets.len())
            .field("ready", &self.ready)
            .field("frozen", &self.frozen)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl Layer {
    pub fn color(id: LayerId, source: Box<dyn Source>, options: LayerOptions) -> Result<Self, LayerError> {
        Self::with_variant(id, LayerVariant::Color(ColorLayer), source, options)
    }

    pub fn elevation(
        id: LayerId,
        source: Box<dyn Source>,
        options: LayerOptions,
    ) -> Result<Self, LayerError> {
        let variant = LayerVariant::Elevation(ElevationLayer::new(options.min_max));
        Self::with_variant(id, variant, source, options)
    }

    pub fn mask(
        id: LayerId,
        source: Box<dyn Source>,
        options: LayerOptions,
        mode: MaskMode,
    ) -> Result<Self, LayerError> {
        let variant = LayerVariant::Mask(MaskLayer::new(mode)?);
        Self::with_variant(id, variant, source, options)
    }

    fn with_variant(
        id: LayerId,
        variant: LayerVariant,
        source: Box<dyn Source>,
        options: LayerOptions,
    ) -> Result<Self, LayerError> {
        options.validate()?;
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        Ok(Self {
            id,
            name: options.name.clone().unwrap_or_else(|| id.to_string()),
            variant,
            source,
            source_revision: 0,
            style: options.style,
            options,
            color_map: None,
            targets: BTreeMap::new(),
            watched: BTreeSet::new(),
            runtime: None,
            operations: Rc::new(RefCell::new(OperationCounter::new())),
            events: EventBus::new(),
            inbox_tx,
            inbox,
            root_generation: 0,
            root_abort: None,
            ready: false,
            frozen: false,
            disposed: false,
        })
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> &LayerVariant {
        &self.variant
    }

    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    pub fn style(&self) -> &LayerStyle {
        &self.style
    }

    /// The configured extent wins over the source's, so a layer can crop.
    pub fn extent(&self) -> Option<Extent> {
        self.options.extent.clone().or_else(|| self.source.extent())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn loading(&self) -> bool {
        self.operations.borrow().loading()
    }

    pub fn progress(&self) -> f64 {
        self.operations.borrow().progress()
    }

    /// Layer-wide value range, for elevation layers.
    pub fn min_max(&self) -> Option<MinMax> {
        match &self.variant {
            LayerVariant::Elevation(e) => e.min_max(),
            _ => None,
        }
    }

    pub fn composer(&self) -> Option<&LayerComposer> {
        self.runtime.as_ref().map(|r| &r.composer)
    }

    pub fn target(&self, node: NodeId) -> Option<&Target> {
        self.targets.get(&node)
    }

    pub fn target_state(&self, node: NodeId) -> Option<TargetState> {
        self.targets.get(&node).map(Target::state)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn events(&self) -> &[LayerEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<LayerEvent> {
        self.events.drain()
    }

    pub fn color_map(&self) -> Option<&ColorMap> {
        self.color_map.as_ref()
    }

    pub fn color_map_mut(&mut self) -> Option<&mut ColorMap> {
        self.color_map.as_mut()
    }

    pub fn set_color_map(&mut self, color_map: Option<ColorMap>) {
        if let Some(mut previous) = std::mem::replace(&mut self.color_map, color_map) {
            previous.dispose();
        }
        self.notify(false);
    }

    pub fn set_opacity(&mut self, opacity: f32) -> Result<(), LayerError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(LayerError::InvalidOptions(format!(
                "opacity {opacity} is outside [0, 1]"
            )));
        }
        if self.style.opacity != opacity {
            self.style.opacity = opacity;
            self.events.emit(LayerEvent::OpacityChanged(opacity));
            self.notify(false);
        }
        Ok(())
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.style.visible != visible {
            self.style.visible = visible;
            self.events.emit(LayerEvent::VisibilityChanged(visible));
            self.notify(false);
        }
    }

    pub fn set_colorimetry(&mut self, colorimetry: Colorimetry) {
        if self.style.colorimetry != colorimetry {
            self.style.colorimetry = colorimetry;
            self.events.emit(LayerEvent::ColorimetryChanged(colorimetry));
            self.notify(false);
        }
    }

    pub fn set_elevation_range(&mut self, range: Option<(f32, f32)>) -> Result<(), LayerError> {
        if let Some((min, max)) = range {
            if !(min <= max) {
                return Err(LayerError::InvalidOptions(format!(
                    "elevation range [{min}, {max}] is not ordered"
                )));
            }
        }
        if self.style.elevation_range != range {
            self.style.elevation_range = range;
            self.events.emit(LayerEvent::ElevationRangeChanged(range));
            self.notify(false);
        }
        Ok(())
    }

    /// A frozen layer keeps pushing style to materials but stops fetching
    /// and repainting.
    pub fn set_frozen(&mut self, frozen: bool) {
        if self.frozen != frozen {
            self.frozen = frozen;
            debug!(layer = %self.id, frozen, "layer frozen state changed");
            self.notify(false);
        }
    }

    fn check_alive(&self) -> Result<(), LayerError> {
        if self.disposed {
            Err(LayerError::Disposed)
        } else {
            Ok(())
        }
    }

    fn notify(&self, force: bool) {
        if let Some(runtime) = &self.runtime {
            runtime.notifier.notify_change(self.name.clone(), force);
        }
    }

    /// Binds the layer to an instance. Elevation layers without a known
    /// range start fetching their root image here and are not ready until
    /// it arrives.
    pub fn initialize(&mut self, instance: &Instance) -> Result<(), LayerError> {
        self.check_alive()?;
        if self.runtime.is_some() {
            return Err(LayerError::AlreadyInitialized);
        }
        let target_crs = instance.reference_crs();
        self.source.initialize(target_crs)?;
        self.source_revision = self.source.revision();

        let strategy = self.variant.strategy();
        let composer_options = ComposerOptions {
            source_crs: self.source.crs().clone(),
            target_crs: target_crs.clone(),
            compute_min_max: strategy.compute_min_max(),
            no_data: self.options.no_data.clone(),
            interpretation: self.options.interpretation,
            flip_y: self.source.flip_y(),
            mesh_segments: self.options.mesh_segments,
            fade_duration_s: self.options.fade_duration_s,
        };
        let data_type = strategy.data_type(self.source.as_ref());
        self.runtime = Some(Runtime {
            composer: LayerComposer::new(composer_options, instance.projection().clone()),
            pool: RenderTargetPool::with_capacity(
                instance.renderer().clone(),
                self.options.pool_capacity,
            ),
            queue: instance.request_queue().clone(),
            notifier: instance.notifier().clone(),
            data_type,
        });
        self.start_preprocessing();
        info!(
            layer = %self.id,
            name = %self.name,
            kind = self.variant.kind(),
            crs = %target_crs,
            ready = self.ready,
            "layer initialized"
        );
        Ok(())
    }

    fn start_preprocessing(&mut self) {
        let needs_root = self.options.preload_root
            && matches!(&self.variant, LayerVariant::Elevation(e) if e.min_max().is_none());
        if !needs_root {
            self.ready = true;
            return;
        }
        let Some(runtime) = &self.runtime else {
            return;
        };
        let queue = runtime.queue.clone();
        let waker = HostWaker {
            layer: self.name.clone(),
            notifier: runtime.notifier.clone(),
        };
        let Some(extent) = self.extent() else {
            self.ready = true;
            return;
        };

        let (width, height) = root_image_size(&extent);
        let controller = AbortController::new();
        let query = ImageQuery {
            id: format!("{}:root", self.id),
            extent,
            width,
            height,
            signal: controller.signal(),
        };
        let requests = self.source.get_images(query);
        if requests.is_empty() {
            self.ready = true;
            return;
        }

        self.root_generation += 1;
        self.ready = false;
        debug!(layer = %self.id, images = requests.len(), width, height, "fetching root images");
        fetch::spawn_root_fetch(
            self.root_generation,
            controller.signal(),
            requests,
            queue,
            self.inbox_tx.clone(),
            waker,
            OperationGuard::new(&self.operations),
        );
        self.root_abort = Some(controller);
    }

    /// Runs one step of `node`'s pipeline for this layer.
    ///
    /// Per-node fetch and render failures never surface here: they become
    /// retries on the node's update state. Errors are reserved for misuse,
    /// such as updating a disposed layer.
    pub fn update(&mut self, ctx: &Context<'_>, node: &mut dyn TileNode) -> Result<(), LayerError> {
        self.check_alive()?;
        self.drain_inbox();
        self.sync_source_revision()?;
        if !self.ready || self.runtime.is_none() {
            return Ok(());
        }

        let node_id = node.id();
        if node.is_disposed() {
            self.watched.remove(&node_id);
            self.unregister_node(node_id);
            return Ok(());
        }
        if !node.is_visible() {
            if let Some(target) = self.targets.get_mut(&node_id) {
                if target.state() == TargetState::Processing {
                    target.abort();
                    node.layer_update_state(self.id).abort();
                    trace!(layer = %self.id, node = %node_id, "fetch cancelled, node hidden");
                }
            }
            return Ok(());
        }
        if node.material().is_none() {
            return Ok(());
        }

        if !self.targets.contains_key(&node_id) {
            self.register_node(node);
        }
        self.update_material(node)?;
        if !self.frozen {
            self.process_target(node, ctx.frame.time);
        }
        Ok(())
    }

    /// Deletes composer images no node needs any more.
    ///
    /// Pending inbox messages are applied first so nodes disposed since the
    /// last update release their images in this pass.
    pub fn post_update(&mut self) -> usize {
        self.drain_inbox();
        self.runtime
            .as_mut()
            .map_or(0, |runtime| runtime.composer.cleanup())
    }

    fn sync_source_revision(&mut self) -> Result<(), LayerError> {
        if self.runtime.is_none() {
            return Ok(());
        }
        let revision = self.source.revision();
        if revision != self.source_revision {
            self.source_revision = revision;
            info!(layer = %self.id, revision, "source updated, reloading");
            self.clear()?;
        }
        Ok(())
    }

    fn adjusted_extent(&self, geometry: &Extent, width: u32, height: u32) -> AdjustedExtent {
        let margin_px = self.options.margin_px;
        if self.source.crs() == geometry.crs() {
            if let Some(adjusted) =
                self.source
                    .adjust_extent_and_pixel_size(geometry, width, height, margin_px)
            {
                return adjusted;
            }
        }

        let ratio = self.options.margin_ratio;
        let grown = geometry.with_relative_margin(ratio);
        let scale = 1.0 + 2.0 * ratio;
        let width = ((f64::from(width) * scale).round() as u32).max(1);
        let height = ((f64::from(height) * scale).round() as u32).max(1);
        let px_x = grown.width() / f64::from(width);
        let px_y = grown.height() / f64::from(height);
        let border = f64::from(margin_px);
        AdjustedExtent {
            extent: grown.with_margin(px_x * border, px_y * border),
            width: width + 2 * margin_px,
            height: height + 2 * margin_px,
        }
    }

    fn register_node(&mut self, node: &mut dyn TileNode) {
        let id = self.id;
        let node_id = node.id();
        let geometry = node.extent();
        let (w, h) = node.texture_size();
        let factor = self.options.resolution_factor;
        let width = ((f64::from(w) * factor).round() as u32).max(1);
        let height = ((f64::from(h) * factor).round() as u32).max(1);
        let adjusted = self.adjusted_extent(&geometry, width, height);

        node.layer_update_state(id).reset();
        if let Some(material) = node.material() {
            self.variant.strategy_mut().register_node(id, material);
        }
        if self.watched.insert(node_id) {
            let inbox = self.inbox_tx.clone();
            node.add_dispose_listener(DisposeListener::new(id, move |disposed| {
                let _ = inbox.send(InboxMessage::NodeDisposed(disposed));
            }));
        }

        debug!(
            layer = %id,
            node = %node_id,
            width = adjusted.width,
            height = adjusted.height,
            "node registered"
        );
        let target = Target::new(
            node_id,
            node.level(),
            geometry,
            adjusted.extent,
            adjusted.width,
            adjusted.height,
        );
        self.targets.insert(node_id, target);
    }

    /// Forgets `node`: aborts its fetch, unlocks its images and returns its
    /// render target to the pool. Unknown nodes are ignored.
    pub fn unregister_node(&mut self, node: NodeId) {
        let Some(mut target) = self.targets.remove(&node) else {
            return;
        };
        target.abort();
        if let Some(runtime) = self.runtime.as_mut() {
            runtime
                .composer
                .unlock(target.image_ids().iter().map(String::as_str), node);
            if let Some(render_target) = target.take_render_target() {
                runtime.pool.release(render_target);
            }
        }
        debug!(layer = %self.id, %node, "node unregistered");
    }

    fn update_material(&mut self, node: &mut dyn TileNode) -> Result<(), LayerError> {
        let id = self.id;
        let color_map = match self.color_map.as_mut() {
            Some(color_map) => Some(ColorMapBinding {
                lut: color_map.lut()?,
                min: color_map.min(),
                max: color_map.max(),
                mode: color_map.mode(),
            }),
            None => None,
        };
        if let Some(material) = node.material() {
            self.variant
                .strategy_mut()
                .update_material(id, material, &self.style);
            material.set_layer_color_map(id, color_map);
        }
        Ok(())
    }

    fn can_fetch(&self, extent: &Extent) -> bool {
        let within_layer = self
            .extent()
            .is_none_or(|own| own.intersects_extent(extent));
        within_layer && self.source.contains(extent)
    }

    fn process_target(&mut self, node: &mut dyn TileNode, now: Time) {
        let node_id = node.id();
        let Some(mut target) = self.targets.remove(&node_id) else {
            return;
        };
        if let Err(e) = self.advance(&mut target, node, now) {
            warn!(layer = %self.id, node = %node_id, error = %e, "target processing failed");
            target.abort();
            target.set_state(TargetState::Pending);
            node.layer_update_state(self.id)
                .failure(now, false, e.to_string());
        }
        self.targets.insert(node_id, target);
    }

    fn advance(&mut self, target: &mut Target, node: &mut dyn TileNode, now: Time) -> Result<(), LayerError> {
        let id = self.id;
        match target.state() {
            TargetState::Pending => {
                if !self.can_fetch(target.extent()) {
                    self.variant
                        .strategy_mut()
                        .apply_empty_texture_to_node(id, node);
                    node.layer_update_state(id).no_more_update_possible();
                    target.set_state(TargetState::Complete);
                    trace!(layer = %id, node = %target.node(), "node outside layer extent");
                    return Ok(());
                }
                if !node.layer_update_state(id).new_try(now) {
                    return Ok(());
                }
                self.apply_default_texture(target, node, now)?;
                self.fetch_images(target)?;
                self.notify(false);
            }
            TargetState::Processing => match target.take_settled() {
                None => {}
                Some(Settled::Loaded) => {
                    node.layer_update_state(id).success();
                    let result = self.paint(target, node, now)?;
                    if result.is_last_render {
                        target.set_state(TargetState::Complete);
                    } else {
                        node.layer_update_state(id)
                            .failure(now, false, "required images missing after fetch");
                        target.set_state(TargetState::Pending);
                    }
                    self.notify(false);
                }
                Some(Settled::Failed(reason)) => {
                    let state = node.layer_update_state(id);
                    state.failure(now, false, reason.as_str());
                    if state.status() == UpdateStatus::DefinitiveError {
                        error!(
                            layer = %id,
                            node = %target.node(),
                            errors = state.error_count(),
                            error = %reason,
                            "giving up on node after repeated failures"
                        );
                    } else {
                        warn!(
                            layer = %id,
                            node = %target.node(),
                            retry_in_s = state.seconds_until_next_try(),
                            error = %reason,
                            "image fetch failed"
                        );
                    }
                    target.set_state(TargetState::Pending);
                }
            },
            TargetState::Complete => {
                if target.is_animating() {
                    self.paint(target, node, now)?;
                    self.notify(false);
                }
            }
        }
        Ok(())
    }

    fn acquire_render_target(&mut self, target: &mut Target) -> Result<RenderTarget, LayerError> {
        if let Some(render_target) = target.take_render_target() {
            return Ok(render_target);
        }
        let runtime = self.runtime.as_mut().ok_or(LayerError::Disposed)?;
        Ok(runtime
            .pool
            .acquire(target.width(), target.height(), runtime.data_type)?)
    }

    /// Paints something right away: a stretched ancestor texture when one
    /// is loaded, otherwise whatever the composer already holds.
    fn apply_default_texture(
        &mut self,
        target: &mut Target,
        node: &mut dyn TileNode,
        now: Time,
    ) -> Result<(), LayerError> {
        let mut render_target = self.acquire_render_target(target)?;
        let ancestor = find_loaded_ancestor(self.targets.values(), target).and_then(|a| {
            a.texture()
                .map(|texture| (a.node(), Rc::clone(texture), a.extent().clone()))
        });
        let runtime = self.runtime.as_mut().ok_or(LayerError::Disposed)?;
        let drawn = match &ancestor {
            Some((parent, texture, extent)) => {
                trace!(layer = %self.id, node = %target.node(), %parent, "inheriting ancestor texture");
                runtime.composer.copy(
                    &[CopySource { texture, extent }],
                    &mut render_target,
                    target.extent(),
                )
            }
            None => runtime
                .composer
                .render(target.extent(), &mut render_target, target.image_ids(), true, now)
                .map(|r| r.min_max),
        };
        let binding = TextureBinding {
            texture: render_target.texture().clone(),
            pitch: target.pitch(),
        };
        target.set_render_target(render_target);
        let min_max = drawn?;
        self.variant
            .strategy_mut()
            .apply_texture_to_node(self.id, node, binding, min_max);
        Ok(())
    }

    fn fetch_images(&mut self, target: &mut Target) -> Result<(), LayerError> {
        let runtime = self.runtime.as_mut().ok_or(LayerError::Disposed)?;
        let node = target.node();
        let (generation, signal) = target.begin_fetch();
        let query = ImageQuery {
            id: format!("{}:{}", self.id, node),
            extent: target.extent().clone(),
            width: target.width(),
            height: target.height(),
            signal: signal.clone(),
        };
        let requests = self.source.get_images(query);

        let ids: Vec<String> = requests.iter().map(|r| r.id().to_owned()).collect();
        runtime
            .composer
            .unlock(target.image_ids().iter().map(String::as_str), node);
        for image in &ids {
            runtime.composer.lock(image, node);
        }
        target.set_image_ids(ids);

        let missing: Vec<_> = requests
            .into_iter()
            .filter(|r| !runtime.composer.has(r.id()))
            .collect();
        if missing.is_empty() {
            target.settle(Settled::Loaded);
            return Ok(());
        }

        trace!(layer = %self.id, %node, generation, missing = missing.len(), "fetch scheduled");
        fetch::spawn_fetch(FetchJob {
            node,
            generation,
            signal,
            requests: missing,
            debounce: self.options.debounce(),
            queue: runtime.queue.clone(),
            inbox: self.inbox_tx.clone(),
            waker: HostWaker {
                layer: self.name.clone(),
                notifier: runtime.notifier.clone(),
            },
            guard: OperationGuard::new(&self.operations),
        });
        Ok(())
    }

    /// Composites the target's images and hands the texture to the node.
    fn paint(
        &mut self,
        target: &mut Target,
        node: &mut dyn TileNode,
        now: Time,
    ) -> Result<RenderResult, LayerError> {
        let mut render_target = self.acquire_render_target(target)?;
        let runtime = self.runtime.as_mut().ok_or(LayerError::Disposed)?;
        let rendered = runtime.composer.render(
            target.extent(),
            &mut render_target,
            target.image_ids(),
            false,
            now,
        );
        let binding = TextureBinding {
            texture: render_target.texture().clone(),
            pitch: target.pitch(),
        };
        target.set_render_target(render_target);
        let result = rendered?;
        target.set_animating(result.animating);

        self.variant
            .strategy_mut()
            .apply_texture_to_node(self.id, node, binding, result.min_max);
        if let (LayerVariant::Elevation(elevation), Some(range)) = (&mut self.variant, result.min_max) {
            if elevation.refine(range) {
                if let Some(refined) = elevation.min_max() {
                    self.events.emit(LayerEvent::MinMaxChanged(refined));
                }
            }
        }
        Ok(result)
    }

    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                InboxMessage::NodeDisposed(node) => {
                    self.watched.remove(&node);
                    self.unregister_node(node);
                }
                InboxMessage::Fetched {
                    node,
                    generation,
                    outcome,
                } => self.on_fetched(node, generation, outcome),
                InboxMessage::Root {
                    generation,
                    results,
                } => self.on_root_fetched(generation, results),
            }
        }
    }

    fn on_fetched(&mut self, node: NodeId, generation: u64, outcome: FetchOutcome) {
        let Some(target) = self.targets.get_mut(&node) else {
            return;
        };
        if target.generation() != generation || target.state() != TargetState::Processing {
            trace!(layer = %self.id, %node, generation, "stale fetch result dropped");
            return;
        }
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        match outcome {
            FetchOutcome::Aborted => target.abort(),
            FetchOutcome::Loaded { images, mut error } => {
                for image in images {
                    let image_id = image.id.clone();
                    match runtime.composer.add(image, false) {
                        Ok(_) => {
                            runtime.composer.lock(&image_id, node);
                        }
                        Err(e) => {
                            error.get_or_insert(e.to_string());
                        }
                    }
                }
                target.settle(match error {
                    Some(reason) => Settled::Failed(reason),
                    None => Settled::Loaded,
                });
            }
        }
    }

    fn on_root_fetched(&mut self, generation: u64, results: Vec<Result<ImageResult, FetchFailure>>) {
        if generation != self.root_generation {
            return;
        }
        self.root_abort = None;
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        let mut ranges = Vec::new();
        for result in results {
            match result {
                Ok(image) => {
                    let image_id = image.id.clone();
                    match runtime.composer.add(image, true) {
                        Ok(_) => ranges.extend(runtime.composer.image_min_max(&image_id)),
                        Err(e) => warn!(layer = %self.id, image = %image_id, error = %e, "root image rejected"),
                    }
                }
                Err(FetchFailure::Aborted) => {}
                Err(FetchFailure::Failed(reason)) => {
                    warn!(layer = %self.id, error = %reason, "root image fetch failed");
                }
            }
        }
        if let (LayerVariant::Elevation(elevation), Some(range)) =
            (&mut self.variant, MinMax::union_all(ranges))
        {
            if elevation.refine(range) {
                self.events.emit(LayerEvent::MinMaxChanged(range));
            }
        }
        self.ready = true;
        info!(layer = %self.id, min_max = ?self.min_max(), "layer ready");
        self.notify(false);
    }

    /// Drops every target and image, then starts over. Hosts see the layer
    /// repaint from scratch on the following updates.
    pub fn clear(&mut self) -> Result<(), LayerError> {
        self.check_alive()?;
        self.release_all();
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.composer.clear();
        }
        if let LayerVariant::Elevation(elevation) = &mut self.variant {
            elevation.reset(self.options.min_max);
        }
        self.events.emit(LayerEvent::Cleared);
        info!(layer = %self.id, "layer cleared");
        if self.runtime.is_some() {
            self.start_preprocessing();
        }
        self.notify(true);
        Ok(())
    }

    fn release_all(&mut self) {
        let nodes: Vec<NodeId> = self.targets.keys().copied().collect();
        for node in nodes {
            self.unregister_node(node);
        }
        if let Some(controller) = self.root_abort.take() {
            controller.abort();
        }
    }

    /// Releases every resource. A disposed layer rejects all further calls.
    pub fn dispose(&mut self) -> Result<(), LayerError> {
        self.check_alive()?;
        self.release_all();
        self.watched.clear();
        self.notify(true);
        if let Some(mut runtime) = self.runtime.take() {
            runtime.pool.dispose_all();
            runtime.composer.dispose()?;
        }
        if let Some(color_map) = self.color_map.as_mut() {
            color_map.dispose();
        }
        self.disposed = true;
        self.ready = false;
        self.events.emit(LayerEvent::Disposed);
        info!(layer = %self.id, "layer disposed");
        Ok(())
    }
}

fn root_image_size(extent: &Extent) -> (u32, u32) {
    let (w, h) = (extent.width(), extent.height());
    if !(w > 0.0 && h > 0.0) {
        return (ROOT_IMAGE_SIZE, ROOT_IMAGE_SIZE);
    }
    let long = f64::from(ROOT_IMAGE_SIZE);
    if w >= h {
        (ROOT_IMAGE_SIZE, ((long * h / w).round() as u32).max(1))
    } else {
        (((long * w / h).round() as u32).max(1), ROOT_IMAGE_SIZE)
    }
}
