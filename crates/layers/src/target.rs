use std::rc::Rc;

use foundation::extent::Extent;
use foundation::ids::NodeId;
use foundation::math::StableF64;
use foundation::offset_scale::OffsetScale;
use gpu::{RenderTarget, Texture};
use serde::{Deserialize, Serialize};
use streaming::{AbortController, AbortSignal};
use tracing::trace;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetState {
    /// Waiting to (re)start a fetch.
    Pending,
    /// A fetch is in flight or its result awaits rendering.
    Processing,
    /// Painted with every required image.
    Complete,
}

/// Result of a fetch, waiting for the node's next update.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Settled {
    Loaded,
    Failed(String),
}

/// The texture region a layer paints for one node.
///
/// `extent` is the node's extent grown by a margin; `pitch` locates the
/// node inside it. The render target is only present once painted.
#[derive(Debug)]
pub struct Target {
    node: NodeId,
    level: u32,
    geometry_extent: Extent,
    extent: Extent,
    width: u32,
    height: u32,
    pitch: OffsetScale,
    state: TargetState,
    render_target: Option<RenderTarget>,
    image_ids: Vec<String>,
    abort: Option<AbortController>,
    generation: u64,
    settled: Option<Settled>,
    animating: bool,
}

impl Target {
    pub fn new(
        node: NodeId,
        level: u32,
        geometry_extent: Extent,
        extent: Extent,
        width: u32,
        height: u32,
    ) -> Self {
        let pitch = geometry_extent.offset_to_parent(&extent);
        Self {
            node,
            level,
            geometry_extent,
            extent,
            width,
            height,
            pitch,
            state: TargetState::Pending,
            render_target: None,
            image_ids: Vec::new(),
            abort: None,
            generation: 0,
            settled: None,
            animating: false,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn geometry_extent(&self) -> &Extent {
        &self.geometry_extent
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pitch(&self) -> OffsetScale {
        self.pitch
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn image_ids(&self) -> &[String] {
        &self.image_ids
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.render_target.as_ref()
    }

    pub fn texture(&self) -> Option<&Rc<Texture>> {
        self.render_target.as_ref().map(RenderTarget::texture)
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub(crate) fn set_state(&mut self, state: TargetState) {
        if self.state != state {
            trace!(node = %self.node, from = ?self.state, to = ?state, "target state");
            self.state = state;
        }
    }

    /// Starts a new fetch generation, cancelling any previous one.
    pub(crate) fn begin_fetch(&mut self) -> (u64, AbortSignal) {
        if let Some(previous) = self.abort.take() {
            previous.abort();
        }
        let controller = AbortController::new();
        let signal = controller.signal();
        self.abort = Some(controller);
        self.generation += 1;
        self.settled = None;
        self.set_state(TargetState::Processing);
        (self.generation, signal)
    }

    /// Cancels the in-flight fetch; a processing target goes back to pending.
    pub(crate) fn abort(&mut self) {
        if let Some(controller) = self.abort.take() {
            controller.abort();
        }
        self.settled = None;
        if self.state == TargetState::Processing {
            self.set_state(TargetState::Pending);
        }
    }

    pub(crate) fn settle(&mut self, settled: Settled) {
        self.abort = None;
        self.settled = Some(settled);
    }

    pub(crate) fn take_settled(&mut self) -> Option<Settled> {
        self.settled.take()
    }

    pub(crate) fn set_image_ids(&mut self, ids: Vec<String>) {
        self.image_ids = ids;
    }

    pub(crate) fn take_render_target(&mut self) -> Option<RenderTarget> {
        self.render_target.take()
    }

    pub(crate) fn set_render_target(&mut self, render_target: RenderTarget) {
        self.render_target = Some(render_target);
    }

    pub(crate) fn set_animating(&mut self, animating: bool) {
        self.animating = animating;
    }
}

/// Smallest completed target whose geometry strictly contains `child`'s.
///
/// Ties on width go to the lower level, then the lower node id.
pub(crate) fn find_loaded_ancestor<'a>(
    targets: impl IntoIterator<Item = &'a Target>,
    child: &Target,
) -> Option<&'a Target> {
    targets
        .into_iter()
        .filter(|t| {
            t.node != child.node
                && t.state == TargetState::Complete
                && t.render_target.is_some()
                && t.level < child.level
                && t.geometry_extent != child.geometry_extent
                && child.geometry_extent.is_inside(&t.geometry_extent, 0.0)
        })
        .min_by_key(|t| (StableF64(t.geometry_extent.width()), t.level, t.node))
}
