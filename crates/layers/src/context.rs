use std::fmt;
use std::rc::Rc;

use foundation::crs::Crs;
use foundation::math::{Projection, WebMercator};
use gpu::Renderer;
use runtime::{ChangeNotifier, Frame};
use streaming::RequestQueue;

/// Host-wide services shared by every layer.
///
/// All handles are reference counted; cloning an instance shares them.
#[derive(Clone)]
pub struct Instance {
    reference_crs: Crs,
    renderer: Renderer,
    notifier: ChangeNotifier,
    request_queue: RequestQueue,
    projection: Rc<dyn Projection>,
}

impl Instance {
    pub fn new(reference_crs: Crs) -> Self {
        Self {
            reference_crs,
            renderer: Renderer::new(),
            notifier: ChangeNotifier::new(),
            request_queue: RequestQueue::default(),
            projection: Rc::new(WebMercator),
        }
    }

    pub fn with_projection(mut self, projection: Rc<dyn Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_request_queue(mut self, request_queue: RequestQueue) -> Self {
        self.request_queue = request_queue;
        self
    }

    pub fn reference_crs(&self) -> &Crs {
        &self.reference_crs
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn request_queue(&self) -> &RequestQueue {
        &self.request_queue
    }

    pub fn projection(&self) -> &Rc<dyn Projection> {
        &self.projection
    }

    pub fn notify_change(&self, source: impl Into<String>, force: bool) {
        self.notifier.notify_change(source, force);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("reference_crs", &self.reference_crs)
            .field("request_queue", &self.request_queue)
            .finish_non_exhaustive()
    }
}

/// What a layer sees during one update call.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub instance: &'a Instance,
    pub frame: Frame,
}

impl<'a> Context<'a> {
    pub fn new(instance: &'a Instance, frame: Frame) -> Self {
        Self { instance, frame }
    }
}
