use std::cell::Cell;
use std::rc::Rc;

/// Snapshot of device resource usage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RendererStats {
    pub live_render_targets: usize,
    pub allocated_bytes: usize,
}

/// Device handle passed opaquely into compositors.
///
/// Clones share the same accounting, so every render target allocated through
/// any clone shows up in [`Renderer::stats`].
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    stats: Rc<Cell<RendererStats>>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RendererStats {
        self.stats.get()
    }

    pub(crate) fn track_alloc(&self, bytes: usize) {
        let mut s = self.stats.get();
        s.live_render_targets += 1;
        s.allocated_bytes += bytes;
        self.stats.set(s);
    }

    pub(crate) fn track_free(&self, bytes: usize) {
        let mut s = self.stats.get();
        s.live_render_targets = s.live_render_targets.saturating_sub(1);
        s.allocated_bytes = s.allocated_bytes.saturating_sub(bytes);
        self.stats.set(s);
    }
}
