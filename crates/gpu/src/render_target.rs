use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::GpuError;
use crate::renderer::Renderer;
use crate::texture::{DataType, Pixel, Texture};

/// Default number of idle render targets kept per size bucket.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// An offscreen colour buffer.
///
/// The colour texture is shared through an `Rc`: materials keep the snapshot
/// they were given, and the next draw copies-on-write if a snapshot is still
/// alive. Dropping the target releases its device accounting.
#[derive(Debug)]
pub struct RenderTarget {
    texture: Rc<Texture>,
    renderer: Renderer,
    bytes: usize,
}

impl RenderTarget {
    pub fn new(
        renderer: &Renderer,
        width: u32,
        height: u32,
        data_type: DataType,
    ) -> Result<Self, GpuError> {
        let texture = Texture::new(width, height, data_type)?;
        let bytes = texture.byte_size();
        renderer.track_alloc(bytes);
        Ok(Self {
            texture: Rc::new(texture),
            renderer: renderer.clone(),
            bytes,
        })
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn data_type(&self) -> DataType {
        self.texture.data_type()
    }

    /// Shareable snapshot of the current contents.
    pub fn texture(&self) -> &Rc<Texture> {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut Texture {
        Rc::make_mut(&mut self.texture)
    }

    pub fn clear(&mut self, color: Pixel) {
        self.texture_mut().clear(color);
    }

    /// Releases the target immediately.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.renderer.track_free(self.bytes);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    width: u32,
    height: u32,
    data_type: DataType,
}

/// Free-list of render targets bucketed by size and data type.
///
/// Each bucket holds at most `capacity` idle targets; releasing beyond that
/// disposes the target, which bounds peak memory.
#[derive(Debug)]
pub struct RenderTargetPool {
    renderer: Renderer,
    capacity: usize,
    buckets: HashMap<PoolKey, Vec<RenderTarget>>,
}

impl RenderTargetPool {
    pub fn new(renderer: Renderer) -> Self {
        Self::with_capacity(renderer, DEFAULT_POOL_CAPACITY)
    }

    pub fn with_capacity(renderer: Renderer, capacity: usize) -> Self {
        Self {
            renderer,
            capacity,
            buckets: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle targets currently pooled.
    pub fn idle_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Returns a cleared target of the requested shape.
    pub fn acquire(
        &mut self,
        width: u32,
        height: u32,
        data_type: DataType,
    ) -> Result<RenderTarget, GpuError> {
        let key = PoolKey {
            width,
            height,
            data_type,
        };
        if let Some(mut rt) = self.buckets.get_mut(&key).and_then(Vec::pop) {
            rt.clear([0.0; 4]);
            return Ok(rt);
        }
        RenderTarget::new(&self.renderer, width, height, data_type)
    }

    pub fn release(&mut self, target: RenderTarget) {
        let key = PoolKey {
            width: target.width(),
            height: target.height(),
            data_type: target.data_type(),
        };
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() < self.capacity {
            bucket.push(target);
        } else {
            debug!(
                width = key.width,
                height = key.height,
                "render target pool bucket full, disposing target"
            );
            target.dispose();
        }
    }

    pub fn dispose_all(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{RenderTarget, RenderTargetPool};
    use crate::renderer::Renderer;
    use crate::texture::DataType;

    #[test]
    fn released_targets_are_reused_and_cleared() {
        let renderer = Renderer::new();
        let mut pool = RenderTargetPool::new(renderer.clone());
        let mut rt = pool.acquire(4, 4, DataType::U8).unwrap();
        rt.clear([1.0, 1.0, 1.0, 1.0]);
        pool.release(rt);
        assert_eq!(pool.idle_count(), 1);

        let rt = pool.acquire(4, 4, DataType::U8).unwrap();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(rt.texture().get(0, 0), [0.0; 4]);
        assert_eq!(renderer.stats().live_render_targets, 1);
    }

    #[test]
    fn buckets_are_keyed_by_shape_and_type() {
        let renderer = Renderer::new();
        let mut pool = RenderTargetPool::new(renderer.clone());
        let rt = pool.acquire(4, 4, DataType::U8).unwrap();
        pool.release(rt);
        let _other = pool.acquire(4, 4, DataType::F32).unwrap();
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(renderer.stats().live_render_targets, 2);
    }

    #[test]
    fn overflow_is_disposed() {
        let renderer = Renderer::new();
        let mut pool = RenderTargetPool::with_capacity(renderer.clone(), 2);
        let targets: Vec<_> = (0..3)
            .map(|_| RenderTarget::new(&renderer, 2, 2, DataType::U8).unwrap())
            .collect();
        assert_eq!(renderer.stats().live_render_targets, 3);
        for t in targets {
            pool.release(t);
        }
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(renderer.stats().live_render_targets, 2);

        pool.dispose_all();
        assert_eq!(renderer.stats().live_render_targets, 0);
        assert_eq!(renderer.stats().allocated_bytes, 0);
    }

    #[test]
    fn snapshots_survive_later_draws() {
        let renderer = Renderer::new();
        let mut rt = RenderTarget::new(&renderer, 1, 1, DataType::F32).unwrap();
        rt.clear([5.0, 0.0, 0.0, 1.0]);
        let snapshot = rt.texture().clone();
        rt.clear([7.0, 0.0, 0.0, 1.0]);
        assert_eq!(snapshot.get(0, 0)[0], 5.0);
        assert_eq!(rt.texture().get(0, 0)[0], 7.0);
    }
}
