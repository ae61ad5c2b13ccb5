//! Software GPU used by the layer compositor.
//!
//! Textures are CPU pixel buffers, render targets are pooled textures, and
//! drawing is a small triangle rasterizer. The API mirrors what the
//! compositor needs from a real device: allocate, draw textured meshes into a
//! target, run a post-process pass, release.

pub mod fill;
pub mod mesh;
pub mod raster;
pub mod render_target;
pub mod renderer;
pub mod texture;

pub use fill::*;
pub use mesh::*;
pub use raster::*;
pub use render_target::*;
pub use renderer::*;
pub use texture::*;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    #[error("texture size must be non-zero (got {width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("pixel buffer has {actual} elements, expected {expected}")]
    PixelCountMismatch { expected: usize, actual: usize },
}
