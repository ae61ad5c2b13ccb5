use std::fmt;
use std::future::Future;

use foundation::crs::Crs;
use foundation::extent::{Extent, ExtentError};
use futures_util::future::{FutureExt, LocalBoxFuture};
use gpu::{DataType, GpuError, MinMax, Texture};
use streaming::{AbortSignal, Aborted};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("request aborted")]
    Aborted,
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error(transparent)]
    Extent(#[from] ExtentError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

impl From<Aborted> for SourceError {
    fn from(_: Aborted) -> Self {
        SourceError::Aborted
    }
}

/// What a layer asks its source for: the region a target covers.
#[derive(Debug, Clone)]
pub struct ImageQuery {
    /// Identifies the requesting (layer, node) pair.
    pub id: String,
    pub extent: Extent,
    pub width: u32,
    pub height: u32,
    pub signal: AbortSignal,
}

/// A decoded image placed at its extent in the source CRS.
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub id: String,
    pub extent: Extent,
    pub texture: Texture,
    pub min_max: Option<MinMax>,
}

pub type ImageFuture = LocalBoxFuture<'static, Result<ImageResult, SourceError>>;

/// A deferred fetch for one source image.
///
/// Nothing happens until the request is started, so a layer can discard
/// requests for images it already has.
pub struct ImageRequest {
    id: String,
    start: Box<dyn FnOnce() -> ImageFuture>,
}

impl ImageRequest {
    pub fn new<F, Fut>(id: impl Into<String>, start: F) -> Self
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<ImageResult, SourceError>> + 'static,
    {
        Self {
            id: id.into(),
            start: Box::new(move || start().boxed_local()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start(self) -> ImageFuture {
        (self.start)()
    }
}

impl fmt::Debug for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRequest").field("id", &self.id).finish()
    }
}

/// Source-provided replacement for the default margin around a target.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedExtent {
    pub extent: Extent,
    pub width: u32,
    pub height: u32,
}

/// Provider of raster images.
///
/// `extent` and `contains` speak the layer's CRS (the one passed to
/// `initialize`); images come back in the source's own `crs`.
pub trait Source {
    fn initialize(&mut self, _target_crs: &Crs) -> Result<(), SourceError> {
        Ok(())
    }

    fn crs(&self) -> &Crs;

    fn extent(&self) -> Option<Extent>;

    fn contains(&self, extent: &Extent) -> bool {
        self.extent()
            .is_none_or(|own| own.intersects_extent(extent))
    }

    fn adjust_extent_and_pixel_size(
        &self,
        _extent: &Extent,
        _width: u32,
        _height: u32,
        _margin_px: u32,
    ) -> Option<AdjustedExtent> {
        None
    }

    /// Images needed to cover `query.extent` at the requested size.
    fn get_images(&self, query: ImageQuery) -> Vec<ImageRequest>;

    fn data_type(&self) -> DataType {
        DataType::U8
    }

    /// Rows arrive south-up and must be mirrored.
    fn flip_y(&self) -> bool {
        false
    }

    /// Bumped whenever the underlying data changes; layers reload on change.
    fn revision(&self) -> u64 {
        0
    }
}
