//! Image compositing space.
//!
//! The composer keeps every source image it has been given at its true
//! extent, in the layer's CRS, and renders arbitrary sub-regions of that
//! space into render targets. Overlaps resolve by resolution: finer images
//! are drawn over coarser ones, newer over older at equal resolution.

mod image;
mod preprocess;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use foundation::crs::Crs;
use foundation::extent::{Extent, ExtentError};
use foundation::ids::NodeId;
use foundation::math::Projection;
use foundation::time::Time;
use gpu::{DrawItem, MinMax, Mesh, RenderTarget, Texture, draw, fill_no_data};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::interpretation::Interpretation;
use crate::source::ImageResult;
use image::{Image, z_order};
use preprocess::Preprocessing;

pub const DEFAULT_MESH_SEGMENTS: u32 = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposerError {
    #[error("composer has been disposed")]
    Disposed,
    #[error("cannot reproject image `{id}` from {from} to {to}")]
    Reprojection { id: String, from: Crs, to: Crs },
    #[error(transparent)]
    Extent(#[from] ExtentError),
}

/// Handling of pixels equal to the source's no-data sentinel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoDataOptions {
    /// Fill holes in rendered textures from the nearest valid pixel.
    pub replace_no_data: bool,
    /// Search radius for filling, in CRS units. Unbounded when absent.
    pub max_search_distance: Option<f64>,
    /// Alpha given to filled pixels.
    pub alpha: f32,
    /// Sentinel value marking missing data in the first channel.
    pub value: Option<f32>,
}

fn default_mesh_segments() -> u32 {
    DEFAULT_MESH_SEGMENTS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposerOptions {
    pub source_crs: Crs,
    pub target_crs: Crs,
    #[serde(default)]
    pub compute_min_max: bool,
    #[serde(default)]
    pub no_data: NoDataOptions,
    #[serde(default)]
    pub interpretation: Interpretation,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default = "default_mesh_segments")]
    pub mesh_segments: u32,
    #[serde(default)]
    pub fade_duration_s: f64,
}

impl ComposerOptions {
    pub fn new(source_crs: Crs, target_crs: Crs) -> Self {
        Self {
            source_crs,
            target_crs,
            compute_min_max: false,
            no_data: NoDataOptions::default(),
            interpretation: Interpretation::raw(),
            flip_y: false,
            mesh_segments: DEFAULT_MESH_SEGMENTS,
            fade_duration_s: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderResult {
    /// False when required images were missing and the render is provisional.
    pub is_last_render: bool,
    pub min_max: Option<MinMax>,
    /// Some drawn image is still fading in.
    pub animating: bool,
}

/// An already rendered texture and the extent it covers.
#[derive(Debug, Clone, Copy)]
pub struct CopySource<'a> {
    pub texture: &'a Texture,
    pub extent: &'a Extent,
}

pub struct LayerComposer {
    options: ComposerOptions,
    projection: Rc<dyn Projection>,
    images: HashMap<String, Image>,
    sequence: u64,
    disposed: bool,
}

impl fmt::Debug for LayerComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerComposer")
            .field("options", &self.options)
            .field("images", &self.images.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl LayerComposer {
    pub fn new(options: ComposerOptions, projection: Rc<dyn Projection>) -> Self {
        Self {
            options,
            projection,
            images: HashMap::new(),
            sequence: 0,
            disposed: false,
        }
    }

    pub fn options(&self) -> &ComposerOptions {
        &self.options
    }

    fn check_alive(&self) -> Result<(), ComposerError> {
        if self.disposed {
            Err(ComposerError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Registers a source image. Returns `false` if the id is already known.
    ///
    /// Preprocessing (flip, no-data masking, interpretation) is realized
    /// here, once. Images in a CRS other than the target CRS are placed on a
    /// lattice whose vertices are reprojected one by one.
    pub fn add(&mut self, image: ImageResult, always_visible: bool) -> Result<bool, ComposerError> {
        self.check_alive()?;
        if self.images.contains_key(&image.id) {
            return Ok(false);
        }
        let ImageResult {
            id,
            extent,
            mut texture,
            min_max,
        } = image;

        let pass = Preprocessing {
            flip_y: self.options.flip_y,
            no_data: self.options.no_data.value,
            interpretation: self.options.interpretation,
        };
        if pass.is_needed() {
            pass.apply(&mut texture);
            trace!(%id, "image preprocessed");
        }

        let min_max = match min_max {
            Some(mm) => Some(mm),
            None if self.options.compute_min_max => {
                texture.value_range(self.options.no_data.value)
            }
            None => None,
        };
        texture.set_min_max(min_max);

        let target_crs = &self.options.target_crs;
        let (placed, mesh, reprojected) = if extent.crs() == target_crs {
            (extent.clone(), Mesh::rectangle(extent.bounds()), false)
        } else {
            let projection = &self.projection;
            let from = extent.crs();
            let mesh = Mesh::lattice(extent.bounds(), self.options.mesh_segments, |x, y| {
                projection.transform(from, target_crs, x, y)
            })
            .ok_or_else(|| ComposerError::Reprojection {
                id: id.clone(),
                from: from.clone(),
                to: target_crs.clone(),
            })?;
            let placed = Extent::from_bounds(target_crs.clone(), *mesh.bounds())?;
            (placed, mesh, true)
        };

        self.sequence += 1;
        debug!(%id, reprojected, always_visible, "image added");
        self.images.insert(
            id,
            Image {
                z: z_order(placed.width()),
                extent: placed,
                texture,
                mesh,
                reprojected,
                owners: BTreeSet::new(),
                min_max,
                always_visible,
                sequence: self.sequence,
                first_drawn: None,
            },
        );
        Ok(true)
    }

    pub fn has(&self, id: &str) -> bool {
        self.images.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn image_min_max(&self, id: &str) -> Option<MinMax> {
        self.images.get(id).and_then(|i| i.min_max)
    }

    pub fn owner_count(&self, id: &str) -> Option<usize> {
        self.images.get(id).map(|i| i.owners.len())
    }

    /// Memory held by image textures.
    pub fn byte_size(&self) -> usize {
        self.images.values().map(|i| i.texture.byte_size()).sum()
    }

    /// Marks `node` as depending on image `id`. Returns `false` if unknown.
    pub fn lock(&mut self, id: &str, node: NodeId) -> bool {
        match self.images.get_mut(id) {
            Some(image) => {
                image.owners.insert(node);
                true
            }
            None => false,
        }
    }

    /// Drops `node`'s claim on each image. Images left without owners are
    /// removed by the next [`cleanup`](Self::cleanup).
    pub fn unlock<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>, node: NodeId) {
        for id in ids {
            if let Some(image) = self.images.get_mut(id) {
                image.owners.remove(&node);
            }
        }
    }

    /// Deletes unowned images that are not always visible.
    pub fn cleanup(&mut self) -> usize {
        let before = self.images.len();
        self.images.retain(|id, image| {
            let keep = !image.is_orphan();
            if !keep {
                trace!(%id, reprojected = image.reprojected, "image deleted");
            }
            keep
        });
        let removed = before - self.images.len();
        if removed > 0 {
            debug!(removed, remaining = self.images.len(), "composer cleanup");
        }
        removed
    }

    /// Removes every image, including always-visible ones.
    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// Renders `extent` into `target`.
    ///
    /// If any of `image_ids` is missing (or `is_fallback_mode` is set) the
    /// render is provisional: always-visible images overlapping `extent` are
    /// drawn as well, so the result is never blank when data exists.
    pub fn render(
        &mut self,
        extent: &Extent,
        target: &mut RenderTarget,
        image_ids: &[String],
        is_fallback_mode: bool,
        now: Time,
    ) -> Result<RenderResult, ComposerError> {
        self.check_alive()?;
        let fallback = is_fallback_mode || image_ids.iter().any(|id| !self.images.contains_key(id));
        let required: BTreeSet<&str> = image_ids.iter().map(String::as_str).collect();

        let mut selected: Vec<&str> = self
            .images
            .iter()
            .filter(|(id, image)| {
                image.extent.intersects_extent(extent)
                    && (required.contains(id.as_str()) || (fallback && image.always_visible))
            })
            .map(|(id, _)| id.as_str())
            .collect();
        selected.sort_by_key(|id| self.images[*id].draw_key());
        let selected: Vec<String> = selected.into_iter().map(str::to_owned).collect();

        let fade = self.options.fade_duration_s;
        let mut animating = false;
        let mut opacities = Vec::with_capacity(selected.len());
        for id in &selected {
            if let Some(image) = self.images.get_mut(id) {
                let opacity = image.opacity(now, fade);
                animating |= opacity < 1.0;
                opacities.push(opacity);
            }
        }

        let items: Vec<DrawItem<'_>> = selected
            .iter()
            .zip(&opacities)
            .filter_map(|(id, &opacity)| {
                self.images.get(id).map(|image| DrawItem {
                    mesh: &image.mesh,
                    texture: &image.texture,
                    opacity,
                })
            })
            .collect();

        let texture = target.texture_mut();
        texture.clear([0.0; 4]);
        draw(texture, extent.bounds(), &items);

        let min_max = if self.options.compute_min_max {
            let overlapping = |image: &Image| image.extent.intersects_extent(extent);
            MinMax::union_all(
                self.images
                    .iter()
                    .filter(|(id, image)| required.contains(id.as_str()) && overlapping(image))
                    .filter_map(|(_, image)| image.min_max),
            )
            .or_else(|| {
                MinMax::union_all(
                    self.images
                        .values()
                        .filter(|image| overlapping(image))
                        .filter_map(|image| image.min_max),
                )
            })
        } else {
            None
        };

        let no_data = &self.options.no_data;
        if no_data.replace_no_data {
            let radius_px = match no_data.max_search_distance {
                Some(d) if extent.width() > 0.0 => d / extent.width() * f64::from(texture.width()),
                Some(_) => 0.0,
                None => f64::INFINITY,
            };
            let filled = fill_no_data(texture, radius_px, no_data.alpha);
            trace!(filled, radius_px, "no-data filled");
        }
        texture.set_min_max(min_max);

        Ok(RenderResult {
            is_last_render: !fallback,
            min_max,
            animating,
        })
    }

    /// Stretches already rendered textures into `dest`, which covers
    /// `target_extent`. Used to show an ancestor's texture on a child.
    pub fn copy(
        &self,
        sources: &[CopySource<'_>],
        dest: &mut RenderTarget,
        target_extent: &Extent,
    ) -> Result<Option<MinMax>, ComposerError> {
        self.check_alive()?;
        let meshes: Vec<Mesh> = sources
            .iter()
            .map(|s| Mesh::rectangle(s.extent.bounds()))
            .collect();
        let items: Vec<DrawItem<'_>> = sources
            .iter()
            .zip(&meshes)
            .map(|(s, mesh)| DrawItem {
                mesh,
                texture: s.texture,
                opacity: 1.0,
            })
            .collect();

        let texture = dest.texture_mut();
        texture.clear([0.0; 4]);
        draw(texture, target_extent.bounds(), &items);
        let min_max = MinMax::union_all(sources.iter().filter_map(|s| s.texture.min_max()));
        texture.set_min_max(min_max);
        Ok(min_max)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Frees every image. Disposing twice is an error.
    pub fn dispose(&mut self) -> Result<(), ComposerError> {
        self.check_alive()?;
        self.images.clear();
        self.disposed = true;
        Ok(())
    }
}
