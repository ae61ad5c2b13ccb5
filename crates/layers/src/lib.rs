pub mod color_map;
pub mod composer;
pub mod context;
pub mod interpretation;
pub mod layer;
pub mod mask;
pub mod node;
pub mod options;
pub mod raster;
pub mod source;
pub mod symbology;
pub mod target;
pub mod terrain;
pub mod update_state;
pub mod variant;

#[cfg(test)]
mod testing;

pub use color_map::*;
pub use composer::*;
pub use context::*;
pub use interpretation::*;
pub use layer::*;
pub use mask::*;
pub use node::*;
pub use options::*;
pub use raster::*;
pub use source::*;
pub use symbology::*;
pub use target::*;
pub use terrain::*;
pub use update_state::*;
pub use variant::*;
