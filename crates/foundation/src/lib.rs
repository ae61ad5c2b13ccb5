pub mod bounds;
pub mod crs;
pub mod extent;
pub mod ids;
pub mod math;
pub mod offset_scale;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use crs::*;
pub use extent::*;
pub use ids::*;
pub use offset_scale::*;
pub use time::*;
