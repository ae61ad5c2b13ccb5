use serde::{Deserialize, Serialize};

/// Name of a coordinate reference system, e.g. `EPSG:3857`.
///
/// CRS identity is by name; transform math lives behind
/// [`Projection`](crate::math::Projection).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(String);

impl Crs {
    pub const WGS84: &'static str = "EPSG:4326";
    pub const WEB_MERCATOR: &'static str = "EPSG:3857";

    pub fn new(name: impl Into<String>) -> Self {
        Crs(name.into())
    }

    pub fn wgs84() -> Self {
        Crs::new(Self::WGS84)
    }

    pub fn web_mercator() -> Self {
        Crs::new(Self::WEB_MERCATOR)
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
