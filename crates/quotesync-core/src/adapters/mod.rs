//! Quote provider adapters.

mod polygon;

pub use polygon::{PolygonPriceSource, DEFAULT_POLYGON_BASE_URL};
