//! IIIF Image API 2.1 request model: URL grammar, feature matrix, and the
//! info.json document.

pub mod features;
pub mod info;
pub mod url;

pub use features::{FeatureSet, COMPLIANCE_LEVEL_2};
pub use info::{build_info, Info, Profile, TileSize};
pub use url::{Format, Id, Quality, Region, Rotation, Size, Url};
