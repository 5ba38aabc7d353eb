//! A read-only image server implementing the IIIF Image API 2.x.
//!
//! Serves pyramidal JPEG 2000 assets (and common raster formats) over HTTP,
//! performing on-demand region extraction, scaling, rotation, mirroring,
//! quality conversion, and re-encoding to the requested output format.

pub mod config;
pub mod encode;
pub mod error;
pub mod iiif;
pub mod img;
pub mod openjpeg;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use encode::encode_image;
pub use error::{ImageError, InvalidSyntax};
pub use iiif::{
    build_info, FeatureSet, Format, Id, Info, Profile, Quality, Region, Rotation, Size, TileSize,
    Url,
};
pub use img::{Constraint, Decoder, ImageInfo, Rect, Resource};
pub use openjpeg::{reduction_factor, Jp2Decoder};
pub use server::{
    cache_key, create_router, CacheStats, ErrorResponse, HandlerError, IdResolver, ImageHandler,
    InfoCache, Resolution, TileCache,
};
