//! Image decoding, transformation, and the request orchestrator.

pub mod constraint;
pub mod raster;
pub mod resource;
pub mod transform;

pub use constraint::Constraint;
pub use resource::Resource;

use std::path::Path;

use image::DynamicImage;

use crate::error::ImageError;

// =============================================================================
// Geometry
// =============================================================================

/// A rectangle in source-image (level 0) pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Rect { x, y, w, h }
    }

    /// The full rectangle of an image with the given dimensions.
    pub fn full(width: u32, height: u32) -> Self {
        Rect { x: 0, y: 0, w: width, h: height }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Clip this rectangle against image bounds; out-of-range boxes collapse
    /// to empty.
    pub fn intersect(&self, width: u32, height: u32) -> Rect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Rect {
            x,
            y,
            w: self.w.min(width - x),
            h: self.h.min(height - y),
        }
    }
}

// =============================================================================
// Decoder metadata
// =============================================================================

/// The cacheable metadata a decoder reports for an open image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// 0 when the source is untiled.
    pub tile_width: u32,
    pub tile_height: u32,
    /// Resolution levels; level 0 is full size, each level halves linear dims.
    pub levels: u32,
}

// =============================================================================
// Decoder abstraction
// =============================================================================

/// An open, single-use image source.
///
/// A decoder is owned by the request that created it: configure the crop and
/// output size, then call `decode_image` once. The decoded raster is at least
/// as large as the requested output; the transform pipeline performs the
/// exact scale.
pub trait Decoder: Send + std::fmt::Debug {
    /// Level-0 width in pixels.
    fn width(&self) -> u32;

    /// Level-0 height in pixels.
    fn height(&self) -> u32;

    /// Native tile width, or 0 when untiled.
    fn tile_width(&self) -> u32;

    /// Native tile height, or 0 when untiled.
    fn tile_height(&self) -> u32;

    /// Resolution level count, at least 1.
    fn levels(&self) -> u32;

    /// Restrict decoding to a region in level-0 coordinates.
    fn set_crop(&mut self, region: Rect);

    /// Set the requested output size. Either dimension may be 0 to follow
    /// the region's aspect ratio.
    fn set_resize(&mut self, width: u32, height: u32);

    /// Decode the configured region into a pixel buffer.
    fn decode_image(&mut self) -> Result<DynamicImage, ImageError>;

    /// The metadata snapshot used for info documents and the info cache.
    fn image_info(&self) -> ImageInfo {
        ImageInfo {
            width: self.width(),
            height: self.height(),
            tile_width: self.tile_width(),
            tile_height: self.tile_height(),
            levels: self.levels(),
        }
    }
}

/// A decoder constructor. Returns `NotHandled` when the file's suffix is not
/// one the decoder claims, so dispatch can try the next entry.
pub type DecodeFn = fn(&Path) -> Result<Box<dyn Decoder>, ImageError>;

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// JPEG 2000 decoder constructor.
pub fn decode_jp2(path: &Path) -> Result<Box<dyn Decoder>, ImageError> {
    if !has_extension(path, &["jp2"]) {
        return Err(ImageError::NotHandled);
    }
    Ok(Box::new(crate::openjpeg::Jp2Decoder::open(path)?))
}

/// General raster decoder constructor for TIFF/PNG/JPG/GIF sources.
pub fn decode_raster(path: &Path) -> Result<Box<dyn Decoder>, ImageError> {
    if !has_extension(path, &["tif", "tiff", "png", "jpg", "jpeg", "gif"]) {
        return Err(ImageError::NotHandled);
    }
    Ok(Box::new(raster::RasterDecoder::open(path)?))
}

/// The decoder constructors tried, in order, for each resource.
pub fn default_decoders() -> &'static [DecodeFn] {
    &[decode_jp2, decode_raster]
}

// =============================================================================
// Tests
// =============================================================================
