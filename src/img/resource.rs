//! The request orchestrator: pick a decoder for a resource, resolve the
//! IIIF operations into concrete pixel boxes, and run the decode and
//! transform stages.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::error::ImageError;
use crate::iiif::{Id, Region, Size, Url};

use super::{default_decoders, transform, Constraint, Decoder, ImageInfo, Rect};

/// An open image resource bound to one request.
#[derive(Debug)]
pub struct Resource {
    pub id: Id,
    pub file_path: PathBuf,
    pub decoder: Box<dyn Decoder>,
}

impl Resource {
    /// Open the file at `path` with the first decoder that claims its suffix.
    pub fn new(id: Id, path: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let path = path.into();
        if !path.is_file() {
            return Err(ImageError::DoesNotExist);
        }
        for open in default_decoders() {
            match open(&path) {
                Ok(decoder) => {
                    return Ok(Resource { id, file_path: path, decoder });
                }
                Err(ImageError::NotHandled) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ImageError::InvalidFiletype)
    }

    /// Metadata snapshot for info documents and the info cache.
    pub fn image_info(&self) -> ImageInfo {
        self.decoder.image_info()
    }

    /// Apply a parsed command URL under the given constraint.
    ///
    /// Consumes the resource: decoders are single-use.
    pub fn apply(mut self, url: &Url, max: Constraint) -> Result<DynamicImage, ImageError> {
        let max = max.normalized();
        let (src_w, src_h) = (self.decoder.width(), self.decoder.height());

        let region = resolve_region(&url.region, src_w, src_h)?;
        let (out_w, out_h) = resolve_size(&url.size, region.w, region.h);
        if !max.allows(out_w, out_h) {
            return Err(ImageError::DimensionsExceedLimits);
        }

        self.decoder.set_crop(region);
        self.decoder.set_resize(out_w, out_h);
        let decoded = self.decoder.decode_image()?;

        let scaled = transform::scale(&decoded, out_w, out_h);
        let mirrored = if url.rotation.mirror {
            transform::mirror(&scaled)
        } else {
            scaled
        };
        let rotated = transform::rotate(&mirrored, url.rotation.degrees);
        Ok(transform::apply_quality(&rotated, url.quality))
    }
}

/// Resolve an IIIF region against the level-0 dimensions.
///
/// Percent boxes round half-even; every box is clipped to the image. A box
/// entirely outside the image is a decode error, the same failure the codec
/// reports when it refuses a decode area.
pub fn resolve_region(region: &Region, width: u32, height: u32) -> Result<Rect, ImageError> {
    let rect = match *region {
        Region::Full => Rect::full(width, height),
        Region::Square => {
            let side = width.min(height);
            Rect::new((width - side) / 2, (height - side) / 2, side, side)
        }
        Region::Absolute { x, y, w, h } => Rect::new(x, y, w, h),
        Region::Percent { x, y, w, h } => {
            let to_px = |pct: f64, dim: u32| (pct / 100.0 * dim as f64).round_ties_even() as u32;
            Rect::new(to_px(x, width), to_px(y, height), to_px(w, width), to_px(h, height))
        }
    };
    let clipped = rect.intersect(width, height);
    if clipped.is_empty() {
        return Err(ImageError::Decode("region is outside the image".to_string()));
    }
    Ok(clipped)
}

/// Resolve an IIIF size against the region dimensions.
///
/// Outputs are always at least one pixel on a side.
pub fn resolve_size(size: &Size, region_w: u32, region_h: u32) -> (u32, u32) {
    let round = |v: f64| (v.round() as u32).max(1);
    match *size {
        Size::Full | Size::Max => (region_w, region_h),
        Size::Exact(w, h) => (w, h),
        Size::Width(w) => transform::fill_aspect(region_w, region_h, w, 0),
        Size::Height(h) => transform::fill_aspect(region_w, region_h, 0, h),
        Size::BestFit(w, h) => {
            let scale = (w as f64 / region_w as f64).min(h as f64 / region_h as f64);
            (
                round(region_w as f64 * scale).min(w),
                round(region_h as f64 * scale).min(h),
            )
        }
        Size::Percent(p) => (
            round(region_w as f64 * p / 100.0),
            round(region_h as f64 * p / 100.0),
        ),
    }
}

/// Convenience used by the serving layer for probe-only opens.
pub fn read_image_info(id: Id, path: &Path) -> Result<ImageInfo, ImageError> {
    Ok(Resource::new(id, path)?.image_info())
}

// =============================================================================
// Tests
// =============================================================================
