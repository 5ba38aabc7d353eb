//! Pixel-buffer transform stages.
//!
//! Stage order is fixed: crop, scale, mirror, rotate, quality. Mirroring
//! happens before rotation, so the composition is `rotate ∘ mirror`. Every
//! stage is a pure function returning a new buffer.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};

use crate::iiif::Quality;

use super::Rect;

/// The resample filter used for exact scaling. Separable and deterministic.
const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

/// Cut the region out of the buffer. No-op when the rectangle covers the
/// whole image (decoders usually crop during decode).
pub fn crop(img: &DynamicImage, region: Rect) -> DynamicImage {
    if region == Rect::full(img.width(), img.height()) {
        img.clone()
    } else {
        img.crop_imm(region.x, region.y, region.w, region.h)
    }
}

/// Scale to exactly `(width, height)`. A zero dimension is completed from
/// the other so the output aspect ratio stays as close to the input's as
/// integer pixels allow.
pub fn scale(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (ow, oh) = fill_aspect(img.width(), img.height(), width, height);
    if (ow, oh) == img.dimensions() {
        img.clone()
    } else {
        img.resize_exact(ow, oh, RESAMPLE_FILTER)
    }
}

/// Complete a zero output dimension from the source aspect ratio.
///
/// Outputs are at least one pixel in either direction; both dimensions zero
/// means "native size".
pub fn fill_aspect(src_w: u32, src_h: u32, out_w: u32, out_h: u32) -> (u32, u32) {
    match (out_w, out_h) {
        (0, 0) => (src_w, src_h),
        (0, h) => {
            let w = (h as f64 * src_w as f64 / src_h as f64).round() as u32;
            (w.max(1), h)
        }
        (w, 0) => {
            let h = (w as f64 * src_h as f64 / src_w as f64).round() as u32;
            (w, h.max(1))
        }
        (w, h) => (w, h),
    }
}

/// Horizontal flip.
pub fn mirror(img: &DynamicImage) -> DynamicImage {
    img.fliph()
}

/// Rotate by a right angle about the image center. A pure pixel remap.
pub fn rotate(img: &DynamicImage, degrees: u16) -> DynamicImage {
    match degrees {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img.clone(),
    }
}

/// Rec. 601 luma for an 8-bit RGB pixel.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8
}

/// Convert to 8-bit gray using Rec. 601 luma.
pub fn grayscale(img: &DynamicImage) -> DynamicImage {
    let rgb = img.to_rgb8();
    let gray = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        image::Luma([luminance(p[0], p[1], p[2])])
    });
    DynamicImage::ImageLuma8(gray)
}

/// Luma thresholded at 128: values below become 0, the rest 255.
pub fn bitonal(img: &DynamicImage) -> DynamicImage {
    let rgb = img.to_rgb8();
    let bw = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        let v = if luminance(p[0], p[1], p[2]) < 128 { 0 } else { 255 };
        image::Luma([v])
    });
    DynamicImage::ImageLuma8(bw)
}

/// Apply the requested quality conversion.
pub fn apply_quality(img: &DynamicImage, quality: Quality) -> DynamicImage {
    match quality {
        Quality::Default | Quality::Color => img.clone(),
        Quality::Gray => grayscale(img),
        Quality::Bitonal => bitonal(img),
    }
}

// =============================================================================
// Tests
// =============================================================================
