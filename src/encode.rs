//! Output encoding for rendered pixel buffers.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::error::ImageError;
use crate::iiif::Format;

/// Quality used for JPEG output.
const JPEG_QUALITY: u8 = 80;

/// Encode a pixel buffer into the requested output format.
///
/// JP2 and PDF output are not advertised by the feature set and have no
/// encoder here; asking for them is an encode failure rather than a panic in
/// case a caller bypasses the support check.
pub fn encode_image(img: &DynamicImage, format: Format) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        Format::Jpg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            encoder
                .encode_image(img)
                .map_err(|e| ImageError::Encode(e.to_string()))?;
        }
        Format::Png => write(img, &mut buf, ImageFormat::Png)?,
        Format::Tif => write(img, &mut buf, ImageFormat::Tiff)?,
        Format::Gif => {
            // The GIF encoder wants RGBA frames.
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            write(&rgba, &mut buf, ImageFormat::Gif)?;
        }
        Format::Webp => {
            // The (lossless) WebP encoder only takes 8-bit RGB/RGBA.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            write(&rgb, &mut buf, ImageFormat::WebP)?;
        }
        Format::Jp2 | Format::Pdf => {
            return Err(ImageError::Encode(format!(
                "no encoder for output format {format}"
            )));
        }
    }
    Ok(buf.into_inner())
}

fn write(
    img: &DynamicImage,
    buf: &mut Cursor<Vec<u8>>,
    format: ImageFormat,
) -> Result<(), ImageError> {
    img.write_to(buf, format)
        .map_err(|e| ImageError::Encode(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
