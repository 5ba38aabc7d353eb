//! General raster decoder for TIFF/PNG/JPG/GIF sources.
//!
//! Backed by the `image` crate. These sources are single-level and untiled;
//! the decoder crops during decode and leaves exact scaling to the transform
//! pipeline.

use std::io;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};

use crate::error::ImageError;

use super::{Decoder, Rect};

#[derive(Debug)]
pub struct RasterDecoder {
    path: PathBuf,
    width: u32,
    height: u32,
    crop: Rect,
}

impl RasterDecoder {
    /// Open a raster file and read its dimensions without a full decode.
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        let reader = ImageReader::open(path).map_err(open_error)?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        Ok(RasterDecoder {
            path: path.to_path_buf(),
            width,
            height,
            crop: Rect::full(width, height),
        })
    }
}

fn open_error(e: io::Error) -> ImageError {
    if e.kind() == io::ErrorKind::NotFound {
        ImageError::DoesNotExist
    } else {
        ImageError::Decode(e.to_string())
    }
}

impl Decoder for RasterDecoder {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn tile_width(&self) -> u32 {
        0
    }

    fn tile_height(&self) -> u32 {
        0
    }

    fn levels(&self) -> u32 {
        1
    }

    fn set_crop(&mut self, region: Rect) {
        self.crop = region.intersect(self.width, self.height);
    }

    fn set_resize(&mut self, _width: u32, _height: u32) {
        // Single-level sources have no cheaper resolution to decode at; the
        // transform pipeline performs the scale.
    }

    fn decode_image(&mut self) -> Result<DynamicImage, ImageError> {
        if self.crop.is_empty() {
            return Err(ImageError::Decode("region is outside the image".to_string()));
        }
        let img = ImageReader::open(&self.path)
            .map_err(open_error)?
            .decode()
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        Ok(super::transform::crop(&img, self.crop))
    }
}

// =============================================================================
// Tests
// =============================================================================
