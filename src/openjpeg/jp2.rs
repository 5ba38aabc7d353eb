//! JPEG 2000 decoding through libopenjp2.
//!
//! The decoder reads codestream metadata once at open, then performs a single
//! streamed decode: pick the deepest resolution level that still covers the
//! requested output, restrict the codec to the requested region in level-0
//! coordinates, and convert the codec-owned component planes into a pixel
//! buffer. Codec, stream, and image handles are RAII-wrapped so they are
//! released on every exit path.

use std::ffi::{c_char, c_void, CStr};
use std::fs::File;
use std::io::{self, BufReader};
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr;

use image::{DynamicImage, GrayImage, RgbImage};
use openjpeg_sys as opj;
use tracing::{debug, error, warn};

use crate::error::ImageError;
use crate::img::{transform, Decoder, Rect};

use super::stream::Stream;

// =============================================================================
// RAII wrappers
// =============================================================================

struct Codec(*mut opj::opj_codec_t);

impl Codec {
    fn decompressor() -> Result<Self, ImageError> {
        let raw = unsafe { opj::opj_create_decompress(opj::OPJ_CODEC_FORMAT::OPJ_CODEC_JP2) };
        if raw.is_null() {
            return Err(ImageError::Decode("unable to create codec".to_string()));
        }
        unsafe {
            opj::opj_set_info_handler(raw, Some(msg_info), ptr::null_mut());
            opj::opj_set_warning_handler(raw, Some(msg_warning), ptr::null_mut());
            opj::opj_set_error_handler(raw, Some(msg_error), ptr::null_mut());
        }
        Ok(Codec(raw))
    }
}

impl Drop for Codec {
    fn drop(&mut self) {
        unsafe { opj::opj_destroy_codec(self.0) };
    }
}

struct OwnedImage(*mut opj::opj_image_t);

impl Drop for OwnedImage {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { opj::opj_image_destroy(self.0) };
        }
    }
}

unsafe extern "C" fn msg_info(msg: *const c_char, _client_data: *mut c_void) {
    if let Ok(s) = CStr::from_ptr(msg).to_str() {
        debug!(target: "openjpeg", "{}", s.trim_end());
    }
}

unsafe extern "C" fn msg_warning(msg: *const c_char, _client_data: *mut c_void) {
    if let Ok(s) = CStr::from_ptr(msg).to_str() {
        warn!(target: "openjpeg", "{}", s.trim_end());
    }
}

unsafe extern "C" fn msg_error(msg: *const c_char, _client_data: *mut c_void) {
    if let Ok(s) = CStr::from_ptr(msg).to_str() {
        error!(target: "openjpeg", "{}", s.trim_end());
    }
}

// =============================================================================
// Reduction selection
// =============================================================================

/// Deepest reduction level whose dimensions still cover the requested output.
///
/// Level `r` has linear dimensions `1/2^r` of the source; the chosen level is
/// the largest `r` in `[0, levels)` with `src_w / 2^r >= out_w` and
/// `src_h / 2^r >= out_h`. The remaining downscale happens in the transform
/// pipeline.
pub fn reduction_factor(src_w: u32, src_h: u32, out_w: u32, out_h: u32, levels: u32) -> u32 {
    let mut r = 0;
    while r + 1 < levels {
        let next = r + 1;
        if (src_w >> next) >= out_w && (src_h >> next) >= out_h {
            r = next;
        } else {
            break;
        }
    }
    r
}

// =============================================================================
// Decoder
// =============================================================================

#[derive(Debug)]
pub struct Jp2Decoder {
    path: PathBuf,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    levels: u32,
    crop: Rect,
    resize: (u32, u32),
}

impl Jp2Decoder {
    /// Open a JP2 file and read its codestream metadata.
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        let stream = open_stream(path)?;
        let codec = Codec::decompressor()?;
        setup_decoder(&codec, 0)?;
        let image = read_header(&codec, &stream)?;

        let (width, height) = unsafe {
            let img = &*image.0;
            (img.x1 - img.x0, img.y1 - img.y0)
        };

        let (tile_width, tile_height, levels) = read_codestream_layout(&codec, width, height)?;

        Ok(Jp2Decoder {
            path: path.to_path_buf(),
            width,
            height,
            tile_width,
            tile_height,
            levels: levels.max(1),
            crop: Rect::full(width, height),
            resize: (0, 0),
        })
    }

    fn raw_decode(&self, reduce: u32) -> Result<OwnedImage, ImageError> {
        let stream = open_stream(&self.path)?;
        let codec = Codec::decompressor()?;
        setup_decoder(&codec, reduce)?;
        let image = read_header(&codec, &stream)?;

        // The codec takes the region in level-0 coordinates; a full-frame
        // request skips the call entirely.
        if self.crop != Rect::full(self.width, self.height) {
            let r = self.crop;
            let ok = unsafe {
                opj::opj_set_decode_area(
                    codec.0,
                    image.0,
                    r.x as i32,
                    r.y as i32,
                    (r.x + r.w) as i32,
                    (r.y + r.h) as i32,
                )
            };
            if ok == 0 {
                return Err(ImageError::Decode("failed to set the decode area".to_string()));
            }
        }

        let ok = unsafe {
            opj::opj_decode(codec.0, stream.as_ptr(), image.0) != 0
                && opj::opj_end_decompress(codec.0, stream.as_ptr()) != 0
        };
        if !ok {
            return Err(ImageError::Decode("failed to decode image".to_string()));
        }
        Ok(image)
    }
}

impl Decoder for Jp2Decoder {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn tile_width(&self) -> u32 {
        self.tile_width
    }

    fn tile_height(&self) -> u32 {
        self.tile_height
    }

    fn levels(&self) -> u32 {
        self.levels
    }

    fn set_crop(&mut self, region: Rect) {
        self.crop = region.intersect(self.width, self.height);
    }

    fn set_resize(&mut self, width: u32, height: u32) {
        self.resize = (width, height);
    }

    fn decode_image(&mut self) -> Result<DynamicImage, ImageError> {
        if self.crop.is_empty() {
            return Err(ImageError::Decode("region is outside the image".to_string()));
        }
        let (out_w, out_h) =
            transform::fill_aspect(self.crop.w, self.crop.h, self.resize.0, self.resize.1);
        let reduce = reduction_factor(self.crop.w, self.crop.h, out_w, out_h, self.levels);
        let image = self.raw_decode(reduce)?;
        unsafe { convert_image(&image) }
    }
}

// =============================================================================
// Pipeline steps
// =============================================================================

fn open_stream(path: &Path) -> Result<Stream, ImageError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ImageError::DoesNotExist
        } else {
            ImageError::Decode(e.to_string())
        }
    })?;
    let length = file
        .metadata()
        .map_err(|e| ImageError::Decode(e.to_string()))?
        .len();
    Stream::open(Box::new(BufReader::new(file)), length)
}

fn setup_decoder(codec: &Codec, reduce: u32) -> Result<(), ImageError> {
    unsafe {
        let mut parameters: opj::opj_dparameters_t = mem::zeroed();
        opj::opj_set_default_decoder_parameters(&mut parameters);
        parameters.cp_reduce = reduce;
        if opj::opj_setup_decoder(codec.0, &mut parameters) == 0 {
            return Err(ImageError::Decode("unable to setup decoder".to_string()));
        }
    }
    Ok(())
}

fn read_header(codec: &Codec, stream: &Stream) -> Result<OwnedImage, ImageError> {
    let mut image: *mut opj::opj_image_t = ptr::null_mut();
    let ok = unsafe { opj::opj_read_header(stream.as_ptr(), codec.0, &mut image) };
    if ok == 0 || image.is_null() {
        // Still destroy a partially allocated image.
        let _ = OwnedImage(image);
        return Err(ImageError::Decode("failed to read the header".to_string()));
    }
    Ok(OwnedImage(image))
}

/// Tile geometry and resolution count from the codestream info.
///
/// A single tile spanning the whole image is reported as untiled (0×0).
fn read_codestream_layout(codec: &Codec, width: u32, height: u32) -> Result<(u32, u32, u32), ImageError> {
    unsafe {
        let mut info = opj::opj_get_cstr_info(codec.0);
        if info.is_null() {
            return Err(ImageError::Decode("unable to read codestream info".to_string()));
        }
        let (tdx, tdy, tw, th) = ((*info).tdx, (*info).tdy, (*info).tw, (*info).th);
        let tccp = (*info).m_default_tile_info.tccp_info;
        let levels = if tccp.is_null() { 1 } else { (*tccp).numresolutions };
        opj::opj_destroy_cstr_info(&mut info);

        if tw <= 1 && th <= 1 && tdx >= width && tdy >= height {
            Ok((0, 0, levels))
        } else {
            Ok((tdx, tdy, levels))
        }
    }
}

fn sample_to_u8(value: i32, prec: u32, signed: u32) -> u8 {
    let v = if signed != 0 && prec > 0 {
        value + (1 << (prec - 1))
    } else {
        value
    };
    let v = if prec > 8 {
        v >> (prec - 8)
    } else if prec < 8 && prec > 0 {
        v << (8 - prec)
    } else {
        v
    };
    v.clamp(0, 255) as u8
}

/// Convert the codec-owned component planes into an 8-bit pixel buffer.
///
/// One or two components produce gray (any alpha plane is dropped); three or
/// four produce RGB. Component subsampling is not supported.
unsafe fn convert_image(image: &OwnedImage) -> Result<DynamicImage, ImageError> {
    let img = &*image.0;
    if img.numcomps == 0 || img.comps.is_null() {
        return Err(ImageError::Decode("image has no components".to_string()));
    }
    let comps = std::slice::from_raw_parts(img.comps, img.numcomps as usize);

    let (w, h) = (comps[0].w, comps[0].h);
    if w == 0 || h == 0 {
        return Err(ImageError::Decode("decoded image is empty".to_string()));
    }
    for c in comps {
        if c.w != w || c.h != h || c.data.is_null() {
            return Err(ImageError::Decode(
                "subsampled components are not supported".to_string(),
            ));
        }
    }

    let pixels = w as usize * h as usize;
    match img.numcomps {
        1 | 2 => {
            let plane = std::slice::from_raw_parts(comps[0].data, pixels);
            let mut buf = Vec::with_capacity(pixels);
            for &v in plane {
                buf.push(sample_to_u8(v, comps[0].prec, comps[0].sgnd));
            }
            GrayImage::from_raw(w, h, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ImageError::Decode("gray buffer size mismatch".to_string()))
        }
        3 | 4 => {
            let r = std::slice::from_raw_parts(comps[0].data, pixels);
            let g = std::slice::from_raw_parts(comps[1].data, pixels);
            let b = std::slice::from_raw_parts(comps[2].data, pixels);
            let mut buf = Vec::with_capacity(pixels * 3);
            for i in 0..pixels {
                buf.push(sample_to_u8(r[i], comps[0].prec, comps[0].sgnd));
                buf.push(sample_to_u8(g[i], comps[1].prec, comps[1].sgnd));
                buf.push(sample_to_u8(b[i], comps[2].prec, comps[2].sgnd));
            }
            RgbImage::from_raw(w, h, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ImageError::Decode("rgb buffer size mismatch".to_string()))
        }
        n => Err(ImageError::Decode(format!("unsupported component count {n}"))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduction_factor_full_size() {
        assert_eq!(reduction_factor(6000, 4000, 6000, 4000, 5), 0);
        assert_eq!(reduction_factor(6000, 4000, 5000, 4000, 5), 0);
    }

    #[test]
    fn test_reduction_factor_picks_deepest_covering_level() {
        // 6000/2 = 3000 >= 1500 and 4000/2 = 2000 >= 1000; one more halving
        // would fall below the request.
        assert_eq!(reduction_factor(6000, 4000, 1500, 1000, 5), 1);
        assert_eq!(reduction_factor(6000, 4000, 375, 250, 5), 4);
        assert_eq!(reduction_factor(6000, 4000, 100, 100, 5), 4);
    }

    #[test]
    fn test_reduction_factor_bounded_by_levels() {
        assert_eq!(reduction_factor(6000, 4000, 10, 10, 1), 0);
        assert_eq!(reduction_factor(6000, 4000, 10, 10, 3), 2);
    }

    #[test]
    fn test_reduction_factor_tightness() {
        // The chosen level covers the request, and the next one would not.
        for levels in 1..8u32 {
            for (ow, oh) in [(50, 50), (300, 200), (1024, 1024), (6000, 4000)] {
                let r = reduction_factor(6000, 4000, ow, oh, levels);
                assert!(6000 >> r >= ow);
                assert!(4000 >> r >= oh);
                assert!(
                    r + 1 >= levels || (6000 >> (r + 1)) < ow || (4000 >> (r + 1)) < oh,
                    "r={r} not maximal for {ow}x{oh} levels={levels}"
                );
            }
        }
    }

    #[test]
    fn test_sample_scaling() {
        assert_eq!(sample_to_u8(0, 8, 0), 0);
        assert_eq!(sample_to_u8(255, 8, 0), 255);
        assert_eq!(sample_to_u8(300, 8, 0), 255);
        assert_eq!(sample_to_u8(-5, 8, 0), 0);
        // 16-bit samples shift down to 8
        assert_eq!(sample_to_u8(0xFFFF, 16, 0), 255);
        assert_eq!(sample_to_u8(0x0100, 16, 0), 1);
        // 4-bit samples shift up
        assert_eq!(sample_to_u8(0xF, 4, 0), 240);
        // Signed samples are re-centered
        assert_eq!(sample_to_u8(-128, 8, 1), 0);
        assert_eq!(sample_to_u8(0, 8, 1), 128);
        assert_eq!(sample_to_u8(127, 8, 1), 255);
    }

    #[test]
    fn test_open_missing_file() {
        let err = Jp2Decoder::open(Path::new("/nonexistent/file.jp2")).unwrap_err();
        assert!(matches!(err, ImageError::DoesNotExist));
    }
}
