//! IIIF Image API 2.1 URL grammar.
//!
//! A command request has the shape
//! `{id}/{region}/{size}/{rotation}/{quality}.{format}`; an info request is
//! `{id}/info.json`. Everything before the final four command segments is the
//! identifier, which may itself contain slashes when percent-escaped on the
//! wire.
//!
//! Parsing and serialization round-trip: for any valid `Url` `u`,
//! `Url::parse(&u.canonical_path())` reproduces `u` up to the canonical
//! escape form of the identifier.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::InvalidSyntax;

/// Characters escaped when emitting an identifier into a URI path segment.
const ID_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?');

// =============================================================================
// Identifier
// =============================================================================

/// An opaque image identifier, stored unescaped.
///
/// Equality is byte-exact on the unescaped form. Resolver plugins may rewrite
/// identifiers to local paths; the handler treats them as opaque keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id(String);

impl Id {
    pub fn new(raw: impl Into<String>) -> Self {
        Id(raw.into())
    }

    /// Decode a percent-escaped path segment into an identifier.
    ///
    /// Invalid UTF-8 after decoding keeps the escaped form so lookups still
    /// have a usable (if odd) key.
    pub fn from_escaped(segment: &str) -> Self {
        match percent_decode_str(segment).decode_utf8() {
            Ok(decoded) => Id(decoded.into_owned()),
            Err(_) => Id(segment.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The percent-escaped form used when emitting canonical URIs.
    pub fn escaped(&self) -> String {
        utf8_percent_encode(&self.0, ID_ESCAPE).to_string()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::new(s)
    }
}

// =============================================================================
// Region
// =============================================================================

/// The sub-rectangle of the source image to render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// The complete image.
    Full,
    /// A centered square whose side is the shorter image dimension.
    Square,
    /// A pixel-space box in level-0 coordinates.
    Absolute { x: u32, y: u32, w: u32, h: u32 },
    /// A box expressed in percentages of the level-0 dimensions.
    Percent { x: f64, y: f64, w: f64, h: f64 },
}

impl FromStr for Region {
    type Err = InvalidSyntax;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => return Ok(Region::Full),
            "square" => return Ok(Region::Square),
            _ => {}
        }

        if let Some(rest) = s.strip_prefix("pct:") {
            let [x, y, w, h] = parse_quad::<f64>(rest, s)?;
            if !(x >= 0.0 && y >= 0.0 && w > 0.0 && h > 0.0) {
                return Err(InvalidSyntax::new(format!(
                    "region {s:?} must have a positive width and height"
                )));
            }
            return Ok(Region::Percent { x, y, w, h });
        }

        let [x, y, w, h] = parse_quad::<u32>(s, s)?;
        if w == 0 || h == 0 {
            return Err(InvalidSyntax::new(format!(
                "region {s:?} must have a positive width and height"
            )));
        }
        Ok(Region::Absolute { x, y, w, h })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Full => f.write_str("full"),
            Region::Square => f.write_str("square"),
            Region::Absolute { x, y, w, h } => write!(f, "{x},{y},{w},{h}"),
            Region::Percent { x, y, w, h } => write!(f, "pct:{x},{y},{w},{h}"),
        }
    }
}

fn parse_quad<T: FromStr>(csv: &str, original: &str) -> Result<[T; 4], InvalidSyntax> {
    let mut parts = csv.split(',');
    let mut out = Vec::with_capacity(4);
    for _ in 0..4 {
        let part = parts
            .next()
            .ok_or_else(|| InvalidSyntax::new(format!("region {original:?} needs four values")))?;
        out.push(part.parse::<T>().map_err(|_| {
            InvalidSyntax::new(format!("region {original:?} has a malformed value {part:?}"))
        })?);
    }
    if parts.next().is_some() {
        return Err(InvalidSyntax::new(format!(
            "region {original:?} has too many values"
        )));
    }
    out.try_into()
        .map_err(|_| InvalidSyntax::new(format!("region {original:?} needs four values")))
}

// =============================================================================
// Size
// =============================================================================

/// The requested output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Size {
    /// `full`: the extracted region at its native size (deprecated alias of `max`).
    Full,
    /// `max`: the extracted region at its native size, within server maximums.
    Max,
    /// `w,`: fixed width, height follows the aspect ratio.
    Width(u32),
    /// `,h`: fixed height, width follows the aspect ratio.
    Height(u32),
    /// `w,h`: exact output dimensions, aspect ratio not preserved.
    Exact(u32, u32),
    /// `!w,h`: best fit inside the box, aspect ratio preserved.
    BestFit(u32, u32),
    /// `pct:p`: the region scaled by p percent (> 0).
    Percent(f64),
}

impl FromStr for Size {
    type Err = InvalidSyntax;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => return Ok(Size::Full),
            "max" => return Ok(Size::Max),
            _ => {}
        }

        if let Some(rest) = s.strip_prefix("pct:") {
            let pct: f64 = rest
                .parse()
                .map_err(|_| InvalidSyntax::new(format!("size {s:?} has a malformed percentage")))?;
            if !(pct > 0.0) {
                return Err(InvalidSyntax::new(format!("size {s:?} must be positive")));
            }
            return Ok(Size::Percent(pct));
        }

        let (best_fit, dims) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (ws, hs) = dims
            .split_once(',')
            .ok_or_else(|| InvalidSyntax::new(format!("size {s:?} is not a recognized form")))?;
        let parse_dim = |txt: &str| -> Result<u32, InvalidSyntax> {
            let v: u32 = txt
                .parse()
                .map_err(|_| InvalidSyntax::new(format!("size {s:?} has a malformed value")))?;
            if v == 0 {
                return Err(InvalidSyntax::new(format!("size {s:?} must be positive")));
            }
            Ok(v)
        };

        match (ws.is_empty(), hs.is_empty()) {
            (true, true) => Err(InvalidSyntax::new(format!(
                "size {s:?} needs at least one dimension"
            ))),
            (false, true) if !best_fit => Ok(Size::Width(parse_dim(ws)?)),
            (true, false) if !best_fit => Ok(Size::Height(parse_dim(hs)?)),
            (false, false) => {
                let (w, h) = (parse_dim(ws)?, parse_dim(hs)?);
                if best_fit {
                    Ok(Size::BestFit(w, h))
                } else {
                    Ok(Size::Exact(w, h))
                }
            }
            _ => Err(InvalidSyntax::new(format!(
                "size {s:?} is not a recognized form"
            ))),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Full => f.write_str("full"),
            Size::Max => f.write_str("max"),
            Size::Width(w) => write!(f, "{w},"),
            Size::Height(h) => write!(f, ",{h}"),
            Size::Exact(w, h) => write!(f, "{w},{h}"),
            Size::BestFit(w, h) => write!(f, "!{w},{h}"),
            Size::Percent(p) => write!(f, "pct:{p}"),
        }
    }
}

// =============================================================================
// Rotation
// =============================================================================

/// Mirroring plus rotation in right angles.
///
/// Arbitrary angles are rejected at parse time; the transform pipeline only
/// performs pure pixel remaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub mirror: bool,
    /// One of 0, 90, 180, 270.
    pub degrees: u16,
}

impl FromStr for Rotation {
    type Err = InvalidSyntax;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mirror, rest) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let degrees: u16 = rest
            .parse()
            .map_err(|_| InvalidSyntax::new(format!("rotation {s:?} is malformed")))?;
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(InvalidSyntax::new(format!(
                "rotation {s:?} is not a multiple of 90 degrees below 360"
            )));
        }
        Ok(Rotation { mirror, degrees })
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mirror {
            write!(f, "!{}", self.degrees)
        } else {
            write!(f, "{}", self.degrees)
        }
    }
}

// =============================================================================
// Quality and Format
// =============================================================================

/// The requested pixel quality conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    Color,
    Gray,
    Bitonal,
    Default,
}

impl Quality {
    pub fn name(&self) -> &'static str {
        match self {
            Quality::Color => "color",
            Quality::Gray => "gray",
            Quality::Bitonal => "bitonal",
            Quality::Default => "default",
        }
    }
}

impl FromStr for Quality {
    type Err = InvalidSyntax;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "color" => Ok(Quality::Color),
            "gray" => Ok(Quality::Gray),
            "bitonal" => Ok(Quality::Bitonal),
            "default" => Ok(Quality::Default),
            _ => Err(InvalidSyntax::new(format!("unknown quality {s:?}"))),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The requested output format, selected by the URL's filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Jpg,
    Png,
    Gif,
    Tif,
    Jp2,
    Pdf,
    Webp,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Jpg => "jpg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Tif => "tif",
            Format::Jp2 => "jp2",
            Format::Pdf => "pdf",
            Format::Webp => "webp",
        }
    }

    /// The Content-Type sent with an encoded response body.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Jpg => "image/jpeg",
            Format::Png => "image/png",
            Format::Gif => "image/gif",
            Format::Tif => "image/tiff",
            Format::Jp2 => "image/jp2",
            Format::Pdf => "application/pdf",
            Format::Webp => "image/webp",
        }
    }
}

impl FromStr for Format {
    type Err = InvalidSyntax;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpg" => Ok(Format::Jpg),
            "png" => Ok(Format::Png),
            "gif" => Ok(Format::Gif),
            "tif" => Ok(Format::Tif),
            "jp2" => Ok(Format::Jp2),
            "pdf" => Ok(Format::Pdf),
            "webp" => Ok(Format::Webp),
            _ => Err(InvalidSyntax::new(format!("unknown format {s:?}"))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Url
// =============================================================================

/// A parsed IIIF request.
///
/// Info requests carry default command segments; `info` distinguishes the two
/// shapes. `path` preserves the request path as received (sans any prefix) and
/// doubles as the tile cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct Url {
    pub id: Id,
    pub info: bool,
    pub region: Region,
    pub size: Size,
    pub rotation: Rotation,
    pub quality: Quality,
    pub format: Format,
    pub path: String,
}

impl Url {
    /// Parse a prefix-stripped request path.
    pub fn parse(path: &str) -> Result<Url, InvalidSyntax> {
        let trimmed = path.trim_start_matches('/');

        if let Some(id_part) = trimmed.strip_suffix("/info.json") {
            if id_part.is_empty() {
                return Err(InvalidSyntax::new("missing identifier"));
            }
            return Ok(Url {
                id: Id::from_escaped(id_part),
                info: true,
                region: Region::Full,
                size: Size::Max,
                rotation: Rotation { mirror: false, degrees: 0 },
                quality: Quality::Default,
                format: Format::Jpg,
                path: trimmed.to_string(),
            });
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() < 5 {
            return Err(InvalidSyntax::new(
                "expected {id}/{region}/{size}/{rotation}/{quality}.{format}",
            ));
        }

        let tail = segments.len() - 4;
        let id_part = segments[..tail].join("/");
        if id_part.is_empty() {
            return Err(InvalidSyntax::new("missing identifier"));
        }

        let (quality_part, format_part) = segments[tail + 3]
            .rsplit_once('.')
            .ok_or_else(|| InvalidSyntax::new("missing format suffix"))?;

        Ok(Url {
            id: Id::from_escaped(&id_part),
            info: false,
            region: segments[tail].parse()?,
            size: segments[tail + 1].parse()?,
            rotation: segments[tail + 2].parse()?,
            quality: quality_part.parse()?,
            format: format_part.parse()?,
            path: trimmed.to_string(),
        })
    }

    /// The canonical path for this request, with the identifier escaped.
    pub fn canonical_path(&self) -> String {
        if self.info {
            format!("{}/info.json", self.id.escaped())
        } else {
            format!(
                "{}/{}/{}/{}/{}.{}",
                self.id.escaped(),
                self.region,
                self.size,
                self.rotation,
                self.quality,
                self.format
            )
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
