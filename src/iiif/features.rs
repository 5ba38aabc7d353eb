//! The operation subset this server advertises and accepts.
//!
//! Feature names follow the IIIF Image API 2.1 `supports` vocabulary. A
//! request whose segments require a disabled feature is rejected before any
//! image work happens, and the handler answers 501.

use super::url::{Format, Quality, Region, Rotation, Size, Url};

/// The IIIF Image API 2.1 level-2 compliance profile.
pub const COMPLIANCE_LEVEL_2: &str = "http://iiif.io/api/image/2/level2.json";

/// Feature toggles plus the supported output formats and qualities.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub region_by_px: bool,
    pub region_by_pct: bool,
    pub region_square: bool,

    pub size_by_w: bool,
    pub size_by_h: bool,
    pub size_by_pct: bool,
    pub size_by_wh: bool,
    pub size_by_confined_wh: bool,
    pub size_above_full: bool,

    pub rotation_by_90s: bool,
    pub rotation_arbitrary: bool,
    pub mirroring: bool,

    pub base_uri_redirect: bool,
    pub cors: bool,
    pub jsonld_media_type: bool,

    formats: Vec<Format>,
    qualities: Vec<Quality>,
    compliance: &'static str,
}

impl FeatureSet {
    /// Everything this build can actually do.
    ///
    /// JP2 and PDF output have no encoder, so those formats are not
    /// advertised, and requests for them fail the support check. Arbitrary
    /// rotation is off: the transform pipeline only remaps pixels.
    pub fn all() -> Self {
        FeatureSet {
            region_by_px: true,
            region_by_pct: true,
            region_square: true,
            size_by_w: true,
            size_by_h: true,
            size_by_pct: true,
            size_by_wh: true,
            size_by_confined_wh: true,
            size_above_full: true,
            rotation_by_90s: true,
            rotation_arbitrary: false,
            mirroring: true,
            base_uri_redirect: true,
            cors: true,
            jsonld_media_type: true,
            formats: vec![Format::Jpg, Format::Png, Format::Gif, Format::Tif, Format::Webp],
            qualities: vec![Quality::Color, Quality::Gray, Quality::Bitonal, Quality::Default],
            compliance: COMPLIANCE_LEVEL_2,
        }
    }

    pub fn compliance(&self) -> &'static str {
        self.compliance
    }

    pub fn format_names(&self) -> Vec<String> {
        self.formats.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn quality_names(&self) -> Vec<String> {
        self.qualities.iter().map(|q| q.name().to_string()).collect()
    }

    /// True when every segment of the URL only needs enabled features.
    pub fn supported(&self, u: &Url) -> bool {
        if u.info {
            return true;
        }
        self.region_supported(&u.region)
            && self.size_supported(&u.size)
            && self.rotation_supported(&u.rotation)
            && self.qualities.contains(&u.quality)
            && self.formats.contains(&u.format)
    }

    fn region_supported(&self, region: &Region) -> bool {
        match region {
            Region::Full => true,
            Region::Square => self.region_square,
            Region::Absolute { .. } => self.region_by_px,
            Region::Percent { .. } => self.region_by_pct,
        }
    }

    fn size_supported(&self, size: &Size) -> bool {
        match size {
            Size::Full | Size::Max => true,
            Size::Width(_) => self.size_by_w,
            Size::Height(_) => self.size_by_h,
            Size::Exact(..) => self.size_by_wh,
            Size::BestFit(..) => self.size_by_confined_wh,
            Size::Percent(p) => self.size_by_pct && (*p <= 100.0 || self.size_above_full),
        }
    }

    fn rotation_supported(&self, rotation: &Rotation) -> bool {
        if rotation.mirror && !self.mirroring {
            return false;
        }
        rotation.degrees == 0 || self.rotation_by_90s
    }

    /// The enabled feature tokens, for the info document's profile.
    pub fn supports_tokens(&self) -> Vec<String> {
        let flags = [
            (self.base_uri_redirect, "baseUriRedirect"),
            (self.cors, "cors"),
            (self.jsonld_media_type, "jsonldMediaType"),
            (self.mirroring, "mirroring"),
            (self.region_by_pct, "regionByPct"),
            (self.region_by_px, "regionByPx"),
            (self.region_square, "regionSquare"),
            (self.rotation_arbitrary, "rotationArbitrary"),
            (self.rotation_by_90s, "rotationBy90s"),
            (self.size_above_full, "sizeAboveFull"),
            (self.size_by_confined_wh, "sizeByConfinedWh"),
            (self.size_by_h, "sizeByH"),
            (self.size_by_pct, "sizeByPct"),
            (self.size_by_w, "sizeByW"),
            (self.size_by_wh, "sizeByWh"),
        ];
        flags
            .iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, name)| name.to_string())
            .collect()
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        FeatureSet::all()
    }
}

// =============================================================================
// Tests
// =============================================================================
