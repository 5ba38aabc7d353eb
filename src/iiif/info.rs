//! The IIIF `info.json` document.
//!
//! The document's `profile` is a heterogeneous JSON array (a compliance URI
//! followed by a capabilities object), which rules out a plain derive;
//! `Profile` carries hand-written `Serialize`/`Deserialize` impls instead.
//! Deserialization also backs the info-override files, where a sibling
//! `{file}-info.json` replaces the generated document verbatim.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::img::{Constraint, ImageInfo};

use super::features::FeatureSet;

pub const CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
pub const PROTOCOL: &str = "http://iiif.io/api/image";

/// Viewers are not told about sizes below this many pixels on a side.
const MIN_ADVERTISED_DIMENSION: u32 = 16;

// =============================================================================
// Document model
// =============================================================================

/// A single advertised tile size with its scale factors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSize {
    pub width: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub height: Option<u32>,
    #[serde(rename = "scaleFactors")]
    pub scale_factors: Vec<u32>,
}

/// The info.json body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@id", default)]
    pub id: String,
    pub protocol: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tiles: Vec<TileSize>,
    pub profile: Profile,
}

/// The profile entry: compliance URI plus capabilities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Profile {
    pub compliance: String,
    pub formats: Vec<String>,
    pub qualities: Vec<String>,
    pub supports: Vec<String>,
    pub max_area: Option<u64>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl Profile {
    /// The constraint this profile imposes; absent fields are unbounded.
    pub fn constraint(&self) -> Constraint {
        Constraint {
            width: self.max_width.unwrap_or(0),
            height: self.max_height.unwrap_or(0),
            area: self.max_area.unwrap_or(0),
        }
        .normalized()
    }
}

#[derive(Serialize, Deserialize, Default)]
struct ProfileDetails {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    formats: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    qualities: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    supports: Vec<String>,
    #[serde(rename = "maxArea", skip_serializing_if = "Option::is_none", default)]
    max_area: Option<u64>,
    #[serde(rename = "maxWidth", skip_serializing_if = "Option::is_none", default)]
    max_width: Option<u32>,
    #[serde(rename = "maxHeight", skip_serializing_if = "Option::is_none", default)]
    max_height: Option<u32>,
}

impl Serialize for Profile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let details = ProfileDetails {
            formats: self.formats.clone(),
            qualities: self.qualities.clone(),
            supports: self.supports.clone(),
            max_area: self.max_area,
            max_width: self.max_width,
            max_height: self.max_height,
        };
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.compliance)?;
        seq.serialize_element(&details)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Profile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProfileVisitor;

        impl<'de> Visitor<'de> for ProfileVisitor {
            type Value = Profile;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a profile array: [compliance URI, {capabilities}]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Profile, A::Error> {
                let compliance: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let details: ProfileDetails = seq.next_element()?.unwrap_or_default();
                // Ignore any further entries rather than rejecting the file.
                while seq.next_element::<serde_json::Value>()?.is_some() {}
                Ok(Profile {
                    compliance,
                    formats: details.formats,
                    qualities: details.qualities,
                    supports: details.supports,
                    max_area: details.max_area,
                    max_width: details.max_width,
                    max_height: details.max_height,
                })
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Profile, E> {
                // A bare compliance URI is also legal in the wild.
                Ok(Profile {
                    compliance: value.to_string(),
                    ..Profile::default()
                })
            }
        }

        deserializer.deserialize_any(ProfileVisitor)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Build an info document from decoder metadata and the server's capabilities.
///
/// The `@id` is left empty; the handler fills it in with the canonical
/// absolute URL once the request host is known. Profile maximums are included
/// only when the constraint is tighter than the image itself.
pub fn build_info(image: ImageInfo, features: &FeatureSet, max: Constraint) -> Info {
    let mut info = Info {
        context: CONTEXT.to_string(),
        id: String::new(),
        protocol: PROTOCOL.to_string(),
        width: image.width,
        height: image.height,
        tiles: Vec::new(),
        profile: Profile {
            compliance: features.compliance().to_string(),
            formats: features.format_names(),
            qualities: features.quality_names(),
            supports: features.supports_tokens(),
            max_area: None,
            max_width: None,
            max_height: None,
        },
    };

    let max = max.normalized();
    if max.smaller_than_any(image.width, image.height) {
        info.profile.max_area = Some(max.area);
        info.profile.max_width = Some(max.width);
        info.profile.max_height = Some(max.height);
    }

    if image.tile_width > 0 {
        let mut tile = TileSize {
            width: image.tile_width,
            height: None,
            scale_factors: scale_factors(image.width, image.height, image.levels),
        };
        if image.tile_height > 0 {
            tile.height = Some(image.tile_height);
        }
        info.tiles = vec![tile];
    }

    info
}

/// Powers of two up to the level count, stopping before either dimension
/// would drop below the advertised minimum.
fn scale_factors(width: u32, height: u32, levels: u32) -> Vec<u32> {
    let mut factors = Vec::new();
    let mut scale = 1u32;
    for _ in 0..levels {
        if width / scale < MIN_ADVERTISED_DIMENSION || height / scale < MIN_ADVERTISED_DIMENSION {
            break;
        }
        factors.push(scale);
        scale <<= 1;
    }
    factors
}

// =============================================================================
// Tests
// =============================================================================
