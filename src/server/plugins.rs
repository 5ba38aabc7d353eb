//! Identifier-to-path resolution.
//!
//! Resolution is an ordered chain of transformers. Each one either resolves
//! the identifier to a filesystem path, skips (not mine), or errors; errors
//! are logged and treated as skips so one misbehaving transformer cannot take
//! the server down. When nothing claims the identifier, the default layout
//! `{tile_path}/{id}` applies.

use std::path::PathBuf;

use tracing::warn;

use crate::iiif::Id;

/// Outcome of a single transformer.
pub enum Resolution {
    /// The transformer owns this identifier and produced a path.
    Resolved(PathBuf),
    /// The transformer does not handle this identifier.
    Skipped,
}

/// A pluggable identifier transformer.
pub type IdToPath = Box<dyn Fn(&Id) -> Result<Resolution, String> + Send + Sync>;

/// The ordered transformer chain plus the default tile path.
///
/// The chain is assembled at startup and read-only afterwards.
pub struct IdResolver {
    transformers: Vec<IdToPath>,
    tile_path: PathBuf,
}

impl IdResolver {
    pub fn new(tile_path: impl Into<PathBuf>) -> Self {
        IdResolver {
            transformers: Vec::new(),
            tile_path: tile_path.into(),
        }
    }

    /// Append a transformer to the end of the chain.
    pub fn push(&mut self, transformer: IdToPath) {
        self.transformers.push(transformer);
    }

    /// Walk the chain; the first `Resolved` wins.
    pub fn resolve(&self, id: &Id) -> PathBuf {
        for transformer in &self.transformers {
            match transformer(id) {
                Ok(Resolution::Resolved(path)) => return path,
                Ok(Resolution::Skipped) => continue,
                Err(e) => {
                    warn!("error resolving identifier {id}: {e}");
                    continue;
                }
            }
        }
        self.tile_path.join(id.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
