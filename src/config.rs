//! Configuration for the IIIF server.
//!
//! Every option can be set on the command line or through an `IIIF_`-prefixed
//! environment variable. Zero-valued cache capacities disable the cache;
//! zero-valued maximums mean unbounded.

use std::path::PathBuf;

use clap::Parser;

use crate::img::Constraint;

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:12415";

/// Default URL prefix the IIIF handler owns.
pub const DEFAULT_WEB_PATH: &str = "/iiif";

/// Default encoded-tile cache capacity in entries.
pub const DEFAULT_TILE_CACHE_LEN: usize = 250;

/// Default image-info cache capacity in entries.
pub const DEFAULT_INFO_CACHE_LEN: usize = 10_000;

/// A read-only IIIF Image API 2.x server for pyramidal JPEG 2000 assets.
#[derive(Parser, Debug, Clone)]
#[command(name = "iiif-server")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_ADDRESS, env = "IIIF_ADDRESS")]
    pub address: String,

    /// Root directory searched when no resolver claims an identifier.
    #[arg(long, env = "IIIF_TILE_PATH")]
    pub tile_path: PathBuf,

    /// Canonical base URL override for the @id emitted in info documents.
    ///
    /// When unset, the base URL is derived per request from the Host and
    /// X-Forwarded-* headers.
    #[arg(long, env = "IIIF_URL")]
    pub iiif_url: Option<String>,

    /// URL path prefix the IIIF handler owns.
    #[arg(long, default_value = DEFAULT_WEB_PATH, env = "IIIF_WEB_PATH")]
    pub iiif_web_path: String,

    /// Encoded-tile cache capacity in entries (0 disables).
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_LEN, env = "IIIF_TILE_CACHE_LEN")]
    pub tile_cache_len: usize,

    /// Image-info cache capacity in entries (0 disables).
    #[arg(long, default_value_t = DEFAULT_INFO_CACHE_LEN, env = "IIIF_INFO_CACHE_LEN")]
    pub info_cache_len: usize,

    /// Maximum output width in pixels (0 = unbounded).
    #[arg(long, default_value_t = 0, env = "IIIF_MAX_WIDTH")]
    pub max_width: u32,

    /// Maximum output height in pixels (0 = unbounded).
    #[arg(long, default_value_t = 0, env = "IIIF_MAX_HEIGHT")]
    pub max_height: u32,

    /// Maximum output area in pixels (0 = unbounded).
    #[arg(long, default_value_t = 0, env = "IIIF_MAX_AREA")]
    pub max_area: u64,

    /// Log level: DEBUG, INFO, WARN or ERROR.
    #[arg(long, default_value = "INFO", env = "IIIF_LOG_LEVEL")]
    pub log_level: String,

    /// Plugin artifacts to load (comma-separated paths or globs).
    ///
    /// Dynamic loading is handled outside this binary; the option is
    /// accepted so deployments share one configuration surface.
    #[arg(long, env = "IIIF_PLUGINS", value_delimiter = ',')]
    pub plugins: Vec<String>,
}

impl Config {
    /// Validate the configuration, returning a message suitable for startup
    /// failure output.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_path.as_os_str().is_empty() {
            return Err("tile path is required; set --tile-path or IIIF_TILE_PATH".to_string());
        }
        if self.iiif_web_path.trim_matches('/').is_empty() {
            return Err("iiif-web-path must contain at least one path segment".to_string());
        }
        if self.level_directive().is_none() {
            return Err(format!(
                "unknown log level {:?}; expected DEBUG, INFO, WARN or ERROR",
                self.log_level
            ));
        }
        if let Some(url) = &self.iiif_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("iiif-url {url:?} must be an absolute http(s) URL"));
            }
        }
        Ok(())
    }

    /// The output constraint configured for this server.
    pub fn constraint(&self) -> Constraint {
        Constraint {
            width: self.max_width,
            height: self.max_height,
            area: self.max_area,
        }
        .normalized()
    }

    fn level_directive(&self) -> Option<&'static str> {
        match self.log_level.to_ascii_uppercase().as_str() {
            "DEBUG" => Some("debug"),
            "INFO" => Some("info"),
            "WARN" => Some("warn"),
            "ERROR" => Some("error"),
            _ => None,
        }
    }

    /// Default tracing filter directive for the configured level.
    pub fn log_filter(&self) -> String {
        let level = self.level_directive().unwrap_or("info");
        format!("iiif_server={level},tower_http={level},openjpeg={level}")
    }
}

// =============================================================================
// Tests
// =============================================================================
