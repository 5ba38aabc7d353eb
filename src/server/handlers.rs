//! The IIIF HTTP handler.
//!
//! One handler owns the configured URL prefix. It strips the prefix, parses
//! the remainder as an IIIF request, and serves either the info document or
//! the rendered image. Unparseable paths that resolve as a bare identifier
//! redirect to the info document with a 303.
//!
//! Decode and transform work is CPU-bound and runs on the blocking pool; the
//! handler task only touches caches and headers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tokio::task;
use tracing::{debug, error};

use crate::encode::encode_image;
use crate::error::ImageError;
use crate::iiif::{build_info, FeatureSet, Id, Info, Url};
use crate::img::{resource, Constraint, ImageInfo, Resource};

use super::cache::{cache_key, InfoCache, TileCache};
use super::plugins::IdResolver;

// =============================================================================
// Handler state
// =============================================================================

/// Everything a request needs: capabilities, limits, caches, and the
/// identifier resolver. Built once at startup and shared via `Arc`.
pub struct ImageHandler {
    /// URL prefix this handler owns, normalized to `/prefix` form.
    pub web_path: String,

    /// Canonical base URL override for emitted `@id` values.
    pub base_url: Option<String>,

    pub features: FeatureSet,

    /// Server-wide output maximums.
    pub maximums: Constraint,

    pub resolver: IdResolver,

    pub info_cache: Option<InfoCache>,
    pub tile_cache: Option<TileCache>,
}

impl ImageHandler {
    /// A handler with every feature enabled, unbounded output, and default
    /// cache capacities.
    pub fn new(tile_path: impl Into<PathBuf>, web_path: &str) -> Self {
        ImageHandler {
            web_path: normalize_prefix(web_path),
            base_url: None,
            features: FeatureSet::all(),
            maximums: Constraint::unbounded(),
            resolver: IdResolver::new(tile_path),
            info_cache: InfoCache::new(10_000),
            tile_cache: TileCache::new(250),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_maximums(mut self, maximums: Constraint) -> Self {
        self.maximums = maximums;
        self
    }

    /// Capacity 0 disables a cache.
    pub fn with_cache_capacities(mut self, info: usize, tiles: usize) -> Self {
        self.info_cache = InfoCache::new(info);
        self.tile_cache = TileCache::new(tiles);
        self
    }

    pub fn with_resolver(mut self, resolver: IdResolver) -> Self {
        self.resolver = resolver;
        self
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    format!("/{trimmed}")
}

// =============================================================================
// Error responses
// =============================================================================

/// JSON error body returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// An error ready to become an HTTP response.
#[derive(Debug)]
pub struct HandlerError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        HandlerError { status, error_type, message: message.into() }
    }

    pub fn internal() -> Self {
        HandlerError::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", "server error")
    }

    pub fn from_image_error(err: &ImageError) -> Self {
        match err {
            ImageError::DoesNotExist => {
                HandlerError::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            ImageError::InvalidFiletype => HandlerError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_file_type",
                err.to_string(),
            ),
            ImageError::DimensionsExceedLimits => HandlerError::new(
                StatusCode::NOT_IMPLEMENTED,
                "dimensions_exceed_limits",
                err.to_string(),
            ),
            ImageError::Decode(_) => HandlerError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                err.to_string(),
            ),
            ImageError::Encode(_) => HandlerError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                err.to_string(),
            ),
            // Dispatch control flow; reaching the handler means a bug.
            ImageError::NotHandled => HandlerError::internal(),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error_type.to_string(),
            message: self.message,
            status: Some(self.status.as_u16()),
        };
        (self.status, Json(body)).into_response()
    }
}

// =============================================================================
// Routes
// =============================================================================

/// Health check: `GET /health`.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// The IIIF route: everything under the configured prefix.
pub async fn iiif_route(State(handler): State<Arc<ImageHandler>>, req: Request) -> Response {
    let raw_path = req.uri().path().to_string();
    let headers = req.headers().clone();

    // Routing guarantees the prefix is present; strip it to get the IIIF path.
    let request_path = raw_path
        .strip_prefix(&handler.web_path)
        .unwrap_or(&raw_path)
        .trim_start_matches('/')
        .to_string();

    let url = match Url::parse(&request_path) {
        Ok(url) => url,
        Err(e) => {
            // The path may be a base URI request missing only /info.json.
            if handler.is_valid_base_path(&request_path).await {
                return redirect_303(&format!("{raw_path}/info.json"));
            }
            debug!("rejecting request {request_path:?}: {e}");
            return HandlerError::new(StatusCode::BAD_REQUEST, "invalid_request", e.to_string())
                .into_response();
        }
    };

    let file_path = handler.resolver.resolve(&url.id);

    // Info first: command requests reuse its constraints when an override
    // file is in play, and cached metadata avoids touching the image at all.
    let (mut info, from_override) = match handler.get_info(&url.id, &file_path).await {
        Ok(pair) => pair,
        Err(e) => {
            if e.status != StatusCode::NOT_FOUND {
                error!(
                    "unable to build info for {} (path {}): {}",
                    url.id,
                    file_path.display(),
                    e.message
                );
            }
            return e.into_response();
        }
    };
    info.id = handler.canonical_id(&headers, &url.id);

    if url.info {
        return info_response(&headers, &info);
    }

    // Open the resource unconditionally before anything else about the
    // command is considered, so a missing file or unclaimed suffix answers
    // 404/415 even when the info above came from the cache or an override
    // file.
    let task_id = url.id.clone();
    let task_path = file_path.clone();
    let resource = match task::spawn_blocking(move || Resource::new(task_id, task_path)).await {
        Ok(Ok(resource)) => resource,
        Ok(Err(e)) => {
            let response = HandlerError::from_image_error(&e);
            if response.status != StatusCode::NOT_FOUND {
                error!(
                    "error initializing resource {} (path {}): {}",
                    url.id,
                    file_path.display(),
                    e
                );
            }
            return response.into_response();
        }
        Err(e) => {
            error!("resource task failed for {}: {}", url.id, e);
            return HandlerError::internal().into_response();
        }
    };

    if !handler.features.supported(&url) {
        return HandlerError::new(
            StatusCode::NOT_IMPLEMENTED,
            "unsupported_feature",
            "feature not supported",
        )
        .into_response();
    }

    // Small JPEG renders are served from the tile cache when possible.
    let key = cache_key(&url);
    if let (Some(cache), Some(key)) = (handler.tile_cache.as_ref(), key.as_deref()) {
        if let Some(data) = cache.get(key).await {
            return command_response(&url, data, &file_path);
        }
    }

    // An override file's profile replaces the global maximums for this
    // request only.
    let max = if from_override {
        info.profile.constraint()
    } else {
        handler.maximums
    };

    let task_url = url.clone();
    let rendered = task::spawn_blocking(move || -> Result<Vec<u8>, ImageError> {
        let img = resource.apply(&task_url, max)?;
        encode_image(&img, task_url.format)
    })
    .await;

    let body = match rendered {
        Ok(Ok(bytes)) => Bytes::from(bytes),
        Ok(Err(e)) => {
            let response = HandlerError::from_image_error(&e);
            if response.status != StatusCode::NOT_FOUND {
                error!("error serving {} (path {}): {}", url.id, file_path.display(), e);
            }
            return response.into_response();
        }
        Err(e) => {
            error!("render task failed for {}: {}", url.id, e);
            return HandlerError::internal().into_response();
        }
    };

    if let (Some(cache), Some(key)) = (handler.tile_cache.as_ref(), key) {
        cache.put(key, body.clone()).await;
    }

    command_response(&url, body, &file_path)
}

// =============================================================================
// Info assembly
// =============================================================================

impl ImageHandler {
    /// Build the info document for an identifier.
    ///
    /// Checks the metadata cache, then an override file, then the image
    /// itself. Returns the document plus whether it came from an override
    /// (override profiles constrain the request that follows).
    async fn get_info(&self, id: &Id, file_path: &Path) -> Result<(Info, bool), HandlerError> {
        if let Some(cache) = &self.info_cache {
            if let Some(meta) = cache.get(id).await {
                return Ok((build_info(meta, &self.features, self.maximums), false));
            }
        }

        if let Some(info) = self.load_info_override(file_path) {
            return Ok((info, true));
        }

        let meta = self.read_image_info(id.clone(), file_path.to_path_buf()).await?;
        if let Some(cache) = &self.info_cache {
            cache.put(id.clone(), meta).await;
        }
        Ok((build_info(meta, &self.features, self.maximums), false))
    }

    /// A parseable sibling `{file}-info.json` replaces the generated
    /// document verbatim.
    fn load_info_override(&self, file_path: &Path) -> Option<Info> {
        let mut name = file_path.as_os_str().to_os_string();
        name.push("-info.json");
        let override_path = PathBuf::from(name);

        let data = std::fs::read(&override_path).ok()?;
        debug!("loading image data from override file {}", override_path.display());
        match serde_json::from_slice::<Info>(&data) {
            Ok(info) => Some(info),
            Err(e) => {
                error!("cannot parse override file {}: {}", override_path.display(), e);
                None
            }
        }
    }

    async fn read_image_info(&self, id: Id, file_path: PathBuf) -> Result<ImageInfo, HandlerError> {
        debug!("loading image data from image resource (id: {id})");
        match task::spawn_blocking(move || resource::read_image_info(id, &file_path)).await {
            Ok(Ok(meta)) => Ok(meta),
            Ok(Err(e)) => Err(HandlerError::from_image_error(&e)),
            Err(e) => {
                error!("metadata task failed: {e}");
                Err(HandlerError::internal())
            }
        }
    }

    /// True when the path is a known identifier that only lacks /info.json.
    async fn is_valid_base_path(&self, request_path: &str) -> bool {
        if !self.features.base_uri_redirect || request_path.is_empty() {
            return false;
        }
        let json_path = format!("{request_path}/info.json");
        let Ok(url) = Url::parse(&json_path) else {
            return false;
        };
        let file_path = self.resolver.resolve(&url.id);
        self.get_info(&url.id, &file_path).await.is_ok()
    }

    /// The absolute IIIF base URI for an identifier.
    ///
    /// Uses the configured base URL when set, otherwise the forwarded host
    /// and protocol, otherwise the request host over plain HTTP.
    fn canonical_id(&self, headers: &HeaderMap, id: &Id) -> String {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => {
                let (scheme, host) = request_origin(headers);
                format!("{scheme}://{host}")
            }
        };
        format!("{base}{}/{}", self.web_path, id.escaped())
    }
}

/// Scheme and host for canonical URLs, trusting proxy headers when both are
/// present. This only shapes the URLs reported back in info documents.
fn request_origin(headers: &HeaderMap) -> (String, String) {
    let forwarded_host = header_str(headers, "x-forwarded-host");
    let forwarded_proto = header_str(headers, "x-forwarded-proto");
    if let (Some(host), Some(proto)) = (forwarded_host, forwarded_proto) {
        return (proto.to_string(), host.to_string());
    }
    let host = header_str(headers, "host").unwrap_or("localhost");
    ("http".to_string(), host.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty())
}

// =============================================================================
// Response builders
// =============================================================================

fn accepts_ld_json(headers: &HeaderMap) -> bool {
    headers.get_all(header::ACCEPT).iter().any(|value| {
        value
            .to_str()
            .map(|v| {
                v.split(',')
                    .any(|part| part.trim().split(';').next() == Some("application/ld+json"))
            })
            .unwrap_or(false)
    })
}

fn info_response(headers: &HeaderMap, info: &Info) -> Response {
    let content_type = if accepts_ld_json(headers) {
        "application/ld+json"
    } else {
        "application/json"
    };
    let body = match serde_json::to_vec(info) {
        Ok(body) => body,
        Err(e) => {
            error!("unable to serialize info document: {e}");
            return HandlerError::internal().into_response();
        }
    };
    response_or_500(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(Body::from(body)),
    )
}

fn command_response(url: &Url, data: Bytes, file_path: &Path) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, url.format.mime_type());
    if let Some(modified) = last_modified(file_path) {
        builder = builder.header(header::LAST_MODIFIED, modified);
    }
    response_or_500(builder.body(Body::from(data)))
}

fn last_modified(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(httpdate::fmt_http_date(modified))
}

fn redirect_303(location: &str) -> Response {
    response_or_500(
        Response::builder()
            .status(StatusCode::SEE_OTHER)
            .header(header::LOCATION, location)
            .body(Body::empty()),
    )
}

fn response_or_500(result: Result<Response, axum::http::Error>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            error!("unable to build response: {e}");
            HandlerError::internal().into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
