//! Router assembly.
//!
//! The IIIF handler owns a single wildcard route under its configured
//! prefix; the handler does its own path parsing so identifiers keep their
//! percent-escapes exactly as received. CORS and request tracing are applied
//! as router-level layers.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, iiif_route, ImageHandler};

/// Build the application router around a configured handler.
pub fn create_router(handler: ImageHandler) -> Router {
    let prefix = handler.web_path.clone();
    Router::new()
        .route("/health", get(health_handler))
        .route(&format!("{prefix}/{{*rest}}"), get(iiif_route))
        .with_state(Arc::new(handler))
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Permissive CORS for a read-only surface: any viewer origin, GET traffic
/// only. Info responses additionally carry an unconditional
/// `Access-Control-Allow-Origin: *` from the handler, which the layer's
/// origin-triggered headers replace rather than duplicate.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)) // 24 hours
}

// =============================================================================
// Tests
// =============================================================================
