//! HTTP serving layer: routing, the IIIF handler, caches, and identifier
//! resolution.

pub mod cache;
pub mod handlers;
pub mod plugins;
pub mod routes;

pub use cache::{cache_key, CacheStats, InfoCache, TileCache};
pub use handlers::{health_handler, iiif_route, ErrorResponse, HandlerError, ImageHandler};
pub use plugins::{IdResolver, IdToPath, Resolution};
pub use routes::create_router;
