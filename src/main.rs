//! IIIF server binary: parse configuration, wire up the handler, and serve.

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iiif_server::{
    config::Config,
    server::{create_router, IdResolver, ImageHandler},
};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    init_logging(&config);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Starting IIIF server");
    info!("  Tile path: {}", config.tile_path.display());
    info!("  Web path: {}", config.iiif_web_path);
    info!(
        "  Cache: {} info entries, {} tiles",
        config.info_cache_len, config.tile_cache_len
    );
    if !config.plugins.is_empty() {
        // Plugin artifacts are loaded by the deployment wrapper, not here.
        warn!(
            "Ignoring {} plugin artifact(s); this build uses compiled-in resolvers only",
            config.plugins.len()
        );
    }

    let handler = ImageHandler::new(&config.tile_path, &config.iiif_web_path)
        .with_base_url(config.iiif_url.clone())
        .with_maximums(config.constraint())
        .with_cache_capacities(config.info_cache_len, config.tile_cache_len)
        .with_resolver(IdResolver::new(&config.tile_path));

    let router = create_router(handler);

    info!("Listening on http://{}", config.address);
    let listener = match tokio::net::TcpListener::bind(&config.address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.address, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &Config) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
