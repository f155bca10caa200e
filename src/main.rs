//! Stream Resolver API Server
//!
//! Main entry point for the link resolution REST API service.

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use stream_resolver::cache::{InMemoryCache, NoopCache, ResolutionCache};
use stream_resolver::config::Config;
use stream_resolver::constants::sites;
use stream_resolver::extractors::ExtractorRegistry;
use stream_resolver::fetch::Scraper;
use stream_resolver::resolver::LinkResolver;
use stream_resolver::routes::{configure_routes, ApiDoc, AppState};

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let bind_address = format!("{}:{}", config.host, config.port);

    let scraper = Scraper::with_config(config.scraper_config()).map_err(|e| {
        error!("Failed to build HTTP client: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let mut profiles = sites::builtin();
    match config.load_site_profiles() {
        Ok(extra) if !extra.is_empty() => {
            info!("Loaded {} site profiles from file", extra.len());
            // file profiles win over built-in ones for the same host
            profiles.splice(0..0, extra);
        }
        Ok(_) => {}
        Err(e) => warn!("Ignoring site profiles file: {}", e),
    }

    let cache: Arc<dyn ResolutionCache> = match config.cache_ttl() {
        Some(ttl) => {
            info!("Caching resolutions for {}s", ttl.as_secs());
            Arc::new(InMemoryCache::new(ttl))
        }
        None => {
            info!("Resolution cache disabled");
            Arc::new(NoopCache)
        }
    };

    let registry = ExtractorRegistry::with_defaults();
    info!("Registered extractors: {}", registry.names().join(", "));

    let resolver = LinkResolver::new(Arc::new(scraper))
        .with_registry(registry)
        .with_profiles(profiles)
        .with_cache(cache)
        .with_max_depth(config.max_resolve_depth)
        .with_user_agent(config.user_agent.clone());

    let app_state = web::Data::new(AppState {
        resolver: Arc::new(resolver),
    });

    info!("Starting Stream Resolver API server on {}", bind_address);

    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/health", web::get().to(health_check))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
