//! API Routes module for the stream resolver
//!
//! This module contains the HTTP route handlers exposing the resolver:
//! - POST /api/resolve - Resolve a page into playable links
//! - GET /api/sites - List configured site profiles
//! - DELETE /api/cache - Drop cached resolutions

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use url::Url;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::error::{AppError, AppResult};
use crate::models::{
    ApiError, ApiResponse, ContainerType, ExtractionContext, Quality, ResolveRequest, ResolveResponse,
    ResolvedLink, SiteSummary, SubtitleTrack,
};
use crate::resolver::LinkResolver;

/// Application state shared across handlers
pub struct AppState {
    pub resolver: Arc<LinkResolver>,
}

/// Query parameters for cache purging
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct CacheQuery {
    /// Page URL to evict; everything is purged when absent
    pub url: Option<String>,
}

/// Result of a cache purge
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CachePurgeResult {
    pub removed: usize,
}

/// POST /api/resolve - Resolve a detail or episode page
///
/// The site profile is picked from the page host unless `site` names one.
#[utoipa::path(
    post,
    path = "/api/resolve",
    tag = "resolver",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Page resolved; `found` tells whether any link was found", body = ResolveResponse),
        (status = 400, description = "Bad request - url must be an absolute http(s) URL", body = ApiError),
        (status = 404, description = "Unknown site profile", body = ApiError)
    )
)]
pub async fn resolve(data: web::Data<AppState>, body: web::Json<ResolveRequest>) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let page_url = validate_page_url(&request.url)?;
    let ctx = ExtractionContext::new(page_url.as_str()).with_referer(request.referer.clone());

    let resolver = &data.resolver;
    let resolution = match request.site.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => {
            let profile = resolver
                .profile_named(name)
                .ok_or_else(|| AppError::not_found(format!("Unknown site: {}", name)))?;
            info!("Resolving {} with site profile {}", page_url, profile.name);
            resolver.resolve_with_profile(&page_url, ctx, profile).await
        }
        None => {
            info!("Resolving {}", page_url);
            resolver.resolve_links(&page_url, ctx).await
        }
    };

    Ok(HttpResponse::Ok().json(ApiResponse::new(ResolveResponse::new(page_url, resolution))))
}

/// GET /api/sites - List configured site profiles
#[utoipa::path(
    get,
    path = "/api/sites",
    tag = "resolver",
    responses(
        (status = 200, description = "Configured site profiles", body = Vec<SiteSummary>)
    )
)]
pub async fn list_sites(data: web::Data<AppState>) -> impl Responder {
    let sites: Vec<SiteSummary> = data.resolver.profiles().iter().map(|p| p.summary()).collect();
    HttpResponse::Ok().json(ApiResponse::new(sites))
}

/// DELETE /api/cache - Evict one page or purge every cached resolution
#[utoipa::path(
    delete,
    path = "/api/cache",
    tag = "cache",
    params(CacheQuery),
    responses(
        (status = 200, description = "Number of entries removed", body = CachePurgeResult)
    )
)]
pub async fn purge_cache(data: web::Data<AppState>, query: web::Query<CacheQuery>) -> impl Responder {
    let cache = data.resolver.cache();
    let removed = match query.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => usize::from(cache.evict(url)),
        None => cache.purge(),
    };

    info!("Removed {} cached resolutions", removed);
    HttpResponse::Ok().json(ApiResponse::new(CachePurgeResult { removed }))
}

fn validate_page_url(raw: &str) -> AppResult<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::validation("url is required"));
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(raw.to_string()),
        _ => Err(AppError::validation(format!("url must be an absolute http(s) URL: {}", raw))),
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stream Resolver API",
        version = "0.1.0",
        description = "Resolves streaming site pages into playable media links",
        license(
            name = "MIT"
        )
    ),
    paths(
        resolve,
        list_sites,
        purge_cache
    ),
    components(
        schemas(
            ResolveRequest,
            ResolveResponse,
            ResolvedLink,
            SubtitleTrack,
            Quality,
            ContainerType,
            SiteSummary,
            CacheQuery,
            CachePurgeResult,
            ApiError
        )
    ),
    tags(
        (name = "resolver", description = "Link resolution endpoints"),
        (name = "cache", description = "Resolution cache management")
    )
)]
pub struct ApiDoc;

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/resolve", web::post().to(resolve))
            .route("/sites", web::get().to(list_sites))
            .route("/cache", web::delete().to(purge_cache)),
    );
}
