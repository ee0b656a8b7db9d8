//! API route definitions.

mod articles;
mod health;
mod ledger;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware;
use axum::response::Response;
use axum::routing::get;

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// - `GET /health` - Health check
/// - `GET /api/v0/article/index` - Index of curated and published articles
/// - `GET /api/v0/article/{name}` - Article by name (`?list=` to pick a list)
/// - `GET /api/v0/article/cid/{cid}` - Article by content address
/// - `GET /api/v0/db/meta` - Ledger database identity
/// - `GET /api/v0/db/sync` - Ledger database sync progress
/// - `GET /api/v0/db/block` - Ledger tip against the curator checkpoints
/// - `GET /api/v0/db/overview` - All of the above
pub fn router(state: AppState) -> Router {
    let api_v0 = Router::new()
        .route("/article/index", get(articles::article_index))
        .route("/article/cid/{cid}", get(articles::article_by_cid))
        .route("/article/{name}", get(articles::article_by_name))
        .route("/db/meta", get(ledger::meta))
        .route("/db/sync", get(ledger::sync_status))
        .route("/db/block", get(ledger::block_status))
        .route("/db/overview", get(ledger::overview))
        .layer(middleware::map_response(add_cache_headers));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v0", api_v0)
        .with_state(state)
}

/// Add cache headers to API responses.
///
/// Matches the server-side index cache, so clients see updates at about the
/// same time as the server does.
async fn add_cache_headers(response: Response) -> Response {
    if response.status().is_success() {
        let (mut parts, body) = response.into_parts();
        parts.headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=10, stale-while-revalidate=60"),
        );
        Response::from_parts(parts, body)
    } else {
        response
    }
}
