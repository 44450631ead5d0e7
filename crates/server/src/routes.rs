//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::client_ip_middleware;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::http::header;
use axum::middleware;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/stores",
            get(handlers::list_stores).post(handlers::create_store),
        )
        .route(
            "/api/stores/{id}",
            get(handlers::get_store).delete(handlers::delete_store),
        )
        .route("/api/audit", get(handlers::query_audit))
        // Health checks are unauthenticated for probes and load balancers.
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready));

    let mut router = Router::new().merge(api_routes);

    // Network-restrict /metrics in production; see the metrics module.
    if state.config.server.metrics_enabled {
        router = router.merge(Router::new().route("/metrics", get(metrics_handler)));
    }

    let rate_limit_state = state.rate_limit.clone();

    // Middleware layers are applied in reverse order (outermost first).
    router
        .layer(DefaultBodyLimit::max(state.config.server.body_limit_bytes))
        // Resolves the client IP and enforces the global write window.
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            client_ip_middleware,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
