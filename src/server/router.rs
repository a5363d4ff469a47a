use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use super::{pages, recordings, ws, ServeState};
use crate::config::ServiceConfig;

pub fn build_router(config: &ServiceConfig, state: ServeState) -> Router {
    let cors = cors_layer(config);

    Router::new()
        .route("/health", get(pages::health))
        .route("/api/pages", get(pages::list).post(pages::create))
        .route("/api/pages/:id", get(pages::detail).delete(pages::close))
        .route("/api/pages/:id/navigate", post(pages::navigate))
        .route("/api/pages/:id/navigate-back", post(pages::navigate_back))
        .route(
            "/api/pages/:id/navigate-forward",
            post(pages::navigate_forward),
        )
        .route("/api/pages/:id/reload", post(pages::reload))
        .route("/api/pages/:id/structure", get(pages::structure))
        .route("/api/pages/:id/act-xpath", post(pages::act_xpath))
        .route("/api/pages/:id/act-id", post(pages::act_id))
        .route("/api/pages/:id/wait", post(pages::wait))
        .route("/api/pages/:id/condition", post(pages::condition))
        .route("/api/pages/:id/screenshot", get(pages::screenshot))
        .route("/api/pages/:id/xpath/:encoded_id", get(pages::xpath))
        .route("/api/pages/:id/get-list-html", post(pages::get_list_html))
        .route(
            "/api/pages/:id/get-list-html-by-parent",
            post(pages::get_list_html_by_parent),
        )
        .route(
            "/api/pages/:id/get-element-html",
            post(pages::get_element_html),
        )
        .route("/api/pages/:id/actions/:idx", delete(pages::delete_action))
        .route("/api/pages/:id/records", delete(pages::delete_records))
        .route("/api/recordings", get(recordings::list))
        .route("/api/recordings/:id", get(recordings::detail))
        .route(
            "/api/recordings/:id/files/:filename",
            get(recordings::file),
        )
        .route("/api/recordings/:id/data/:filename", get(recordings::data))
        .route("/api/replay", post(recordings::replay))
        .route("/ws", get(ws::websocket_handler))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);
    match &config.cors_origin {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => base.allow_origin(value),
            Err(err) => {
                warn!(target: "simplepage", %err, origin, "invalid CORS origin; allowing any");
                base.allow_origin(Any)
            }
        },
        None => base.allow_origin(Any),
    }
}
