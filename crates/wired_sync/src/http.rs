//! axum endpoint for component requests.
//!
//! Mounts `POST {route}/:component/:target`. Every request that reaches the
//! handler is answered with `200 OK` and a response body; problems with the
//! request itself are reported in `metadata.errors`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use wired_common::{CodecError, ErrorBag, WireJsonCodec, WireMap, WireResponse};

use crate::controller::{rejected, respond};
use crate::registry::WireRegistry;

/// Build the router for `registry`, using its configured route and body limit.
pub fn router(registry: Arc<WireRegistry>) -> Router {
    let config = registry.config();
    let path = format!("{}/:component/:target", config.route.trim_end_matches('/'));

    Router::new()
        .route(&path, post(handle_component))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn handle_component(
    State(registry): State<Arc<WireRegistry>>,
    Path((component, target)): Path<(String, String)>,
    body: Bytes,
) -> Json<WireResponse> {
    let input = match WireJsonCodec::decode::<Value>(&body) {
        Ok(input) => input,
        Err(CodecError::Empty) => Value::Null,
        Err(err) => {
            tracing::warn!("Invalid body for {}/{}: {}", component, target, err);
            let errors = ErrorBag::from([("request".to_string(), vec!["The request body must be valid JSON.".to_string()])]);
            return Json(rejected(WireMap::new(), errors));
        }
    };

    Json(respond(&registry, &component, &target, input))
}

/// Bind `addr` and serve `registry` until the process exits.
pub async fn serve(registry: Arc<WireRegistry>, addr: SocketAddr) -> std::io::Result<()> {
    let route = registry.config().route.clone();
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, route = %route, "Serving wired components");
    axum::serve(listener, app).await
}
