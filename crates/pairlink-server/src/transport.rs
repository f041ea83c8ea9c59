//! WebSocket transport.
//!
//! axum router for the relay: `GET /ws` upgrades to the per-client event
//! socket, `GET /health` answers liveness probes. Browser origins are
//! checked against the configured allow-list before the upgrade; an empty
//! list admits any origin. tower-http's CORS layer covers the plain HTTP
//! surface with the same policy.

use axum::{
    Router,
    extract::{State, ws::WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, StatusCode, header::ORIGIN},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{AppState, ServerError};

/// Build the relay router around the shared state.
pub(crate) fn router(state: AppState) -> Result<Router, ServerError> {
    let cors = cors_layer(&state.allowed_origins)?;

    Ok(Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state))
}

async fn health() -> &'static str {
    "OK"
}

/// Enforce the origin allow-list, then hand the socket to the connection
/// loop.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let origin = headers.get(ORIGIN);
    if !origin_allowed(&state.allowed_origins, origin) {
        tracing::warn!(?origin, "rejecting upgrade from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| crate::handle_socket(socket, state))
}

/// Whether the `Origin` header passes the allow-list.
///
/// An empty allow-list admits everything. A missing header is admitted too:
/// only browsers send `Origin`, and the check exists to stop hostile pages,
/// not command-line clients.
fn origin_allowed(allowed: &[String], origin: Option<&HeaderValue>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match origin.and_then(|value| value.to_str().ok()) {
        Some(origin) => allowed.iter().any(|candidate| candidate == origin),
        None => true,
    }
}

fn cors_layer(allowed: &[String]) -> Result<CorsLayer, ServerError> {
    if allowed.is_empty() {
        return Ok(CorsLayer::new().allow_origin(Any));
    }

    let origins = allowed
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                ServerError::Config(format!("invalid allowed origin '{origin}': {e}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new().allow_origin(AllowOrigin::list(origins)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).unwrap()
    }

    #[test]
    fn empty_allow_list_admits_any_origin() {
        assert!(origin_allowed(&[], Some(&header("https://evil.example"))));
        assert!(origin_allowed(&[], None));
    }

    #[test]
    fn listed_origin_is_admitted() {
        let allowed = vec!["https://app.example.com".to_string()];
        assert!(origin_allowed(&allowed, Some(&header("https://app.example.com"))));
    }

    #[test]
    fn unlisted_origin_is_rejected() {
        let allowed = vec!["https://app.example.com".to_string()];
        assert!(!origin_allowed(&allowed, Some(&header("https://evil.example"))));
    }

    #[test]
    fn missing_origin_header_is_admitted() {
        let allowed = vec!["https://app.example.com".to_string()];
        assert!(origin_allowed(&allowed, None));
    }

    #[test]
    fn invalid_configured_origin_is_a_config_error() {
        let result = cors_layer(&["not a header value\u{0}".to_string()]);
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
