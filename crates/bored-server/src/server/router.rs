//! HTTP routes: health check, agent connect and client connect

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use bored_core::Credential;

use super::ws::{agent_transport, split_client};
use crate::connection::serve_agent;
use crate::state::ServerState;

/// Build the HTTP router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/agent/connect", get(agent_connect))
        .route("/client/connect", get(client_connect))
        .fallback(not_found)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn agent_connect(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Some(expected) = &state.config.agent_token {
        if bearer_token(&headers) != Some(expected.as_str()) {
            tracing::warn!("Rejecting agent: missing or invalid bearer token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let credential = headers
        .get(state.config.credential_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(Credential::from)
        .unwrap_or_default();

    ws.on_upgrade(move |socket| async move {
        let transport = agent_transport(socket, state.config.mux.outbound_queue);
        serve_agent(
            Arc::clone(&state.registry),
            transport,
            credential,
            state.config.mux.clone(),
            state.shutdown.clone(),
        )
        .await;
    })
}

async fn client_connect(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (reader, writer) = split_client(socket);

        tokio::select! {
            _ = state.shutdown.cancelled() => {
                tracing::debug!("WebSocket client relay cancelled");
            }
            _ = state.relay.serve_client(reader, writer) => {}
        }
    })
}

/// Token from an `Authorization: Bearer <token>` header; the scheme is case-insensitive
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use bored_core::config::ServerConfig;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn app(config: ServerConfig) -> Router {
        router(Arc::new(ServerState::new(config, CancellationToken::new())))
    }

    async fn status(app: Router, request: Request<Body>) -> StatusCode {
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_healthz() {
        let request = Request::get("/healthz").body(Body::empty()).unwrap();
        assert_eq!(status(app(ServerConfig::default()), request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let request = Request::get("/nope").body(Body::empty()).unwrap();
        assert_eq!(status(app(ServerConfig::default()), request).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_agent_token_is_enforced() {
        let config = ServerConfig {
            agent_token: Some("secret".into()),
            ..Default::default()
        };

        let missing = Request::get("/agent/connect").body(Body::empty()).unwrap();
        assert_eq!(status(app(config.clone()), missing).await, StatusCode::UNAUTHORIZED);

        let wrong = Request::get("/agent/connect")
            .header("Authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(app(config.clone()), wrong).await, StatusCode::UNAUTHORIZED);

        // Right token but not an upgrade request: rejected by the upgrade layer instead
        let plain = Request::get("/agent/connect")
            .header("Authorization", "bearer secret")
            .body(Body::empty())
            .unwrap();
        let code = status(app(config), plain).await;
        assert_ne!(code, StatusCode::UNAUTHORIZED);
        assert!(code.is_client_error());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "BEARER abc ".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
