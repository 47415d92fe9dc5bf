//! Authentication middleware.
//!
//! MCP surface: `x-hasmcp-key: Bearer <JWT>` (or `?token=<JWT>` for clients
//! that cannot set headers). The token's server claim must match the server
//! id embedded in the URL path. Admin surface: a static bearer token.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use hasmcp_core::idgen::decode_base62;

use super::state::AppState;

const HEADER_MCP_KEY: &str = "x-hasmcp-key";
const BEARER_PREFIX: &str = "Bearer ";

const UNAUTHORIZED_BODY: &str = r#"{"error": {"message":"authentication failed", "code":401}}"#;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        UNAUTHORIZED_BODY,
    )
        .into_response()
}

/// Authenticate an `/mcp/{id}` request and stash the verified token claims
/// in request extensions.
pub async fn mcp_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(HEADER_MCP_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let token = if header_value.is_empty() {
        // fall back to a query token, sent bare (no Bearer prefix)
        let query = request.uri().query().unwrap_or("");
        match query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
        {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return unauthorized(),
        }
    } else {
        match header_value.strip_prefix(BEARER_PREFIX) {
            Some(token) => token.to_string(),
            None => return unauthorized(),
        }
    };

    let auth = match state.jwt.authenticate(&token) {
        Ok(auth) => auth,
        Err(e) => {
            error!(error = %e, "auth failed");
            return unauthorized();
        }
    };

    // /mcp/<11 base62 chars>... — the id lives at bytes 5..16
    let path = request.uri().path().to_string();
    if path.len() < 16 {
        error!(path = %path, "auth failed: invalid path");
        return unauthorized();
    }
    let server_id = decode_base62(&path[5..16]);
    if auth.server_id != server_id {
        info!(claimed = auth.server_id, path_id = server_id, "server id mismatch");
        return unauthorized();
    }

    request.extensions_mut().insert(auth);
    next.run(request).await
}

/// Guard the admin API with the configured static access token.
pub async fn api_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.cfg.apiauth.enabled {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX));

    match presented {
        Some(token) if !token.is_empty() && token == state.cfg.apiauth.api_access_token => {
            next.run(request).await
        }
        _ => unauthorized(),
    }
}
