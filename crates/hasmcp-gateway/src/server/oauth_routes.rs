//! `/oauth2` handlers: redirect to the provider's consent page, then land
//! the callback and bounce the operator back to the admin UI.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use hasmcp_core::idgen::decode_base62;

use super::mcp_routes::api_error_response;
use super::state::AppState;
use crate::oauth::{AuthorizeRequest, CallbackRequest};

const INVALID_REQUEST_BODY: &str = r#"{"error": {"message":"invalid request payload", "code":400}}"#;

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub server_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
}

pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
    headers: HeaderMap,
) -> Response {
    let server_id = decode_base62(&query.server_id);
    if server_id == 0 {
        return invalid_request();
    }

    let request = AuthorizeRequest {
        server_id,
        host_name: host_of(&headers),
    };
    match state.oauth2.authorize(request).await {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => api_error_response(e),
    }
}

pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    if query.state.is_empty() {
        return invalid_request();
    }

    let request = CallbackRequest {
        host_name: host_of(&headers),
        state: query.state,
        code: query.code,
    };
    match state.oauth2.callback(request).await {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => api_error_response(e),
    }
}

fn invalid_request() -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        [(header::CONTENT_TYPE, "application/json")],
        INVALID_REQUEST_BODY,
    )
        .into_response()
}

fn host_of(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
