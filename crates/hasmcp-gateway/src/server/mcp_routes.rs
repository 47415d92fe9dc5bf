//! `/mcp/{id}` handlers: JSON-RPC calls, session SSE streams, the per-server
//! debug tail, and session deletion.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Extension, Json,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::error::{ApiError, McpError};
use crate::jsonrpc::{self, ErrorResponse, JsonRpcError};
use crate::jwt::TokenAuth;
use crate::mcp::event::EventPayload;
use crate::mcp::{
    CallSessionRequest, DeleteSessionRequest, McpController, SubscribeResponse,
    SubscribeSessionRequest,
};

use super::state::AppState;

const HEADER_SESSION_ID: &str = "mcp-session-id";
const HEADER_PROTOCOL_VERSION: &str = "mcp-protocol-version";

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
const HEARTBEAT_COMMENT: &str = r#"{"status": "tick"}"#;

/// Headers never forwarded to upstream tools.
const EXCLUDED_HEADERS: [&str; 5] = [
    "last-event-id",
    HEADER_PROTOCOL_VERSION,
    HEADER_SESSION_ID,
    "x-hasmcp-key",
    "accept-encoding",
];

pub async fn json_rpc(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenAuth>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: jsonrpc::Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return invalid_envelope(&body),
    };
    if request.jsonrpc != jsonrpc::VERSION {
        return invalid_envelope(&body);
    }

    let request_id = request.id.clone();
    let call = CallSessionRequest {
        headers: forwardable_headers(&headers),
        server_id: auth.server_id,
        mcp_session_id: header_str(&headers, HEADER_SESSION_ID),
        mcp_protocol_version: header_str(&headers, HEADER_PROTOCOL_VERSION),
        permissions: auth.permissions,
        request,
    };

    match state.mcp.call_session(call).await {
        Ok(res) => {
            let status = StatusCode::from_u16(res.http_status).unwrap_or(StatusCode::OK);
            let body = res
                .result
                .as_ref()
                .map(|r| serde_json::to_vec(r).unwrap_or_default())
                .unwrap_or_default();
            (
                status,
                [
                    (header::CONTENT_TYPE.as_str(), "application/json".to_string()),
                    (HEADER_SESSION_ID, res.mcp_session_id),
                    (HEADER_PROTOCOL_VERSION, res.mcp_protocol_version),
                ],
                body,
            )
                .into_response()
        }
        Err(McpError::Rpc(e)) => {
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(ErrorResponse::new(request_id, e))).into_response()
        }
        Err(McpError::Api(e)) => api_error_response(e),
    }
}

pub async fn stream(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenAuth>,
    headers: HeaderMap,
) -> Response {
    let mcp_session_id = header_str(&headers, HEADER_SESSION_ID);
    let subscription = match state
        .mcp
        .subscribe_session(SubscribeSessionRequest {
            server_id: auth.server_id,
            mcp_session_id: mcp_session_id.clone(),
            permissions: auth.permissions,
        })
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => return api_error_response(e),
    };

    info!(session = %mcp_session_id, "streaming is initialized");
    sse_response(state.mcp.clone(), subscription, origin_of(&headers))
}

pub async fn tail(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenAuth>,
    headers: HeaderMap,
) -> Response {
    let subscription = match state.mcp.start_tail(auth.server_id, &auth.permissions) {
        Ok(subscription) => subscription,
        Err(e) => return api_error_response(e),
    };

    info!(server_id = auth.server_id, "tailing is initialized");
    sse_response(state.mcp.clone(), subscription, origin_of(&headers))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<TokenAuth>,
    headers: HeaderMap,
) -> Response {
    let result = state
        .mcp
        .delete_session(DeleteSessionRequest {
            server_id: auth.server_id,
            mcp_session_id: header_str(&headers, HEADER_SESSION_ID),
            permissions: auth.permissions,
        })
        .await;

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => api_error_response(e),
    }
}

/// Unsubscribes when the stream is dropped, i.e. on client disconnect.
struct StreamGuard {
    mcp: Arc<McpController>,
    topic_id: i64,
    subscription_id: i64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        info!(
            topic_id = self.topic_id,
            subscription_id = self.subscription_id,
            "sse conn closed by user"
        );
        self.mcp.unsubscribe(self.topic_id, self.subscription_id);
    }
}

fn sse_response(mcp: Arc<McpController>, subscription: SubscribeResponse, origin: String) -> Response {
    let guard = StreamGuard {
        mcp,
        topic_id: subscription.topic_id,
        subscription_id: subscription.subscription_id,
    };

    let stream = ReceiverStream::new(subscription.events).map(move |event| {
        let _held = &guard;
        Ok::<Event, Infallible>(sse_frame(event))
    });

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text(HEARTBEAT_COMMENT),
    );

    (
        [
            (header::CACHE_CONTROL.as_str(), "no-cache".to_string()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), origin),
            (header::ACCESS_CONTROL_ALLOW_HEADERS.as_str(), "cache-control".to_string()),
            (header::ACCESS_CONTROL_ALLOW_CREDENTIALS.as_str(), "true".to_string()),
        ],
        sse,
    )
        .into_response()
}

fn sse_frame(event: EventPayload) -> Event {
    let mut frame = Event::default();
    if let Some(id) = event.id() {
        frame = frame.id(id);
    }
    if let Some(kind) = event.event_type() {
        frame = frame.event(kind);
    }
    frame.data(String::from_utf8_lossy(event.data()))
}

pub(super) fn api_error_response(e: ApiError) -> Response {
    let status = StatusCode::from_u16(e.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "error": e }))).into_response()
}

fn invalid_envelope(body: &[u8]) -> Response {
    let error = JsonRpcError::invalid_json(
        "invalid jsonrpc 2.0 object received",
        Some(serde_json::json!({
            "payload": String::from_utf8_lossy(body),
        })),
    );
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(None, error))).into_response()
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn origin_of(headers: &HeaderMap) -> String {
    let origin = header_str(headers, "origin");
    if origin.is_empty() {
        "*".to_string()
    } else {
        origin
    }
}

/// Caller headers eligible for proxying to upstream tools.
fn forwardable_headers(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut forwarded: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        let key = name.as_str();
        if EXCLUDED_HEADERS.contains(&key) {
            continue;
        }
        let Ok(value) = value.to_str() else { continue };
        forwarded
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    forwarded
}
