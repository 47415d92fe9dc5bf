//! Error values crossing the gateway's HTTP boundary.
//!
//! `JsonRpcError` travels inside the JSON-RPC envelope; `ApiError` is what
//! the non-protocol endpoints (session delete, streams, OAuth2, admin CRUD)
//! return as `{"error": {code, message, data}}` with its code as the HTTP
//! status.

use serde::Serialize;
use serde_json::Value;

use crate::jsonrpc::JsonRpcError;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiError {
    pub fn new(code: u16, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn bad_request(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(400, message, data)
    }

    pub fn unauthorized(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(401, message, data)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message, None)
    }

    pub fn not_found(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(404, message, data)
    }

    pub fn conflict(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(409, message, data)
    }

    pub fn unprocessable(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(422, message, data)
    }

    pub fn internal(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(500, message, data)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for ApiError {}

/// Either side of the boundary; dispatcher paths can fail both ways.
#[derive(Debug, Clone)]
pub enum McpError {
    Rpc(JsonRpcError),
    Api(ApiError),
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        McpError::Rpc(err)
    }
}

impl From<ApiError> for McpError {
    fn from(err: ApiError) -> Self {
        McpError::Api(err)
    }
}

impl std::fmt::Display for McpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McpError::Rpc(e) => e.fmt(f),
            McpError::Api(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for McpError {}
