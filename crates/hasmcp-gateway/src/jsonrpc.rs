//! JSON-RPC 2.0 envelope types and error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VERSION: &str = "2.0";

pub const ERR_INVALID_JSON: i32 = -32700;
pub const ERR_INVALID_REQUEST: i32 = -32600;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_INTERNAL: i32 = -32603;
pub const ERR_SERVER: i32 = -32000;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    /// Params as raw bytes for debug traces; empty when absent.
    pub fn params_bytes(&self) -> Vec<u8> {
        self.params
            .as_ref()
            .map(|p| serde_json::to_vec(p).unwrap_or_default())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultResponse {
    pub jsonrpc: &'static str,
    pub result: Value,
    pub id: Value,
}

impl ResultResponse {
    pub fn new(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: VERSION,
            result,
            id: id.unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub jsonrpc: &'static str,
    pub error: JsonRpcError,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl ErrorResponse {
    pub fn new(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: VERSION,
            error,
            id,
        }
    }
}

/// A protocol error. Carried as an error value through the dispatcher and
/// serialized verbatim into the response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    pub fn invalid_json(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(ERR_INVALID_JSON, message, data)
    }

    pub fn invalid_params(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(ERR_INVALID_PARAMS, message, data)
    }

    pub fn method_not_found(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(ERR_METHOD_NOT_FOUND, message, data)
    }

    pub fn internal(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(ERR_INTERNAL, message, data)
    }

    pub fn server_error(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(ERR_SERVER, message, data)
    }

    /// HTTP status the envelope travels with.
    pub fn http_status(&self) -> u16 {
        match self.code {
            ERR_INVALID_JSON | ERR_INVALID_REQUEST | ERR_INVALID_PARAMS => 400,
            ERR_METHOD_NOT_FOUND => 404,
            _ => 500,
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for JsonRpcError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_parses_with_and_without_id() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, Some(Value::from(1)));
        assert!(req.params.is_none());

        let notif: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(notif.id.is_none());
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(JsonRpcError::invalid_json("x", None).http_status(), 400);
        assert_eq!(JsonRpcError::invalid_params("x", None).http_status(), 400);
        assert_eq!(JsonRpcError::method_not_found("x", None).http_status(), 404);
        assert_eq!(JsonRpcError::internal("x", None).http_status(), 500);
        assert_eq!(JsonRpcError::server_error("x", None).http_status(), 500);
    }

    #[test]
    fn error_response_omits_null_fields() {
        let resp = ErrorResponse::new(None, JsonRpcError::method_not_found("nope", None));
        let raw = serde_json::to_string(&resp).unwrap();
        assert!(!raw.contains("\"id\""));
        assert!(!raw.contains("\"data\""));
    }
}
