//! `resources/list` and `resources/read`.
//!
//! A read fetches the resource URI over HTTP and returns the body inline:
//! text for `text/*` mime types, base64 blob otherwise. The mime type comes
//! from the upstream `Content-Type`, falling back to the stored one.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::json;

use super::{
    paginate, parse_cursor, CallSessionRequest, CallSessionResponse, McpController,
    PAGE_SIZE_RESOURCES,
};
use crate::jsonrpc::{JsonRpcError, ResultResponse};
use crate::mcp::protocol::{
    ListResourcesResult, ReadResourceRequestParams, ReadResourceResult, ResourceContents,
};

impl McpController {
    pub(super) async fn call_resources_list(
        &self,
        req: &CallSessionRequest,
    ) -> Result<CallSessionResponse, JsonRpcError> {
        let entry = self.server_entry(req.server_id).await?;
        let cursor = parse_cursor(&req.request)?;

        let (page, next) = paginate(&entry.resource_ids, cursor, PAGE_SIZE_RESOURCES);
        let resources = page
            .iter()
            .filter_map(|id| entry.protocol.resources.get(id).cloned())
            .collect();

        let result = ListResourcesResult {
            resources,
            next_cursor: next.map(|n| n.to_string()),
        };
        let data = serde_json::to_value(&result).map_err(|e| {
            JsonRpcError::internal(
                "failed to marshal resources/list response",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;

        Ok(CallSessionResponse {
            http_status: 200,
            mcp_session_id: req.mcp_session_id.clone(),
            mcp_protocol_version: req.mcp_protocol_version.clone(),
            result: Some(ResultResponse::new(req.request.id.clone(), data)),
        })
    }

    pub(super) async fn call_resources_read(
        &self,
        req: &CallSessionRequest,
    ) -> Result<CallSessionResponse, JsonRpcError> {
        let entry = self.server_entry(req.server_id).await?;

        let params: ReadResourceRequestParams = match &req.request.params {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                JsonRpcError::invalid_json(
                    "invalid json for resources/read",
                    Some(json!({ "reason": e.to_string() })),
                )
            })?,
            None => {
                return Err(JsonRpcError::invalid_params(
                    "missing params for resources/read",
                    None,
                ))
            }
        };

        let resource = entry
            .protocol
            .resources
            .values()
            .find(|r| r.uri == params.uri)
            .ok_or_else(|| {
                JsonRpcError::invalid_params(
                    "resource not found at specified URI",
                    Some(json!({ "uri": params.uri })),
                )
            })?;

        let response = self
            .httpc()
            .client()
            .get(params.uri.as_str())
            .send()
            .await
            .map_err(|e| {
                JsonRpcError::server_error(
                    "failed to fetch resource content",
                    Some(json!({ "uri": params.uri, "reason": e.to_string() })),
                )
            })?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| resource.mime_type.clone())
            .unwrap_or_default();

        let body = response.bytes().await.map_err(|e| {
            JsonRpcError::internal(
                "failed to read resource content",
                Some(json!({ "uri": params.uri, "reason": e.to_string() })),
            )
        })?;

        let mut contents = ResourceContents {
            uri: params.uri.clone(),
            mime_type: Some(mime_type.clone()),
            text: None,
            blob: None,
        };
        if mime_type.starts_with("text/") {
            contents.text = Some(String::from_utf8_lossy(&body).into_owned());
        } else {
            contents.blob = Some(BASE64.encode(&body));
        }

        let result = ReadResourceResult {
            contents: vec![contents],
        };
        let data = serde_json::to_value(&result).map_err(|e| {
            JsonRpcError::server_error(
                "failed to marshal resources/read response",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;

        Ok(CallSessionResponse {
            http_status: 200,
            mcp_session_id: req.mcp_session_id.clone(),
            mcp_protocol_version: req.mcp_protocol_version.clone(),
            result: Some(ResultResponse::new(req.request.id.clone(), data)),
        })
    }
}
