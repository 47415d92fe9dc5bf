//! `tools/list` and `tools/call`: the upstream proxy path.
//!
//! A call resolves the tool id embedded in the wire name, builds the upstream
//! URL from the path template and the caller's arguments, assembles headers
//! with `${VARNAME}` substitution (caller headers win when the server proxies
//! them), performs the HTTP call, and wraps the whole response body as one
//! text content block regardless of upstream status.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use tracing::{error, warn};

use hasmcp_core::ToolHeader;

use super::{
    paginate, parse_cursor, CallSessionRequest, CallSessionResponse, McpController,
    PAGE_SIZE_TOOLS,
};
use crate::cache::Cache;
use crate::jsonrpc::{JsonRpcError, ResultResponse};
use crate::mcp::protocol::{CallToolRequestParams, CallToolResult, ContentBlock, ListToolsResult};

const ARG_PATH: &str = "pathArgs";
const ARG_QUERY: &str = "queryArgs";
const ARG_BODY: &str = "bodyArgs";

static VARIABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("static pattern"));

impl McpController {
    pub(super) async fn call_tools_list(
        &self,
        req: &CallSessionRequest,
    ) -> Result<CallSessionResponse, JsonRpcError> {
        let entry = self.server_entry(req.server_id).await?;
        let cursor = parse_cursor(&req.request)?;

        let (page, next) = paginate(&entry.tool_ids, cursor, PAGE_SIZE_TOOLS);
        let tools = page
            .iter()
            .filter_map(|id| entry.protocol.tools.get(id).cloned())
            .collect();

        let result = ListToolsResult {
            tools,
            next_cursor: next.map(|n| n.to_string()),
        };
        let data = serde_json::to_value(&result).map_err(|e| {
            JsonRpcError::internal(
                "failed to marshal response",
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

    pub(super) async fn call_tools_call(
        &self,
        req: &CallSessionRequest,
    ) -> Result<CallSessionResponse, JsonRpcError> {
        let params: CallToolRequestParams = match &req.request.params {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                JsonRpcError::invalid_json(
                    "failed to parse tools/call params",
                    Some(json!({ "reason": e.to_string() })),
                )
            })?,
            None => CallToolRequestParams::default(),
        };

        let entry = self.server_entry(req.server_id).await?;

        let tool_id = super::id_from_mcp_name(&params.name);
        if !entry.protocol.tools.contains_key(&tool_id) {
            return Err(JsonRpcError::invalid_params(
                "Tool not found",
                Some(json!({ "toolName": params.name })),
            ));
        }

        let path_args = params.arguments.get(ARG_PATH);
        let query_args = params.arguments.get(ARG_QUERY);
        let body_args = params.arguments.get(ARG_BODY);

        let tool = self.cache().get_tool(tool_id).await.map_err(|e| {
            JsonRpcError::internal(
                "Tool not found",
                Some(json!({
                    "reason": e.to_string(),
                    "toolName": params.name,
                })),
            )
        })?;

        let provider = self.cache().get_provider(tool.provider_id).await.map_err(|e| {
            error!(
                tool_name = %params.name,
                tool_id = tool.id,
                provider_id = tool.provider_id,
                error = %e,
                "tool provider is not found"
            );
            JsonRpcError::internal(
                "Tool provider is not found",
                Some(json!({
                    "reason": e.to_string(),
                    "toolName": params.name,
                    "providerID": tool.provider_id,
                    "toolID": tool.id,
                })),
            )
        })?;

        let url = build_url(&provider.base_url, &tool.path, path_args, query_args).ok_or_else(
            || {
                JsonRpcError::internal(
                    "Tool url is malformed",
                    Some(json!({ "toolName": params.name })),
                )
            },
        )?;

        let caller_headers: &HashMap<String, Vec<String>> = if entry.request_headers_proxy_enabled
        {
            &req.headers
        } else {
            // no proxying: the tool's own headers are authoritative
            static EMPTY: LazyLock<HashMap<String, Vec<String>>> = LazyLock::new(HashMap::new);
            &EMPTY
        };

        let headers = build_headers(caller_headers, &tool.headers, self.cache()).await;

        let body = body_args
            .map(|v| serde_json::to_vec(v).unwrap_or_default())
            .unwrap_or_default();

        let method = reqwest::Method::from_str(tool.method.as_str())
            .unwrap_or(reqwest::Method::GET);

        let response = self
            .httpc()
            .client()
            .request(method, url.as_str())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                JsonRpcError::internal(
                    "upstream call failed",
                    Some(json!({
                        "reason": e.to_string(),
                        "toolName": params.name,
                    })),
                )
            })?;

        let body = response.text().await.map_err(|e| {
            JsonRpcError::internal(
                "failed to read upstream response",
                Some(json!({
                    "reason": e.to_string(),
                    "toolName": params.name,
                })),
            )
        })?;

        let payload = CallToolResult {
            content: vec![ContentBlock::Text { text: body }],
        };
        let data = serde_json::to_value(&payload).map_err(|e| {
            JsonRpcError::internal(
                "failed to marshal tool result",
                Some(json!({
                    "reason": e.to_string(),
                    "toolName": params.name,
                })),
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

/// Assemble upstream headers. Caller headers pass through first (when the
/// server proxies them); a tool header whose key the caller already sent is
/// skipped entirely, otherwise its `${VARNAME}` references are substituted
/// from the variable cache.
pub(crate) async fn build_headers(
    caller_headers: &HashMap<String, Vec<String>>,
    tool_headers: &[ToolHeader],
    cache: &Cache,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (key, values) in caller_headers {
        let Ok(name) = HeaderName::from_str(key) else {
            warn!(key = %key, "skipping invalid proxied header name");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => warn!(key = %key, "skipping invalid proxied header value"),
            }
        }
    }

    for header in tool_headers {
        let caller_has = caller_headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case(&header.key));
        if caller_has {
            continue;
        }

        let mut value = header.value.clone();
        for name in extract_variables(&value) {
            match cache.get_variable(&name).await {
                Ok(resolved) => {
                    value = value.replacen(&format!("${{{name}}}"), &resolved, 1);
                }
                Err(_) => continue,
            }
        }

        let (Ok(name), Ok(value)) = (
            HeaderName::from_str(&header.key),
            HeaderValue::from_str(&value),
        ) else {
            warn!(key = %header.key, "skipping invalid tool header");
            continue;
        };
        headers.append(name, value);
    }

    headers
}

/// Names referenced as `${NAME}` in a header value, in order of appearance.
pub(crate) fn extract_variables(s: &str) -> Vec<String> {
    VARIABLE_NAME
        .captures_iter(s)
        .map(|c| c[1].to_string())
        .collect()
}

/// `base + path(template applied) + query`; `None` when the result does not
/// parse as a URL.
pub(crate) fn build_url(
    base_url: &str,
    path: &str,
    path_args: Option<&Value>,
    query_args: Option<&Value>,
) -> Option<String> {
    let built = format!(
        "{}{}{}",
        base_url,
        build_path(path, path_args),
        build_query(query_args)
    );
    url::Url::parse(&built).ok()?;
    Some(built)
}

/// Replace `{key}` segments with the string args. A non-flat argument object
/// yields an empty path.
pub(crate) fn build_path(path_template: &str, path_args: Option<&Value>) -> String {
    let Some(args) = path_args else {
        return path_template.to_string();
    };
    let Ok(args) = serde_json::from_value::<BTreeMap<String, String>>(args.clone()) else {
        return String::new();
    };

    let mut path = path_template.to_string();
    for (key, value) in &args {
        path = path.replace(&format!("{{{key}}}"), value);
    }
    path
}

/// `?k1=v1&k2=v2` from flat string args. Keys and values are joined
/// verbatim, without URL escaping.
pub(crate) fn build_query(query_args: Option<&Value>) -> String {
    let Some(args) = query_args else {
        return String::new();
    };
    let Ok(args) = serde_json::from_value::<BTreeMap<String, String>>(args.clone()) else {
        return String::new();
    };
    if args.is_empty() {
        return String::new();
    }

    let pairs: Vec<String> = args
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    format!("?{}", pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn path_template_substitution() {
        let args = json!({"login": "octocat", "repo": "hello"});
        assert_eq!(
            build_path("/users/{login}/repos/{repo}", Some(&args)),
            "/users/octocat/repos/hello"
        );
        assert_eq!(build_path("/users", None), "/users");
        // non-flat args: empty path, like a broken template expansion
        assert_eq!(build_path("/users/{login}", Some(&json!({"login": {"a": 1}}))), "");
    }

    #[test]
    fn query_is_joined_without_escaping() {
        let args = json!({"q": "a b", "page": "2"});
        assert_eq!(build_query(Some(&args)), "?page=2&q=a b");
        assert_eq!(build_query(None), "");
        assert_eq!(build_query(Some(&json!({}))), "");
    }

    #[test]
    fn url_assembly() {
        let path_args = json!({"id": "42"});
        let query_args = json!({"verbose": "true"});
        let url = build_url(
            "https://api.example.com",
            "/items/{id}",
            Some(&path_args),
            Some(&query_args),
        )
        .unwrap();
        assert_eq!(url, "https://api.example.com/items/42?verbose=true");

        assert!(build_url("not a url", "/x", None, None).is_none());
    }

    #[test]
    fn variable_extraction() {
        assert_eq!(
            extract_variables("Bearer ${GITHUB_COM_ACCESS_TOKEN}"),
            vec!["GITHUB_COM_ACCESS_TOKEN".to_string()]
        );
        assert_eq!(
            extract_variables("${A_1} and ${B_2}"),
            vec!["A_1".to_string(), "B_2".to_string()]
        );
        assert!(extract_variables("no refs ${lowercase}").is_empty());
    }
}
