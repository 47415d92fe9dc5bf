//! The in-memory server registry.
//!
//! Maps server ids to protocol-ready projections built from the cache.
//! Projections are immutable once published; the change router replaces an
//! entry wholesale and grafts the live session map onto the replacement, so
//! readers never observe a half-built server.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;

use hasmcp_core::idgen::encode_base62;

use crate::cache::Cache;
use crate::jsonrpc::JsonRpcError;
use crate::mcp::protocol::{
    opt, Implementation, Prompt, Resource, Tool, ToolInputSchema,
};

/// Wire names carry the feature prefix, the base-62 id, and a separator:
/// everything after position 12 is human-readable garnish. Clients are
/// supposed to show titles, but many still show names.
const NAME_MAX_LEN: usize = 41;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Za-z0-9]").expect("static pattern"));

/// One live MCP session on a server.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub pubsub_id: i64,
    pub initialize_params: crate::mcp::protocol::InitializeRequestParams,
}

pub struct ProtocolComponents {
    pub implementation: Implementation,
    pub tools: HashMap<i64, Tool>,
    pub prompts: HashMap<i64, Prompt>,
    pub resources: HashMap<i64, Resource>,
}

/// Protocol-ready projection of one server. `sessions` is shared across
/// rebuilds: the change router moves the same map onto each replacement.
pub struct ServerEntry {
    pub request_headers_proxy_enabled: bool,
    pub tool_ids: Vec<i64>,
    pub prompt_ids: Vec<i64>,
    pub resource_ids: Vec<i64>,
    pub sessions: Arc<DashMap<i64, SessionState>>,
    pub protocol: ProtocolComponents,
}

pub struct Registry {
    servers: DashMap<i64, Arc<ServerEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            servers: DashMap::new(),
        }
    }

    pub fn get(&self, id: i64) -> Option<Arc<ServerEntry>> {
        self.servers.get(&id).map(|e| e.clone())
    }

    pub fn insert(&self, id: i64, entry: Arc<ServerEntry>) {
        self.servers.insert(id, entry);
    }

    pub fn remove(&self, id: i64) {
        self.servers.remove(&id);
    }

    /// Atomic load-or-build. A missing server surfaces as `InvalidParams` so
    /// the dispatcher can return it verbatim.
    pub async fn get_or_build(
        &self,
        cache: &Cache,
        id: i64,
    ) -> Result<Arc<ServerEntry>, JsonRpcError> {
        if let Some(entry) = self.get(id) {
            return Ok(entry);
        }
        let entry = Arc::new(build_server(cache, id).await?);
        self.servers.insert(id, entry.clone());
        Ok(entry)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a fresh projection from the cache.
pub async fn build_server(cache: &Cache, server_id: i64) -> Result<ServerEntry, JsonRpcError> {
    let server = cache.reload_server(server_id).await.map_err(|e| {
        JsonRpcError::invalid_params(
            "Server not found",
            Some(serde_json::json!({
                "serverID": server_id,
                "reason": e.to_string(),
            })),
        )
    })?;

    let server_name_len = server.name.len();

    let mut tool_ids = Vec::new();
    let mut tools = HashMap::new();
    for provider in &server.providers {
        for t in &provider.tools {
            tool_ids.push(t.id);

            let title = if t.title.is_empty() {
                format!("{} {}", t.method.as_str(), t.path)
            } else {
                t.title.clone()
            };

            let mut properties = std::collections::BTreeMap::new();
            let mut required = Vec::with_capacity(3);
            // an empty object schema serializes as "{}": two bytes
            if t.path_args_schema.len() > 2 {
                properties.insert(
                    "pathArgs".to_string(),
                    serde_json::from_str::<Value>(&t.path_args_schema).unwrap_or(Value::Null),
                );
                required.push("pathArgs".to_string());
            }
            if t.query_args_schema.len() > 2 {
                properties.insert(
                    "queryArgs".to_string(),
                    serde_json::from_str::<Value>(&t.query_args_schema).unwrap_or(Value::Null),
                );
                required.push("queryArgs".to_string());
            }
            if !t.req_body_schema.is_empty() {
                properties.insert(
                    "bodyArgs".to_string(),
                    serde_json::from_str::<Value>(&t.req_body_schema).unwrap_or(Value::Null),
                );
                required.push("bodyArgs".to_string());
            }

            tools.insert(
                t.id,
                Tool {
                    name: to_mcp_name('T', t.id, &t.name, &title, server_name_len),
                    title: opt(&title),
                    description: opt(&t.description),
                    input_schema: ToolInputSchema {
                        kind: "object",
                        properties,
                        required: if required.is_empty() { None } else { Some(required) },
                    },
                },
            );
        }
    }

    let mut prompt_ids = Vec::with_capacity(server.prompts.len());
    let mut prompts = HashMap::with_capacity(server.prompts.len());
    for p in &server.prompts {
        prompt_ids.push(p.id);
        prompts.insert(
            p.id,
            Prompt {
                name: to_mcp_name('P', p.id, &p.name, "", server_name_len),
                title: opt(&p.name),
                description: opt(&p.description),
            },
        );
    }

    let mut resource_ids = Vec::with_capacity(server.resources.len());
    let mut resources = HashMap::with_capacity(server.resources.len());
    for r in &server.resources {
        resource_ids.push(r.id);
        resources.insert(
            r.id,
            Resource {
                name: to_mcp_name('R', r.id, &r.name, "", server_name_len),
                title: opt(&r.name),
                description: opt(&r.description),
                uri: r.uri.clone(),
                mime_type: opt(&r.mime_type),
                size: Some(r.size),
            },
        );
    }

    Ok(ServerEntry {
        request_headers_proxy_enabled: server.request_headers_proxy_enabled,
        tool_ids,
        prompt_ids,
        resource_ids,
        sessions: Arc::new(DashMap::new()),
        protocol: ProtocolComponents {
            implementation: Implementation {
                name: server.name.clone(),
                version: server.version.to_string(),
            },
            tools,
            prompts,
            resources,
        },
    })
}

/// Deterministic wire name: `<prefix><base62 id>_<human name or title>`,
/// squeezed to `[A-Za-z0-9_]` and capped so `len(server name) + len(name)`
/// stays within the display limit of common clients.
pub fn to_mcp_name(prefix: char, id: i64, name: &str, title: &str, server_name_len: usize) -> String {
    let title = title.replace(['[', ']', '{', '}'], "");

    let mut out = String::with_capacity(NAME_MAX_LEN);
    out.push(prefix);
    out.push_str(&encode_base62(id));
    out.push('_');
    out.push_str(if name.is_empty() { &title } else { name });

    let mut out = NON_ALNUM.replace_all(&out, "_").into_owned();
    while out.contains("__") {
        out = out.replace("__", "_");
    }

    let cap = NAME_MAX_LEN.saturating_sub(server_name_len);
    if out.len() > cap {
        out.truncate(cap);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hasmcp_core::idgen::decode_base62;
    use pretty_assertions::assert_eq;

    #[test]
    fn name_carries_decodable_id() {
        let name = to_mcp_name('T', 123_456_789, "getUser", "Get User", 4);
        assert!(name.starts_with('T'));
        assert_eq!(decode_base62(&name[1..12]), 123_456_789);
    }

    #[test]
    fn name_prefers_name_over_title() {
        let with_name = to_mcp_name('T', 1, "getUser", "Get User", 0);
        assert!(with_name.ends_with("_getUser"));

        let from_title = to_mcp_name('T', 1, "", "Get User", 0);
        assert!(from_title.ends_with("_Get_User"));
    }

    #[test]
    fn name_is_sanitized_and_collapsed() {
        let name = to_mcp_name('T', 7, "", "GET /users/{login}/repos", 0);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(!name.contains("__"));
    }

    #[test]
    fn name_respects_the_display_limit() {
        for server_name_len in [0usize, 4, 10, 16] {
            let name = to_mcp_name(
                'R',
                i64::MAX,
                "a-very-long-resource-name-that-will-overflow-the-cap",
                "",
                server_name_len,
            );
            assert!(
                name.len() <= 41 - server_name_len,
                "{} > {}",
                name.len(),
                41 - server_name_len
            );
        }
    }

    #[test]
    fn prompt_and_resource_prefixes() {
        assert!(to_mcp_name('P', 5, "greet", "", 0).starts_with('P'));
        assert!(to_mcp_name('R', 5, "readme", "", 0).starts_with('R'));
    }
}
