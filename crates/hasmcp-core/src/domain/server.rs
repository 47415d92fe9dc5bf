//! MCP servers: curated bundles of provider tools, prompts and resources.

use chrono::{DateTime, Utc};

use super::{Prompt, Provider, Resource, Visibility};

/// A server row as persisted, carrying association ids only. The cache
/// composes it with the referenced entities into a full [`Server`].
#[derive(Debug, Clone, Default)]
pub struct ServerRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub version: i32,
    pub name: String,
    pub instructions: String,
    pub request_headers_proxy_enabled: bool,
    pub visibility: Visibility,

    pub tool_refs: Vec<ServerToolRef>,
    pub prompt_ids: Vec<i64>,
    pub resource_ids: Vec<i64>,
}

/// Binding of one provider tool to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerToolRef {
    pub provider_id: i64,
    pub tool_id: i64,
}

/// The composed view of a server: its bound providers carry only the bound
/// subset of their tools. A server has at most one provider.
#[derive(Debug, Clone, Default)]
pub struct Server {
    pub id: i64,
    pub version: i32,
    pub name: String,
    pub instructions: String,
    pub request_headers_proxy_enabled: bool,
    pub visibility: Visibility,

    pub providers: Vec<Provider>,
    pub prompts: Vec<Prompt>,
    pub resources: Vec<Resource>,
}

/// An access token minted for a server. Only the bcrypt hash of the JWT is
/// kept; the token itself is shown once at creation.
#[derive(Debug, Clone, Default)]
pub struct ServerToken {
    pub id: i64,
    pub server_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Space-separated scope set, e.g. `"session:create session:call"`.
    pub scope: String,
    pub hashed_value: String,
}
