//! Providers are upstream REST APIs; their endpoints become MCP tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Visibility;

/// Kind of upstream API. Only REST today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiKind {
    #[default]
    Rest,
}

impl ApiKind {
    pub fn as_str(&self) -> &'static str {
        "REST"
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "REST" => Some(ApiKind::Rest),
            _ => None,
        }
    }
}

/// HTTP method of a provider tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Connect,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "HEAD" => Some(HttpMethod::Head),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "CONNECT" => Some(HttpMethod::Connect),
            "OPTIONS" => Some(HttpMethod::Options),
            "TRACE" => Some(HttpMethod::Trace),
            _ => None,
        }
    }
}

/// A header the gateway attaches to upstream calls. Values may reference
/// variables with `${NAME}` placeholders, substituted at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHeader {
    pub key: String,
    pub value: String,
}

/// OAuth2 client configuration of a provider. The client secret is held
/// encrypted; the plaintext only exists transiently inside the broker.
#[derive(Debug, Clone, Default)]
pub struct Oauth2Config {
    pub client_id: String,
    pub client_secret_encrypted: Vec<u8>,
    pub client_secret_nonce: Vec<u8>,
    pub auth_url: String,
    pub token_url: String,
}

impl Oauth2Config {
    /// True when the provider has everything needed to run the code flow.
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret_encrypted.is_empty()
            && !self.auth_url.is_empty()
            && !self.token_url.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Provider {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub version: i32,
    pub api_kind: ApiKind,
    pub visibility: Visibility,
    pub base_url: String,
    pub document_url: String,
    pub icon_url: String,
    /// Uppercased host of the base URL, `www.` stripped, dots to underscores.
    /// Secret variable names for this provider derive from it.
    pub secret_prefix: String,
    pub name: String,
    pub description: String,

    pub oauth2: Oauth2Config,
    pub tools: Vec<ProviderTool>,
}

/// One HTTP endpoint of a provider, callable through MCP `tools/call`.
///
/// The four schema fields hold raw JSON Schema documents (empty string when
/// unset); which of them are non-empty decides the tool's MCP input schema.
#[derive(Debug, Clone, Default)]
pub struct ProviderTool {
    pub id: i64,
    pub provider_id: i64,

    pub method: HttpMethod,
    pub path: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub path_args_schema: String,
    pub query_args_schema: String,
    pub req_body_schema: String,
    pub res_body_schema: String,
    pub headers: Vec<ToolHeader>,
    pub oauth2_scopes: Vec<String>,
}

/// Derive the secret prefix from a provider base URL.
///
/// `https://api.github.com/v3` -> `API_GITHUB_COM`
pub fn secret_prefix_for(base_url: &str) -> String {
    let host = host_of(base_url);
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.to_ascii_uppercase().replace('.', "_")
}

// Minimal host extraction; the admin layer has already validated the URL.
fn host_of(base_url: &str) -> &str {
    let rest = base_url
        .split_once("://")
        .map(|(_, r)| r)
        .unwrap_or(base_url);
    let end = rest
        .find(|c| c == '/' || c == ':' || c == '?')
        .unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_prefix_strips_www_and_scheme() {
        assert_eq!(secret_prefix_for("https://www.github.com"), "GITHUB_COM");
        assert_eq!(secret_prefix_for("https://api.github.com/v3"), "API_GITHUB_COM");
        assert_eq!(secret_prefix_for("http://localhost:8080"), "LOCALHOST");
    }

    #[test]
    fn method_round_trip() {
        for m in ["GET", "POST", "DELETE", "PATCH"] {
            assert_eq!(HttpMethod::parse(m).unwrap().as_str(), m);
        }
        assert!(HttpMethod::parse("FETCH").is_none());
    }
}
