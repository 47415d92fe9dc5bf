//! Wire DTOs for the admin API. Ids travel as base-62 strings; secret
//! material never travels out at all.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hasmcp_core::idgen::{decode_base62, encode_base62};
use hasmcp_core::{
    ApiKind, HttpMethod, Prompt, Provider, ProviderTool, Resource, ServerRecord, ServerToken,
    ToolHeader, Variable, VariableKind, Visibility,
};

use crate::error::ApiError;

pub fn parse_id(id: &str) -> Result<i64, ApiError> {
    let decoded = decode_base62(id);
    if decoded == 0 {
        return Err(ApiError::bad_request(
            "invalid id",
            Some(serde_json::json!({ "id": id })),
        ));
    }
    Ok(decoded)
}

// ---------------------------------------------------------------------------
// providers

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub id: String,
    pub version: i32,
    pub api_kind: ApiKind,
    pub visibility: Visibility,
    pub base_url: String,
    pub document_url: String,
    pub icon_url: String,
    pub secret_prefix: String,
    pub name: String,
    pub description: String,
    pub oauth2: Oauth2View,
    pub tools: Vec<ToolView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Oauth2View {
    pub client_id: String,
    pub client_secret_set: bool,
    pub auth_url: String,
    pub token_url: String,
}

impl From<&Provider> for ProviderView {
    fn from(p: &Provider) -> Self {
        Self {
            id: encode_base62(p.id),
            version: p.version,
            api_kind: p.api_kind,
            visibility: p.visibility,
            base_url: p.base_url.clone(),
            document_url: p.document_url.clone(),
            icon_url: p.icon_url.clone(),
            secret_prefix: p.secret_prefix.clone(),
            name: p.name.clone(),
            description: p.description.clone(),
            oauth2: Oauth2View {
                client_id: p.oauth2.client_id.clone(),
                client_secret_set: !p.oauth2.client_secret_encrypted.is_empty(),
                auth_url: p.oauth2.auth_url.clone(),
                token_url: p.oauth2.token_url.clone(),
            },
            tools: p.tools.iter().map(ToolView::from).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Oauth2Request {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateProviderRequest {
    pub api_kind: Option<ApiKind>,
    pub visibility: Option<Visibility>,
    pub base_url: String,
    pub document_url: String,
    pub icon_url: String,
    pub name: String,
    pub description: String,
    pub oauth2: Option<Oauth2Request>,
    pub tools: Vec<UpsertToolRequest>,
}

impl CreateProviderRequest {
    /// Build the domain entity; the plaintext client secret is returned
    /// separately for the controller to encrypt.
    pub fn into_provider(self) -> (Provider, Option<String>) {
        let mut provider = Provider {
            api_kind: self.api_kind.unwrap_or_default(),
            visibility: self.visibility.unwrap_or_default(),
            base_url: self.base_url,
            document_url: self.document_url,
            icon_url: self.icon_url,
            name: self.name,
            description: self.description,
            ..Default::default()
        };
        let mut client_secret = None;
        if let Some(oauth2) = self.oauth2 {
            provider.oauth2.client_id = oauth2.client_id;
            provider.oauth2.auth_url = oauth2.auth_url;
            provider.oauth2.token_url = oauth2.token_url;
            if !oauth2.client_secret.is_empty() {
                client_secret = Some(oauth2.client_secret);
            }
        }
        provider.tools = self.tools.into_iter().map(|t| t.into_tool(0)).collect();
        (provider, client_secret)
    }
}

// ---------------------------------------------------------------------------
// provider tools

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolView {
    pub id: String,
    pub provider_id: String,
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

impl From<&ProviderTool> for ToolView {
    fn from(t: &ProviderTool) -> Self {
        Self {
            id: encode_base62(t.id),
            provider_id: encode_base62(t.provider_id),
            method: t.method,
            path: t.path.clone(),
            name: t.name.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            path_args_schema: t.path_args_schema.clone(),
            query_args_schema: t.query_args_schema.clone(),
            req_body_schema: t.req_body_schema.clone(),
            res_body_schema: t.res_body_schema.clone(),
            headers: t.headers.clone(),
            oauth2_scopes: t.oauth2_scopes.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertToolRequest {
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

impl UpsertToolRequest {
    pub fn into_tool(self, provider_id: i64) -> ProviderTool {
        ProviderTool {
            id: 0,
            provider_id,
            method: self.method,
            path: self.path,
            name: self.name,
            title: self.title,
            description: self.description,
            path_args_schema: self.path_args_schema,
            query_args_schema: self.query_args_schema,
            req_body_schema: self.req_body_schema,
            res_body_schema: self.res_body_schema,
            headers: self.headers,
            oauth2_scopes: self.oauth2_scopes,
        }
    }
}

// ---------------------------------------------------------------------------
// servers

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerView {
    pub id: String,
    pub version: i32,
    pub name: String,
    pub instructions: String,
    pub request_headers_proxy_enabled: bool,
    pub visibility: Visibility,
    pub tool_ids: Vec<String>,
    pub prompt_ids: Vec<String>,
    pub resource_ids: Vec<String>,
}

impl From<&ServerRecord> for ServerView {
    fn from(s: &ServerRecord) -> Self {
        Self {
            id: encode_base62(s.id),
            version: s.version,
            name: s.name.clone(),
            instructions: s.instructions.clone(),
            request_headers_proxy_enabled: s.request_headers_proxy_enabled,
            visibility: s.visibility,
            tool_ids: s.tool_refs.iter().map(|r| encode_base62(r.tool_id)).collect(),
            prompt_ids: s.prompt_ids.iter().copied().map(encode_base62).collect(),
            resource_ids: s.resource_ids.iter().copied().map(encode_base62).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertServerRequest {
    pub name: String,
    pub instructions: String,
    pub request_headers_proxy_enabled: bool,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindToolRequest {
    pub provider_id: String,
    pub tool_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindPromptRequest {
    pub prompt_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindResourceRequest {
    pub resource_id: String,
}

// ---------------------------------------------------------------------------
// prompts and resources

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub arguments: Value,
    pub messages: Value,
    pub visibility: Visibility,
}

impl From<&Prompt> for PromptView {
    fn from(p: &Prompt) -> Self {
        Self {
            id: encode_base62(p.id),
            name: p.name.clone(),
            description: p.description.clone(),
            arguments: p.arguments.clone(),
            messages: p.messages.clone(),
            visibility: p.visibility,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertPromptRequest {
    pub name: String,
    pub description: String,
    pub arguments: Value,
    pub messages: Value,
    pub visibility: Option<Visibility>,
}

impl UpsertPromptRequest {
    pub fn into_prompt(self, id: i64) -> Prompt {
        Prompt {
            id,
            name: self.name,
            description: self.description,
            arguments: self.arguments,
            messages: self.messages,
            visibility: self.visibility.unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub uri: String,
    pub mime_type: String,
    pub size: i64,
    pub annotations: Value,
    pub visibility: Visibility,
}

impl From<&Resource> for ResourceView {
    fn from(r: &Resource) -> Self {
        Self {
            id: encode_base62(r.id),
            name: r.name.clone(),
            description: r.description.clone(),
            uri: r.uri.clone(),
            mime_type: r.mime_type.clone(),
            size: r.size,
            annotations: r.annotations.clone(),
            visibility: r.visibility,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertResourceRequest {
    pub name: String,
    pub description: String,
    pub uri: String,
    pub mime_type: String,
    pub size: i64,
    pub annotations: Value,
    pub visibility: Option<Visibility>,
}

impl UpsertResourceRequest {
    pub fn into_resource(self, id: i64) -> Resource {
        Resource {
            id,
            name: self.name,
            description: self.description,
            uri: self.uri,
            mime_type: self.mime_type,
            size: self.size,
            annotations: self.annotations,
            visibility: self.visibility.unwrap_or_default(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// variables

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableView {
    pub id: String,
    pub kind: VariableKind,
    pub name: String,
    /// Plaintext for ENV variables; always empty for SECRET.
    pub value: String,
}

impl From<&Variable> for VariableView {
    fn from(v: &Variable) -> Self {
        Self {
            id: encode_base62(v.id),
            kind: v.kind,
            name: v.name.clone(),
            value: if v.kind == VariableKind::Env {
                v.value.clone()
            } else {
                String::new()
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpsertVariableRequest {
    pub kind: VariableKind,
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// server tokens

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub id: String,
    pub server_id: String,
    pub scope: String,
    pub created_at: String,
    pub expires_at: String,
}

impl From<&ServerToken> for TokenView {
    fn from(t: &ServerToken) -> Self {
        Self {
            id: encode_base62(t.id),
            server_id: encode_base62(t.server_id),
            scope: t.scope.clone(),
            created_at: t.created_at.to_rfc3339(),
            expires_at: t.expires_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateTokenRequest {
    pub scopes: Vec<String>,
    pub ttl_days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub token: TokenView,
    /// The signed JWT, returned exactly once.
    pub value: String,
}
