//! OAuth2 broker for provider credentials.
//!
//! `authorize` sends the operator to the provider's consent page with a
//! short-lived state JWT; `callback` exchanges the code and stores the
//! resulting tokens as SECRET variables, named so the provider's tool
//! headers pick them up on the next call.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use hasmcp_core::idgen::encode_base62;
use hasmcp_core::Secrets;

use crate::cache::Cache;
use crate::crud::CrudController;
use crate::error::ApiError;
use crate::httpc::Httpc;
use crate::jwt::StateJwt;
use crate::mcp::tool::extract_variables;

/// Seconds the operator gets to finish consent on the provider side.
const STATE_TTL_SECS: i64 = 180;

pub struct AuthorizeRequest {
    pub server_id: i64,
    pub host_name: String,
}

pub struct CallbackRequest {
    pub host_name: String,
    pub state: String,
    pub code: String,
}

/// Token endpoint response, RFC 6749 shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    expires_in: Option<i64>,
}

pub struct Oauth2Broker {
    http_scheme: String,
    secrets: Arc<Secrets>,
    cache: Arc<Cache>,
    state_jwt: Arc<StateJwt>,
    httpc: Arc<Httpc>,
    crud: Arc<CrudController>,
}

impl Oauth2Broker {
    pub fn new(
        http_scheme: String,
        secrets: Arc<Secrets>,
        cache: Arc<Cache>,
        state_jwt: Arc<StateJwt>,
        httpc: Arc<Httpc>,
        crud: Arc<CrudController>,
    ) -> Self {
        Self {
            http_scheme,
            secrets,
            cache,
            state_jwt,
            httpc,
            crud,
        }
    }

    /// Build the provider's consent URL for a server. The scope set is the
    /// union of the scopes of the server's bound tools.
    pub async fn authorize(&self, req: AuthorizeRequest) -> Result<String, ApiError> {
        let server = self.cache.get_server(req.server_id).await.map_err(|e| {
            ApiError::not_found("server not found", Some(json!({ "reason": e.to_string() })))
        })?;

        // a server without a provider has nothing to authorize against
        if server.providers.len() != 1 {
            return Err(ApiError::unprocessable(
                "a provider must be assigned to MCP server to authorize",
                Some(json!({
                    "serverID": encode_base62(server.id),
                    "providerCount": server.providers.len(),
                })),
            ));
        }

        let provider = self
            .cache
            .get_provider(server.providers[0].id)
            .await
            .map_err(|e| {
                ApiError::not_found("provider not found", Some(json!({ "reason": e.to_string() })))
            })?;

        let client_secret = self.decrypt_client_secret(&provider)?;
        let oauth2 = &provider.oauth2;
        if oauth2.client_id.is_empty()
            || client_secret.is_empty()
            || oauth2.token_url.is_empty()
            || oauth2.auth_url.is_empty()
        {
            return Err(ApiError::bad_request(
                "provider client credentials are missing",
                Some(json!({
                    "clientIDMissing": oauth2.client_id.is_empty(),
                    "clientSecretMissing": client_secret.is_empty(),
                    "tokenURLMissing": oauth2.token_url.is_empty(),
                    "authURLMissing": oauth2.auth_url.is_empty(),
                })),
            ));
        }

        let mut scopes: Vec<String> = Vec::new();
        for tool in &server.providers[0].tools {
            for scope in &tool.oauth2_scopes {
                let scope = scope.trim();
                if scope.is_empty() || scopes.iter().any(|s| s == scope) {
                    continue;
                }
                scopes.push(scope.to_string());
            }
        }

        let state_entropy = self.secrets.random_string64().map_err(|e| {
            ApiError::internal(
                "couldn't generate random string for nonce",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;
        let expires_at = chrono::Utc::now().timestamp() + STATE_TTL_SECS;
        let state = self
            .state_jwt
            .issue_state(provider.id, server.id, &state_entropy[..16], expires_at)
            .map_err(|e| {
                ApiError::internal(
                    "couldn't generate jwt token for state",
                    Some(json!({ "reason": e.to_string() })),
                )
            })?;

        // NOTE: the redirect URL must be registered with the provider
        let redirect_url = format!("{}://{}/oauth2/callback", self.http_scheme, req.host_name);

        let mut url = url::Url::parse(&oauth2.auth_url).map_err(|e| {
            ApiError::bad_request(
                "provider authorize URL is malformed",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &oauth2.client_id)
            .append_pair("redirect_uri", &redirect_url)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("access_type", "offline");

        Ok(url.to_string())
    }

    /// Finish the flow: verify state, exchange the code, persist tokens.
    /// Returns the internal redirect target for the admin UI.
    pub async fn callback(&self, req: CallbackRequest) -> Result<String, ApiError> {
        if req.code.is_empty() {
            return Err(ApiError::unprocessable("invalid authorization code", None));
        }

        let state = self.state_jwt.verify_state(&req.state).map_err(|e| {
            ApiError::unauthorized(
                "failed to verify state",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;

        let provider = self.cache.get_provider(state.provider_id).await.map_err(|_| {
            ApiError::unauthorized(
                "couldn't find the provider",
                Some(json!({
                    "providerID": encode_base62(state.provider_id),
                    "serverID": encode_base62(state.server_id),
                })),
            )
        })?;

        let client_secret = self.decrypt_client_secret(&provider)?;
        let redirect_url = format!("{}://{}/oauth2/callback", self.http_scheme, req.host_name);

        let response = self
            .httpc
            .client()
            .post(provider.oauth2.token_url.as_str())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", req.code.as_str()),
                ("redirect_uri", redirect_url.as_str()),
                ("client_id", provider.oauth2.client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.exchange_error(&state, &req.code, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "token endpoint rejected the exchange");
            return Err(self.exchange_error(&state, &req.code, format!("status {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.exchange_error(&state, &req.code, e.to_string()))?;

        let access_token_name = access_token_variable_name(&provider);
        let refresh_token_name = format!("{}_REFRESH_TOKEN", provider.secret_prefix);

        self.crud
            .save_secret_variable(&access_token_name, &token.access_token)
            .await
            .map_err(|e| {
                ApiError::internal(
                    "couldn't save access token",
                    Some(json!({
                        "providerID": encode_base62(state.provider_id),
                        "serverID": encode_base62(state.server_id),
                        "reason": e.to_string(),
                    })),
                )
            })?;

        if let Some(refresh_token) = token.refresh_token.filter(|t| !t.is_empty()) {
            self.crud
                .save_secret_variable(&refresh_token_name, &refresh_token)
                .await
                .map_err(|e| {
                    ApiError::internal(
                        "couldn't save refresh token",
                        Some(json!({
                            "providerID": encode_base62(state.provider_id),
                            "serverID": encode_base62(state.server_id),
                            "reason": e.to_string(),
                        })),
                    )
                })?;
        }

        Ok(format!(
            "/servers/{}?message=Successfully+added+access+and+refresh+tokens+to+variables",
            encode_base62(state.server_id)
        ))
    }

    fn decrypt_client_secret(&self, provider: &hasmcp_core::Provider) -> Result<String, ApiError> {
        if provider.oauth2.client_secret_encrypted.is_empty() {
            return Ok(String::new());
        }
        let plaintext = self
            .secrets
            .decrypt(
                &provider.oauth2.client_secret_encrypted,
                &provider.oauth2.client_secret_nonce,
            )
            .map_err(|e| {
                ApiError::internal(
                    "failed to decrypt provider client secret",
                    Some(json!({ "reason": e.to_string() })),
                )
            })?;
        String::from_utf8(plaintext).map_err(|_| {
            ApiError::internal("failed to decrypt provider client secret", None)
        })
    }

    fn exchange_error(
        &self,
        state: &crate::jwt::StateAuth,
        code: &str,
        reason: String,
    ) -> ApiError {
        ApiError::unauthorized(
            "couldn't get access token from provider",
            Some(json!({
                "providerID": encode_base62(state.provider_id),
                "serverID": encode_base62(state.server_id),
                "reason": reason,
                "code": code,
            })),
        )
    }
}

/// Where the access token should land: the first `${VAR}` referenced by an
/// `Authorization` header across the provider's tools, else
/// `<SECRET_PREFIX>_ACCESS_TOKEN`. A tool whose `Authorization` header is a
/// literal doesn't settle the name; later tools may still reference one.
fn access_token_variable_name(provider: &hasmcp_core::Provider) -> String {
    for tool in &provider.tools {
        for header in &tool.headers {
            if header.key != "Authorization" {
                continue;
            }
            if let Some(name) = extract_variables(&header.value).into_iter().next() {
                return name;
            }
            // literal value: move on to the next tool
            break;
        }
    }
    format!("{}_ACCESS_TOKEN", provider.secret_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hasmcp_core::{Provider, ProviderTool, ToolHeader};

    fn provider_with_header(key: &str, value: &str) -> Provider {
        Provider {
            secret_prefix: "API_EXAMPLE_COM".into(),
            tools: vec![ProviderTool {
                headers: vec![ToolHeader {
                    key: key.into(),
                    value: value.into(),
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn access_token_name_from_authorization_header() {
        let p = provider_with_header("Authorization", "Bearer ${GH_TOKEN}");
        assert_eq!(access_token_variable_name(&p), "GH_TOKEN");
    }

    #[test]
    fn access_token_name_falls_back_to_prefix() {
        let p = provider_with_header("X-Key", "${OTHER}");
        assert_eq!(
            access_token_variable_name(&p),
            "API_EXAMPLE_COM_ACCESS_TOKEN"
        );

        let plain = provider_with_header("Authorization", "Bearer literal");
        assert_eq!(
            access_token_variable_name(&plain),
            "API_EXAMPLE_COM_ACCESS_TOKEN"
        );
    }

    #[test]
    fn access_token_name_scans_past_literal_headers() {
        // tool #1 authorizes with a literal, tool #2 references a variable:
        // the variable wins
        let mut p = provider_with_header("Authorization", "Bearer literal");
        p.tools.push(ProviderTool {
            headers: vec![ToolHeader {
                key: "Authorization".into(),
                value: "Bearer ${GH_TOKEN}".into(),
            }],
            ..Default::default()
        });
        assert_eq!(access_token_variable_name(&p), "GH_TOKEN");
    }
}
