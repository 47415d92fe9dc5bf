//! Server mutations: the record itself, its bindings, and access tokens.

use chrono::{Duration, Utc};
use serde_json::json;

use hasmcp_core::idgen::encode_base62;
use hasmcp_core::repository::{CatalogStore, ProviderStore, ServerStore, TokenStore};
use hasmcp_core::{EventKind, ObjectKind, ServerRecord, ServerToken};

use super::{validate_name, CrudController, MAX_INSTRUCTIONS_LEN};
use crate::error::ApiError;
use crate::jwt::ServerTokenClaims;
use crate::mcp::{
    SCOPE_SERVER_TAIL, SCOPE_SESSION_CALL, SCOPE_SESSION_CREATE, SCOPE_SESSION_DELETE,
    SCOPE_SESSION_STREAM,
};

const KNOWN_SCOPES: [&str; 5] = [
    SCOPE_SESSION_CREATE,
    SCOPE_SESSION_CALL,
    SCOPE_SESSION_STREAM,
    SCOPE_SESSION_DELETE,
    SCOPE_SERVER_TAIL,
];

const DEFAULT_TOKEN_TTL_DAYS: i64 = 365;

/// A freshly minted token: the JWT is returned exactly once.
pub struct CreateServerTokenResult {
    pub token: ServerToken,
    pub value: String,
}

impl CrudController {
    pub async fn create_server(&self, mut server: ServerRecord) -> Result<ServerRecord, ApiError> {
        validate_name(&server.name)?;
        validate_instructions(&server.instructions)?;

        server.id = self.idgen().next();
        server.version = 1;
        self.storage()
            .create_server(&server)
            .await
            .map_err(|e| ApiError::internal("failed to persist server", Some(json!({ "reason": e.to_string() }))))?;

        self.emit(ObjectKind::Server, EventKind::Create, server.id, server.id);
        Ok(server)
    }

    pub async fn update_server(&self, server: ServerRecord) -> Result<ServerRecord, ApiError> {
        validate_name(&server.name)?;
        validate_instructions(&server.instructions)?;

        self.storage()
            .update_server(&server)
            .await
            .map_err(|e| ApiError::internal("failed to update server", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Server, server.id);
        self.emit(ObjectKind::Server, EventKind::Update, server.id, server.id);
        Ok(server)
    }

    pub async fn delete_server(&self, id: i64) -> Result<(), ApiError> {
        self.storage()
            .delete_server(id)
            .await
            .map_err(|e| ApiError::internal("failed to delete server", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Server, id);
        self.emit(ObjectKind::Server, EventKind::Delete, id, id);
        Ok(())
    }

    /// Bind one provider tool. A server carries tools of at most one
    /// provider; a second provider is rejected.
    pub async fn add_server_tool(
        &self,
        server_id: i64,
        provider_id: i64,
        tool_id: i64,
    ) -> Result<(), ApiError> {
        let record = self.require_server(server_id).await?;

        if record
            .tool_refs
            .iter()
            .any(|r| r.provider_id != provider_id)
        {
            return Err(ApiError::unprocessable(
                "server already uses a different provider",
                Some(json!({ "serverID": encode_base62(server_id) })),
            ));
        }

        let tool = self
            .storage()
            .get_provider_tool(tool_id)
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
            .ok_or_else(|| ApiError::not_found("tool not found", None))?;
        if tool.provider_id != provider_id {
            return Err(ApiError::unprocessable(
                "tool does not belong to the given provider",
                None,
            ));
        }

        self.storage()
            .add_server_tool(server_id, provider_id, tool_id)
            .await
            .map_err(|e| ApiError::internal("failed to bind tool", Some(json!({ "reason": e.to_string() }))))?;
        self.after_binding_change(server_id).await;
        self.emit(ObjectKind::ServerTool, EventKind::Create, tool_id, server_id);
        Ok(())
    }

    pub async fn remove_server_tool(&self, server_id: i64, tool_id: i64) -> Result<(), ApiError> {
        self.require_server(server_id).await?;
        self.storage()
            .remove_server_tool(server_id, tool_id)
            .await
            .map_err(|e| ApiError::internal("failed to unbind tool", Some(json!({ "reason": e.to_string() }))))?;
        self.after_binding_change(server_id).await;
        self.emit(ObjectKind::ServerTool, EventKind::Delete, tool_id, server_id);
        Ok(())
    }

    pub async fn add_server_prompt(&self, server_id: i64, prompt_id: i64) -> Result<(), ApiError> {
        self.require_server(server_id).await?;
        self.storage()
            .get_prompt(prompt_id)
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
            .ok_or_else(|| ApiError::not_found("prompt not found", None))?;

        self.storage()
            .add_server_prompt(server_id, prompt_id)
            .await
            .map_err(|e| ApiError::internal("failed to bind prompt", Some(json!({ "reason": e.to_string() }))))?;
        self.after_binding_change(server_id).await;
        self.emit(ObjectKind::ServerPrompt, EventKind::Create, prompt_id, server_id);
        Ok(())
    }

    pub async fn remove_server_prompt(&self, server_id: i64, prompt_id: i64) -> Result<(), ApiError> {
        self.require_server(server_id).await?;
        self.storage()
            .remove_server_prompt(server_id, prompt_id)
            .await
            .map_err(|e| ApiError::internal("failed to unbind prompt", Some(json!({ "reason": e.to_string() }))))?;
        self.after_binding_change(server_id).await;
        self.emit(ObjectKind::ServerPrompt, EventKind::Delete, prompt_id, server_id);
        Ok(())
    }

    pub async fn add_server_resource(
        &self,
        server_id: i64,
        resource_id: i64,
    ) -> Result<(), ApiError> {
        self.require_server(server_id).await?;
        self.storage()
            .get_resource(resource_id)
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
            .ok_or_else(|| ApiError::not_found("resource not found", None))?;

        self.storage()
            .add_server_resource(server_id, resource_id)
            .await
            .map_err(|e| ApiError::internal("failed to bind resource", Some(json!({ "reason": e.to_string() }))))?;
        self.after_binding_change(server_id).await;
        self.emit(ObjectKind::ServerResource, EventKind::Create, resource_id, server_id);
        Ok(())
    }

    pub async fn remove_server_resource(
        &self,
        server_id: i64,
        resource_id: i64,
    ) -> Result<(), ApiError> {
        self.require_server(server_id).await?;
        self.storage()
            .remove_server_resource(server_id, resource_id)
            .await
            .map_err(|e| ApiError::internal("failed to unbind resource", Some(json!({ "reason": e.to_string() }))))?;
        self.after_binding_change(server_id).await;
        self.emit(ObjectKind::ServerResource, EventKind::Delete, resource_id, server_id);
        Ok(())
    }

    /// Mint an access token for a server. The JWT leaves the process once;
    /// only its hash is stored.
    pub async fn create_server_token(
        &self,
        server_id: i64,
        scopes: &[String],
        ttl_days: Option<i64>,
    ) -> Result<CreateServerTokenResult, ApiError> {
        self.require_server(server_id).await?;

        if scopes.is_empty() {
            return Err(ApiError::bad_request("at least one scope is required", None));
        }
        for scope in scopes {
            if !KNOWN_SCOPES.contains(&scope.as_str()) {
                return Err(ApiError::bad_request(
                    "unknown scope",
                    Some(json!({ "scope": scope })),
                ));
            }
        }

        let scope = scopes.join(" ");
        let expires_at = Utc::now() + Duration::days(ttl_days.unwrap_or(DEFAULT_TOKEN_TTL_DAYS));
        let id = self.idgen().next();

        let value = self
            .jwt()
            .issue_server_token(&ServerTokenClaims {
                server_id: encode_base62(server_id),
                scope: scope.clone(),
                exp: expires_at.timestamp(),
                jti: Some(encode_base62(id)),
            })
            .map_err(|e| ApiError::internal("failed to sign token", Some(json!({ "reason": e.to_string() }))))?;

        let hashed_value = self
            .secrets()
            .hash_token(value.as_bytes())
            .map_err(|e| ApiError::internal("failed to hash token", Some(json!({ "reason": e.to_string() }))))?;

        let token = ServerToken {
            id,
            server_id,
            created_at: Utc::now(),
            expires_at,
            scope,
            hashed_value,
        };
        self.storage()
            .create_server_token(&token)
            .await
            .map_err(|e| ApiError::internal("failed to persist token", Some(json!({ "reason": e.to_string() }))))?;

        Ok(CreateServerTokenResult { token, value })
    }

    pub async fn list_server_tokens(&self, server_id: i64) -> Result<Vec<ServerToken>, ApiError> {
        self.storage()
            .list_server_tokens(server_id)
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))
    }

    pub async fn delete_server_token(&self, id: i64) -> Result<(), ApiError> {
        self.storage()
            .delete_server_token(id)
            .await
            .map_err(|e| ApiError::internal("failed to delete token", Some(json!({ "reason": e.to_string() }))))
    }

    async fn require_server(&self, server_id: i64) -> Result<ServerRecord, ApiError> {
        self.storage()
            .get_server(server_id)
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
            .ok_or_else(|| {
                ApiError::not_found(
                    "server not found",
                    Some(json!({ "serverID": encode_base62(server_id) })),
                )
            })
    }

    async fn after_binding_change(&self, server_id: i64) {
        let _ = self.storage().bump_server_version(server_id).await;
        self.cache().evict(ObjectKind::Server, server_id);
    }
}

fn validate_instructions(instructions: &str) -> Result<(), ApiError> {
    if instructions.len() > MAX_INSTRUCTIONS_LEN {
        return Err(ApiError::bad_request(
            "instructions exceed the maximum length",
            Some(json!({ "max": MAX_INSTRUCTIONS_LEN })),
        ));
    }
    Ok(())
}
