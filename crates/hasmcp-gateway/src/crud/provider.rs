//! Provider and provider-tool mutations.

use serde_json::json;

use hasmcp_core::repository::{ProviderStore, ServerStore};
use hasmcp_core::{secret_prefix_for, EventKind, ObjectKind, Provider, ProviderTool};

use super::{validate_name, validate_tool_name, CrudController};
use crate::error::ApiError;

impl CrudController {
    /// Create a provider, optionally with an initial tool set. The plaintext
    /// OAuth2 client secret is encrypted before anything is persisted.
    pub async fn create_provider(
        &self,
        mut provider: Provider,
        client_secret: Option<String>,
    ) -> Result<Provider, ApiError> {
        validate_name(&provider.name)?;
        url::Url::parse(&provider.base_url).map_err(|e| {
            ApiError::bad_request(
                "base URL is not a valid URL",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;

        provider.id = self.idgen().next();
        provider.version = 1;
        provider.secret_prefix = secret_prefix_for(&provider.base_url);
        self.apply_client_secret(&mut provider, client_secret)?;

        let mut seen = Vec::with_capacity(provider.tools.len());
        for tool in &mut provider.tools {
            validate_tool_name(&tool.name)?;
            let key = (tool.method, tool.path.clone());
            if seen.contains(&key) {
                return Err(ApiError::conflict(
                    "duplicate tool method and path",
                    Some(json!({ "method": tool.method.as_str(), "path": tool.path })),
                ));
            }
            seen.push(key);
            tool.id = self.idgen().next();
            tool.provider_id = provider.id;
        }

        self.storage()
            .create_provider(&provider)
            .await
            .map_err(|e| ApiError::internal("failed to persist provider", Some(json!({ "reason": e.to_string() }))))?;

        Ok(provider)
    }

    /// Update provider fields. Length/pattern checks run only on what is
    /// present; association and tool updates have their own endpoints.
    pub async fn update_provider(
        &self,
        mut provider: Provider,
        client_secret: Option<String>,
    ) -> Result<Provider, ApiError> {
        validate_name(&provider.name)?;
        provider.secret_prefix = secret_prefix_for(&provider.base_url);
        self.apply_client_secret(&mut provider, client_secret)?;

        self.storage()
            .update_provider(&provider)
            .await
            .map_err(|e| ApiError::internal("failed to update provider", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Provider, provider.id);

        let server_ids = self
            .storage()
            .list_server_ids_by_provider_id(provider.id)
            .await
            .unwrap_or_default();
        self.emit_for_servers(ObjectKind::Provider, EventKind::Update, provider.id, &server_ids);

        Ok(provider)
    }

    pub async fn delete_provider(&self, id: i64) -> Result<(), ApiError> {
        let server_ids = self
            .storage()
            .list_server_ids_by_provider_id(id)
            .await
            .unwrap_or_default();

        self.storage()
            .delete_provider(id)
            .await
            .map_err(|e| ApiError::internal("failed to delete provider", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Provider, id);
        self.emit_for_servers(ObjectKind::Provider, EventKind::Delete, id, &server_ids);
        Ok(())
    }

    pub async fn create_provider_tool(
        &self,
        mut tool: ProviderTool,
    ) -> Result<ProviderTool, ApiError> {
        validate_tool_name(&tool.name)?;

        self.storage()
            .get_provider(tool.provider_id)
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
            .ok_or_else(|| ApiError::not_found("provider not found", None))?;

        let exists = self
            .storage()
            .provider_tool_exists(tool.provider_id, tool.method.as_str(), &tool.path)
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?;
        if exists {
            return Err(ApiError::conflict(
                "a tool with this method and path already exists",
                Some(json!({ "method": tool.method.as_str(), "path": tool.path })),
            ));
        }

        tool.id = self.idgen().next();
        self.storage()
            .create_provider_tool(&tool)
            .await
            .map_err(|e| ApiError::internal("failed to persist tool", Some(json!({ "reason": e.to_string() }))))?;
        self.storage()
            .bump_provider_version(tool.provider_id)
            .await
            .map_err(|e| ApiError::internal("failed to bump provider version", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Provider, tool.provider_id);

        let server_ids = self
            .storage()
            .list_server_ids_by_provider_id(tool.provider_id)
            .await
            .unwrap_or_default();
        self.emit_for_servers(ObjectKind::ProviderTool, EventKind::Create, tool.id, &server_ids);

        Ok(tool)
    }

    pub async fn update_provider_tool(&self, tool: ProviderTool) -> Result<ProviderTool, ApiError> {
        validate_tool_name(&tool.name)?;

        self.storage()
            .update_provider_tool(&tool)
            .await
            .map_err(|e| ApiError::internal("failed to update tool", Some(json!({ "reason": e.to_string() }))))?;
        self.storage()
            .bump_provider_version(tool.provider_id)
            .await
            .map_err(|e| ApiError::internal("failed to bump provider version", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::ProviderTool, tool.id);
        self.cache().evict(ObjectKind::Provider, tool.provider_id);

        let server_ids = self
            .storage()
            .list_server_ids_by_tool_id(tool.id)
            .await
            .unwrap_or_default();
        self.emit_for_servers(ObjectKind::ProviderTool, EventKind::Update, tool.id, &server_ids);

        Ok(tool)
    }

    pub async fn delete_provider_tool(&self, provider_id: i64, tool_id: i64) -> Result<(), ApiError> {
        let server_ids = self
            .storage()
            .list_server_ids_by_tool_id(tool_id)
            .await
            .unwrap_or_default();

        self.storage()
            .delete_provider_tool(provider_id, tool_id)
            .await
            .map_err(|e| ApiError::internal("failed to delete tool", Some(json!({ "reason": e.to_string() }))))?;
        self.storage()
            .bump_provider_version(provider_id)
            .await
            .map_err(|e| ApiError::internal("failed to bump provider version", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::ProviderTool, tool_id);
        self.cache().evict(ObjectKind::Provider, provider_id);
        self.emit_for_servers(ObjectKind::ProviderTool, EventKind::Delete, tool_id, &server_ids);
        Ok(())
    }

    fn apply_client_secret(
        &self,
        provider: &mut Provider,
        client_secret: Option<String>,
    ) -> Result<(), ApiError> {
        let Some(secret) = client_secret.filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let (ciphertext, nonce) = self.secrets().encrypt(secret.as_bytes()).map_err(|e| {
            ApiError::internal(
                "failed to encrypt client secret",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;
        provider.oauth2.client_secret_encrypted = ciphertext;
        provider.oauth2.client_secret_nonce = nonce;
        Ok(())
    }
}
