//! Repository traits for persistent storage.
//!
//! These define the storage contract the gateway consumes without naming an
//! implementation; `hasmcp-storage` provides the SQLite one and tests are
//! free to substitute fakes. Composite operations (a provider with its tools,
//! a server with its bindings) are single calls so implementations can scope
//! them in one transaction.

use async_trait::async_trait;

use crate::domain::{
    Prompt, Provider, ProviderTool, Resource, ServerRecord, ServerToken, Variable,
};

/// Result type for repository operations.
pub type RepoResult<T> = anyhow::Result<T>;

#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Persist a provider together with its tools.
    async fn create_provider(&self, provider: &Provider) -> RepoResult<()>;
    /// Update provider fields (not tools) and bump its version.
    async fn update_provider(&self, provider: &Provider) -> RepoResult<()>;
    async fn delete_provider(&self, id: i64) -> RepoResult<()>;
    /// Load a provider with all of its tools.
    async fn get_provider(&self, id: i64) -> RepoResult<Option<Provider>>;
    async fn list_providers(&self) -> RepoResult<Vec<Provider>>;

    async fn create_provider_tool(&self, tool: &ProviderTool) -> RepoResult<()>;
    async fn update_provider_tool(&self, tool: &ProviderTool) -> RepoResult<()>;
    async fn delete_provider_tool(&self, provider_id: i64, tool_id: i64) -> RepoResult<()>;
    async fn get_provider_tool(&self, id: i64) -> RepoResult<Option<ProviderTool>>;
    /// True when the provider already has a tool with this method and path.
    async fn provider_tool_exists(
        &self,
        provider_id: i64,
        method: &str,
        path: &str,
    ) -> RepoResult<bool>;
    /// Bump the provider version; used when a child tool mutates.
    async fn bump_provider_version(&self, id: i64) -> RepoResult<()>;
}

#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn create_server(&self, server: &ServerRecord) -> RepoResult<()>;
    /// Update server fields (not bindings) and bump its version.
    async fn update_server(&self, server: &ServerRecord) -> RepoResult<()>;
    async fn delete_server(&self, id: i64) -> RepoResult<()>;
    /// Load a server row with its binding id lists.
    async fn get_server(&self, id: i64) -> RepoResult<Option<ServerRecord>>;
    async fn list_servers(&self) -> RepoResult<Vec<ServerRecord>>;
    async fn bump_server_version(&self, id: i64) -> RepoResult<()>;

    async fn add_server_tool(
        &self,
        server_id: i64,
        provider_id: i64,
        tool_id: i64,
    ) -> RepoResult<()>;
    async fn remove_server_tool(&self, server_id: i64, tool_id: i64) -> RepoResult<()>;
    async fn add_server_prompt(&self, server_id: i64, prompt_id: i64) -> RepoResult<()>;
    async fn remove_server_prompt(&self, server_id: i64, prompt_id: i64) -> RepoResult<()>;
    async fn add_server_resource(&self, server_id: i64, resource_id: i64) -> RepoResult<()>;
    async fn remove_server_resource(&self, server_id: i64, resource_id: i64) -> RepoResult<()>;

    async fn list_server_ids_by_provider_id(&self, provider_id: i64) -> RepoResult<Vec<i64>>;
    async fn list_server_ids_by_tool_id(&self, tool_id: i64) -> RepoResult<Vec<i64>>;
    async fn list_server_ids_by_prompt_id(&self, prompt_id: i64) -> RepoResult<Vec<i64>>;
    async fn list_server_ids_by_resource_id(&self, resource_id: i64) -> RepoResult<Vec<i64>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_prompt(&self, prompt: &Prompt) -> RepoResult<()>;
    async fn update_prompt(&self, prompt: &Prompt) -> RepoResult<()>;
    async fn delete_prompt(&self, id: i64) -> RepoResult<()>;
    async fn get_prompt(&self, id: i64) -> RepoResult<Option<Prompt>>;
    async fn list_prompts(&self) -> RepoResult<Vec<Prompt>>;

    async fn create_resource(&self, resource: &Resource) -> RepoResult<()>;
    async fn update_resource(&self, resource: &Resource) -> RepoResult<()>;
    async fn delete_resource(&self, id: i64) -> RepoResult<()>;
    async fn get_resource(&self, id: i64) -> RepoResult<Option<Resource>>;
    async fn list_resources(&self) -> RepoResult<Vec<Resource>>;
}

#[async_trait]
pub trait VariableStore: Send + Sync {
    async fn create_variable(&self, variable: &Variable) -> RepoResult<()>;
    async fn update_variable(&self, variable: &Variable) -> RepoResult<()>;
    /// Insert-or-replace by name, keeping the existing row id on replace.
    async fn save_variable(&self, variable: &Variable) -> RepoResult<Variable>;
    async fn delete_variable(&self, id: i64) -> RepoResult<()>;
    async fn get_variable_by_name(&self, name: &str) -> RepoResult<Option<Variable>>;
    async fn list_variables(&self) -> RepoResult<Vec<Variable>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create_server_token(&self, token: &ServerToken) -> RepoResult<()>;
    async fn list_server_tokens(&self, server_id: i64) -> RepoResult<Vec<ServerToken>>;
    async fn delete_server_token(&self, id: i64) -> RepoResult<()>;
}

/// The full storage contract the gateway wires against.
pub trait Storage:
    ProviderStore + ServerStore + CatalogStore + VariableStore + TokenStore
{
}

impl<T> Storage for T where
    T: ProviderStore + ServerStore + CatalogStore + VariableStore + TokenStore
{
}
