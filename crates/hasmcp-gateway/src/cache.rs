//! Typed in-memory projections of persisted entities.
//!
//! Sub-maps per entity kind, filled lazily on first access and eagerly
//! re-filled by `reload_*`. Variables are loaded up-front with SECRET values
//! decrypted, so plaintext exists only in this process's memory. Eviction is
//! how the mutation path invalidates; duplicate reloads are harmless (both
//! writers store the same value).

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use hasmcp_core::repository::{CatalogStore, ProviderStore, ServerStore, VariableStore};
use hasmcp_core::{
    ObjectKind, Prompt, Provider, Resource, Secrets, Server, ServerRecord, Storage, Variable,
    VariableKind,
};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not found")]
    NotFound,
    #[error("storage: {0}")]
    Storage(String),
    #[error("decrypt failed for {0}")]
    Decrypt(String),
}

pub struct Cache {
    secrets: Arc<Secrets>,
    storage: Arc<dyn Storage>,

    variables: DashMap<String, String>,
    variable_refs: DashMap<i64, String>,
    tools: DashMap<i64, Arc<hasmcp_core::ProviderTool>>,
    providers: DashMap<i64, Arc<Provider>>,
    servers: DashMap<i64, Arc<Server>>,
    prompts: DashMap<i64, Arc<Prompt>>,
    resources: DashMap<i64, Arc<Resource>>,
}

impl Cache {
    /// Load all variables eagerly (decrypting SECRET values); everything else
    /// fills on demand. Fails when a stored secret cannot be decrypted with
    /// the configured key.
    pub async fn new(secrets: Arc<Secrets>, storage: Arc<dyn Storage>) -> anyhow::Result<Self> {
        let cache = Self {
            secrets,
            storage,
            variables: DashMap::new(),
            variable_refs: DashMap::new(),
            tools: DashMap::new(),
            providers: DashMap::new(),
            servers: DashMap::new(),
            prompts: DashMap::new(),
            resources: DashMap::new(),
        };

        for variable in cache.storage.list_variables().await? {
            let value = cache.plaintext_of(&variable)?;
            cache.variable_refs.insert(variable.id, variable.name.clone());
            cache.variables.insert(variable.name, value);
        }

        Ok(cache)
    }

    pub fn evict(&self, kind: ObjectKind, id: i64) {
        match kind {
            ObjectKind::Variable => {
                if let Some((_, name)) = self.variable_refs.remove(&id) {
                    self.variables.remove(&name);
                }
            }
            ObjectKind::ProviderTool => {
                self.tools.remove(&id);
            }
            ObjectKind::Provider => {
                self.providers.remove(&id);
            }
            ObjectKind::Server => {
                self.servers.remove(&id);
            }
            ObjectKind::Prompt => {
                self.prompts.remove(&id);
            }
            ObjectKind::Resource => {
                self.resources.remove(&id);
            }
            _ => {}
        }
    }

    pub async fn get_server(&self, id: i64) -> Result<Arc<Server>, CacheError> {
        match self.servers.get(&id) {
            Some(server) => Ok(server.clone()),
            None => self.reload_server(id).await,
        }
    }

    /// Rebuild the composed server view: record plus the bound subset of each
    /// provider's tools, and the referenced prompts and resources. Any
    /// missing piece fails the whole build.
    pub async fn reload_server(&self, id: i64) -> Result<Arc<Server>, CacheError> {
        let record: ServerRecord = self
            .storage
            .get_server(id)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?
            .ok_or(CacheError::NotFound)?;

        let mut providers: Vec<Provider> = Vec::new();
        for tool_ref in &record.tool_refs {
            let provider_id = tool_ref.provider_id;
            if providers.iter().any(|p| p.id == provider_id) {
                continue;
            }
            let mut provider = (*self.get_provider(provider_id).await?).clone();
            let bound = std::mem::take(&mut provider.tools);
            provider.tools = bound
                .into_iter()
                .filter(|t| {
                    record
                        .tool_refs
                        .iter()
                        .any(|r| r.provider_id == provider_id && r.tool_id == t.id)
                })
                .collect();
            providers.push(provider);
        }

        let mut prompts = Vec::with_capacity(record.prompt_ids.len());
        for prompt_id in &record.prompt_ids {
            prompts.push((*self.get_prompt(*prompt_id).await?).clone());
        }

        let mut resources = Vec::with_capacity(record.resource_ids.len());
        for resource_id in &record.resource_ids {
            resources.push((*self.get_resource(*resource_id).await?).clone());
        }

        let server = Arc::new(Server {
            id: record.id,
            version: record.version,
            name: record.name,
            instructions: record.instructions,
            request_headers_proxy_enabled: record.request_headers_proxy_enabled,
            visibility: record.visibility,
            providers,
            prompts,
            resources,
        });

        self.servers.insert(id, server.clone());
        Ok(server)
    }

    pub async fn get_provider(&self, id: i64) -> Result<Arc<Provider>, CacheError> {
        match self.providers.get(&id) {
            Some(provider) => Ok(provider.clone()),
            None => self.reload_provider(id).await,
        }
    }

    pub async fn reload_provider(&self, id: i64) -> Result<Arc<Provider>, CacheError> {
        let provider = self
            .storage
            .get_provider(id)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?
            .ok_or(CacheError::NotFound)?;
        let provider = Arc::new(provider);
        self.providers.insert(id, provider.clone());
        Ok(provider)
    }

    pub async fn get_tool(&self, id: i64) -> Result<Arc<hasmcp_core::ProviderTool>, CacheError> {
        match self.tools.get(&id) {
            Some(tool) => Ok(tool.clone()),
            None => self.reload_tool(id).await,
        }
    }

    pub async fn reload_tool(&self, id: i64) -> Result<Arc<hasmcp_core::ProviderTool>, CacheError> {
        let tool = self
            .storage
            .get_provider_tool(id)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?
            .ok_or(CacheError::NotFound)?;
        let tool = Arc::new(tool);
        self.tools.insert(id, tool.clone());
        Ok(tool)
    }

    pub async fn get_prompt(&self, id: i64) -> Result<Arc<Prompt>, CacheError> {
        match self.prompts.get(&id) {
            Some(prompt) => Ok(prompt.clone()),
            None => self.reload_prompt(id).await,
        }
    }

    pub async fn reload_prompt(&self, id: i64) -> Result<Arc<Prompt>, CacheError> {
        let prompt = self
            .storage
            .get_prompt(id)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?
            .ok_or(CacheError::NotFound)?;
        let prompt = Arc::new(prompt);
        self.prompts.insert(id, prompt.clone());
        Ok(prompt)
    }

    pub async fn get_resource(&self, id: i64) -> Result<Arc<Resource>, CacheError> {
        match self.resources.get(&id) {
            Some(resource) => Ok(resource.clone()),
            None => self.reload_resource(id).await,
        }
    }

    pub async fn reload_resource(&self, id: i64) -> Result<Arc<Resource>, CacheError> {
        let resource = self
            .storage
            .get_resource(id)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?
            .ok_or(CacheError::NotFound)?;
        let resource = Arc::new(resource);
        self.resources.insert(id, resource.clone());
        Ok(resource)
    }

    /// Plaintext variable value by name; SECRET values decrypt on reload.
    pub async fn get_variable(&self, name: &str) -> Result<String, CacheError> {
        match self.variables.get(name) {
            Some(value) => Ok(value.clone()),
            None => self.reload_variable(name).await,
        }
    }

    pub async fn reload_variable(&self, name: &str) -> Result<String, CacheError> {
        let variable = self
            .storage
            .get_variable_by_name(name)
            .await
            .map_err(|e| CacheError::Storage(e.to_string()))?
            .ok_or(CacheError::NotFound)?;

        let value = self.plaintext_of(&variable)?;
        self.variable_refs.insert(variable.id, variable.name.clone());
        self.variables.insert(variable.name, value.clone());
        Ok(value)
    }

    fn plaintext_of(&self, variable: &Variable) -> Result<String, CacheError> {
        if variable.kind == VariableKind::Env {
            return Ok(variable.value.clone());
        }

        let ciphertext = hex::decode(&variable.value)
            .map_err(|_| CacheError::Decrypt(variable.name.clone()))?;
        let nonce = hex::decode(&variable.nonce)
            .map_err(|_| CacheError::Decrypt(variable.name.clone()))?;
        let plaintext = self
            .secrets
            .decrypt(&ciphertext, &nonce)
            .map_err(|_| CacheError::Decrypt(variable.name.clone()))?;
        String::from_utf8(plaintext).map_err(|_| CacheError::Decrypt(variable.name.clone()))
    }
}
