//! Prompt and resource mutations.

use serde_json::json;

use hasmcp_core::repository::{CatalogStore, ServerStore};
use hasmcp_core::{EventKind, ObjectKind, Prompt, Resource};

use super::{CrudController, MAX_DESCRIPTION_LEN, MAX_PROMPT_NAME_LEN};
use crate::error::ApiError;

impl CrudController {
    pub async fn create_prompt(&self, mut prompt: Prompt) -> Result<Prompt, ApiError> {
        validate_prompt(&prompt, true)?;
        prompt.id = self.idgen().next();
        self.storage()
            .create_prompt(&prompt)
            .await
            .map_err(|e| ApiError::internal("failed to persist prompt", Some(json!({ "reason": e.to_string() }))))?;
        Ok(prompt)
    }

    pub async fn update_prompt(&self, prompt: Prompt) -> Result<Prompt, ApiError> {
        // updates only re-check lengths on the fields provided
        validate_prompt(&prompt, false)?;
        self.storage()
            .update_prompt(&prompt)
            .await
            .map_err(|e| ApiError::internal("failed to update prompt", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Prompt, prompt.id);
        let server_ids = self
            .storage()
            .list_server_ids_by_prompt_id(prompt.id)
            .await
            .unwrap_or_default();
        self.emit_for_servers(ObjectKind::Prompt, EventKind::Update, prompt.id, &server_ids);
        Ok(prompt)
    }

    pub async fn delete_prompt(&self, id: i64) -> Result<(), ApiError> {
        let server_ids = self
            .storage()
            .list_server_ids_by_prompt_id(id)
            .await
            .unwrap_or_default();

        self.storage()
            .delete_prompt(id)
            .await
            .map_err(|e| ApiError::internal("failed to delete prompt", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Prompt, id);
        self.emit_for_servers(ObjectKind::Prompt, EventKind::Delete, id, &server_ids);
        Ok(())
    }

    pub async fn create_resource(&self, mut resource: Resource) -> Result<Resource, ApiError> {
        validate_resource(&resource, true)?;
        resource.id = self.idgen().next();
        self.storage()
            .create_resource(&resource)
            .await
            .map_err(|e| ApiError::internal("failed to persist resource", Some(json!({ "reason": e.to_string() }))))?;
        Ok(resource)
    }

    pub async fn update_resource(&self, resource: Resource) -> Result<Resource, ApiError> {
        validate_resource(&resource, false)?;
        self.storage()
            .update_resource(&resource)
            .await
            .map_err(|e| ApiError::internal("failed to update resource", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Resource, resource.id);
        let server_ids = self
            .storage()
            .list_server_ids_by_resource_id(resource.id)
            .await
            .unwrap_or_default();
        self.emit_for_servers(ObjectKind::Resource, EventKind::Update, resource.id, &server_ids);
        Ok(resource)
    }

    pub async fn delete_resource(&self, id: i64) -> Result<(), ApiError> {
        let server_ids = self
            .storage()
            .list_server_ids_by_resource_id(id)
            .await
            .unwrap_or_default();

        self.storage()
            .delete_resource(id)
            .await
            .map_err(|e| ApiError::internal("failed to delete resource", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Resource, id);
        self.emit_for_servers(ObjectKind::Resource, EventKind::Delete, id, &server_ids);
        Ok(())
    }
}

fn validate_prompt(prompt: &Prompt, create: bool) -> Result<(), ApiError> {
    if create && prompt.name.is_empty() {
        return Err(ApiError::bad_request("prompt name is required", None));
    }
    if prompt.name.len() > MAX_PROMPT_NAME_LEN {
        return Err(ApiError::bad_request(
            "prompt name exceeds the maximum length",
            Some(json!({ "max": MAX_PROMPT_NAME_LEN })),
        ));
    }
    if prompt.description.len() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request(
            "prompt description exceeds the maximum length",
            Some(json!({ "max": MAX_DESCRIPTION_LEN })),
        ));
    }
    Ok(())
}

fn validate_resource(resource: &Resource, create: bool) -> Result<(), ApiError> {
    if create {
        if resource.name.is_empty() {
            return Err(ApiError::bad_request("resource name is required", None));
        }
        if resource.uri.is_empty() {
            return Err(ApiError::bad_request("resource URI is required", None));
        }
        url::Url::parse(&resource.uri).map_err(|e| {
            ApiError::bad_request(
                "resource URI is not a valid URL",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;
    }
    if resource.description.len() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request(
            "resource description exceeds the maximum length",
            Some(json!({ "max": MAX_DESCRIPTION_LEN })),
        ));
    }
    Ok(())
}
