//! Admin mutations.
//!
//! Every write follows the same shape: validate, persist (bumping the owner
//! version), evict the touched cache entries, then emit one `ResourceChange`
//! per affected server so the change router can rebuild projections and
//! notify live sessions.

mod catalog;
mod provider;
mod server;
mod variable;

pub use server::CreateServerTokenResult;

use std::sync::{Arc, LazyLock};

use regex::Regex;

use hasmcp_core::{EventKind, IdGen, ObjectKind, ResourceChange, Secrets, Storage};

use crate::cache::Cache;
use crate::error::ApiError;
use crate::jwt::McpJwt;
use crate::mcp::McpController;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9]{1,16}$").expect("static pattern"));
static TOOL_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z][A-Za-z0-9]{0,19}$").expect("static pattern"));
static VARIABLE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Z0-9_]{1,128}$").expect("static pattern"));

pub(crate) const MAX_INSTRUCTIONS_LEN: usize = 4096;
pub(crate) const MAX_PROMPT_NAME_LEN: usize = 128;
pub(crate) const MAX_DESCRIPTION_LEN: usize = 4096;

pub struct CrudController {
    idgen: Arc<IdGen>,
    storage: Arc<dyn Storage>,
    cache: Arc<Cache>,
    secrets: Arc<Secrets>,
    jwt: Arc<McpJwt>,
    mcp: Arc<McpController>,
}

impl CrudController {
    pub fn new(
        idgen: Arc<IdGen>,
        storage: Arc<dyn Storage>,
        cache: Arc<Cache>,
        secrets: Arc<Secrets>,
        jwt: Arc<McpJwt>,
        mcp: Arc<McpController>,
    ) -> Arc<Self> {
        Arc::new(Self {
            idgen,
            storage,
            cache,
            secrets,
            jwt,
            mcp,
        })
    }

    pub(crate) fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub(crate) fn cache(&self) -> &Cache {
        &self.cache
    }

    pub(crate) fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    pub(crate) fn idgen(&self) -> &IdGen {
        &self.idgen
    }

    pub(crate) fn jwt(&self) -> &McpJwt {
        &self.jwt
    }

    /// Route a change event to the router queue. A full queue is logged by
    /// the controller; the mutation itself has already been persisted.
    pub(crate) fn emit(
        &self,
        object_kind: ObjectKind,
        event_kind: EventKind,
        resource_id: i64,
        resource_owner_id: i64,
    ) {
        let _ = self.mcp.handle_changes(ResourceChange {
            object_kind,
            event_kind,
            resource_id,
            resource_owner_id,
        });
    }

    /// Emit the same change addressed to every server in `server_ids`.
    pub(crate) fn emit_for_servers(
        &self,
        object_kind: ObjectKind,
        event_kind: EventKind,
        resource_id: i64,
        server_ids: &[i64],
    ) {
        for server_id in server_ids {
            self.emit(object_kind, event_kind, resource_id, *server_id);
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), ApiError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "name must match [A-Za-z0-9]{1,16}",
            Some(serde_json::json!({ "name": name })),
        ))
    }
}

pub(crate) fn validate_tool_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || TOOL_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "tool name must match [a-z][A-Za-z0-9]{0,19}",
            Some(serde_json::json!({ "name": name })),
        ))
    }
}

pub(crate) fn validate_variable_name(name: &str) -> Result<(), ApiError> {
    if VARIABLE_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "variable name must match [A-Z0-9_]{1,128}",
            Some(serde_json::json!({ "name": name })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_name("GitHub1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("seventeen-chars!!").is_err());
    }

    #[test]
    fn tool_name_validation() {
        assert!(validate_tool_name("getUser").is_ok());
        assert!(validate_tool_name("").is_ok()); // optional, title used instead
        assert!(validate_tool_name("GetUser").is_err());
        assert!(validate_tool_name("averylongtoolnamethatflowsover").is_err());
    }

    #[test]
    fn variable_name_validation() {
        assert!(validate_variable_name("API_EXAMPLE_COM_ACCESS_TOKEN").is_ok());
        assert!(validate_variable_name("lowercase").is_err());
        assert!(validate_variable_name("").is_err());
    }
}
