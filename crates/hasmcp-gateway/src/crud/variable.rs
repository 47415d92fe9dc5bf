//! Variable mutations. SECRET values are encrypted before persistence and
//! never leave the process again in the clear.

use serde_json::json;

use hasmcp_core::repository::VariableStore;
use hasmcp_core::{ObjectKind, Variable, VariableKind};

use super::{validate_variable_name, CrudController};
use crate::error::ApiError;

impl CrudController {
    pub async fn create_variable(
        &self,
        kind: VariableKind,
        name: &str,
        value: &str,
    ) -> Result<Variable, ApiError> {
        validate_variable_name(name)?;

        let mut variable = Variable {
            id: self.idgen().next(),
            kind,
            name: name.to_string(),
            ..Default::default()
        };
        self.fill_value(&mut variable, value)?;

        self.storage()
            .create_variable(&variable)
            .await
            .map_err(|e| ApiError::internal("failed to persist variable", Some(json!({ "reason": e.to_string() }))))?;
        Ok(variable)
    }

    pub async fn update_variable(
        &self,
        id: i64,
        kind: VariableKind,
        name: &str,
        value: &str,
    ) -> Result<Variable, ApiError> {
        validate_variable_name(name)?;

        let mut variable = Variable {
            id,
            kind,
            name: name.to_string(),
            ..Default::default()
        };
        self.fill_value(&mut variable, value)?;

        self.storage()
            .update_variable(&variable)
            .await
            .map_err(|e| ApiError::internal("failed to update variable", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Variable, id);
        Ok(variable)
    }

    /// Upsert a SECRET by name; the OAuth2 broker lands exchanged tokens
    /// here. The cached plaintext is evicted so the next header substitution
    /// reloads the fresh value.
    pub async fn save_secret_variable(&self, name: &str, value: &str) -> Result<Variable, ApiError> {
        validate_variable_name(name)?;

        let mut variable = Variable {
            id: self.idgen().next(),
            kind: VariableKind::Secret,
            name: name.to_string(),
            ..Default::default()
        };
        self.fill_value(&mut variable, value)?;

        let saved = self
            .storage()
            .save_variable(&variable)
            .await
            .map_err(|e| ApiError::internal("failed to save variable", Some(json!({ "reason": e.to_string() }))))?;

        self.cache().evict(ObjectKind::Variable, saved.id);
        Ok(saved)
    }

    pub async fn delete_variable(&self, id: i64) -> Result<(), ApiError> {
        self.storage()
            .delete_variable(id)
            .await
            .map_err(|e| ApiError::internal("failed to delete variable", Some(json!({ "reason": e.to_string() }))))?;
        self.cache().evict(ObjectKind::Variable, id);
        Ok(())
    }

    pub async fn list_variables(&self) -> Result<Vec<Variable>, ApiError> {
        self.storage()
            .list_variables()
            .await
            .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))
    }

    fn fill_value(&self, variable: &mut Variable, value: &str) -> Result<(), ApiError> {
        match variable.kind {
            VariableKind::Env => {
                variable.value = value.to_string();
                variable.nonce = String::new();
            }
            VariableKind::Secret => {
                let (ciphertext, nonce) = self.secrets().encrypt(value.as_bytes()).map_err(|e| {
                    ApiError::internal(
                        "failed to encrypt variable",
                        Some(json!({ "reason": e.to_string() })),
                    )
                })?;
                variable.value = hex::encode(ciphertext);
                variable.nonce = hex::encode(nonce);
            }
        }
        Ok(())
    }
}
