use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ENV variables are stored in the clear; SECRET values are AES-256-GCM
/// encrypted with a per-row nonce before they reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VariableKind {
    #[default]
    Env,
    Secret,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Env => "ENV",
            VariableKind::Secret => "SECRET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ENV" => Some(VariableKind::Env),
            "SECRET" => Some(VariableKind::Secret),
            _ => None,
        }
    }
}

/// A named value usable in tool header templates via `${NAME}`.
///
/// For SECRET variables `value` and `nonce` are hex-encoded ciphertext and
/// nonce; for ENV variables `value` is plaintext and `nonce` is empty.
#[derive(Debug, Clone, Default)]
pub struct Variable {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub kind: VariableKind,
    pub name: String,
    pub value: String,
    pub nonce: String,
}
