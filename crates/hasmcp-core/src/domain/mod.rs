//! Domain entities shared across the gateway and the storage layer.

mod change;
mod prompt;
mod provider;
mod resource;
mod server;
mod variable;

pub use change::{EventKind, ObjectKind, ResourceChange};
pub use prompt::Prompt;
pub use provider::{
    secret_prefix_for, ApiKind, HttpMethod, Oauth2Config, Provider, ProviderTool, ToolHeader,
};
pub use resource::Resource;
pub use server::{Server, ServerRecord, ServerToken, ServerToolRef};
pub use variable::{Variable, VariableKind};

use serde::{Deserialize, Serialize};

/// Who can see an entity in the admin UI. The gateway itself serves both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    #[default]
    Internal,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Internal => "INTERNAL",
            Visibility::Public => "PUBLIC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INTERNAL" => Some(Visibility::Internal),
            "PUBLIC" => Some(Visibility::Public),
            _ => None,
        }
    }
}
