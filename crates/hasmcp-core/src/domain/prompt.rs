use chrono::{DateTime, Utc};

use super::Visibility;

/// A parameterized prompt template. `arguments` and `messages` hold the MCP
/// JSON shapes verbatim; message text may embed `{{.Arg}}` placeholders that
/// `prompts/get` substitutes from the caller's arguments.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub name: String,
    pub description: String,
    pub arguments: serde_json::Value,
    pub messages: serde_json::Value,
    pub visibility: Visibility,
}
