use chrono::{DateTime, Utc};

use super::Visibility;

/// A URI-addressable document a server can read on behalf of clients.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub name: String,
    pub description: String,
    pub uri: String,
    pub mime_type: String,
    pub size: i64,
    pub annotations: serde_json::Value,
    pub visibility: Visibility,
}
