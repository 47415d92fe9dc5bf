//! SQLite implementation of the repository traits.
//!
//! One connection behind an async mutex; composite writes run inside a
//! transaction so partial state never persists.

mod catalog;
mod provider;
mod server;
mod variable;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::Database;

pub struct SqliteStorage {
    db: Arc<Mutex<Database>>,
}

impl SqliteStorage {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    pub(crate) fn db(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }
}

pub(crate) fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub(crate) fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_json(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hasmcp_core::repository::*;
    use hasmcp_core::{
        HttpMethod, Prompt, Provider, ProviderTool, Resource, ServerRecord, ToolHeader, Variable,
        VariableKind,
    };
    use pretty_assertions::assert_eq;

    fn storage() -> SqliteStorage {
        let db = Database::open_in_memory().unwrap();
        SqliteStorage::new(Arc::new(Mutex::new(db)))
    }

    fn sample_provider(id: i64) -> Provider {
        Provider {
            id,
            version: 1,
            base_url: "https://api.example.com".into(),
            secret_prefix: "API_EXAMPLE_COM".into(),
            name: "example".into(),
            description: "demo provider".into(),
            tools: vec![ProviderTool {
                id: id + 1,
                provider_id: id,
                method: HttpMethod::Get,
                path: "/users/{login}".into(),
                name: "getUser".into(),
                title: "Get User".into(),
                path_args_schema: r#"{"login":{"type":"string"}}"#.into(),
                headers: vec![ToolHeader {
                    key: "Authorization".into(),
                    value: "Bearer ${API_EXAMPLE_COM_ACCESS_TOKEN}".into(),
                }],
                oauth2_scopes: vec!["read:user".into()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn provider_round_trip() {
        let s = storage();
        s.create_provider(&sample_provider(100)).await.unwrap();

        let p = s.get_provider(100).await.unwrap().unwrap();
        assert_eq!(p.name, "example");
        assert_eq!(p.tools.len(), 1);
        assert_eq!(p.tools[0].path, "/users/{login}");
        assert_eq!(p.tools[0].headers[0].key, "Authorization");
        assert_eq!(p.tools[0].oauth2_scopes, vec!["read:user".to_string()]);

        assert!(s
            .provider_tool_exists(100, "GET", "/users/{login}")
            .await
            .unwrap());
        assert!(!s.provider_tool_exists(100, "POST", "/users").await.unwrap());

        s.delete_provider(100).await.unwrap();
        assert!(s.get_provider(100).await.unwrap().is_none());
        // cascade removes tools
        assert!(s.get_provider_tool(101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn version_bumps_on_child_mutation() {
        let s = storage();
        s.create_provider(&sample_provider(200)).await.unwrap();
        s.bump_provider_version(200).await.unwrap();
        let p = s.get_provider(200).await.unwrap().unwrap();
        assert_eq!(p.version, 2);
    }

    #[tokio::test]
    async fn server_bindings_and_reverse_lookups() {
        let s = storage();
        s.create_provider(&sample_provider(300)).await.unwrap();
        s.create_server(&ServerRecord {
            id: 400,
            version: 1,
            name: "Demo".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        s.create_prompt(&Prompt {
            id: 500,
            name: "greeting".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        s.create_resource(&Resource {
            id: 600,
            name: "readme".into(),
            uri: "https://example.com/readme.md".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        s.add_server_tool(400, 300, 301).await.unwrap();
        s.add_server_prompt(400, 500).await.unwrap();
        s.add_server_resource(400, 600).await.unwrap();

        let record = s.get_server(400).await.unwrap().unwrap();
        assert_eq!(record.tool_refs.len(), 1);
        assert_eq!(record.tool_refs[0].tool_id, 301);
        assert_eq!(record.prompt_ids, vec![500]);
        assert_eq!(record.resource_ids, vec![600]);

        assert_eq!(s.list_server_ids_by_tool_id(301).await.unwrap(), vec![400]);
        assert_eq!(s.list_server_ids_by_provider_id(300).await.unwrap(), vec![400]);
        assert_eq!(s.list_server_ids_by_prompt_id(500).await.unwrap(), vec![400]);
        assert_eq!(s.list_server_ids_by_resource_id(600).await.unwrap(), vec![400]);

        s.remove_server_tool(400, 301).await.unwrap();
        assert!(s.list_server_ids_by_tool_id(301).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_variable_upserts_by_name() {
        let s = storage();
        let v = s
            .save_variable(&Variable {
                id: 700,
                kind: VariableKind::Secret,
                name: "GITHUB_COM_ACCESS_TOKEN".into(),
                value: "deadbeef".into(),
                nonce: "0102".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(v.id, 700);

        // same name, new value: id must be stable
        let v2 = s
            .save_variable(&Variable {
                id: 701,
                kind: VariableKind::Secret,
                name: "GITHUB_COM_ACCESS_TOKEN".into(),
                value: "cafebabe".into(),
                nonce: "0304".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(v2.id, 700);
        assert_eq!(v2.value, "cafebabe");

        let loaded = s
            .get_variable_by_name("GITHUB_COM_ACCESS_TOKEN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.value, "cafebabe");
        assert_eq!(s.list_variables().await.unwrap().len(), 1);
    }
}
