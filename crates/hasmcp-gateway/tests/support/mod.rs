//! Shared fixture: a full gateway stack on an in-memory database.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use hasmcp_core::config::{HttpcConfig, IdGenConfig};
use hasmcp_core::{
    HttpMethod, IdGen, MemQueue, Prompt, Provider, ProviderTool, PubSub, Resource, Secrets,
    ServerRecord, Storage, ToolHeader,
};
use hasmcp_gateway::jsonrpc::Request;
use hasmcp_gateway::mcp::{
    CallSessionRequest, McpController, McpControllerParams, SCOPE_SESSION_CALL,
    SCOPE_SESSION_CREATE, SCOPE_SESSION_DELETE, SCOPE_SESSION_STREAM,
};
use hasmcp_gateway::{Cache, CrudController, Httpc, McpJwt};
use hasmcp_storage::{Database, SqliteStorage};

pub const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub struct Stack {
    pub mcp: Arc<McpController>,
    pub crud: Arc<CrudController>,
    pub storage: Arc<dyn Storage>,
}

pub async fn stack() -> Stack {
    let secrets = Arc::new(Secrets::new(KEY_HEX, "test-salt").unwrap());
    let idgen = Arc::new(
        IdGen::new(&IdGenConfig {
            node: 1,
            epoch_time_in_seconds: 1_577_836_800,
            node_bits: 8,
        })
        .unwrap(),
    );

    let db = Database::open_in_memory().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(Arc::new(Mutex::new(db))));
    let cache = Arc::new(Cache::new(secrets.clone(), storage.clone()).await.unwrap());

    let queue = MemQueue::new();
    let pubsub = Arc::new(PubSub::new(idgen.clone(), Duration::from_millis(500)));
    let httpc = Arc::new(Httpc::new(&HttpcConfig::default()).unwrap());
    let jwt = Arc::new(McpJwt::new("integration-test-secret"));

    let mcp = McpController::new(McpControllerParams {
        idgen: idgen.clone(),
        httpc,
        queue,
        pubsub,
        jwt: jwt.clone(),
        cache: cache.clone(),
    })
    .unwrap();

    let crud = CrudController::new(idgen, storage.clone(), cache, secrets, jwt, mcp.clone());

    Stack { mcp, crud, storage }
}

pub fn all_scopes() -> HashSet<String> {
    [
        SCOPE_SESSION_CREATE,
        SCOPE_SESSION_CALL,
        SCOPE_SESSION_STREAM,
        SCOPE_SESSION_DELETE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn rpc(method: &str, params: Option<serde_json::Value>) -> Request {
    Request {
        jsonrpc: "2.0".to_string(),
        id: Some(serde_json::json!(1)),
        method: method.to_string(),
        params,
    }
}

pub fn call(server_id: i64, session: &str, request: Request) -> CallSessionRequest {
    CallSessionRequest {
        headers: Default::default(),
        server_id,
        mcp_session_id: session.to_string(),
        mcp_protocol_version: "2025-06-18".to_string(),
        permissions: all_scopes(),
        request,
    }
}

pub fn initialize_params() -> serde_json::Value {
    serde_json::json!({
        "protocolVersion": "2025-06-18",
        "clientInfo": {"name": "it-client", "version": "0.1"}
    })
}

/// Seed one provider with two tools and one server bound to both.
/// Returns `(server_id, provider_id, tool_ids)`.
pub async fn seed_server(stack: &Stack, base_url: &str, proxy_headers: bool) -> (i64, i64, Vec<i64>) {
    let provider = stack
        .crud
        .create_provider(
            Provider {
                base_url: base_url.to_string(),
                name: "example".to_string(),
                description: "integration provider".to_string(),
                tools: vec![
                    ProviderTool {
                        method: HttpMethod::Get,
                        path: "/users/{login}".to_string(),
                        name: "getUser".to_string(),
                        title: "Get User".to_string(),
                        path_args_schema: r#"{"login":{"type":"string"}}"#.to_string(),
                        headers: vec![ToolHeader {
                            key: "X-App".to_string(),
                            value: "${APP_KEY}".to_string(),
                        }],
                        ..Default::default()
                    },
                    ProviderTool {
                        method: HttpMethod::Post,
                        path: "/search".to_string(),
                        name: "search".to_string(),
                        title: "Search".to_string(),
                        query_args_schema: r#"{"q":{"type":"string"}}"#.to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let server = stack
        .crud
        .create_server(ServerRecord {
            name: "Demo".to_string(),
            request_headers_proxy_enabled: proxy_headers,
            ..Default::default()
        })
        .await
        .unwrap();

    let tool_ids: Vec<i64> = provider.tools.iter().map(|t| t.id).collect();
    for tool_id in &tool_ids {
        stack
            .crud
            .add_server_tool(server.id, provider.id, *tool_id)
            .await
            .unwrap();
    }

    (server.id, provider.id, tool_ids)
}

/// Bind a fresh prompt to a server and return it.
pub async fn seed_prompt(stack: &Stack, server_id: i64, name: &str) -> Prompt {
    let prompt = stack
        .crud
        .create_prompt(Prompt {
            name: name.to_string(),
            description: "test prompt".to_string(),
            arguments: serde_json::json!([]),
            messages: serde_json::json!([
                {"role": "user", "content": {"type": "text", "text": "Hello {{.Name}}!"}}
            ]),
            ..Default::default()
        })
        .await
        .unwrap();
    stack
        .crud
        .add_server_prompt(server_id, prompt.id)
        .await
        .unwrap();
    prompt
}

/// Bind a fresh resource to a server and return it.
pub async fn seed_resource(stack: &Stack, server_id: i64, uri: &str) -> Resource {
    let resource = stack
        .crud
        .create_resource(Resource {
            name: "readme".to_string(),
            uri: uri.to_string(),
            mime_type: "text/markdown".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    stack
        .crud
        .add_server_resource(server_id, resource.id)
        .await
        .unwrap();
    resource
}
