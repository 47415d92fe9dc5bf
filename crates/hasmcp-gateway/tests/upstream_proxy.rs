//! Upstream-facing flows against a stub HTTP server: tool invocation with
//! header substitution and proxying, and resource reads.

mod support;

use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hasmcp_core::VariableKind;

use support::*;

async fn initialize(stack: &Stack, server_id: i64) -> String {
    stack
        .mcp
        .call_session(call(
            server_id,
            "",
            rpc("initialize", Some(initialize_params())),
        ))
        .await
        .unwrap()
        .mcp_session_id
}

async fn first_tool_name(stack: &Stack, server_id: i64, session: &str) -> String {
    let response = stack
        .mcp
        .call_session(call(server_id, session, rpc("tools/list", None)))
        .await
        .unwrap();
    let result = response.result.unwrap().result;
    result["tools"][0]["name"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn tool_call_substitutes_header_variables() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .and(header("X-App", "resolved-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("user payload"))
        .mount(&upstream)
        .await;

    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, &upstream.uri(), false).await;
    stack
        .crud
        .create_variable(VariableKind::Env, "APP_KEY", "resolved-secret")
        .await
        .unwrap();

    let session = initialize(&stack, server_id).await;
    let tool_name = first_tool_name(&stack, server_id, &session).await;

    let response = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc(
                "tools/call",
                Some(serde_json::json!({
                    "name": tool_name,
                    "arguments": {"pathArgs": {"login": "octocat"}}
                })),
            ),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap().result;
    assert_eq!(result["content"][0]["type"], "text");
    assert_eq!(result["content"][0]["text"], "user payload");
}

#[tokio::test]
async fn proxied_caller_header_wins_over_tool_header() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .and(header("X-App", "caller-val"))
        .respond_with(ResponseTemplate::new(200).set_body_string("proxied"))
        .mount(&upstream)
        .await;

    let stack = stack().await;
    // request_headers_proxy_enabled: the caller's X-App must shadow the
    // tool's ${APP_KEY} header entirely
    let (server_id, _, _) = seed_server(&stack, &upstream.uri(), true).await;
    stack
        .crud
        .create_variable(VariableKind::Env, "APP_KEY", "tool-val")
        .await
        .unwrap();

    let session = initialize(&stack, server_id).await;
    let tool_name = first_tool_name(&stack, server_id, &session).await;

    let mut request = call(
        server_id,
        &session,
        rpc(
            "tools/call",
            Some(serde_json::json!({
                "name": tool_name,
                "arguments": {"pathArgs": {"login": "octocat"}}
            })),
        ),
    );
    request
        .headers
        .insert("x-app".to_string(), vec!["caller-val".to_string()]);

    let response = stack.mcp.call_session(request).await.unwrap();
    let result = response.result.unwrap().result;
    assert_eq!(result["content"][0]["text"], "proxied");
}

#[tokio::test]
async fn tool_call_builds_query_from_args() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_string("results"))
        .mount(&upstream)
        .await;

    let stack = stack().await;
    let (server_id, _, tool_ids) = seed_server(&stack, &upstream.uri(), false).await;
    let session = initialize(&stack, server_id).await;

    let tool_name = format!(
        "T{}_search",
        hasmcp_core::idgen::encode_base62(tool_ids[1])
    );
    let response = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc(
                "tools/call",
                Some(serde_json::json!({
                    "name": tool_name,
                    "arguments": {"queryArgs": {"q": "rust"}}
                })),
            ),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap().result;
    assert_eq!(result["content"][0]["text"], "results");
}

#[tokio::test]
async fn unknown_tool_name_is_invalid_params() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let session = initialize(&stack, server_id).await;

    let err = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc(
                "tools/call",
                Some(serde_json::json!({
                    "name": "T00000000000_ghost",
                    "arguments": {}
                })),
            ),
        ))
        .await
        .unwrap_err();

    match err {
        hasmcp_gateway::error::McpError::Rpc(e) => assert_eq!(e.http_status(), 400),
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn resource_read_returns_text_inline() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/readme"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("hello world")
                .insert_header("content-type", "text/plain"),
        )
        .mount(&upstream)
        .await;

    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let uri = format!("{}/readme", upstream.uri());
    seed_resource(&stack, server_id, &uri).await;

    let session = initialize(&stack, server_id).await;

    let response = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc("resources/read", Some(serde_json::json!({ "uri": uri }))),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap().result;
    assert_eq!(result["contents"][0]["uri"], uri);
    assert_eq!(result["contents"][0]["mimeType"], "text/plain");
    assert_eq!(result["contents"][0]["text"], "hello world");
    assert!(result["contents"][0].get("blob").is_none());
}

#[tokio::test]
async fn resource_read_returns_binary_as_blob() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0xde, 0xad, 0xbe, 0xef])
                .insert_header("content-type", "application/octet-stream"),
        )
        .mount(&upstream)
        .await;

    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let uri = format!("{}/logo", upstream.uri());
    seed_resource(&stack, server_id, &uri).await;

    let session = initialize(&stack, server_id).await;

    let response = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc("resources/read", Some(serde_json::json!({ "uri": uri }))),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap().result;
    assert_eq!(result["contents"][0]["mimeType"], "application/octet-stream");
    assert_eq!(result["contents"][0]["blob"], "3q2+7w==");
    assert!(result["contents"][0].get("text").is_none());
}

#[tokio::test]
async fn unknown_resource_uri_is_invalid_params() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let session = initialize(&stack, server_id).await;

    let err = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc(
                "resources/read",
                Some(serde_json::json!({ "uri": "https://nowhere.example.com/x" })),
            ),
        ))
        .await
        .unwrap_err();

    match err {
        hasmcp_gateway::error::McpError::Rpc(e) => assert_eq!(e.http_status(), 400),
        other => panic!("expected rpc error, got {other:?}"),
    }
}
