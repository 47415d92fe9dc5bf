//! End-to-end dispatcher flows on an in-memory stack: session lifecycle,
//! listing, pagination, scope enforcement, and change fan-out.

mod support;

use std::collections::HashSet;
use std::time::Duration;

use pretty_assertions::assert_eq;

use hasmcp_core::repository::ProviderStore;
use hasmcp_gateway::error::McpError;
use hasmcp_gateway::jsonrpc::ERR_METHOD_NOT_FOUND;
use hasmcp_gateway::mcp::event::SseEvent;
use hasmcp_gateway::mcp::{DeleteSessionRequest, SubscribeSessionRequest, SCOPE_SESSION_CALL};

use support::*;

/// Run initialize and return `(session_token, initialize_result)`.
async fn initialize(stack: &Stack, server_id: i64) -> (String, serde_json::Value) {
    let response = stack
        .mcp
        .call_session(call(
            server_id,
            "",
            rpc("initialize", Some(initialize_params())),
        ))
        .await
        .unwrap();

    assert_eq!(response.http_status, 200);
    assert!(!response.mcp_session_id.is_empty());
    let result = response.result.unwrap().result;
    (response.mcp_session_id, result)
}

#[tokio::test]
async fn initialize_then_list_tools() {
    let stack = stack().await;
    let (server_id, _, tool_ids) = seed_server(&stack, "https://api.example.com", false).await;

    let (session, result) = initialize(&stack, server_id).await;
    assert_eq!(result["protocolVersion"], "2025-06-18");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
    assert_eq!(result["capabilities"]["prompts"]["listChanged"], true);
    assert_eq!(result["capabilities"]["resources"]["subscribe"], false);
    assert_eq!(result["serverInfo"]["name"], "Demo");

    let response = stack
        .mcp
        .call_session(call(server_id, &session, rpc("tools/list", None)))
        .await
        .unwrap();
    let result = response.result.unwrap().result;

    let tools = result["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert!(result.get("nextCursor").is_none());

    // id-ascending order, names decode back to the tool ids
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for (name, tool_id) in names.iter().zip(&tool_ids) {
        assert!(name.starts_with('T'));
        assert_eq!(hasmcp_core::idgen::decode_base62(&name[1..12]), *tool_id);
    }

    // the first tool declares pathArgs as required input
    assert_eq!(tools[0]["inputSchema"]["type"], "object");
    assert_eq!(tools[0]["inputSchema"]["required"][0], "pathArgs");
}

#[tokio::test]
async fn ping_returns_empty_object() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let (session, _) = initialize(&stack, server_id).await;

    let response = stack
        .mcp
        .call_session(call(server_id, &session, rpc("ping", None)))
        .await
        .unwrap();
    assert_eq!(response.http_status, 200);
    assert_eq!(response.result.unwrap().result, serde_json::json!({}));
}

#[tokio::test]
async fn session_server_mismatch_is_rejected() {
    let stack = stack().await;
    let (server_a, _, _) = seed_server(&stack, "https://a.example.com", false).await;
    let server_b = stack
        .crud
        .create_server(hasmcp_core::ServerRecord {
            name: "Other".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id;

    let (session_a, _) = initialize(&stack, server_a).await;

    let err = stack
        .mcp
        .call_session(call(server_b, &session_a, rpc("tools/list", None)))
        .await
        .unwrap_err();

    match err {
        McpError::Rpc(e) => {
            assert_eq!(e.code, ERR_METHOD_NOT_FOUND);
            assert_eq!(e.http_status(), 404);
            assert_eq!(e.data.unwrap()["reason"], "server-session mismatch!");
        }
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_scope_is_forbidden() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let (session, _) = initialize(&stack, server_id).await;

    let mut request = call(server_id, &session, rpc("tools/list", None));
    request.permissions = HashSet::new();

    match stack.mcp.call_session(request).await.unwrap_err() {
        McpError::Api(e) => assert_eq!(e.code, 403),
        other => panic!("expected api error, got {other:?}"),
    }

    // stream scope is enforced separately
    let err = stack
        .mcp
        .subscribe_session(SubscribeSessionRequest {
            server_id,
            mcp_session_id: session.clone(),
            permissions: [SCOPE_SESSION_CALL.to_string()].into_iter().collect(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, 403);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let (session, _) = initialize(&stack, server_id).await;

    match stack
        .mcp
        .call_session(call(server_id, &session, rpc("sampling/createMessage", None)))
        .await
        .unwrap_err()
    {
        McpError::Rpc(e) => assert_eq!(e.code, ERR_METHOD_NOT_FOUND),
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn recognized_but_unimplemented_methods() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let (session, _) = initialize(&stack, server_id).await;

    for method in ["resources/subscribe", "resources/templates/list", "logging/setLevel"] {
        match stack
            .mcp
            .call_session(call(server_id, &session, rpc(method, None)))
            .await
            .unwrap_err()
        {
            McpError::Rpc(e) => assert_eq!(e.message, "not implemented", "method {method}"),
            other => panic!("expected rpc error for {method}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn client_notifications_are_accepted_with_202() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let (session, _) = initialize(&stack, server_id).await;

    let response = stack
        .mcp
        .call_session(call(server_id, &session, rpc("notifications/initialized", None)))
        .await
        .unwrap();
    assert_eq!(response.http_status, 202);
    assert!(response.result.is_none());
}

#[tokio::test]
async fn prompts_paginate_in_sorted_pages() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;

    for i in 0..25 {
        seed_prompt(&stack, server_id, &format!("prompt{i:02}")).await;
    }

    let (session, _) = initialize(&stack, server_id).await;

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
        let response = stack
            .mcp
            .call_session(call(server_id, &session, rpc("prompts/list", params)))
            .await
            .unwrap();
        let result = response.result.unwrap().result;
        let page = result["prompts"].as_array().unwrap();
        assert!(page.len() <= 10);
        seen.extend(page.iter().map(|p| p["name"].as_str().unwrap().to_string()));

        match result.get("nextCursor").and_then(|c| c.as_str()) {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }

    assert_eq!(seen.len(), 25);
    // ids ascend, and ids were assigned in creation order
    let ids: Vec<i64> = seen
        .iter()
        .map(|n| hasmcp_core::idgen::decode_base62(&n[1..12]))
        .collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    let err = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc("prompts/list", Some(serde_json::json!({"cursor": "abc"}))),
        ))
        .await
        .unwrap_err();
    match err {
        McpError::Rpc(e) => assert_eq!(e.http_status(), 400),
        other => panic!("expected rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn prompt_get_applies_template_arguments() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let prompt = seed_prompt(&stack, server_id, "greeting").await;
    let (session, _) = initialize(&stack, server_id).await;

    let wire_name = format!("P{}_greeting", hasmcp_core::idgen::encode_base62(prompt.id));
    let response = stack
        .mcp
        .call_session(call(
            server_id,
            &session,
            rpc(
                "prompts/get",
                Some(serde_json::json!({
                    "name": wire_name,
                    "arguments": {"Name": "Ada"}
                })),
            ),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap().result;
    assert_eq!(result["messages"][0]["content"]["text"], "Hello Ada!");
}

#[tokio::test]
async fn provider_tool_update_fans_out_exactly_once() {
    let stack = stack().await;
    let (server_id, _, tool_ids) = seed_server(&stack, "https://api.example.com", false).await;
    let (session, _) = initialize(&stack, server_id).await;

    let mut subscription = stack
        .mcp
        .subscribe_session(SubscribeSessionRequest {
            server_id,
            mcp_session_id: session.clone(),
            permissions: all_scopes(),
        })
        .await
        .unwrap();

    // admin patches a tool description
    let mut tool = stack
        .storage
        .get_provider_tool(tool_ids[0])
        .await
        .unwrap()
        .unwrap();
    tool.description = "updated description".to_string();
    stack.crud.update_provider_tool(tool).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), subscription.events.recv())
        .await
        .expect("no notification within window")
        .expect("channel closed");
    let data = String::from_utf8_lossy(event.data()).into_owned();
    assert!(data.contains("notifications/tools/list_changed"), "{data}");

    // exactly once per change event
    let extra = tokio::time::timeout(Duration::from_millis(300), subscription.events.recv()).await;
    assert!(extra.is_err(), "unexpected second notification");
}

#[tokio::test]
async fn delete_session_removes_it_and_closes_the_topic() {
    let stack = stack().await;
    let (server_id, _, _) = seed_server(&stack, "https://api.example.com", false).await;
    let (session, _) = initialize(&stack, server_id).await;

    let mut subscription = stack
        .mcp
        .subscribe_session(SubscribeSessionRequest {
            server_id,
            mcp_session_id: session.clone(),
            permissions: all_scopes(),
        })
        .await
        .unwrap();

    stack
        .mcp
        .delete_session(DeleteSessionRequest {
            server_id,
            mcp_session_id: session.clone(),
            permissions: all_scopes(),
        })
        .await
        .unwrap();

    // the topic is gone, so the subscriber's channel closes
    let closed = tokio::time::timeout(Duration::from_secs(1), subscription.events.recv())
        .await
        .expect("channel did not close");
    assert!(closed.is_none());

    // a second delete is a no-op for the session map but the topic is gone;
    // subscribing again resurrects the session from the token claims
    let resurrected = stack
        .mcp
        .subscribe_session(SubscribeSessionRequest {
            server_id,
            mcp_session_id: session,
            permissions: all_scopes(),
        })
        .await;
    assert!(resurrected.is_ok());
}
