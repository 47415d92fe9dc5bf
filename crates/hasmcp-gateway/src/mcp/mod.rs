//! The MCP session manager and JSON-RPC dispatcher.
//!
//! Every call lands in [`McpController::call_session`]: scope check, session
//! token verification, a debug trace to the server topic, then dispatch by
//! method string. CRUD mutations arrive through [`McpController::handle_changes`]
//! and are applied by a single queue worker that rebuilds projections and
//! fans list-changed notifications to live sessions.

pub mod event;
pub mod protocol;

mod notification;
mod prompt;
mod resource;
pub(crate) mod tool;

pub use notification::{
    METHOD_NOTIFICATION_INITIALIZED, METHOD_NOTIFICATION_PROMPTS_LIST_CHANGED,
    METHOD_NOTIFICATION_RESOURCES_LIST_CHANGED, METHOD_NOTIFICATION_ROOTS_LIST_CHANGED,
    METHOD_NOTIFICATION_TOOLS_LIST_CHANGED,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use hasmcp_core::idgen::{decode_base62, encode_base62};
use hasmcp_core::queue::Task;
use hasmcp_core::{EventKind, IdGen, MemQueue, ObjectKind, PubSub, ResourceChange};

use crate::cache::Cache;
use crate::error::{ApiError, McpError};
use crate::httpc::Httpc;
use crate::jsonrpc::{JsonRpcError, Request, ResultResponse};
use crate::jwt::{McpJwt, SessionClaims};
use crate::registry::{build_server, Registry, ServerEntry, SessionState};

use event::{DebugEvent, EventPayload};
use protocol::{InitializeRequestParams, InitializeResult, PROTOCOL_VERSION};

pub const SCOPE_SESSION_CREATE: &str = "session:create";
pub const SCOPE_SESSION_CALL: &str = "session:call";
pub const SCOPE_SESSION_STREAM: &str = "session:stream";
pub const SCOPE_SESSION_DELETE: &str = "session:delete";
pub const SCOPE_SERVER_TAIL: &str = "server:tail";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
pub const METHOD_PROMPTS_GET: &str = "prompts/get";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";
pub const METHOD_RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
pub const METHOD_RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
pub const METHOD_LOGGING_SET_LEVEL: &str = "logging/setLevel";

const CHANGE_QUEUE_NAME: &str = "MCP_RESOURCE_UPDATES";
const CHANGE_QUEUE_SIZE: usize = 100_000;

// some clients still choke on pagination, keep the tool page large
pub(crate) const PAGE_SIZE_TOOLS: usize = 100;
pub(crate) const PAGE_SIZE_PROMPTS: usize = 10;
pub(crate) const PAGE_SIZE_RESOURCES: usize = 10;

pub struct CallSessionRequest {
    pub headers: HashMap<String, Vec<String>>,
    pub server_id: i64,
    pub mcp_session_id: String,
    pub mcp_protocol_version: String,
    pub permissions: HashSet<String>,
    pub request: Request,
}

#[derive(Debug)]
pub struct CallSessionResponse {
    pub http_status: u16,
    pub mcp_session_id: String,
    pub mcp_protocol_version: String,
    pub result: Option<ResultResponse>,
}

pub struct DeleteSessionRequest {
    pub server_id: i64,
    pub mcp_session_id: String,
    pub permissions: HashSet<String>,
}

pub struct SubscribeSessionRequest {
    pub server_id: i64,
    pub mcp_session_id: String,
    pub permissions: HashSet<String>,
}

#[derive(Debug)]
pub struct SubscribeResponse {
    pub subscription_id: i64,
    pub topic_id: i64,
    pub events: mpsc::Receiver<EventPayload>,
}

pub struct McpControllerParams {
    pub idgen: Arc<IdGen>,
    pub httpc: Arc<Httpc>,
    pub queue: Arc<MemQueue<ResourceChange>>,
    pub pubsub: Arc<PubSub<EventPayload>>,
    pub jwt: Arc<McpJwt>,
    pub cache: Arc<Cache>,
}

pub struct McpController {
    idgen: Arc<IdGen>,
    httpc: Arc<Httpc>,
    queue: Arc<MemQueue<ResourceChange>>,
    pubsub: Arc<PubSub<EventPayload>>,
    jwt: Arc<McpJwt>,
    cache: Arc<Cache>,
    registry: Registry,
    change_queue_id: u32,
}

impl McpController {
    /// Wires the change queue (one worker) and returns the shared controller.
    pub fn new(p: McpControllerParams) -> anyhow::Result<Arc<Self>> {
        let change_queue_id = p.queue.create(CHANGE_QUEUE_NAME, CHANGE_QUEUE_SIZE);

        let controller = Arc::new(Self {
            idgen: p.idgen,
            httpc: p.httpc,
            queue: p.queue.clone(),
            pubsub: p.pubsub,
            jwt: p.jwt,
            cache: p.cache,
            registry: Registry::new(),
            change_queue_id,
        });

        let worker = controller.clone();
        p.queue.add_workers(change_queue_id, 1, move |task: Task<ResourceChange>| {
            let controller = worker.clone();
            async move { controller.apply_changes(task.val).await }
        })?;

        Ok(controller)
    }

    pub(crate) fn cache(&self) -> &Cache {
        &self.cache
    }

    pub(crate) fn httpc(&self) -> &Httpc {
        &self.httpc
    }

    /// Enqueue a CRUD change for the router worker. Non-blocking; a full
    /// queue is an error the admin path surfaces.
    pub fn handle_changes(&self, change: ResourceChange) -> anyhow::Result<()> {
        self.queue
            .add_task(
                self.change_queue_id,
                Task {
                    id: self.idgen.next(),
                    val: change,
                },
            )
            .map_err(|e| {
                error!(error = %e, "failed to queue the resource change");
                anyhow::anyhow!(e)
            })
    }

    /// Change-router worker body: rebuild the affected projection, graft the
    /// live sessions forward, and notify them about what changed.
    async fn apply_changes(&self, change: ResourceChange) -> anyhow::Result<()> {
        if change.object_kind == ObjectKind::Server && change.event_kind == EventKind::Delete {
            self.registry.remove(change.resource_id);
            return Ok(());
        }

        let server_id = change.resource_owner_id;
        let Some(current) = self.registry.get(server_id) else {
            // nothing live to notify; the next session builds fresh
            return Ok(());
        };

        let mut rebuilt = match build_server(&self.cache, server_id).await {
            Ok(entry) => entry,
            Err(e) => {
                // never serve a stale projection
                error!(id = server_id, error = %e, "failed to build server, dropping it instead of risking stale state");
                self.registry.remove(server_id);
                return Err(anyhow::anyhow!(e));
            }
        };
        rebuilt.sessions = current.sessions.clone();
        let rebuilt = Arc::new(rebuilt);
        self.registry.insert(server_id, rebuilt.clone());

        info!(id = server_id, tools = ?rebuilt.tool_ids, "saved rebuilt server projection");

        let (mut tools_changed, mut prompts_changed, mut resources_changed) = (false, false, false);
        match change.object_kind {
            ObjectKind::Server => {
                tools_changed = id_set_changed(&current.tool_ids, &rebuilt.tool_ids);
                prompts_changed = id_set_changed(&current.prompt_ids, &rebuilt.prompt_ids);
                resources_changed = id_set_changed(&current.resource_ids, &rebuilt.resource_ids);
            }
            ObjectKind::ProviderTool | ObjectKind::Provider | ObjectKind::ServerTool => {
                tools_changed = true;
            }
            ObjectKind::Prompt | ObjectKind::ServerPrompt => {
                prompts_changed = true;
            }
            ObjectKind::Resource | ObjectKind::ServerResource => {
                resources_changed = true;
            }
            _ => {}
        }

        let session_ids: Vec<i64> = current.sessions.iter().map(|s| *s.key()).collect();
        for (flag, method) in [
            (tools_changed, METHOD_NOTIFICATION_TOOLS_LIST_CHANGED),
            (prompts_changed, METHOD_NOTIFICATION_PROMPTS_LIST_CHANGED),
            (resources_changed, METHOD_NOTIFICATION_RESOURCES_LIST_CHANGED),
        ] {
            if !flag {
                continue;
            }
            for session_id in &session_ids {
                self.send_session_notification(server_id, *session_id, method);
            }
        }

        Ok(())
    }

    /// Execute one protocol command for a session.
    pub async fn call_session(
        &self,
        req: CallSessionRequest,
    ) -> Result<CallSessionResponse, McpError> {
        let method = req.request.method.clone();

        let required_scope = match method.as_str() {
            METHOD_INITIALIZE | METHOD_NOTIFICATION_INITIALIZED => SCOPE_SESSION_CREATE,
            _ => SCOPE_SESSION_CALL,
        };
        if !req.permissions.contains(required_scope) {
            return Err(ApiError::forbidden("Insufficient permissions to call the session").into());
        }

        let mut session_info = req.mcp_session_id.clone();
        if method != METHOD_INITIALIZE {
            let session = self.jwt.verify_session(&req.mcp_session_id).map_err(|e| {
                JsonRpcError::method_not_found(
                    "Please initialize a new MCP session to make request",
                    Some(json!({
                        "reason": e.to_string(),
                        "Mcp-Session-Id": req.mcp_session_id,
                    })),
                )
            })?;

            if session.server_id != req.server_id {
                return Err(JsonRpcError::method_not_found(
                    "Please initialize a new MCP session to make request",
                    Some(json!({
                        "reason": "server-session mismatch!",
                        "Mcp-Session-Id": req.mcp_session_id,
                    })),
                )
                .into());
            }

            session_info = format!(
                "{}.{}/{}",
                encode_base62(session.session_id),
                session.initialize_params.client_info.name,
                session.initialize_params.protocol_version,
            );
        }

        let event_type = format!("{}.{}", session_info, method);
        self.publish_debug(req.server_id, format!("« {event_type}"), req.request.params_bytes());

        let outcome = match method.as_str() {
            METHOD_PING => self.call_ping(&req),
            METHOD_INITIALIZE => self.call_initialize(&req).await,
            METHOD_TOOLS_LIST => self.call_tools_list(&req).await,
            METHOD_TOOLS_CALL => self.call_tools_call(&req).await,
            METHOD_PROMPTS_LIST => self.call_prompts_list(&req).await,
            METHOD_PROMPTS_GET => self.call_prompts_get(&req).await,
            METHOD_RESOURCES_LIST => self.call_resources_list(&req).await,
            METHOD_RESOURCES_READ => self.call_resources_read(&req).await,
            METHOD_RESOURCES_SUBSCRIBE
            | METHOD_RESOURCES_TEMPLATES_LIST
            | METHOD_LOGGING_SET_LEVEL => {
                Err(JsonRpcError::internal("not implemented", None))
            }
            METHOD_NOTIFICATION_INITIALIZED | METHOD_NOTIFICATION_ROOTS_LIST_CHANGED => {
                Ok(CallSessionResponse {
                    http_status: 202,
                    mcp_session_id: req.mcp_session_id.clone(),
                    mcp_protocol_version: req.mcp_protocol_version.clone(),
                    result: None,
                })
            }
            _ => {
                warn!(method = %method, "RPC method not found");
                Err(JsonRpcError::method_not_found(
                    "Method not found",
                    Some(json!({ "method": method })),
                ))
            }
        };

        match outcome {
            Ok(res) => {
                let data = res
                    .result
                    .as_ref()
                    .map(|r| serde_json::to_vec(&r.result).unwrap_or_default())
                    .unwrap_or_default();
                self.publish_debug(req.server_id, format!("» {event_type}"), data);
                Ok(res)
            }
            Err(err) => {
                let data = serde_json::to_vec(&err).unwrap_or_default();
                self.publish_debug(req.server_id, format!("» {event_type}"), data);
                info!(method = %method, server_id = req.server_id, error = %err, "method call failed");
                Err(err.into())
            }
        }
    }

    fn call_ping(&self, req: &CallSessionRequest) -> Result<CallSessionResponse, JsonRpcError> {
        Ok(CallSessionResponse {
            http_status: 200,
            mcp_session_id: req.mcp_session_id.clone(),
            mcp_protocol_version: req.mcp_protocol_version.clone(),
            result: Some(ResultResponse::new(req.request.id.clone(), json!({}))),
        })
    }

    async fn call_initialize(
        &self,
        req: &CallSessionRequest,
    ) -> Result<CallSessionResponse, JsonRpcError> {
        let params: InitializeRequestParams = match &req.request.params {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                JsonRpcError::invalid_json(
                    "Invalid params",
                    Some(json!({
                        "params": value,
                        "reason": e.to_string(),
                    })),
                )
            })?,
            None => InitializeRequestParams::default(),
        };

        let entry = self.registry.get_or_build(&self.cache, req.server_id).await?;

        // the new topic's id is the session id
        let session_id = self.pubsub.create(None);
        // the server-wide debug topic; create is a no-op when it exists
        self.pubsub.create(Some(req.server_id));

        entry.sessions.insert(
            session_id,
            SessionState {
                pubsub_id: session_id,
                initialize_params: params.clone(),
            },
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: protocol::server_capabilities(),
            server_info: entry.protocol.implementation.clone(),
        };
        let result = serde_json::to_value(&result).map_err(|e| {
            JsonRpcError::internal(
                "Failed to marshal initialize result",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;

        let expires_at = chrono::Utc::now() + chrono::Months::new(12);
        let token = self
            .jwt
            .issue_session(&SessionClaims {
                server_id: encode_base62(req.server_id),
                initialize_params: params,
                jti: encode_base62(session_id),
                exp: expires_at.timestamp(),
            })
            .map_err(|e| {
                JsonRpcError::internal(
                    "Failed to issue session token",
                    Some(json!({ "reason": e.to_string() })),
                )
            })?;

        Ok(CallSessionResponse {
            http_status: 200,
            mcp_session_id: token,
            mcp_protocol_version: req.mcp_protocol_version.clone(),
            result: Some(ResultResponse::new(req.request.id.clone(), result)),
        })
    }

    /// Close a session: forget it and tear its topic down.
    pub async fn delete_session(&self, req: DeleteSessionRequest) -> Result<(), ApiError> {
        if !req.permissions.contains(SCOPE_SESSION_DELETE) {
            return Err(ApiError::forbidden(
                "Insufficient permissions to delete the session",
            ));
        }

        let session = self.jwt.verify_session(&req.mcp_session_id).map_err(|e| {
            ApiError::not_found(
                "Please initialize a new MCP session to make request",
                Some(json!({
                    "reason": e.to_string(),
                    "Mcp-Session-Id": req.mcp_session_id,
                })),
            )
        })?;

        if session.server_id != req.server_id {
            return Err(ApiError::forbidden(
                "Please initialize a new MCP session to make request",
            ));
        }

        let entry = self
            .registry
            .get_or_build(&self.cache, req.server_id)
            .await
            .map_err(|e| ApiError::not_found("Not found", Some(json!({ "reason": e.to_string() }))))?;

        let Some((_, state)) = entry.sessions.remove(&session.session_id) else {
            return Ok(());
        };

        self.pubsub.delete(state.pubsub_id);
        Ok(())
    }

    /// Attach an SSE consumer to a session's topic. A session that is gone
    /// (restart) but carries a valid token is resurrected from its claims.
    pub async fn subscribe_session(
        &self,
        req: SubscribeSessionRequest,
    ) -> Result<SubscribeResponse, ApiError> {
        if !req.permissions.contains(SCOPE_SESSION_STREAM) {
            return Err(ApiError::forbidden(
                "Insufficient permissions to stream the session",
            ));
        }

        let session = self.jwt.verify_session(&req.mcp_session_id).map_err(|e| {
            ApiError::not_found(
                "Please initialize a new MCP session to make request",
                Some(json!({
                    "reason": e.to_string(),
                    "Mcp-Session-Id": req.mcp_session_id,
                })),
            )
        })?;

        if session.server_id != req.server_id {
            return Err(ApiError::forbidden(
                "Please initialize a new MCP session to make request",
            ));
        }

        let entry = self
            .registry
            .get_or_build(&self.cache, req.server_id)
            .await
            .map_err(|e| ApiError::not_found("Not found", Some(json!({ "reason": e.to_string() }))))?;

        let session_id = session.session_id;
        if !entry.sessions.contains_key(&session_id) {
            entry.sessions.insert(
                session_id,
                SessionState {
                    pubsub_id: session_id,
                    initialize_params: session.initialize_params,
                },
            );
            self.pubsub.create(Some(session_id));
        }

        let subscription = self
            .pubsub
            .subscribe(session_id)
            .map_err(|e| ApiError::not_found("pubsub not found", Some(json!({ "reason": e.to_string() }))))?;

        Ok(SubscribeResponse {
            subscription_id: subscription.id,
            topic_id: session_id,
            events: subscription.events,
        })
    }

    /// Attach an SSE consumer to a server's debug topic.
    pub fn start_tail(
        &self,
        server_id: i64,
        permissions: &HashSet<String>,
    ) -> Result<SubscribeResponse, ApiError> {
        if !permissions.contains(SCOPE_SERVER_TAIL) {
            return Err(ApiError::forbidden("Insufficient scope"));
        }

        self.pubsub.create(Some(server_id));
        let subscription = self
            .pubsub
            .subscribe(server_id)
            .map_err(|e| ApiError::not_found("pubsub not found", Some(json!({ "reason": e.to_string() }))))?;

        Ok(SubscribeResponse {
            subscription_id: subscription.id,
            topic_id: server_id,
            events: subscription.events,
        })
    }

    /// Detach one SSE consumer; idempotent.
    pub fn unsubscribe(&self, topic_id: i64, subscription_id: i64) {
        if let Err(e) = self.pubsub.unsubscribe(topic_id, subscription_id) {
            warn!(topic_id, subscription_id, error = %e, "failed to unsubscribe");
        }
    }

    /// Push one list-changed notification to a session topic, tracing the
    /// attempt (and any failure) on the server's debug topic.
    fn send_session_notification(&self, server_id: i64, session_id: i64, method: &str) {
        let mut session_info = encode_base62(session_id);
        if let Some(entry) = self.registry.get(server_id) {
            if let Some(state) = entry.sessions.get(&session_id) {
                session_info.push('.');
                session_info.push_str(&state.initialize_params.client_info.name);
            }
        }
        let event_type = format!("{}.{}.{}", session_info, PROTOCOL_VERSION, method);

        let payload = notification::payload_for(method);
        self.publish_debug(server_id, format!("» {event_type}"), payload.to_vec());

        if let Err(e) = self
            .pubsub
            .publish(session_id, notification::event_for(method))
        {
            error!(session_id, method, error = %e, "failed to send notification");
            self.publish_debug(
                server_id,
                format!("i {event_type}"),
                e.to_string().into_bytes(),
            );
        }
    }

    /// Trace an event onto the server debug topic, creating the topic on the
    /// fly if a restart wiped it.
    fn publish_debug(&self, server_id: i64, kind: String, data: Vec<u8>) {
        let event = DebugEvent::new(kind.clone(), data.clone());
        if let Err(first) = self.pubsub.publish(server_id, event) {
            self.pubsub.create(Some(server_id));
            if let Err(e) = self
                .pubsub
                .publish(server_id, DebugEvent::new(kind, data))
            {
                error!(server_id, error = %e, first = %first, "failed to publish after create attempt");
            }
        }
    }

    pub(crate) async fn server_entry(
        &self,
        server_id: i64,
    ) -> Result<Arc<ServerEntry>, JsonRpcError> {
        self.registry.get_or_build(&self.cache, server_id).await
    }
}

/// Symmetric difference on membership: any id present on one side only.
fn id_set_changed(old: &[i64], new: &[i64]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    let old_set: HashSet<i64> = old.iter().copied().collect();
    new.iter().any(|id| !old_set.contains(id))
}

/// Slice `items` from `cursor`, returning the page and the next cursor when
/// more remain.
pub(crate) fn paginate(items: &[i64], cursor: usize, page_size: usize) -> (Vec<i64>, Option<usize>) {
    if cursor >= items.len() {
        return (Vec::new(), None);
    }
    let end = cursor + page_size;
    if end >= items.len() {
        (items[cursor..].to_vec(), None)
    } else {
        (items[cursor..end].to_vec(), Some(end))
    }
}

/// Parse a pagination cursor out of request params; invalid cursors are
/// `InvalidParams`.
pub(crate) fn parse_cursor(request: &Request) -> Result<usize, JsonRpcError> {
    let Some(params) = &request.params else {
        return Ok(0);
    };
    let params: protocol::PaginatedRequestParams = serde_json::from_value(params.clone())
        .map_err(|e| {
            JsonRpcError::invalid_json(
                "failed to parse json request",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;
    match params.cursor {
        None => Ok(0),
        Some(cursor) => cursor.parse::<usize>().map_err(|e| {
            JsonRpcError::invalid_params(
                "failed to parse cursor",
                Some(json!({ "reason": e.to_string() })),
            )
        }),
    }
}

/// Decode the tool/prompt/resource id embedded in a wire name (chars 1..12).
pub(crate) fn id_from_mcp_name(name: &str) -> i64 {
    match name.get(1..12) {
        Some(encoded) => decode_base62(encoded),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn paginate_pages_and_cursors() {
        let ids: Vec<i64> = (0..25).collect();

        let (page, next) = paginate(&ids, 0, 10);
        assert_eq!(page, (0..10).collect::<Vec<i64>>());
        assert_eq!(next, Some(10));

        let (page, next) = paginate(&ids, 10, 10);
        assert_eq!(page, (10..20).collect::<Vec<i64>>());
        assert_eq!(next, Some(20));

        let (page, next) = paginate(&ids, 20, 10);
        assert_eq!(page, (20..25).collect::<Vec<i64>>());
        assert_eq!(next, None);

        let (page, next) = paginate(&ids, 99, 10);
        assert!(page.is_empty());
        assert_eq!(next, None);
    }

    #[test]
    fn id_set_change_detection() {
        assert!(!id_set_changed(&[1, 2, 3], &[3, 2, 1]));
        assert!(id_set_changed(&[1, 2], &[1, 2, 3]));
        assert!(id_set_changed(&[1, 2, 3], &[1, 2]));
        assert!(id_set_changed(&[1, 2, 3], &[1, 2, 4]));
        assert!(!id_set_changed(&[], &[]));
    }

    #[test]
    fn mcp_name_id_extraction() {
        let name = format!("T{}_getUser", encode_base62(42));
        assert_eq!(id_from_mcp_name(&name), 42);
        assert_eq!(id_from_mcp_name("short"), 0);
    }
}
