//! Protocol notifications.
//!
//! Server-to-client list-changed payloads are fixed byte strings; client-to-
//! server notifications are acknowledged with 202 and no body.

use super::event::{EventPayload, NotificationEvent};

/// Server to client.
pub const METHOD_NOTIFICATION_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
pub const METHOD_NOTIFICATION_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
pub const METHOD_NOTIFICATION_RESOURCES_LIST_CHANGED: &str =
    "notifications/resources/list_changed";

/// Client to server.
pub const METHOD_NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_NOTIFICATION_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

const PAYLOAD_TOOLS_LIST_CHANGED: &[u8] =
    br#"{"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}"#;
const PAYLOAD_PROMPTS_LIST_CHANGED: &[u8] =
    br#"{"jsonrpc": "2.0", "method": "notifications/prompts/list_changed"}"#;
const PAYLOAD_RESOURCES_LIST_CHANGED: &[u8] =
    br#"{"jsonrpc": "2.0", "method": "notifications/resources/list_changed"}"#;

pub(crate) fn payload_for(method: &str) -> &'static [u8] {
    match method {
        METHOD_NOTIFICATION_TOOLS_LIST_CHANGED => PAYLOAD_TOOLS_LIST_CHANGED,
        METHOD_NOTIFICATION_PROMPTS_LIST_CHANGED => PAYLOAD_PROMPTS_LIST_CHANGED,
        METHOD_NOTIFICATION_RESOURCES_LIST_CHANGED => PAYLOAD_RESOURCES_LIST_CHANGED,
        _ => b"",
    }
}

pub(crate) fn event_for(method: &str) -> EventPayload {
    NotificationEvent::new(payload_for(method))
}
