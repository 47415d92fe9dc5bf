//! Events flowing through pub/sub topics toward SSE streams.
//!
//! Session topics carry protocol notifications; server topics carry the
//! debug trace of every dispatched call. Both arrive at the stream writer
//! through the same small capability trait.

use std::sync::Arc;

use hasmcp_core::idgen::encode_base62;

/// Anything that can be written as one SSE frame.
pub trait SseEvent: Send + Sync {
    /// `id:` line; omitted when `None`.
    fn id(&self) -> Option<String> {
        None
    }
    /// `event:` line; omitted when `None`.
    fn event_type(&self) -> Option<&str> {
        None
    }
    /// `data:` line payload.
    fn data(&self) -> &[u8];
}

/// The payload type session and server topics are instantiated with.
pub type EventPayload = Arc<dyn SseEvent>;

/// One line of the per-server debug trace: `« ` for inbound calls, `» ` for
/// results and errors, `i ` for notification delivery failures.
pub struct DebugEvent {
    pub id: i64,
    pub kind: String,
    pub data: Vec<u8>,
}

impl DebugEvent {
    pub fn new(kind: String, data: Vec<u8>) -> EventPayload {
        Arc::new(Self { id: 0, kind, data })
    }
}

impl SseEvent for DebugEvent {
    fn id(&self) -> Option<String> {
        if self.id == 0 {
            None
        } else {
            Some(encode_base62(self.id))
        }
    }

    fn event_type(&self) -> Option<&str> {
        Some(&self.kind)
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A fixed protocol notification delivered to one session's stream.
/// No id or event name on the wire, data only.
pub struct NotificationEvent {
    payload: &'static [u8],
}

impl NotificationEvent {
    pub fn new(payload: &'static [u8]) -> EventPayload {
        Arc::new(Self { payload })
    }
}

impl SseEvent for NotificationEvent {
    fn data(&self) -> &[u8] {
        self.payload
    }
}
