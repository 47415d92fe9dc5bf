//! Change events emitted by the admin mutation path and consumed by the
//! gateway's change router.

/// What kind of persisted object a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Variable,
    Provider,
    ProviderTool,
    Server,
    ServerToken,
    ServerTool,
    ServerPrompt,
    ServerResource,
    Resource,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// One CRUD mutation, addressed to the server whose projection it affects.
///
/// `resource_owner_id` is the affected server id for association and child
/// changes, and the server id itself for server events.
#[derive(Debug, Clone, Copy)]
pub struct ResourceChange {
    pub object_kind: ObjectKind,
    pub event_kind: EventKind,
    pub resource_id: i64,
    pub resource_owner_id: i64,
}
