//! hasmcp Core
//!
//! Domain model and the in-process services the gateway is built from:
//! id generation, pub/sub fan-out, bounded work queues, secret handling,
//! configuration, and the repository traits implemented by the storage crate.

pub mod config;
pub mod domain;
pub mod idgen;
pub mod pubsub;
pub mod queue;
pub mod repository;
pub mod secrets;

pub use config::AppConfig;
pub use domain::*;
pub use idgen::IdGen;
pub use pubsub::PubSub;
pub use queue::MemQueue;
pub use repository::{RepoResult, Storage};
pub use secrets::Secrets;
