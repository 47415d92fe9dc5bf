//! hasmcp Storage Layer
//!
//! SQLite persistence behind the repository traits defined in
//! `hasmcp-core`. Secret material (variable values, OAuth client secrets)
//! arrives here already encrypted; this crate only stores and returns the
//! hex-encoded ciphertext and nonces.

mod database;
mod sqlite;

pub use database::Database;
pub use sqlite::SqliteStorage;

/// Default database file name.
pub const DATABASE_FILE: &str = "hasmcp.db";
