//! hasmcp Gateway
//!
//! The MCP runtime: projects persisted configuration into protocol-ready
//! servers, terminates MCP JSON-RPC sessions, proxies tool invocations to
//! upstream providers, fans change notifications and debug traces out over
//! SSE, and brokers the per-server OAuth2 flow.

pub mod cache;
pub mod crud;
pub mod error;
pub mod httpc;
pub mod jsonrpc;
pub mod jwt;
pub mod mcp;
pub mod oauth;
pub mod registry;
pub mod server;

pub use cache::Cache;
pub use crud::CrudController;
pub use error::{ApiError, McpError};
pub use httpc::Httpc;
pub use jwt::{McpJwt, StateJwt};
pub use mcp::McpController;
pub use oauth::Oauth2Broker;
pub use server::GatewayServer;
