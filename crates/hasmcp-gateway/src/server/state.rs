//! Shared handler state.

use std::sync::Arc;

use hasmcp_core::{AppConfig, Storage};

use crate::crud::CrudController;
use crate::jwt::McpJwt;
use crate::mcp::McpController;
use crate::oauth::Oauth2Broker;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<AppConfig>,
    pub mcp: Arc<McpController>,
    pub crud: Arc<CrudController>,
    pub oauth2: Arc<Oauth2Broker>,
    pub jwt: Arc<McpJwt>,
    pub storage: Arc<dyn Storage>,
}
