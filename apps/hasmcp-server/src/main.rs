//! hasmcp gateway server.
//!
//! Loads the YAML configuration, wires the services bottom-up, and serves
//! until interrupted.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hasmcp_core::{AppConfig, IdGen, MemQueue, PubSub, Secrets, Storage};
use hasmcp_gateway::mcp::{McpController, McpControllerParams};
use hasmcp_gateway::server::AppState;
use hasmcp_gateway::{Cache, CrudController, GatewayServer, Httpc, McpJwt, Oauth2Broker, StateJwt};
use hasmcp_storage::{Database, SqliteStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = config_path_from_args();
    let cfg = Arc::new(AppConfig::load(&config_path)?);
    info!(config = %config_path, "configuration loaded");

    let secrets = Arc::new(
        Secrets::new(&cfg.locksmith.encryption_key, &cfg.locksmith.salt)
            .context("locksmith init failed")?,
    );
    let idgen = Arc::new(IdGen::new(&cfg.idgen).context("idgen init failed")?);

    let db = Database::open(Path::new(&cfg.storage.path)).context("storage init failed")?;
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(Arc::new(
        tokio::sync::Mutex::new(db),
    )));

    let cache = Arc::new(
        Cache::new(secrets.clone(), storage.clone())
            .await
            .context("cache init failed")?,
    );

    let queue = MemQueue::new();
    let pubsub = Arc::new(PubSub::new(idgen.clone(), cfg.pubsub.receive_timeout()));
    let httpc = Arc::new(Httpc::new(&cfg.httpc).context("http client init failed")?);

    let mcp_jwt = Arc::new(McpJwt::new(&cfg.mcpjwt.secret));
    let state_jwt = Arc::new(StateJwt::new(&cfg.oauth2_mcp_provider_jwt.secret));

    let mcp = McpController::new(McpControllerParams {
        idgen: idgen.clone(),
        httpc: httpc.clone(),
        queue: queue.clone(),
        pubsub,
        jwt: mcp_jwt.clone(),
        cache: cache.clone(),
    })
    .context("mcp controller init failed")?;

    let crud = CrudController::new(
        idgen,
        storage.clone(),
        cache.clone(),
        secrets.clone(),
        mcp_jwt.clone(),
        mcp.clone(),
    );

    let oauth2 = Arc::new(Oauth2Broker::new(
        cfg.oauth2_mcp_provider.http_scheme.clone(),
        secrets,
        cache,
        state_jwt,
        httpc,
        crud.clone(),
    ));

    let state = AppState {
        cfg,
        mcp,
        crud,
        oauth2,
        jwt: mcp_jwt,
        storage,
    };

    GatewayServer::new(state, queue).run().await
}

fn config_path_from_args() -> String {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return path;
            }
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    "config.yaml".to_string()
}
