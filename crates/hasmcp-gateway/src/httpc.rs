//! Outbound HTTP client used for tool invocations, resource reads, and the
//! OAuth2 code exchange. One client for the process: shared pool, configured
//! user agent and timeout.

use hasmcp_core::config::HttpcConfig;

pub struct Httpc {
    client: reqwest::Client,
}

impl Httpc {
    pub fn new(cfg: &HttpcConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
