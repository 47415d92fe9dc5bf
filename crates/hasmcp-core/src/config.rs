//! YAML configuration.
//!
//! Every section has serde defaults so a partial file is enough for local
//! runs; key material is validated by the services that consume it, not here.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub mcpjwt: JwtSecretConfig,
    pub oauth2_mcp_provider: Oauth2ProviderConfig,
    pub oauth2_mcp_provider_jwt: JwtSecretConfig,
    pub locksmith: LocksmithConfig,
    pub idgen: IdGenConfig,
    pub pubsub: PubSubConfig,
    pub httpc: HttpcConfig,
    pub apiauth: ApiAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub port: u16,
    pub ssl_port: u16,
    pub ssl_enabled: bool,
    pub ssl_cache_dir: String,
    pub letsencrypt_email: String,
    pub domain_name: String,
    pub max_body_size_in_bytes: usize,
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8083,
            ssl_port: 443,
            ssl_enabled: false,
            ssl_cache_dir: String::new(),
            letsencrypt_email: String::new(),
            domain_name: String::new(),
            max_body_size_in_bytes: 4 * 1024 * 1024,
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "hasmcp.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JwtSecretConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Oauth2ProviderConfig {
    pub http_scheme: String,
}

impl Default for Oauth2ProviderConfig {
    fn default() -> Self {
        Self {
            http_scheme: "https".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocksmithConfig {
    pub salt: String,
    /// 32 bytes, hex-encoded.
    pub encryption_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdGenConfig {
    /// 0 picks a random node id at startup.
    pub node: u16,
    pub epoch_time_in_seconds: i64,
    pub node_bits: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PubSubConfig {
    /// Milliseconds a publish waits on one subscriber before dropping the send.
    pub max_duration_for_subscriber_to_receive: u64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            max_duration_for_subscriber_to_receive: 3_000,
        }
    }
}

impl PubSubConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.max_duration_for_subscriber_to_receive)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpcConfig {
    pub user_agent: String,
    /// Seconds before an upstream call is abandoned.
    pub timeout: u64,
}

impl Default for HttpcConfig {
    fn default() -> Self {
        Self {
            user_agent: "hasmcp/0.3".to_string(),
            timeout: 30,
        }
    }
}

impl HttpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiAuthConfig {
    pub enabled: bool,
    pub api_access_token: String,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let cfg: AppConfig = serde_yaml::from_str(
            r#"
server:
  port: 9000
pubsub:
  maxDurationForSubscriberToReceive: 250
locksmith:
  salt: pepper
"#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.ssl_port, 443);
        assert_eq!(cfg.pubsub.receive_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.locksmith.salt, "pepper");
        assert_eq!(cfg.httpc.timeout(), Duration::from_secs(30));
        assert!(!cfg.apiauth.enabled);
    }
}
