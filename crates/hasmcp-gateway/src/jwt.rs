//! HS256 tokens: server access tokens, session tokens, OAuth2 state.
//!
//! Three claim shapes, two secrets. Server and session tokens share the MCP
//! secret; the OAuth2 state token has its own. The session token doubles as
//! the client's `Mcp-Session-Id` — sessions are resurrectable from the token
//! alone after a restart.

use std::collections::HashSet;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hasmcp_core::idgen::{decode_base62, encode_base62};

use crate::mcp::protocol::InitializeRequestParams;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("could not authenticate: {0}")]
    Unauthorized(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claims of a server access token: which server, which scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTokenClaims {
    #[serde(rename = "serverID")]
    pub server_id: String,
    pub scope: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Claims of a session token. `jti` is the base-62 session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "serverID")]
    pub server_id: String,
    #[serde(rename = "initializeParams")]
    pub initialize_params: InitializeRequestParams,
    pub jti: String,
    pub exp: i64,
}

/// Verified server access token.
#[derive(Debug, Clone)]
pub struct TokenAuth {
    pub server_id: i64,
    pub permissions: HashSet<String>,
}

/// Verified session token.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    pub server_id: i64,
    pub session_id: i64,
    pub initialize_params: InitializeRequestParams,
}

pub struct McpJwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

fn hs256_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation
}

impl McpJwt {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue_server_token(&self, claims: &ServerTokenClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    pub fn issue_session(&self, claims: &SessionClaims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Verify a server access token and expand its scope string.
    pub fn authenticate(&self, token: &str) -> Result<TokenAuth, JwtError> {
        let data = decode::<ServerTokenClaims>(token, &self.decoding, &hs256_validation())
            .map_err(|e| JwtError::Unauthorized(e.to_string()))?;

        let permissions = data
            .claims
            .scope
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(TokenAuth {
            server_id: decode_base62(&data.claims.server_id),
            permissions,
        })
    }

    /// Verify a session token (the `Mcp-Session-Id` value).
    pub fn verify_session(&self, token: &str) -> Result<SessionAuth, JwtError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &hs256_validation())
            .map_err(|e| JwtError::Unauthorized(e.to_string()))?;

        Ok(SessionAuth {
            server_id: decode_base62(&data.claims.server_id),
            session_id: decode_base62(&data.claims.jti),
            initialize_params: data.claims.initialize_params,
        })
    }
}

/// OAuth2 state token claims: audience is `[providerID, serverID]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClaims {
    pub aud: Vec<String>,
    pub jti: String,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct StateAuth {
    pub provider_id: i64,
    pub server_id: i64,
}

pub struct StateJwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl StateJwt {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue_state(
        &self,
        provider_id: i64,
        server_id: i64,
        jti: &str,
        exp: i64,
    ) -> Result<String, JwtError> {
        let claims = StateClaims {
            aud: vec![encode_base62(provider_id), encode_base62(server_id)],
            jti: jti.to_string(),
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    pub fn verify_state(&self, token: &str) -> Result<StateAuth, JwtError> {
        let data = decode::<StateClaims>(token, &self.decoding, &hs256_validation())
            .map_err(|e| JwtError::Unauthorized(e.to_string()))?;

        if data.claims.aud.len() < 2 {
            return Err(JwtError::Unauthorized("invalid access token".into()));
        }

        Ok(StateAuth {
            provider_id: decode_base62(&data.claims.aud[0]),
            server_id: decode_base62(&data.claims.aud[1]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::Implementation;
    use pretty_assertions::assert_eq;

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn session_token_round_trip() {
        let jwt = McpJwt::new("test-secret");
        let claims = SessionClaims {
            server_id: encode_base62(12345),
            initialize_params: InitializeRequestParams {
                protocol_version: "2025-06-18".into(),
                capabilities: None,
                client_info: Implementation {
                    name: "client".into(),
                    version: "1.0".into(),
                },
            },
            jti: encode_base62(67890),
            exp: now() + 365 * 24 * 3600,
        };

        let token = jwt.issue_session(&claims).unwrap();
        let auth = jwt.verify_session(&token).unwrap();
        assert_eq!(auth.server_id, 12345);
        assert_eq!(auth.session_id, 67890);
        assert_eq!(auth.initialize_params.client_info.name, "client");
    }

    #[test]
    fn server_token_scopes_expand() {
        let jwt = McpJwt::new("test-secret");
        let token = jwt
            .issue_server_token(&ServerTokenClaims {
                server_id: encode_base62(7),
                scope: "session:create session:call session:stream".into(),
                exp: now() + 3600,
                jti: None,
            })
            .unwrap();

        let auth = jwt.authenticate(&token).unwrap();
        assert_eq!(auth.server_id, 7);
        assert!(auth.permissions.contains("session:call"));
        assert!(auth.permissions.contains("session:stream"));
        assert!(!auth.permissions.contains("server:tail"));
    }

    #[test]
    fn wrong_secret_fails() {
        let a = McpJwt::new("secret-a");
        let b = McpJwt::new("secret-b");
        let token = a
            .issue_server_token(&ServerTokenClaims {
                server_id: encode_base62(1),
                scope: String::new(),
                exp: now() + 60,
                jti: None,
            })
            .unwrap();
        assert!(b.authenticate(&token).is_err());
    }

    #[test]
    fn expired_token_fails() {
        let jwt = McpJwt::new("test-secret");
        let token = jwt
            .issue_server_token(&ServerTokenClaims {
                server_id: encode_base62(1),
                scope: "session:call".into(),
                exp: now() - 3600,
                jti: None,
            })
            .unwrap();
        assert!(jwt.authenticate(&token).is_err());
    }

    #[test]
    fn state_round_trip_and_audience_check() {
        let jwt = StateJwt::new("state-secret");
        let token = jwt.issue_state(11, 22, "0123456789abcdef", now() + 180).unwrap();
        let auth = jwt.verify_state(&token).unwrap();
        assert_eq!(auth.provider_id, 11);
        assert_eq!(auth.server_id, 22);
    }
}
