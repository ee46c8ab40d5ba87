//! Configuration for the API-key / JWT authentication middleware.

use serde::{Deserialize, Serialize};

/// Coarse role carried by a principal, used only to distinguish the
/// dev-mode bypass principal from a real API-key/JWT principal in audit
/// logs; the SSE surface itself does not gate endpoints by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    DevBypass,
}

/// One accepted API key, stored as a SHA-256 hex digest so the raw key
/// never sits in config or logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub key_hash: String,
    pub principal: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Client
}

impl ApiKeyEntry {
    pub fn hash_of(raw_key: &str) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(raw_key.as_bytes());
        hex_encode(&digest)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Optional JWT/OIDC verification, used only when a request's bearer token
/// is a JWT rather than a flat API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_uri: String,
    #[serde(default = "default_jwks_ttl")]
    pub jwks_cache_ttl_secs: u64,
}

fn default_jwks_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControlPlaneAuthConfig {
    /// Accepted API keys, identified by their SHA-256 hash.
    pub api_keys: Vec<ApiKeyEntry>,
    #[serde(default)]
    pub jwt: Option<JwtConfig>,
    /// Skips all authentication when true. Only ever set from a `--dev`
    /// CLI flag / `SSE_SKIP_API_KEY` env var, never from a parsed request.
    #[serde(default)]
    pub dev_mode_skip_auth: bool,
    /// Origins allowed to open an SSE connection from a browser.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl ControlPlaneAuthConfig {
    pub fn find_by_raw_key(&self, raw_key: &str) -> Option<&ApiKeyEntry> {
        let hash = ApiKeyEntry::hash_of(raw_key);
        self.api_keys
            .iter()
            .find(|entry| constant_time_eq(&entry.key_hash, &hash))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_of_is_deterministic() {
        assert_eq!(ApiKeyEntry::hash_of("secret"), ApiKeyEntry::hash_of("secret"));
        assert_ne!(ApiKeyEntry::hash_of("secret"), ApiKeyEntry::hash_of("other"));
    }

    #[test]
    fn find_by_raw_key_matches_hash() {
        let cfg = ControlPlaneAuthConfig {
            api_keys: vec![ApiKeyEntry {
                key_hash: ApiKeyEntry::hash_of("k1"),
                principal: "svc-a".into(),
                role: Role::Client,
            }],
            ..Default::default()
        };
        assert!(cfg.find_by_raw_key("k1").is_some());
        assert!(cfg.find_by_raw_key("wrong").is_none());
    }
}
