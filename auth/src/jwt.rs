//! Bearer-JWT verification, used as an alternate auth method alongside flat
//! API keys when a deployment fronts the bridge with an external IDP.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;
use crate::jwks::{JwksCache, JwksError};

#[derive(Debug, Error)]
pub enum JwtValidatorError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("jwks lookup failed: {0}")]
    Jwks(#[from] JwksError),
    #[error("token verification failed: {0}")]
    Verification(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<serde_json::Value>,
}

pub struct JwtValidator {
    config: JwtConfig,
    jwks: Arc<JwksCache>,
}

impl JwtValidator {
    pub fn new(config: JwtConfig) -> Self {
        let jwks = Arc::new(JwksCache::new(
            config.jwks_uri.clone(),
            std::time::Duration::from_secs(config.jwks_cache_ttl_secs),
        ));
        Self { config, jwks }
    }

    /// Verifies `token`'s signature against the JWKS endpoint and its
    /// issuer/audience claims, returning the subject as the principal id.
    pub async fn validate(&self, token: &str) -> Result<String, JwtValidatorError> {
        let header = decode_header(token).map_err(|e| JwtValidatorError::Malformed(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| JwtValidatorError::Malformed("missing kid".to_string()))?;
        let key = self.jwks.key_for(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<Claims>(token, key.as_ref(), &validation)
            .map_err(|e| JwtValidatorError::Verification(e.to_string()))?;
        Ok(data.claims.sub)
    }
}
