//! Axum middleware enforcing the per-request API-key (or bearer-JWT)
//! authentication the SSE HTTP surface requires on every endpoint.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::config::ControlPlaneAuthConfig;
use crate::jwt::JwtValidator;
use crate::RequestId;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Jwt,
    DevBypass,
}

/// The authenticated caller, inserted into request extensions by
/// [`control_plane_auth_middleware`] for downstream handlers to read.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    pub method: AuthMethod,
}

pub trait PrincipalExt {
    fn principal(&self) -> Option<&Principal>;
}

impl PrincipalExt for Request<Body> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}

#[derive(Clone)]
pub struct ControlPlaneAuthState {
    pub config: Arc<ControlPlaneAuthConfig>,
    pub jwt_validator: Option<Arc<JwtValidator>>,
    pub audit: Arc<AuditLogger>,
}

impl ControlPlaneAuthState {
    pub fn new(config: ControlPlaneAuthConfig) -> Self {
        let jwt_validator = config.jwt.clone().map(|cfg| Arc::new(JwtValidator::new(cfg)));
        Self {
            config: Arc::new(config),
            jwt_validator,
            audit: Arc::new(AuditLogger::new()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential")]
    InvalidCredential,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let body = serde_json::json!({
            "error": self.to_string(),
            "error_code": "AUTHENTICATION_FAILED",
        });
        (status, axum::Json(body)).into_response()
    }
}

/// `axum::middleware::from_fn_with_state` entry point. Resolves a
/// [`Principal`] from `x-api-key` or `Authorization: Bearer`, short-circuits
/// with 401 on failure, and records the decision via [`AuditLogger`].
pub async fn control_plane_auth_middleware(
    State(state): State<ControlPlaneAuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone());

    let outcome = resolve_principal(&state, &request).await;

    match outcome {
        Ok(principal) => {
            state.audit.record(AuditEvent {
                timestamp: chrono::Utc::now(),
                principal: Some(principal.subject.clone()),
                method: request.method().to_string(),
                path,
                outcome: AuditOutcome::Allowed,
                request_id,
                reason: None,
            });
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            state.audit.record(AuditEvent {
                timestamp: chrono::Utc::now(),
                principal: None,
                method: request.method().to_string(),
                path,
                outcome: AuditOutcome::Denied,
                request_id,
                reason: Some(err.to_string()),
            });
            err.into_response()
        }
    }
}

async fn resolve_principal(
    state: &ControlPlaneAuthState,
    request: &Request,
) -> Result<Principal, AuthError> {
    if state.config.dev_mode_skip_auth {
        return Ok(Principal {
            subject: "dev-bypass".to_string(),
            method: AuthMethod::DevBypass,
        });
    }

    if let Some(raw_key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        let entry = state
            .config
            .find_by_raw_key(raw_key)
            .ok_or(AuthError::InvalidCredential)?;
        return Ok(Principal {
            subject: entry.principal.clone(),
            method: AuthMethod::ApiKey,
        });
    }

    if let Some(bearer) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if let Some(validator) = &state.jwt_validator {
            let subject = validator
                .validate(bearer)
                .await
                .map_err(|_| AuthError::InvalidCredential)?;
            return Ok(Principal {
                subject,
                method: AuthMethod::Jwt,
            });
        }
        // No JWT validator configured: treat the bearer token as a flat
        // API key for backward compatibility with clients that send it
        // via `Authorization` instead of `x-api-key`.
        let entry = state
            .config
            .find_by_raw_key(bearer)
            .ok_or(AuthError::InvalidCredential)?;
        return Ok(Principal {
            subject: entry.principal.clone(),
            method: AuthMethod::ApiKey,
        });
    }

    Err(AuthError::MissingCredential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeyEntry, Role};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn state_with_key(raw_key: &str) -> ControlPlaneAuthState {
        ControlPlaneAuthState::new(ControlPlaneAuthConfig {
            api_keys: vec![ApiKeyEntry {
                key_hash: ApiKeyEntry::hash_of(raw_key),
                principal: "svc-a".into(),
                role: Role::Client,
            }],
            jwt: None,
            dev_mode_skip_auth: false,
            allowed_origins: vec![],
        })
    }

    #[tokio::test]
    async fn valid_api_key_resolves_principal() {
        let state = state_with_key("k1");
        let req = HttpRequest::builder()
            .header(API_KEY_HEADER, "k1")
            .body(Body::empty())
            .unwrap();
        let principal = resolve_principal(&state, &req).await.unwrap();
        assert_eq!(principal.subject, "svc-a");
        assert_eq!(principal.method, AuthMethod::ApiKey);
    }

    #[tokio::test]
    async fn missing_credential_is_rejected() {
        let state = state_with_key("k1");
        let req = HttpRequest::builder().body(Body::empty()).unwrap();
        assert!(matches!(
            resolve_principal(&state, &req).await,
            Err(AuthError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn dev_bypass_skips_credential_check() {
        let mut cfg = state_with_key("k1").config.as_ref().clone();
        cfg.dev_mode_skip_auth = true;
        let state = ControlPlaneAuthState::new(cfg);
        let req = HttpRequest::builder().body(Body::empty()).unwrap();
        let principal = resolve_principal(&state, &req).await.unwrap();
        assert_eq!(principal.method, AuthMethod::DevBypass);
    }
}
