//! Process entry point: parses configuration, wires the composition root,
//! and serves the SSE HTTP surface.

use std::net::SocketAddr;

use clap::Parser;
use smg_auth::{ControlPlaneAuthConfig, ControlPlaneAuthState, JwtConfig};
use sse_render_bridge::config::AppConfig;
use sse_render_bridge::state::AppState;
use sse_render_bridge::{logging, routes};
use tracing::info;

#[tokio::main]
async fn main() {
    let config = AppConfig::parse();
    logging::init(config.log_json);

    let auth_config = build_auth_config(&config);
    let auth_state = ControlPlaneAuthState::new(auth_config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("SSE_HOST/SSE_PORT must form a valid socket address");

    let state = AppState::with_fakes(config, auth_state);
    state.spawn_background_tasks();

    let worker_id = state.manager.worker_id().to_string();
    let app = routes::router(state);

    info!(%addr, worker_id, "sse-render-bridge listening");
    axum_server::bind(addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server exited unexpectedly");
}

fn build_auth_config(config: &AppConfig) -> ControlPlaneAuthConfig {
    use smg_auth::ApiKeyEntry;

    let mut api_keys: Vec<ApiKeyEntry> = config
        .api_keys
        .iter()
        .filter(|k| !k.is_empty())
        .map(|raw| ApiKeyEntry {
            key_hash: ApiKeyEntry::hash_of(raw),
            principal: format!("api-key-{}", &ApiKeyEntry::hash_of(raw)[..8]),
            role: smg_auth::Role::Client,
        })
        .collect();
    api_keys.extend(config.api_key_hashes.iter().filter(|h| !h.is_empty()).map(|hash| ApiKeyEntry {
        key_hash: hash.clone(),
        principal: format!("api-key-{}", &hash[..hash.len().min(8)]),
        role: smg_auth::Role::Client,
    }));

    let jwt = match (&config.jwt_issuer, &config.jwt_audience, &config.jwks_uri) {
        (Some(issuer), Some(audience), Some(jwks_uri)) => Some(JwtConfig {
            issuer: issuer.clone(),
            audience: audience.clone(),
            jwks_uri: jwks_uri.clone(),
            jwks_cache_ttl_secs: 300,
        }),
        _ => None,
    };

    ControlPlaneAuthConfig {
        api_keys,
        jwt,
        dev_mode_skip_auth: config.dev_mode_skip_auth,
        allowed_origins: config.allowed_origins.clone(),
    }
}
