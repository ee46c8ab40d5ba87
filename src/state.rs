//! Composition root: wires the shared store, connection manager, task
//! tracker, tool bridge, rate limiter, and auth state into one
//! `Clone`-able handle every route pulls from `axum::extract::State`.

use std::sync::Arc;

use sse_bridge_core::{
    ConnectionManager, ManagerConfig, PubSubBridge, RateLimiter, RateLimiterConfig, ToolBridge,
};
use sse_protocol::{Renderer, StatusTool, TaskQueue, Validator};
use sse_store::{MemoryStore, RedisStore, SharedStore, StoreConfig};
use smg_auth::ControlPlaneAuthState;
use wfaas::TaskTracker;

use crate::config::AppConfig;
use crate::fakes::{FakeRenderer, FakeStatusTool, FakeTaskQueue, FakeValidator};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SharedStore>,
    pub manager: Arc<ConnectionManager>,
    pub tracker: Arc<TaskTracker>,
    pub tool_bridge: Arc<ToolBridge>,
    pub rate_limiter: Arc<RateLimiter>,
    pub auth: ControlPlaneAuthState,
}

impl AppState {
    /// Builds the full dependency graph. `renderer`/`validator`/
    /// `status_tool`/`task_queue` are the pluggable external collaborators;
    /// pass the fakes in `crate::fakes` for `--dev` mode or tests, real
    /// implementations otherwise.
    pub fn new(
        config: AppConfig,
        auth: ControlPlaneAuthState,
        renderer: Arc<dyn Renderer>,
        validator: Arc<dyn Validator>,
        status_tool: Arc<dyn StatusTool>,
        task_queue: Arc<dyn TaskQueue>,
    ) -> Self {
        let store: Arc<dyn SharedStore> = if config.dev_mode {
            Arc::new(MemoryStore::new())
        } else {
            let store_config = StoreConfig { url: config.store_url.clone(), pool_max: config.store_max_connections };
            Arc::new(RedisStore::new(store_config).expect("shared store pool must build"))
        };

        let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
        let manager_config = ManagerConfig {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_retry_ms: config.heartbeat_interval_secs * 1000,
            cleanup_interval: config.cleanup_interval(),
            idle_timeout: config.connection_timeout(),
            buffer_size: config.event_buffer_size,
            buffer_ttl: config.event_buffer_ttl(),
            ..ManagerConfig::default()
        };
        let manager = ConnectionManager::new(store.clone(), worker_id, manager_config);
        let tracker = Arc::new(TaskTracker::new(store.clone()));
        let tool_bridge = Arc::new(ToolBridge::new(
            manager.clone(),
            renderer,
            validator,
            status_tool,
            task_queue,
            tracker.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));

        Self {
            config: Arc::new(config),
            store,
            manager,
            tracker,
            tool_bridge,
            rate_limiter,
            auth,
        }
    }

    /// Convenience constructor used by the binary's own entry point: no
    /// real browser-pool/validator/queue implementation ships in this
    /// workspace (see [`sse_protocol::Renderer`]'s doc comment), so this
    /// wires the in-memory fakes to the same tracker the tool bridge uses.
    /// `config.dev_mode` still governs the shared store backend, same as
    /// [`AppState::new`].
    pub fn with_fakes(config: AppConfig, auth: ControlPlaneAuthState) -> Self {
        let store: Arc<dyn SharedStore> = if config.dev_mode {
            Arc::new(MemoryStore::new())
        } else {
            let store_config = StoreConfig { url: config.store_url.clone(), pool_max: config.store_max_connections };
            Arc::new(RedisStore::new(store_config).expect("shared store pool must build"))
        };
        let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
        let manager_config = ManagerConfig {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_retry_ms: config.heartbeat_interval_secs * 1000,
            cleanup_interval: config.cleanup_interval(),
            idle_timeout: config.connection_timeout(),
            buffer_size: config.event_buffer_size,
            buffer_ttl: config.event_buffer_ttl(),
            ..ManagerConfig::default()
        };
        let manager = ConnectionManager::new(store.clone(), worker_id, manager_config);
        let tracker = Arc::new(TaskTracker::new(store.clone()));

        let renderer: Arc<dyn Renderer> = Arc::new(FakeRenderer);
        let validator: Arc<dyn Validator> = Arc::new(FakeValidator);
        let status_tool: Arc<dyn StatusTool> = Arc::new(FakeStatusTool::new(tracker.clone()));
        let task_queue: Arc<dyn TaskQueue> = Arc::new(FakeTaskQueue::new(renderer.clone(), tracker.clone()));

        let tool_bridge = Arc::new(ToolBridge::new(
            manager.clone(),
            renderer,
            validator,
            status_tool,
            task_queue,
            tracker.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));

        Self {
            config: Arc::new(config),
            store,
            manager,
            tracker,
            tool_bridge,
            rate_limiter,
            auth,
        }
    }

    /// Spawns the background loops every worker process must run: the
    /// pub/sub bridge's subscription loop, and the connection manager's
    /// heartbeat/cleanup sweeps.
    pub fn spawn_background_tasks(&self) {
        let bridge = PubSubBridge::new(self.store.clone(), self.manager.clone());
        tokio::spawn(async move { bridge.run().await });

        let manager = self.manager.clone();
        let heartbeat_interval = self.config.heartbeat_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            loop {
                ticker.tick().await;
                manager.heartbeat_sweep().await;
            }
        });

        let manager = self.manager.clone();
        let rate_limiter = self.rate_limiter.clone();
        let cleanup_interval = self.config.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                manager.cleanup_sweep().await;
                rate_limiter.sweep(cleanup_interval * 10);
            }
        });
    }
}
