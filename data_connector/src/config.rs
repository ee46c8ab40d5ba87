//! Shared-store configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `redis://` connection URL for the shared Redis-compatible store.
    pub url: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
}

fn default_pool_max() -> usize {
    16
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_max: default_pool_max(),
        }
    }
}
