//! Render options and request shapes shared between the tool bridge and
//! the external renderer/task-queue collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resolved render options. Every field has a concrete default so that a
/// caller-supplied argument map with missing or null fields can always be
/// coerced into a value safe to persist in the shared store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub wait_for_load: bool,
    pub full_page: bool,
    pub optimize_png: bool,
    pub timeout: u64,
    pub block_resources: bool,
    pub transparent_background: bool,
    pub user_agent: String,
    pub png_quality: u8,
    pub background_color: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            device_scale_factor: 1.0,
            wait_for_load: true,
            full_page: false,
            optimize_png: true,
            timeout: 30,
            block_resources: false,
            transparent_background: false,
            user_agent: "Mozilla/5.0 (Linux; MCP Bridge)".to_string(),
            png_quality: 90,
            background_color: "#ffffff".to_string(),
        }
    }
}

impl RenderOptions {
    /// Merges a caller-supplied JSON object over the defaults. Any field
    /// absent or explicitly null in `raw` keeps its default value.
    pub fn from_raw(raw: Option<&Value>) -> Self {
        let defaults = Self::default();
        let Some(Value::Object(map)) = raw else {
            return defaults;
        };
        let mut merged = serde_json::to_value(&defaults).expect("RenderOptions always serializes");
        let Value::Object(merged_map) = &mut merged else {
            unreachable!()
        };
        for (key, value) in map {
            if !value.is_null() {
                merged_map.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(merged).unwrap_or(defaults)
    }
}

/// A render request submitted to the external task queue for asynchronous
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderTaskRequest {
    pub dsl_content: Value,
    pub options: RenderOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let opts = RenderOptions::default();
        assert_eq!(opts.width, 800);
        assert_eq!(opts.height, 600);
        assert_eq!(opts.device_scale_factor, 1.0);
        assert!(opts.wait_for_load);
        assert!(!opts.full_page);
        assert!(opts.optimize_png);
        assert_eq!(opts.timeout, 30);
        assert!(!opts.block_resources);
        assert!(!opts.transparent_background);
        assert_eq!(opts.user_agent, "Mozilla/5.0 (Linux; MCP Bridge)");
        assert_eq!(opts.png_quality, 90);
        assert_eq!(opts.background_color, "#ffffff");
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        let raw = serde_json::json!({ "width": 400, "height": null, "full_page": true });
        let opts = RenderOptions::from_raw(Some(&raw));
        assert_eq!(opts.width, 400);
        assert_eq!(opts.height, 600);
        assert!(opts.full_page);
    }

    #[test]
    fn missing_raw_uses_defaults() {
        assert_eq!(RenderOptions::from_raw(None), RenderOptions::default());
    }
}
