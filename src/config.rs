//! View configuration
//!
//! ```
//! use lazyquery::{PendingPolicy, ViewConfig};
//!
//! let config = ViewConfig::from_json(r#"{"max_cache_size": 200, "pending_on_refresh": "reject"}"#).unwrap();
//! assert_eq!(config.max_cache_size, 200);
//! assert_eq!(config.pending_on_refresh, PendingPolicy::Reject);
//! ```

use crate::cache::DEFAULT_MAX_CACHE_SIZE;
use crate::error::ViewError;
use serde::{Deserialize, Serialize};

/// What `refresh()` (and therefore `sort()`) does with uncommitted changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Abandon buffered changes, as `discard()` would.
    #[default]
    Discard,
    /// Refuse with `ViewError::PendingChanges`.
    Reject,
}

fn default_max_cache_size() -> usize {
    DEFAULT_MAX_CACHE_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    /// Upper bound on cached queried records (pinned records may exceed it).
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    #[serde(default)]
    pub pending_on_refresh: PendingPolicy,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            pending_on_refresh: PendingPolicy::default(),
        }
    }
}

impl ViewConfig {
    pub fn from_json(json: &str) -> Result<Self, ViewError> {
        let config: ViewConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_cache_size(mut self, max_cache_size: usize) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_on_refresh = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ViewError> {
        if self.max_cache_size == 0 {
            return Err(ViewError::Config("max_cache_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
