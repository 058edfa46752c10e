use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the reconciliation engine.
///
/// Constructed by the host application; serde derives are provided so hosts
/// can embed it in their own configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard deadline on a full sync pass, covering both the wait for an
    /// in-flight sync and the pass itself (default: 40 seconds)
    pub sync_timeout: Duration,
    /// Number of payment records processed concurrently per chunk
    /// (default: 50)
    pub chunk_size: usize,
    /// How many of the most recent activities the tag synchronizer
    /// inspects per pass (default: 100)
    pub tag_sync_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(40),
            chunk_size: 50,
            tag_sync_depth: 100,
        }
    }
}
