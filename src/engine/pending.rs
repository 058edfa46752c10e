use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A boost/replace update that could not be applied, retried each sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBoost {
    pub tx_id: String,
    /// The `updated_at` the boost would stamp. If the ledger has already
    /// moved to this value or past it, the entry is stale and discarded.
    pub updated_at: u64,
    /// An activity superseded by this boost, deleted once the boost lands.
    pub activity_to_delete: Option<String>,
}

/// Transaction-level metadata captured out-of-band (boost/transfer UI
/// flows) before the canonical activity exists. Applied once a matching
/// sent activity appears, then discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMetadata {
    pub fee_rate: Option<u64>,
    pub address: Option<String>,
    pub transfer_tx_id: Option<String>,
    pub channel_id: Option<String>,
}

/// Eventually-consistent overflow queues for operations that failed to
/// apply. Mutated only under the engine's single-flight guard plus the
/// public CRUD paths; each queue is keyed by activity id (deletes, boosts)
/// or transaction id (metadata).
#[derive(Debug, Default)]
pub struct PendingStore {
    deletes: RwLock<HashSet<String>>,
    boosts: RwLock<HashMap<String, PendingBoost>>,
    metadata: RwLock<HashMap<String, PendingMetadata>>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_delete(&self, activity_id: &str) {
        self.deletes.write().await.insert(activity_id.to_string());
    }

    pub async fn deletes(&self) -> Vec<String> {
        self.deletes.read().await.iter().cloned().collect()
    }

    /// Removed only once the delete is confirmed applied.
    pub async fn remove_delete(&self, activity_id: &str) {
        self.deletes.write().await.remove(activity_id);
    }

    pub async fn add_boost(&self, activity_id: &str, boost: PendingBoost) {
        self.boosts
            .write()
            .await
            .insert(activity_id.to_string(), boost);
    }

    pub async fn boosts(&self) -> Vec<(String, PendingBoost)> {
        self.boosts
            .read()
            .await
            .iter()
            .map(|(id, boost)| (id.clone(), boost.clone()))
            .collect()
    }

    pub async fn remove_boost(&self, activity_id: &str) {
        self.boosts.write().await.remove(activity_id);
    }

    pub async fn add_metadata(&self, tx_id: &str, metadata: PendingMetadata) {
        self.metadata
            .write()
            .await
            .insert(tx_id.to_string(), metadata);
    }

    pub async fn peek_metadata(&self, tx_id: &str) -> Option<PendingMetadata> {
        self.metadata.read().await.get(tx_id).cloned()
    }

    /// Remove and return, for apply-once semantics.
    pub async fn take_metadata(&self, tx_id: &str) -> Option<PendingMetadata> {
        self.metadata.write().await.remove(tx_id)
    }

    pub async fn is_empty(&self) -> bool {
        self.deletes.read().await.is_empty()
            && self.boosts.read().await.is_empty()
            && self.metadata.read().await.is_empty()
    }
}
