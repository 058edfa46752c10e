use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Activity, PaymentDirection};

pub mod deleted;
pub mod memory;
pub mod receive_index;

pub use deleted::{DeletedSet, MemoryDeletedSet};
pub use memory::MemoryActivityStore;
pub use receive_index::{MemoryReceiveIndex, ReceiveIndex};

/// Filter for ledger queries. All criteria are conjunctive; `None` means
/// "don't care".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub direction: Option<PaymentDirection>,
    /// Restrict to one variant: "lightning" or "onchain".
    pub kind: Option<ActivityKindFilter>,
    /// Case-insensitive substring match over address, txid, message and
    /// invoice.
    pub search: Option<String>,
    /// Match activities carrying at least one of these tags.
    pub tags: Vec<String>,
    /// Inclusive lower bound on the activity timestamp.
    pub min_date: Option<u64>,
    /// Inclusive upper bound on the activity timestamp.
    pub max_date: Option<u64>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Include onchain activities with `does_exist = false`.
    pub include_replaced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKindFilter {
    Lightning,
    Onchain,
}

/// An entry of the legacy tag-metadata index, keyed by payment hash,
/// transaction id or address depending on the activity it was written for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEntry {
    pub key: String,
    pub tags: Vec<String>,
}

/// Persistent ledger store. The engine is the only writer; the store is
/// not assumed safe for unbounded concurrent writers, so all mutation is
/// serialized behind the engine's single-flight guard.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_activity(&self, id: &str) -> anyhow::Result<Option<Activity>>;
    async fn insert_activity(&self, activity: Activity) -> anyhow::Result<()>;
    async fn update_activity(&self, activity: Activity) -> anyhow::Result<()>;
    /// Insert or overwrite. Re-insertion of an existing id is an update,
    /// never a duplicate row.
    async fn upsert_activity(&self, activity: Activity) -> anyhow::Result<()>;
    /// Returns true when a row was removed.
    async fn delete_activity(&self, id: &str) -> anyhow::Result<bool>;
    /// Query the ledger, newest first.
    async fn get_activities(&self, filter: &ActivityFilter) -> anyhow::Result<Vec<Activity>>;

    async fn append_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()>;
    async fn remove_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()>;
    async fn get_tags(&self, id: &str) -> anyhow::Result<Vec<String>>;

    // Legacy tag-metadata index, consumed by the tag synchronizer.
    async fn legacy_entry_by_payment_hash(&self, hash: &str)
        -> anyhow::Result<Option<LegacyEntry>>;
    async fn legacy_entry_by_tx_id(&self, tx_id: &str) -> anyhow::Result<Option<LegacyEntry>>;
    async fn legacy_entry_by_address(&self, address: &str) -> anyhow::Result<Option<LegacyEntry>>;
    async fn remove_legacy_entry(&self, key: &str) -> anyhow::Result<()>;
}
