use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Ids the user explicitly deleted. A member rejects every non-forced
/// write so a re-synced payment cannot silently resurrect a deleted row.
#[async_trait]
pub trait DeletedSet: Send + Sync {
    async fn contains(&self, id: &str) -> anyhow::Result<bool>;
    async fn insert(&self, id: &str) -> anyhow::Result<()>;
    async fn remove(&self, id: &str) -> anyhow::Result<()>;
}

/// In-memory `DeletedSet`.
#[derive(Debug, Default)]
pub struct MemoryDeletedSet {
    ids: RwLock<HashSet<String>>,
}

impl MemoryDeletedSet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeletedSet for MemoryDeletedSet {
    async fn contains(&self, id: &str) -> anyhow::Result<bool> {
        Ok(self.ids.read().await.contains(id))
    }

    async fn insert(&self, id: &str) -> anyhow::Result<()> {
        self.ids.write().await.insert(id.to_string());
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        self.ids.write().await.remove(id);
        Ok(())
    }
}
