use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{ActivityFilter, ActivityKindFilter, ActivityStore, LegacyEntry};
use crate::types::Activity;

/// In-memory `ActivityStore`.
///
/// Used directly in tests and as the reference implementation for
/// persistent backends; query semantics (ordering, filter conjunction)
/// are defined by this implementation.
#[derive(Debug, Default)]
pub struct MemoryActivityStore {
    activities: RwLock<HashMap<String, Activity>>,
    tags: RwLock<HashMap<String, Vec<String>>>,
    legacy: RwLock<HashMap<String, LegacyEntry>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a legacy-index entry, keyed by payment hash, txid or address.
    pub async fn put_legacy_entry(&self, entry: LegacyEntry) {
        self.legacy.write().await.insert(entry.key.clone(), entry);
    }

    pub async fn legacy_entry_count(&self) -> usize {
        self.legacy.read().await.len()
    }

    fn matches(activity: &Activity, tags: &[String], filter: &ActivityFilter) -> bool {
        if let Some(direction) = filter.direction {
            if activity.direction() != direction {
                return false;
            }
        }

        match filter.kind {
            Some(ActivityKindFilter::Lightning) if activity.as_lightning().is_none() => {
                return false
            }
            Some(ActivityKindFilter::Onchain) if activity.as_onchain().is_none() => return false,
            _ => {}
        }

        if let Some(onchain) = activity.as_onchain() {
            if !onchain.does_exist && !filter.include_replaced {
                return false;
            }
        }

        if let Some(min) = filter.min_date {
            if activity.timestamp() < min {
                return false;
            }
        }
        if let Some(max) = filter.max_date {
            if activity.timestamp() > max {
                return false;
            }
        }

        if !filter.tags.is_empty() && !filter.tags.iter().any(|t| tags.contains(t)) {
            return false;
        }

        if let Some(search) = &filter.search {
            let needle = search.to_lowercase();
            let haystack = match activity {
                Activity::Lightning(a) => {
                    format!("{} {} {}", a.id, a.invoice, a.message).to_lowercase()
                }
                Activity::Onchain(a) => format!("{} {} {}", a.id, a.tx_id, a.address).to_lowercase(),
            };
            if !haystack.contains(&needle) {
                return false;
            }
        }

        true
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn get_activity(&self, id: &str) -> anyhow::Result<Option<Activity>> {
        Ok(self.activities.read().await.get(id).cloned())
    }

    async fn insert_activity(&self, activity: Activity) -> anyhow::Result<()> {
        self.activities
            .write()
            .await
            .insert(activity.id().to_string(), activity);
        Ok(())
    }

    async fn update_activity(&self, activity: Activity) -> anyhow::Result<()> {
        let mut activities = self.activities.write().await;
        if !activities.contains_key(activity.id()) {
            anyhow::bail!("no activity with id {}", activity.id());
        }
        activities.insert(activity.id().to_string(), activity);
        Ok(())
    }

    async fn upsert_activity(&self, activity: Activity) -> anyhow::Result<()> {
        self.insert_activity(activity).await
    }

    async fn delete_activity(&self, id: &str) -> anyhow::Result<bool> {
        let removed = self.activities.write().await.remove(id).is_some();
        self.tags.write().await.remove(id);
        Ok(removed)
    }

    async fn get_activities(&self, filter: &ActivityFilter) -> anyhow::Result<Vec<Activity>> {
        let activities = self.activities.read().await;
        let tags = self.tags.read().await;
        static NO_TAGS: Vec<String> = Vec::new();

        let mut matched: Vec<Activity> = activities
            .values()
            .filter(|a| {
                let activity_tags = tags.get(a.id()).unwrap_or(&NO_TAGS);
                Self::matches(a, activity_tags, filter)
            })
            .cloned()
            .collect();

        // Newest first; id as tiebreak for deterministic pagination.
        matched.sort_by(|a, b| {
            b.timestamp()
                .cmp(&a.timestamp())
                .then_with(|| a.id().cmp(b.id()))
        });

        let offset = filter.offset.min(matched.len());
        let mut page: Vec<Activity> = matched.split_off(offset);
        if let Some(limit) = filter.limit {
            page.truncate(limit);
        }
        Ok(page)
    }

    async fn append_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()> {
        let mut all = self.tags.write().await;
        let entry = all.entry(id.to_string()).or_default();
        for tag in tags {
            if !entry.contains(tag) {
                entry.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn remove_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()> {
        if let Some(entry) = self.tags.write().await.get_mut(id) {
            entry.retain(|t| !tags.contains(t));
        }
        Ok(())
    }

    async fn get_tags(&self, id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.tags.read().await.get(id).cloned().unwrap_or_default())
    }

    async fn legacy_entry_by_payment_hash(
        &self,
        hash: &str,
    ) -> anyhow::Result<Option<LegacyEntry>> {
        Ok(self.legacy.read().await.get(hash).cloned())
    }

    async fn legacy_entry_by_tx_id(&self, tx_id: &str) -> anyhow::Result<Option<LegacyEntry>> {
        Ok(self.legacy.read().await.get(tx_id).cloned())
    }

    async fn legacy_entry_by_address(&self, address: &str) -> anyhow::Result<Option<LegacyEntry>> {
        Ok(self.legacy.read().await.get(address).cloned())
    }

    async fn remove_legacy_entry(&self, key: &str) -> anyhow::Result<()> {
        self.legacy.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
