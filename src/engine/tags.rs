use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::events::{EventBus, LedgerEvent};
use crate::source::PaymentEventSource;
use crate::store::{ActivityFilter, ActivityStore, LegacyEntry};
use crate::types::{Activity, PaymentDirection};

/// Reconcile the legacy tag-metadata index against the canonical ledger.
///
/// For each of the most recent `depth` activities the side index is
/// probed by payment hash (lightning), transaction id (onchain sent) or
/// receive address (onchain received, one concurrent detail-driven lookup
/// per output). Matched tags are appended to the activity and the
/// consumed index entry removed.
pub async fn sync_legacy_tags(
    store: &Arc<dyn ActivityStore>,
    source: &Arc<dyn PaymentEventSource>,
    event_bus: &Arc<EventBus>,
    depth: usize,
) -> anyhow::Result<usize> {
    let filter = ActivityFilter {
        limit: Some(depth),
        include_replaced: true,
        ..Default::default()
    };
    let recent = store.get_activities(&filter).await?;

    let mut applied = 0;
    for activity in &recent {
        let entries = match activity {
            Activity::Lightning(a) => match store.legacy_entry_by_payment_hash(&a.id).await {
                Ok(entry) => entry.into_iter().collect(),
                Err(e) => {
                    warn!(activity_id = %a.id, error = ?e, "Legacy lookup by payment hash failed");
                    continue;
                }
            },
            Activity::Onchain(a) if a.direction == PaymentDirection::Sent => {
                match store.legacy_entry_by_tx_id(&a.tx_id).await {
                    Ok(entry) => entry.into_iter().collect(),
                    Err(e) => {
                        warn!(activity_id = %a.id, error = ?e, "Legacy lookup by txid failed");
                        continue;
                    }
                }
            }
            Activity::Onchain(a) => match receive_entries(store, source, &a.tx_id).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(activity_id = %a.id, error = ?e, "Legacy lookup by address failed");
                    continue;
                }
            },
        };

        for entry in entries {
            if apply_entry(store, event_bus, activity, &entry).await {
                applied += 1;
            }
        }
    }

    if applied > 0 {
        debug!(applied, "Legacy tag entries reconciled");
    }
    Ok(applied)
}

/// Receive-side lookup: the index is keyed by address, so every output of
/// the transaction is probed, concurrently and independently.
async fn receive_entries(
    store: &Arc<dyn ActivityStore>,
    source: &Arc<dyn PaymentEventSource>,
    tx_id: &str,
) -> anyhow::Result<Vec<LegacyEntry>> {
    let details = match source.get_transaction_details(tx_id).await? {
        Some(details) => details,
        None => return Ok(Vec::new()),
    };

    let lookups = details
        .outputs
        .iter()
        .map(|output| store.legacy_entry_by_address(&output.address));
    let results = join_all(lookups).await;

    let mut entries = Vec::new();
    for (output, result) in details.outputs.iter().zip(results) {
        match result {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    tx_id = %tx_id,
                    address = %output.address,
                    error = ?e,
                    "Per-output legacy lookup failed"
                );
            }
        }
    }
    Ok(entries)
}

async fn apply_entry(
    store: &Arc<dyn ActivityStore>,
    event_bus: &Arc<EventBus>,
    activity: &Activity,
    entry: &LegacyEntry,
) -> bool {
    let id = activity.id();
    let current = match store.get_tags(id).await {
        Ok(tags) => tags,
        Err(e) => {
            warn!(activity_id = %id, error = ?e, "Tag read failed");
            return false;
        }
    };

    let missing: Vec<String> = entry
        .tags
        .iter()
        .filter(|t| !current.contains(t))
        .cloned()
        .collect();

    if !missing.is_empty() {
        if let Err(e) = store.append_tags(id, &missing).await {
            warn!(activity_id = %id, error = ?e, "Tag append failed, keeping legacy entry");
            return false;
        }
        event_bus
            .publish(LedgerEvent::TagsApplied {
                activity_id: id.to_string(),
                tags: missing,
                timestamp: Utc::now(),
            })
            .await;
    }

    if let Err(e) = store.remove_legacy_entry(&entry.key).await {
        warn!(key = %entry.key, error = ?e, "Legacy entry removal failed");
        return false;
    }
    true
}
