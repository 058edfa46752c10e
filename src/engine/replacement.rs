use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::ActivityError;
use crate::events::LedgerEvent;
use crate::types::{now_secs, Activity};

use super::builder::{build_activity, BuildContext};
use super::pending::PendingBoost;
use super::ReconciliationEngine;

impl ReconciliationEngine {
    /// Process a transaction-replacement event: `replaced_tx_id` was
    /// invalidated (fee-bump or conflict) in favour of `conflict_tx_ids`.
    ///
    /// The replaced activity is marked non-existent; each replacement gets
    /// the replaced txid appended to its boost chain and the replaced
    /// activity's tags copied forward. Replaying the same event is a
    /// no-op.
    pub async fn handle_transaction_replaced(
        &self,
        replaced_tx_id: &str,
        conflict_tx_ids: &[String],
    ) -> Result<(), ActivityError> {
        let replaced = self
            .find_onchain_by_tx_id(replaced_tx_id)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))?;

        let replaced_tags = match replaced {
            Some(Activity::Onchain(mut onchain)) => {
                let tags = self
                    .get_tags(&onchain.id)
                    .await
                    .unwrap_or_default();

                if onchain.does_exist || onchain.is_boosted {
                    onchain.does_exist = false;
                    onchain.is_boosted = false;
                    onchain.updated_at = now_secs().max(onchain.updated_at + 1);
                    let id = onchain.id.clone();
                    if let Err(e) = self
                        .store
                        .upsert_activity(Activity::Onchain(onchain))
                        .await
                    {
                        warn!(
                            activity_id = %id,
                            tx_id = %replaced_tx_id,
                            error = ?e,
                            "Failed to mark replaced activity non-existent"
                        );
                    } else {
                        info!(
                            activity_id = %id,
                            tx_id = %replaced_tx_id,
                            "Marked replaced activity non-existent"
                        );
                    }
                }
                tags
            }
            Some(Activity::Lightning(_)) | None => {
                // No onchain activity yet: defer. The eventual arrival of
                // the replaced transaction's own event re-checks the
                // deleted set.
                debug!(
                    tx_id = %replaced_tx_id,
                    "No activity for replaced transaction, deferring"
                );
                Vec::new()
            }
        };

        for conflict_tx_id in conflict_tx_ids {
            self.apply_replacement(replaced_tx_id, conflict_tx_id, &replaced_tags)
                .await;
        }

        Ok(())
    }

    async fn apply_replacement(
        &self,
        replaced_tx_id: &str,
        conflict_tx_id: &str,
        replaced_tags: &[String],
    ) {
        let existing = match self.find_onchain_by_tx_id(conflict_tx_id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(tx_id = %conflict_tx_id, error = ?e, "Replacement lookup failed");
                return;
            }
        };

        let activity = match existing {
            Some(activity) => Some(activity),
            // Not in the ledger yet: synthesize from the payment list when
            // the event source already knows the replacement.
            None => self.synthesize_from_cache(conflict_tx_id).await,
        };

        let Some(Activity::Onchain(mut onchain)) = activity else {
            debug!(
                tx_id = %conflict_tx_id,
                "Replacement not known to event source yet, queueing boost"
            );
            self.pending
                .add_boost(
                    conflict_tx_id,
                    PendingBoost {
                        tx_id: replaced_tx_id.to_string(),
                        updated_at: now_secs(),
                        activity_to_delete: None,
                    },
                )
                .await;
            return;
        };

        // Idempotency: a chain that already records the replaced tx was
        // processed before.
        if !onchain.boost_tx_ids.contains(&replaced_tx_id.to_string()) {
            onchain.boost_tx_ids.push(replaced_tx_id.to_string());
            onchain.is_boosted = true;
            onchain.updated_at = now_secs().max(onchain.updated_at + 1);
            let id = onchain.id.clone();

            if let Err(e) = self.store.upsert_activity(Activity::Onchain(onchain)).await {
                warn!(
                    activity_id = %id,
                    tx_id = %conflict_tx_id,
                    error = ?e,
                    "Replacement write failed, queueing boost"
                );
                self.pending
                    .add_boost(
                        &id,
                        PendingBoost {
                            tx_id: replaced_tx_id.to_string(),
                            updated_at: now_secs(),
                            activity_to_delete: None,
                        },
                    )
                    .await;
                return;
            }

            // Tag continuity across fee-bumps.
            if !replaced_tags.is_empty() {
                if let Err(e) = self.store.append_tags(&id, replaced_tags).await {
                    warn!(activity_id = %id, error = ?e, "Tag copy-forward failed");
                }
            }

            self.event_bus
                .publish(LedgerEvent::TransactionReplaced {
                    replaced_tx_id: replaced_tx_id.to_string(),
                    replacement_tx_id: conflict_tx_id.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
            info!(
                activity_id = %id,
                replaced_tx_id = %replaced_tx_id,
                replacement_tx_id = %conflict_tx_id,
                "Linked replacement to boost chain"
            );
        } else {
            debug!(
                tx_id = %conflict_tx_id,
                replaced_tx_id = %replaced_tx_id,
                "Replacement already recorded, skipping"
            );
        }
    }

    /// Build an activity for a transaction the event source lists but the
    /// ledger does not hold yet.
    async fn synthesize_from_cache(&self, tx_id: &str) -> Option<Activity> {
        let record = {
            let cache = self.payment_cache.read().await;
            cache
                .values()
                .find(|r| r.onchain_tx_id() == Some(tx_id))
                .cloned()
        }?;

        let ctx = BuildContext {
            now: now_secs(),
            ..Default::default()
        };
        let built = build_activity(&record, ctx)?;
        match self.store.upsert_activity(built.clone()).await {
            Ok(()) => Some(built),
            Err(e) => {
                warn!(tx_id = %tx_id, error = ?e, "Failed to synthesize replacement activity");
                None
            }
        }
    }
}
