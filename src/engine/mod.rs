use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::ActivityError;
use crate::events::{EventBus, LedgerEvent};
use crate::resolvers::address::resolve_receive_address;
use crate::resolvers::channel::link_channel;
use crate::resolvers::confirmation::resolve_confirmation;
use crate::source::{ChannelRecord, OrderRegistry, PaymentEventSource, PaymentKind, PaymentRecord};
use crate::store::{ActivityFilter, ActivityKindFilter, ActivityStore, DeletedSet, ReceiveIndex};
use crate::types::{now_secs, Activity, PaymentDirection, SyncSummary};

pub mod builder;
pub mod pending;
pub mod replacement;
pub mod single_flight;
pub mod tags;

use builder::{build_activity, BuildContext, PLACEHOLDER_ADDRESS};
use pending::{PendingBoost, PendingMetadata, PendingStore};
use single_flight::SyncGuard;

/// Drives reconciliation of the local activity ledger against the payment
/// event source. One full pass replays pending operations, rebuilds every
/// payment into its canonical activity, and reconciles the legacy tag
/// index; a single-event entry point handles real-time payment events.
pub struct ReconciliationEngine {
    source: Arc<dyn PaymentEventSource>,
    orders: Arc<dyn OrderRegistry>,
    store: Arc<dyn ActivityStore>,
    deleted: Arc<dyn DeletedSet>,
    receive_index: Arc<dyn ReceiveIndex>,
    pending: Arc<PendingStore>,
    event_bus: Arc<EventBus>,
    config: EngineConfig,
    guard: Arc<SyncGuard>,
    /// Payment list from the last full fetch, serving the single-event
    /// path.
    payment_cache: RwLock<HashMap<String, PaymentRecord>>,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn PaymentEventSource>,
        orders: Arc<dyn OrderRegistry>,
        store: Arc<dyn ActivityStore>,
        deleted: Arc<dyn DeletedSet>,
        receive_index: Arc<dyn ReceiveIndex>,
        event_bus: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            orders,
            store,
            deleted,
            receive_index,
            pending: Arc::new(PendingStore::new()),
            event_bus,
            config,
            guard: Arc::new(SyncGuard::new()),
            payment_cache: RwLock::new(HashMap::new()),
        }
    }

    /// The pending-operation queues, for hosts recording boosts or
    /// transfer metadata out-of-band.
    pub fn pending(&self) -> &Arc<PendingStore> {
        &self.pending
    }

    /// Run a full reconciliation pass.
    ///
    /// Single-flight: a concurrent caller waits for the in-flight pass,
    /// bounded by `EngineConfig::sync_timeout` covering both the wait and
    /// the pass itself. On expiry the guard is force-cleared and a
    /// `Timeout` error is returned; per-item writes already committed
    /// remain valid.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncSummary, ActivityError> {
        let start = Instant::now();
        let permit = self.guard.acquire(self.config.sync_timeout).await?;

        let remaining = self
            .config
            .sync_timeout
            .saturating_sub(start.elapsed());
        let result = tokio::time::timeout(remaining, self.sync_inner()).await;
        drop(permit);

        match result {
            Ok(Ok(mut summary)) => {
                summary.duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    synced = summary.synced,
                    failed = summary.failed,
                    duration_ms = summary.duration_ms,
                    "Sync pass completed"
                );
                self.event_bus
                    .publish(LedgerEvent::SyncCompleted {
                        synced: summary.synced,
                        failed: summary.failed,
                        duration_ms: summary.duration_ms,
                        timestamp: Utc::now(),
                    })
                    .await;
                Ok(summary)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Sync pass failed");
                self.event_bus
                    .publish(LedgerEvent::SyncFailed {
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
                Err(e)
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.sync_timeout.as_secs(),
                    "Sync pass exceeded deadline, force-clearing guard"
                );
                self.guard.force_clear();
                let err = ActivityError::timeout("sync pass exceeded deadline");
                self.event_bus
                    .publish(LedgerEvent::SyncFailed {
                        reason: err.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn sync_inner(&self) -> Result<SyncSummary, ActivityError> {
        // Deletes first: pure idempotent no-ops when already applied.
        self.replay_pending_deletes().await;

        let payments = self
            .source
            .list_payments()
            .await
            .map_err(|e| ActivityError::event_source(format!("payment fetch failed: {e}")))?;

        {
            let mut cache = self.payment_cache.write().await;
            cache.clear();
            cache.extend(payments.iter().map(|p| (p.id.clone(), p.clone())));
        }

        // Channel state is shared by every item in the pass; a fetch
        // failure degrades channel linking but does not abort the sync.
        let channels = match self.source.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = ?e, "Channel fetch failed, channel linking degraded this pass");
                Vec::new()
            }
        };

        let mut summary = SyncSummary::default();
        for chunk in payments.chunks(self.config.chunk_size.max(1)) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|record| self.process_payment(record, &channels)),
            )
            .await;

            for (record, result) in chunk.iter().zip(results) {
                match result {
                    Ok(()) => summary.synced += 1,
                    Err(e) => {
                        summary.failed += 1;
                        warn!(
                            payment_id = %record.id,
                            error = ?e,
                            "Payment failed to reconcile, will retry next pass"
                        );
                    }
                }
            }
        }

        self.replay_pending_boosts().await;

        if let Err(e) = tags::sync_legacy_tags(
            &self.store,
            &self.source,
            &self.event_bus,
            self.config.tag_sync_depth,
        )
        .await
        {
            warn!(error = ?e, "Legacy tag synchronization failed");
        }

        Ok(summary)
    }

    /// Process one payment event by id, without a full fetch.
    ///
    /// Falls back to a full sync when the id is not in the cached payment
    /// list, which covers out-of-order event delivery.
    #[instrument(skip(self))]
    pub async fn handle_payment_event(&self, payment_id: &str) -> Result<(), ActivityError> {
        let permit = self.guard.acquire(self.config.sync_timeout).await?;

        let cached = self.payment_cache.read().await.get(payment_id).cloned();
        if let Some(record) = cached {
            let channels = match self.source.list_channels().await {
                Ok(channels) => channels,
                Err(e) => {
                    warn!(error = ?e, "Channel fetch failed for single event");
                    Vec::new()
                }
            };
            self.process_payment(&record, &channels)
                .await
                .map_err(|e| ActivityError::store(format!("payment event failed: {e}")))?;
            return Ok(());
        }

        debug!(
            payment_id = %payment_id,
            "Payment not in cached list, falling back to full sync"
        );
        drop(permit);
        self.sync().await.map(|_| ())
    }

    /// Build or merge one payment into the ledger. Failures are isolated
    /// to the item.
    async fn process_payment(
        &self,
        record: &PaymentRecord,
        channels: &[ChannelRecord],
    ) -> anyhow::Result<()> {
        if self.deleted.contains(&record.id).await? {
            debug!(payment_id = %record.id, "Skipping payment, id is in the deleted set");
            return Ok(());
        }

        let existing = self.store.get_activity(&record.id).await?;

        let mut ctx = BuildContext {
            existing: existing.clone(),
            now: now_secs(),
            ..Default::default()
        };

        if let PaymentKind::Onchain {
            tx_id,
            confirmation,
        } = &record.kind
        {
            ctx.confirmation = Some(resolve_confirmation(confirmation, record.timestamp));

            let existing_onchain = existing.as_ref().and_then(|a| a.as_onchain());
            let already_linked = existing_onchain
                .map(|o| o.channel_id.is_some())
                .unwrap_or(false);

            if !already_linked {
                ctx.resolved_channel_id =
                    match link_channel(&self.source, &self.orders, channels, record.direction, tx_id)
                        .await
                    {
                        Ok(link) => link,
                        Err(e) => {
                            warn!(tx_id = %tx_id, error = ?e, "Channel linking failed");
                            None
                        }
                    };
            }

            // Channel link takes precedence; a funding transaction that
            // coincidentally matches receive metadata is a transfer.
            let needs_address = record.direction == PaymentDirection::Received
                && record.address.is_none()
                && existing_onchain
                    .map(|o| o.address == PLACEHOLDER_ADDRESS)
                    .unwrap_or(true);
            if needs_address && ctx.resolved_channel_id.is_none() && !already_linked {
                ctx.resolved_address =
                    match resolve_receive_address(&self.source, &self.receive_index, tx_id).await {
                        Ok(address) => address,
                        Err(e) => {
                            warn!(tx_id = %tx_id, error = ?e, "Address resolution failed");
                            None
                        }
                    };
            }
        }

        let healed_address = ctx.resolved_address.clone().filter(|_| {
            existing
                .as_ref()
                .and_then(|a| a.as_onchain())
                .map(|o| o.address == PLACEHOLDER_ADDRESS)
                .unwrap_or(false)
        });

        let mut built = match build_activity(record, ctx) {
            Some(activity) => activity,
            None => return Ok(()),
        };

        // Fold in metadata captured out-of-band before this activity
        // existed (boost/transfer flows); consumed on successful persist.
        let mut consumed_metadata = None;
        if let Activity::Onchain(ref mut onchain) = built {
            if onchain.direction == PaymentDirection::Sent {
                if let Some(metadata) = self.pending.peek_metadata(&onchain.tx_id).await {
                    if let Some(fee_rate) = metadata.fee_rate {
                        onchain.fee_rate = fee_rate;
                    }
                    if let Some(address) = metadata.address.clone() {
                        onchain.address = address;
                    }
                    if let Some(channel_id) = metadata.channel_id.clone() {
                        onchain.channel_id = Some(channel_id);
                        onchain.is_transfer = true;
                    }
                    if metadata.transfer_tx_id.is_some() {
                        onchain.transfer_tx_id = metadata.transfer_tx_id.clone();
                    }
                    consumed_metadata = Some(onchain.tx_id.clone());
                }
            }
        }

        // Healing writes (resolved address, fresh channel link, folded
        // metadata) happen without an upstream record change, so they get
        // stamped past the stored row instead of tripping the stale guard.
        if let Some(existing) = &existing {
            if let Activity::Onchain(ref mut onchain) = built {
                let newly_linked = onchain.channel_id.is_some()
                    && existing
                        .as_onchain()
                        .map(|o| o.channel_id.is_none())
                        .unwrap_or(false);
                let enriched =
                    healed_address.is_some() || newly_linked || consumed_metadata.is_some();
                if enriched && onchain.updated_at <= existing.updated_at() {
                    onchain.updated_at = existing.updated_at() + 1;
                }
            }
        }

        let persisted = self.persist(built.clone(), existing.as_ref()).await?;

        if persisted {
            if let Some(tx_id) = consumed_metadata {
                self.pending.take_metadata(&tx_id).await;
            }
            if let Some(address) = healed_address {
                self.event_bus
                    .publish(LedgerEvent::AddressResolved {
                        activity_id: built.id().to_string(),
                        address,
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        }

        Ok(())
    }

    /// Write an activity through the monotonic `updated_at` guard. A stale
    /// event is a silent no-op. Returns whether a write happened.
    async fn persist(
        &self,
        activity: Activity,
        existing: Option<&Activity>,
    ) -> anyhow::Result<bool> {
        if let Some(existing) = existing {
            if activity.updated_at() <= existing.updated_at() {
                debug!(
                    activity_id = %activity.id(),
                    incoming = activity.updated_at(),
                    stored = existing.updated_at(),
                    "Rejecting stale write"
                );
                return Ok(false);
            }
        }

        let id = activity.id().to_string();
        self.store.upsert_activity(activity).await?;
        self.event_bus
            .publish(LedgerEvent::ActivityUpserted {
                activity_id: id,
                timestamp: Utc::now(),
            })
            .await;
        Ok(true)
    }

    async fn replay_pending_deletes(&self) {
        for id in self.pending.deletes().await {
            match self.store.delete_activity(&id).await {
                Ok(removed) => {
                    if removed {
                        info!(activity_id = %id, "Applied pending delete");
                    }
                    self.pending.remove_delete(&id).await;
                }
                Err(e) => {
                    warn!(activity_id = %id, error = ?e, "Pending delete failed, keeping in queue");
                }
            }
        }
    }

    async fn replay_pending_boosts(&self) {
        for (key, boost) in self.pending.boosts().await {
            let target = match self.lookup_boost_target(&key).await {
                Ok(target) => target,
                Err(e) => {
                    warn!(activity_id = %key, error = ?e, "Pending boost lookup failed");
                    continue;
                }
            };

            let activity = match target {
                Some(activity) => activity,
                None => {
                    debug!(activity_id = %key, "Pending boost target not in ledger yet");
                    continue;
                }
            };

            // The ledger moved past this entry through another path.
            if activity.updated_at() >= boost.updated_at {
                debug!(
                    activity_id = %activity.id(),
                    stored = activity.updated_at(),
                    pending = boost.updated_at,
                    "Discarding stale pending boost"
                );
                self.pending.remove_boost(&key).await;
                continue;
            }

            let mut onchain = match activity {
                Activity::Onchain(onchain) => onchain,
                Activity::Lightning(_) => {
                    // Boosts only apply to onchain rows; drop the entry.
                    self.pending.remove_boost(&key).await;
                    continue;
                }
            };

            if !onchain.boost_tx_ids.contains(&boost.tx_id) {
                onchain.boost_tx_ids.push(boost.tx_id.clone());
            }
            onchain.is_boosted = true;
            onchain.updated_at = boost.updated_at;
            let id = onchain.id.clone();

            match self.store.upsert_activity(Activity::Onchain(onchain)).await {
                Ok(()) => {
                    info!(activity_id = %id, tx_id = %boost.tx_id, "Applied pending boost");
                    if let Some(to_delete) = &boost.activity_to_delete {
                        self.delete_superseded(to_delete).await;
                    }
                    self.pending.remove_boost(&key).await;
                }
                Err(e) => {
                    warn!(activity_id = %id, error = ?e, "Pending boost write failed, keeping in queue");
                }
            }
        }
    }

    /// Pending boosts are keyed by activity id when the target was known,
    /// by transaction id otherwise.
    async fn lookup_boost_target(&self, key: &str) -> anyhow::Result<Option<Activity>> {
        if let Some(activity) = self.store.get_activity(key).await? {
            return Ok(Some(activity));
        }
        self.find_onchain_by_tx_id(key).await
    }

    pub(crate) async fn find_onchain_by_tx_id(
        &self,
        tx_id: &str,
    ) -> anyhow::Result<Option<Activity>> {
        let filter = ActivityFilter {
            kind: Some(ActivityKindFilter::Onchain),
            search: Some(tx_id.to_string()),
            include_replaced: true,
            ..Default::default()
        };
        let candidates = self.store.get_activities(&filter).await?;
        Ok(candidates
            .into_iter()
            .find(|a| a.as_onchain().map(|o| o.tx_id == tx_id).unwrap_or(false)))
    }

    async fn delete_superseded(&self, id: &str) {
        if let Err(e) = self.deleted.insert(id).await {
            warn!(activity_id = %id, error = ?e, "Failed to record superseded id as deleted");
        }
        match self.store.delete_activity(id).await {
            Ok(_) => {}
            Err(e) => {
                warn!(activity_id = %id, error = ?e, "Superseded delete failed, queueing retry");
                self.pending.add_delete(id).await;
            }
        }
    }

    // Public ledger surface, used by the host application. All writes
    // route through the deleted-set guard.

    pub async fn get_activity(&self, id: &str) -> Result<Option<Activity>, ActivityError> {
        self.store
            .get_activity(id)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))
    }

    pub async fn get_activities(
        &self,
        filter: &ActivityFilter,
    ) -> Result<Vec<Activity>, ActivityError> {
        self.store
            .get_activities(filter)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))
    }

    pub async fn insert_activity(&self, activity: Activity) -> Result<(), ActivityError> {
        self.guarded_write(activity, false).await
    }

    pub async fn update_activity(&self, activity: Activity) -> Result<(), ActivityError> {
        let existing = self.get_activity(activity.id()).await?;
        if existing.is_none() {
            return Err(ActivityError::not_found(format!(
                "no activity with id {}",
                activity.id()
            )));
        }
        self.guarded_write(activity, false).await
    }

    /// Insert or update. `force` bypasses the deleted-set guard and the
    /// monotonic check; it is the only path that can resurrect a deleted
    /// id.
    pub async fn upsert_activity(
        &self,
        activity: Activity,
        force: bool,
    ) -> Result<(), ActivityError> {
        self.guarded_write(activity, force).await
    }

    async fn guarded_write(&self, activity: Activity, force: bool) -> Result<(), ActivityError> {
        let id = activity.id().to_string();
        if !force {
            let is_deleted = self
                .deleted
                .contains(&id)
                .await
                .map_err(|e| ActivityError::store(e.to_string()))?;
            if is_deleted {
                return Err(ActivityError::rejected(format!(
                    "activity {id} is in the deleted set"
                )));
            }
            let existing = self.get_activity(&id).await?;
            self.persist(activity, existing.as_ref())
                .await
                .map_err(|e| ActivityError::store(e.to_string()))?;
            return Ok(());
        }

        self.store
            .upsert_activity(activity)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))?;
        self.event_bus
            .publish(LedgerEvent::ActivityUpserted {
                activity_id: id,
                timestamp: Utc::now(),
            })
            .await;
        Ok(())
    }

    /// User-initiated delete: the id moves into the deleted set so a
    /// later event cannot resurrect the row. A failed store delete is
    /// queued for retry on the next pass.
    pub async fn delete_activity(&self, id: &str) -> Result<bool, ActivityError> {
        self.deleted
            .insert(id)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))?;

        match self.store.delete_activity(id).await {
            Ok(removed) => {
                self.event_bus
                    .publish(LedgerEvent::ActivityDeleted {
                        activity_id: id.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
                Ok(removed)
            }
            Err(e) => {
                warn!(activity_id = %id, error = ?e, "Delete failed, queueing for retry");
                self.pending.add_delete(id).await;
                Ok(false)
            }
        }
    }

    /// Lift the delete guard from an id. The row itself is not restored;
    /// the next event for the payment recreates it through the ordinary
    /// build path.
    pub async fn undelete_activity(&self, id: &str) -> Result<(), ActivityError> {
        self.deleted
            .remove(id)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))
    }

    /// Record a boost initiated by the host (RBF/CPFP). Applied
    /// immediately when the target activity exists; queued otherwise.
    pub async fn mark_boosted(
        &self,
        activity_id: &str,
        boost_tx_id: &str,
    ) -> Result<(), ActivityError> {
        let updated_at = now_secs();
        let existing = self.get_activity(activity_id).await?;

        let Some(Activity::Onchain(mut onchain)) = existing else {
            self.pending
                .add_boost(
                    activity_id,
                    PendingBoost {
                        tx_id: boost_tx_id.to_string(),
                        updated_at,
                        activity_to_delete: None,
                    },
                )
                .await;
            debug!(activity_id = %activity_id, "Boost target not in ledger, queued");
            return Ok(());
        };

        if !onchain.boost_tx_ids.contains(&boost_tx_id.to_string()) {
            onchain.boost_tx_ids.push(boost_tx_id.to_string());
        }
        onchain.is_boosted = true;
        onchain.updated_at = updated_at.max(onchain.updated_at + 1);

        if let Err(e) = self.store.upsert_activity(Activity::Onchain(onchain)).await {
            warn!(activity_id = %activity_id, error = ?e, "Boost write failed, queueing for retry");
            self.pending
                .add_boost(
                    activity_id,
                    PendingBoost {
                        tx_id: boost_tx_id.to_string(),
                        updated_at,
                        activity_to_delete: None,
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Record transaction metadata from a host flow (boost/transfer UI)
    /// ahead of the canonical activity existing.
    pub async fn record_transaction_metadata(&self, tx_id: &str, metadata: PendingMetadata) {
        self.pending.add_metadata(tx_id, metadata).await;
    }

    pub async fn add_tags(&self, id: &str, tags: &[String]) -> Result<(), ActivityError> {
        self.store
            .append_tags(id, tags)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))
    }

    pub async fn remove_tags(&self, id: &str, tags: &[String]) -> Result<(), ActivityError> {
        self.store
            .remove_tags(id, tags)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))
    }

    pub async fn get_tags(&self, id: &str) -> Result<Vec<String>, ActivityError> {
        self.store
            .get_tags(id)
            .await
            .map_err(|e| ActivityError::store(e.to_string()))
    }
}

#[cfg(test)]
mod tests;
