#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::engine::ReconciliationEngine;
use crate::events::EventBus;
use crate::source::{
    ChannelRecord, ConfirmationStatus, Order, OrderRegistry, PaymentEventSource, PaymentKind,
    PaymentRecord, TransactionDetails,
};
use crate::store::{
    ActivityFilter, ActivityStore, LegacyEntry, MemoryActivityStore, MemoryDeletedSet,
    MemoryReceiveIndex,
};
use crate::types::{Activity, PaymentDirection, PaymentStatus};

mod replacement_tests;

/// Scriptable event source backing the engine tests.
pub(crate) struct MockSource {
    pub payments: RwLock<Vec<PaymentRecord>>,
    pub channels: RwLock<Vec<ChannelRecord>>,
    pub details: RwLock<HashMap<String, TransactionDetails>>,
    /// Artificial latency injected into payment fetches, for timeout
    /// tests.
    pub fetch_delay: RwLock<Option<Duration>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            payments: RwLock::new(Vec::new()),
            channels: RwLock::new(Vec::new()),
            details: RwLock::new(HashMap::new()),
            fetch_delay: RwLock::new(None),
        }
    }

    pub async fn set_payments(&self, payments: Vec<PaymentRecord>) {
        *self.payments.write().await = payments;
    }

    pub async fn upsert_payment(&self, record: PaymentRecord) {
        let mut payments = self.payments.write().await;
        if let Some(slot) = payments.iter_mut().find(|p| p.id == record.id) {
            *slot = record;
        } else {
            payments.push(record);
        }
    }

    pub async fn put_details(&self, details: TransactionDetails) {
        self.details
            .write()
            .await
            .insert(details.tx_id.clone(), details);
    }
}

#[async_trait]
impl PaymentEventSource for MockSource {
    async fn list_payments(&self) -> anyhow::Result<Vec<PaymentRecord>> {
        if let Some(delay) = *self.fetch_delay.read().await {
            tokio::time::sleep(delay).await;
        }
        Ok(self.payments.read().await.clone())
    }

    async fn list_channels(&self) -> anyhow::Result<Vec<ChannelRecord>> {
        Ok(self.channels.read().await.clone())
    }

    async fn get_transaction_details(
        &self,
        tx_id: &str,
    ) -> anyhow::Result<Option<TransactionDetails>> {
        Ok(self.details.read().await.get(tx_id).cloned())
    }
}

pub(crate) struct MockOrders {
    pub orders: RwLock<Vec<Order>>,
}

impl MockOrders {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OrderRegistry for MockOrders {
    async fn list_orders(&self) -> anyhow::Result<Vec<Order>> {
        Ok(self.orders.read().await.clone())
    }
}

/// `ActivityStore` whose activity writes can be switched to fail,
/// exercising the pending-queue capture paths.
pub(crate) struct FlakyStore {
    inner: MemoryActivityStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryActivityStore::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_allowed(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for FlakyStore {
    async fn get_activity(&self, id: &str) -> anyhow::Result<Option<Activity>> {
        self.inner.get_activity(id).await
    }

    async fn insert_activity(&self, activity: Activity) -> anyhow::Result<()> {
        self.write_allowed()?;
        self.inner.insert_activity(activity).await
    }

    async fn update_activity(&self, activity: Activity) -> anyhow::Result<()> {
        self.write_allowed()?;
        self.inner.update_activity(activity).await
    }

    async fn upsert_activity(&self, activity: Activity) -> anyhow::Result<()> {
        self.write_allowed()?;
        self.inner.upsert_activity(activity).await
    }

    async fn delete_activity(&self, id: &str) -> anyhow::Result<bool> {
        self.write_allowed()?;
        self.inner.delete_activity(id).await
    }

    async fn get_activities(&self, filter: &ActivityFilter) -> anyhow::Result<Vec<Activity>> {
        self.inner.get_activities(filter).await
    }

    async fn append_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()> {
        self.inner.append_tags(id, tags).await
    }

    async fn remove_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()> {
        self.inner.remove_tags(id, tags).await
    }

    async fn get_tags(&self, id: &str) -> anyhow::Result<Vec<String>> {
        self.inner.get_tags(id).await
    }

    async fn legacy_entry_by_payment_hash(
        &self,
        hash: &str,
    ) -> anyhow::Result<Option<LegacyEntry>> {
        self.inner.legacy_entry_by_payment_hash(hash).await
    }

    async fn legacy_entry_by_tx_id(&self, tx_id: &str) -> anyhow::Result<Option<LegacyEntry>> {
        self.inner.legacy_entry_by_tx_id(tx_id).await
    }

    async fn legacy_entry_by_address(&self, address: &str) -> anyhow::Result<Option<LegacyEntry>> {
        self.inner.legacy_entry_by_address(address).await
    }

    async fn remove_legacy_entry(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove_legacy_entry(key).await
    }
}

pub(crate) struct FlakyHarness {
    pub engine: ReconciliationEngine,
    pub source: Arc<MockSource>,
    pub store: Arc<FlakyStore>,
}

pub(crate) fn flaky_harness() -> FlakyHarness {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(FlakyStore::new());

    let engine = ReconciliationEngine::new(
        source.clone(),
        Arc::new(MockOrders::new()),
        store.clone(),
        Arc::new(MemoryDeletedSet::new()),
        Arc::new(MemoryReceiveIndex::new()),
        Arc::new(EventBus::new(64)),
        EngineConfig::default(),
    );

    FlakyHarness {
        engine,
        source,
        store,
    }
}

pub(crate) struct Harness {
    pub engine: ReconciliationEngine,
    pub source: Arc<MockSource>,
    pub store: Arc<MemoryActivityStore>,
    pub deleted: Arc<MemoryDeletedSet>,
    pub receive_index: Arc<MemoryReceiveIndex>,
    pub orders: Arc<MockOrders>,
}

pub(crate) fn harness() -> Harness {
    harness_with_config(EngineConfig::default())
}

pub(crate) fn harness_with_config(config: EngineConfig) -> Harness {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemoryActivityStore::new());
    let deleted = Arc::new(MemoryDeletedSet::new());
    let receive_index = Arc::new(MemoryReceiveIndex::new());
    let orders = Arc::new(MockOrders::new());

    let engine = ReconciliationEngine::new(
        source.clone(),
        orders.clone(),
        store.clone(),
        deleted.clone(),
        receive_index.clone(),
        Arc::new(EventBus::new(64)),
        config,
    );

    Harness {
        engine,
        source,
        store,
        deleted,
        receive_index,
        orders,
    }
}

pub(crate) fn onchain_payment(id: &str, direction: PaymentDirection, amount: u64) -> PaymentRecord {
    PaymentRecord {
        id: id.to_string(),
        direction,
        status: PaymentStatus::Succeeded,
        amount,
        fee: 250,
        fee_rate: 5,
        address: None,
        kind: PaymentKind::Onchain {
            tx_id: format!("tx-{id}"),
            confirmation: ConfirmationStatus::Unconfirmed,
        },
        timestamp: 1_000,
        latest_update_timestamp: 1_000,
    }
}

pub(crate) fn lightning_payment(
    id: &str,
    direction: PaymentDirection,
    status: PaymentStatus,
    amount: u64,
) -> PaymentRecord {
    PaymentRecord {
        id: id.to_string(),
        direction,
        status,
        amount,
        fee: 3,
        fee_rate: 0,
        address: None,
        kind: PaymentKind::Lightning {
            invoice: Some(format!("lnbc-{id}")),
            preimage: None,
            description: None,
        },
        timestamp: 1_000,
        latest_update_timestamp: 1_000,
    }
}
