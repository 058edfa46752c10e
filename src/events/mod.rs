use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Reconciliation lifecycle events published for host applications
/// (notification triggers, UI refresh) so they do not have to poll the
/// ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    SyncCompleted {
        synced: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    SyncFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    ActivityUpserted {
        activity_id: String,
        timestamp: DateTime<Utc>,
    },
    ActivityDeleted {
        activity_id: String,
        timestamp: DateTime<Utc>,
    },
    TransactionReplaced {
        replaced_tx_id: String,
        replacement_tx_id: String,
        timestamp: DateTime<Utc>,
    },
    AddressResolved {
        activity_id: String,
        address: String,
        timestamp: DateTime<Utc>,
    },
    TagsApplied {
        activity_id: String,
        tags: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Generate a unique event ID
    pub fn event_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Get the event timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::SyncCompleted { timestamp, .. } => *timestamp,
            LedgerEvent::SyncFailed { timestamp, .. } => *timestamp,
            LedgerEvent::ActivityUpserted { timestamp, .. } => *timestamp,
            LedgerEvent::ActivityDeleted { timestamp, .. } => *timestamp,
            LedgerEvent::TransactionReplaced { timestamp, .. } => *timestamp,
            LedgerEvent::AddressResolved { timestamp, .. } => *timestamp,
            LedgerEvent::TagsApplied { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::SyncCompleted { .. } => "sync_completed",
            LedgerEvent::SyncFailed { .. } => "sync_failed",
            LedgerEvent::ActivityUpserted { .. } => "activity_upserted",
            LedgerEvent::ActivityDeleted { .. } => "activity_deleted",
            LedgerEvent::TransactionReplaced { .. } => "transaction_replaced",
            LedgerEvent::AddressResolved { .. } => "address_resolved",
            LedgerEvent::TagsApplied { .. } => "tags_applied",
        }
    }
}

/// Trait for handling events asynchronously
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event
    async fn handle(&self, event: LedgerEvent) -> anyhow::Result<()>;

    /// Get the name of this handler for identification
    fn name(&self) -> &str;
}

/// Event bus for distributing events to multiple handlers
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    max_capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("max_capacity", &self.max_capacity)
            .field(
                "handlers_count",
                &self.handlers.try_read().map(|h| h.len()).unwrap_or(0),
            )
            .finish()
    }
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            max_capacity: capacity,
        }
    }

    /// Register an event handler
    pub async fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        let handler_name = handler.name().to_string();
        handlers.push(handler);
        info!(
            handler_name = %handler_name,
            total_handlers = handlers.len(),
            "Event handler registered"
        );
    }

    /// Publish an event to all registered handlers and broadcast subscribers
    pub async fn publish(&self, event: LedgerEvent) {
        let event_id = event.event_id();
        let event_type = event.event_type();

        debug!(
            event_id = %event_id,
            event_type = %event_type,
            "Publishing event"
        );

        // Broadcast to real-time subscribers; no active receivers is not an
        // error.
        let _ = self.sender.send(event.clone());

        // Handlers run in the background so a slow consumer cannot stall the
        // sync pass.
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            let handler_clone = handler.clone();
            let event_clone = event.clone();
            let event_id_clone = event_id.clone();

            tokio::spawn(async move {
                let handler_name = handler_clone.name().to_string();
                if let Err(e) = handler_clone.handle(event_clone).await {
                    error!(
                        event_id = %event_id_clone,
                        handler_name = %handler_name,
                        error = ?e,
                        "Event handler failed"
                    );
                }
            });
        }
    }

    /// Subscribe to the event stream for real-time event processing
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Get the current number of registered handlers
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}
