use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{PaymentDirection, PaymentStatus};

/// Raw confirmation state reported by the event source for an onchain
/// payment. Upstream clocks are not trusted; see
/// [`crate::resolvers::confirmation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Unconfirmed,
    Confirmed { timestamp: u64 },
}

/// Kind-specific payload of a payment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentKind {
    Onchain {
        tx_id: String,
        confirmation: ConfirmationStatus,
    },
    Lightning {
        invoice: Option<String>,
        preimage: Option<String>,
        description: Option<String>,
    },
}

/// One payment as reported by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub direction: PaymentDirection,
    pub status: PaymentStatus,
    /// Amount in sats.
    pub amount: u64,
    /// Fee in sats.
    pub fee: u64,
    /// Fee rate in sat/vB; only meaningful for onchain payments.
    pub fee_rate: u64,
    /// Known destination/receive address, when the node tracked one.
    pub address: Option<String>,
    pub kind: PaymentKind,
    /// When the payment itself happened.
    pub timestamp: u64,
    /// When the node last mutated this record. Drives the monotonic
    /// `updated_at` guard.
    pub latest_update_timestamp: u64,
}

impl PaymentRecord {
    pub fn onchain_tx_id(&self) -> Option<&str> {
        match &self.kind {
            PaymentKind::Onchain { tx_id, .. } => Some(tx_id),
            PaymentKind::Lightning { .. } => None,
        }
    }
}

/// A Lightning channel as reported by the event source. Closed channels
/// stay in the list so closing transactions can be linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub funding_tx_id: Option<String>,
    pub funding_output_index: Option<u32>,
    /// Capacity in sats.
    pub capacity: u64,
    pub is_usable: bool,
    pub is_closed: bool,
}

/// A spent input of a transaction, identified by its prevout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_tx_id: String,
    pub prev_output_index: u32,
}

/// An output of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    /// Value in sats.
    pub value: u64,
}

/// Inputs and outputs of an onchain transaction, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub tx_id: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// The payment/channel event source: a Lightning-style node plus its
/// onchain wallet. The authoritative truth the ledger is reconciled
/// against.
#[async_trait]
pub trait PaymentEventSource: Send + Sync {
    async fn list_payments(&self) -> anyhow::Result<Vec<PaymentRecord>>;
    async fn list_channels(&self) -> anyhow::Result<Vec<ChannelRecord>>;
    async fn get_transaction_details(&self, tx_id: &str)
        -> anyhow::Result<Option<TransactionDetails>>;
}

/// A channel order placed with an external ordering system (e.g. an LSP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Funding transaction of the ordered channel. Orders can learn this
    /// before the channel list reports it.
    pub channel_funding_tx_id: Option<String>,
    /// The channel provisioned for this order, once assigned.
    pub channel_id: Option<String>,
}

/// Secondary order registry, consulted only as a fallback when a funding
/// transaction cannot be matched against live channel state (order-state
/// propagation can race channel confirmation).
#[async_trait]
pub trait OrderRegistry: Send + Sync {
    async fn list_orders(&self) -> anyhow::Result<Vec<Order>>;
}
