use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time as unix seconds.
///
/// Ledger timestamps are plain unix seconds so the monotonic `updated_at`
/// guard is an integer comparison.
pub fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Direction of a payment relative to this wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDirection {
    Sent,
    Received,
}

/// Terminal or in-flight state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// A Lightning payment entry in the ledger. `id` is the payment hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningActivity {
    pub id: String,
    pub direction: PaymentDirection,
    pub status: PaymentStatus,
    /// Amount in sats.
    pub value: u64,
    /// Routing fee in sats.
    pub fee: u64,
    pub invoice: String,
    pub message: String,
    pub timestamp: u64,
    pub preimage: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub seen_at: Option<u64>,
}

/// An onchain payment entry in the ledger. `id` is the node-assigned
/// payment id, distinct from the transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainActivity {
    pub id: String,
    pub direction: PaymentDirection,
    pub tx_id: String,
    /// Amount in sats.
    pub value: u64,
    /// Miner fee in sats.
    pub fee: u64,
    /// Fee rate in sat/vB.
    pub fee_rate: u64,
    pub address: String,
    pub confirmed: bool,
    pub timestamp: u64,
    pub confirm_timestamp: Option<u64>,
    pub is_boosted: bool,
    /// Append-only boost chain. For a sent activity these are the ancestor
    /// transactions this one replaced (RBF); for a received activity the
    /// descendant children that bumped its fee (CPFP). Disambiguate by
    /// `direction`, not by list shape.
    pub boost_tx_ids: Vec<String>,
    /// Set together with `channel_id` when this transaction funds or closes
    /// a Lightning channel.
    pub is_transfer: bool,
    /// False once this transaction was replaced (RBF). The row is kept for
    /// audit and boost-chain traversal.
    pub does_exist: bool,
    pub channel_id: Option<String>,
    pub transfer_tx_id: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub seen_at: Option<u64>,
}

/// A single user-visible ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activity {
    Lightning(LightningActivity),
    Onchain(OnchainActivity),
}

impl Activity {
    pub fn id(&self) -> &str {
        match self {
            Activity::Lightning(a) => &a.id,
            Activity::Onchain(a) => &a.id,
        }
    }

    pub fn updated_at(&self) -> u64 {
        match self {
            Activity::Lightning(a) => a.updated_at,
            Activity::Onchain(a) => a.updated_at,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Activity::Lightning(a) => a.timestamp,
            Activity::Onchain(a) => a.timestamp,
        }
    }

    pub fn direction(&self) -> PaymentDirection {
        match self {
            Activity::Lightning(a) => a.direction,
            Activity::Onchain(a) => a.direction,
        }
    }

    pub fn as_onchain(&self) -> Option<&OnchainActivity> {
        match self {
            Activity::Onchain(a) => Some(a),
            Activity::Lightning(_) => None,
        }
    }

    pub fn as_lightning(&self) -> Option<&LightningActivity> {
        match self {
            Activity::Lightning(a) => Some(a),
            Activity::Onchain(_) => None,
        }
    }
}

/// Aggregate result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Payments that were built or merged into the ledger.
    pub synced: usize,
    /// Payments that failed and will be retried on the next pass.
    pub failed: usize,
    pub duration_ms: u64,
}
