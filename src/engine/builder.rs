use tracing::debug;

use crate::resolvers::confirmation::ConfirmationData;
use crate::source::{PaymentKind, PaymentRecord};
use crate::types::{
    Activity, LightningActivity, OnchainActivity, PaymentDirection, PaymentStatus,
};

/// Sentinel address for inbound onchain activities whose receive address
/// could not be resolved yet. Healed by the address resolver on a later
/// pass.
pub const PLACEHOLDER_ADDRESS: &str = "unknown";

/// Resolved inputs the builder folds into an activity, alongside the raw
/// payment record.
#[derive(Debug, Default)]
pub struct BuildContext {
    pub existing: Option<Activity>,
    pub resolved_address: Option<String>,
    pub resolved_channel_id: Option<String>,
    pub confirmation: Option<ConfirmationData>,
    /// Wall-clock now, injected for determinism.
    pub now: u64,
}

/// Whether a received payment should surface as an activity at all.
/// Zero-value receives (dust/spam probes) never do.
pub fn should_show_received(record: &PaymentRecord) -> bool {
    record.direction != PaymentDirection::Received || record.amount > 0
}

/// Pure transformation of a payment record into a canonical ledger entry,
/// merging with any pre-existing entry for the same id.
///
/// Returns `None` when the record must not produce an activity: a
/// zero-value receive, or an inbound invoice that was created but never
/// paid.
pub fn build_activity(record: &PaymentRecord, ctx: BuildContext) -> Option<Activity> {
    if !should_show_received(record) {
        debug!(payment_id = %record.id, "Skipping zero-value receive");
        return None;
    }

    match &record.kind {
        PaymentKind::Lightning { .. } => build_lightning(record, ctx).map(Activity::Lightning),
        PaymentKind::Onchain { .. } => build_onchain(record, ctx).map(Activity::Onchain),
    }
}

fn build_lightning(record: &PaymentRecord, ctx: BuildContext) -> Option<LightningActivity> {
    // An invoice that was created but never paid is not wallet activity.
    if record.direction == PaymentDirection::Received && record.status == PaymentStatus::Pending {
        debug!(payment_id = %record.id, "Skipping unpaid inbound invoice");
        return None;
    }

    let (invoice, preimage, description) = match &record.kind {
        PaymentKind::Lightning {
            invoice,
            preimage,
            description,
        } => (invoice.clone(), preimage.clone(), description.clone()),
        PaymentKind::Onchain { .. } => return None,
    };

    let existing = ctx.existing.as_ref().and_then(|a| a.as_lightning());

    Some(LightningActivity {
        id: record.id.clone(),
        direction: record.direction,
        status: record.status,
        value: record.amount,
        fee: record.fee,
        invoice: invoice
            .or_else(|| existing.map(|e| e.invoice.clone()))
            .unwrap_or_default(),
        message: description
            .or_else(|| existing.map(|e| e.message.clone()))
            .unwrap_or_default(),
        timestamp: record.timestamp,
        // A preimage never un-happens; keep the stored one when the event
        // omits it.
        preimage: preimage.or_else(|| existing.and_then(|e| e.preimage.clone())),
        created_at: existing.map(|e| e.created_at).unwrap_or(ctx.now),
        updated_at: record.latest_update_timestamp,
        seen_at: existing.and_then(|e| e.seen_at),
    })
}

fn build_onchain(record: &PaymentRecord, ctx: BuildContext) -> Option<OnchainActivity> {
    let tx_id = match &record.kind {
        PaymentKind::Onchain { tx_id, .. } => tx_id.clone(),
        PaymentKind::Lightning { .. } => return None,
    };

    let existing = ctx.existing.as_ref().and_then(|a| a.as_onchain());
    let confirmation = ctx.confirmation.unwrap_or(ConfirmationData {
        confirmed: false,
        confirm_timestamp: None,
    });

    // channel_id / is_transfer are sticky: once linked, a later event that
    // resolved nothing must not clear them.
    let channel_id = ctx
        .resolved_channel_id
        .or_else(|| existing.and_then(|e| e.channel_id.clone()));
    let is_transfer = channel_id.is_some() || existing.map(|e| e.is_transfer).unwrap_or(false);

    let address = ctx
        .resolved_address
        .or_else(|| record.address.clone())
        .or_else(|| {
            existing
                .map(|e| e.address.clone())
                .filter(|a| a != PLACEHOLDER_ADDRESS)
        })
        .unwrap_or_else(|| PLACEHOLDER_ADDRESS.to_string());

    // Boost chain is append-only across rebuilds.
    let boost_tx_ids = existing.map(|e| e.boost_tx_ids.clone()).unwrap_or_default();

    Some(OnchainActivity {
        id: record.id.clone(),
        direction: record.direction,
        tx_id,
        value: record.amount,
        fee: record.fee,
        fee_rate: record.fee_rate,
        address,
        confirmed: confirmation.confirmed,
        timestamp: record.timestamp,
        confirm_timestamp: confirmation.confirm_timestamp,
        is_boosted: existing.map(|e| e.is_boosted).unwrap_or(false),
        boost_tx_ids,
        is_transfer,
        // A replaced row never resurrects through an ordinary rebuild.
        does_exist: existing.map(|e| e.does_exist).unwrap_or(true),
        channel_id,
        transfer_tx_id: existing.and_then(|e| e.transfer_tx_id.clone()),
        created_at: existing.map(|e| e.created_at).unwrap_or(ctx.now),
        updated_at: record.latest_update_timestamp,
        seen_at: existing.and_then(|e| e.seen_at),
    })
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
