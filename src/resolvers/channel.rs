use std::sync::Arc;

use tracing::debug;

use crate::source::{ChannelRecord, OrderRegistry, PaymentEventSource};
use crate::types::PaymentDirection;

/// Determine whether an onchain transaction is the funding or closing leg
/// of a Lightning channel and return the linked channel id.
///
/// Outbound transactions are matched as channel opens (funding), inbound
/// ones as channel closes (a spend of a closed channel's funding
/// outpoint).
pub async fn link_channel(
    source: &Arc<dyn PaymentEventSource>,
    orders: &Arc<dyn OrderRegistry>,
    channels: &[ChannelRecord],
    direction: PaymentDirection,
    tx_id: &str,
) -> anyhow::Result<Option<String>> {
    match direction {
        PaymentDirection::Sent => link_funding(orders, channels, tx_id).await,
        PaymentDirection::Received => link_closing(source, channels, tx_id).await,
    }
}

/// Match a sent transaction against channel funding.
///
/// Direct match against the funding txid of any known channel first. On a
/// miss, fall back to the order registry: channel funding confirmation can
/// race order-state propagation, so an order may reference the funding
/// txid before the channel list does.
async fn link_funding(
    orders: &Arc<dyn OrderRegistry>,
    channels: &[ChannelRecord],
    tx_id: &str,
) -> anyhow::Result<Option<String>> {
    if let Some(channel) = channels
        .iter()
        .find(|c| c.funding_tx_id.as_deref() == Some(tx_id))
    {
        debug!(tx_id = %tx_id, channel_id = %channel.id, "Matched funding transaction to channel");
        return Ok(Some(channel.id.clone()));
    }

    for order in orders.list_orders().await? {
        if order.channel_funding_tx_id.as_deref() != Some(tx_id) {
            continue;
        }
        let Some(order_channel_id) = &order.channel_id else {
            debug!(
                tx_id = %tx_id,
                order_id = %order.id,
                "Order references funding transaction but no channel was assigned yet"
            );
            continue;
        };
        // The order only proves intent; the channel itself must be live.
        // Resolve it by id: the channel list can know the channel before
        // its funding txid has propagated there.
        if let Some(channel) = channels.iter().find(|c| &c.id == order_channel_id) {
            debug!(
                tx_id = %tx_id,
                order_id = %order.id,
                channel_id = %channel.id,
                "Matched funding transaction via order registry"
            );
            return Ok(Some(channel.id.clone()));
        }
        debug!(
            tx_id = %tx_id,
            order_id = %order.id,
            channel_id = %order_channel_id,
            "Order references funding transaction but channel is not known yet"
        );
    }

    Ok(None)
}

/// Match a received transaction against channel closes: any spent input
/// whose prevout is the funding outpoint of a known closed channel.
async fn link_closing(
    source: &Arc<dyn PaymentEventSource>,
    channels: &[ChannelRecord],
    tx_id: &str,
) -> anyhow::Result<Option<String>> {
    let details = match source.get_transaction_details(tx_id).await? {
        Some(details) => details,
        None => return Ok(None),
    };

    for input in &details.inputs {
        let matched = channels.iter().filter(|c| c.is_closed).find(|c| {
            c.funding_tx_id.as_deref() == Some(input.prev_tx_id.as_str())
                && c.funding_output_index == Some(input.prev_output_index)
        });
        if let Some(channel) = matched {
            debug!(
                tx_id = %tx_id,
                channel_id = %channel.id,
                "Matched closing transaction to closed channel"
            );
            return Ok(Some(channel.id.clone()));
        }
    }

    Ok(None)
}
