use std::sync::Arc;

use tracing::{debug, warn};

use crate::source::PaymentEventSource;
use crate::store::ReceiveIndex;

/// Find the receive address of an inbound onchain transaction that the
/// node did not track an address for.
///
/// Scans the transaction's outputs against the pre-registered receive
/// metadata and returns the first output flagged with receive intent.
/// No match is not an error; the activity keeps its placeholder address
/// and is healed on a later pass.
pub async fn resolve_receive_address(
    source: &Arc<dyn PaymentEventSource>,
    receive_index: &Arc<dyn ReceiveIndex>,
    tx_id: &str,
) -> anyhow::Result<Option<String>> {
    let details = match source.get_transaction_details(tx_id).await? {
        Some(details) => details,
        None => {
            debug!(tx_id = %tx_id, "No transaction details available for address resolution");
            return Ok(None);
        }
    };

    for output in &details.outputs {
        match receive_index.is_receive_address(&output.address).await {
            Ok(true) => {
                debug!(
                    tx_id = %tx_id,
                    address = %output.address,
                    "Resolved receive address from registered metadata"
                );
                return Ok(Some(output.address.clone()));
            }
            Ok(false) => {}
            Err(e) => {
                // One unreadable entry must not hide a later match.
                warn!(
                    tx_id = %tx_id,
                    address = %output.address,
                    error = ?e,
                    "Receive index lookup failed"
                );
            }
        }
    }

    Ok(None)
}
