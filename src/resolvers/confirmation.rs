use crate::source::ConfirmationStatus;

/// Normalized confirmation state of an onchain payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationData {
    pub confirmed: bool,
    pub confirm_timestamp: Option<u64>,
}

/// Normalize a raw confirmation status against the event's own timestamp.
///
/// Upstream block clocks are not trusted: a confirmation that claims to
/// predate the payment's own record is clamped forward to the event
/// timestamp.
pub fn resolve_confirmation(
    status: &ConfirmationStatus,
    event_timestamp: u64,
) -> ConfirmationData {
    match status {
        ConfirmationStatus::Unconfirmed => ConfirmationData {
            confirmed: false,
            confirm_timestamp: None,
        },
        ConfirmationStatus::Confirmed { timestamp } => ConfirmationData {
            confirmed: true,
            confirm_timestamp: Some((*timestamp).max(event_timestamp)),
        },
    }
}
