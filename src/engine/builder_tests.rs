#![allow(clippy::unwrap_used)]

use super::*;
use crate::source::ConfirmationStatus;

fn onchain_record(id: &str, direction: PaymentDirection) -> PaymentRecord {
    PaymentRecord {
        id: id.to_string(),
        direction,
        status: PaymentStatus::Succeeded,
        amount: 10_000,
        fee: 300,
        fee_rate: 6,
        address: None,
        kind: PaymentKind::Onchain {
            tx_id: format!("tx-{id}"),
            confirmation: ConfirmationStatus::Unconfirmed,
        },
        timestamp: 1_000,
        latest_update_timestamp: 1_000,
    }
}

fn lightning_record(id: &str, direction: PaymentDirection, status: PaymentStatus) -> PaymentRecord {
    PaymentRecord {
        id: id.to_string(),
        direction,
        status,
        amount: 2_500,
        fee: 2,
        fee_rate: 0,
        address: None,
        kind: PaymentKind::Lightning {
            invoice: Some(format!("lnbc-{id}")),
            preimage: None,
            description: Some("coffee".to_string()),
        },
        timestamp: 1_000,
        latest_update_timestamp: 1_000,
    }
}

#[test]
fn zero_value_receive_is_suppressed() {
    let mut record = onchain_record("p1", PaymentDirection::Received);
    record.amount = 0;
    assert!(!should_show_received(&record));
    assert!(build_activity(&record, BuildContext::default()).is_none());
}

#[test]
fn zero_value_send_still_builds() {
    let mut record = onchain_record("p1", PaymentDirection::Sent);
    record.amount = 0;
    assert!(should_show_received(&record));
    assert!(build_activity(&record, BuildContext::default()).is_some());
}

#[test]
fn unpaid_inbound_invoice_is_skipped() {
    let record = lightning_record("h1", PaymentDirection::Received, PaymentStatus::Pending);
    assert!(build_activity(&record, BuildContext::default()).is_none());

    // A pending *outbound* payment is real in-flight activity.
    let record = lightning_record("h2", PaymentDirection::Sent, PaymentStatus::Pending);
    assert!(build_activity(&record, BuildContext::default()).is_some());
}

#[test]
fn new_onchain_defaults_transfer_from_channel_link() {
    let record = onchain_record("p1", PaymentDirection::Sent);
    let ctx = BuildContext {
        resolved_channel_id: Some("chan1".to_string()),
        now: 50,
        ..Default::default()
    };
    let activity = build_activity(&record, ctx).unwrap();
    let onchain = activity.as_onchain().unwrap();
    assert!(onchain.is_transfer);
    assert_eq!(onchain.channel_id.as_deref(), Some("chan1"));
    assert_eq!(onchain.created_at, 50);
}

#[test]
fn unresolved_address_gets_placeholder() {
    let record = onchain_record("p1", PaymentDirection::Received);
    let activity = build_activity(&record, BuildContext::default()).unwrap();
    assert_eq!(activity.as_onchain().unwrap().address, PLACEHOLDER_ADDRESS);
}

#[test]
fn resolved_address_replaces_placeholder_on_rebuild() {
    let record = onchain_record("p1", PaymentDirection::Received);
    let first = build_activity(&record, BuildContext::default()).unwrap();

    let ctx = BuildContext {
        existing: Some(first),
        resolved_address: Some("bc1q-resolved".to_string()),
        ..Default::default()
    };
    let healed = build_activity(&record, ctx).unwrap();
    assert_eq!(healed.as_onchain().unwrap().address, "bc1q-resolved");
}

#[test]
fn channel_link_is_sticky_across_rebuilds() {
    let record = onchain_record("p1", PaymentDirection::Sent);
    let ctx = BuildContext {
        resolved_channel_id: Some("chan1".to_string()),
        ..Default::default()
    };
    let linked = build_activity(&record, ctx).unwrap();

    // Later event resolves no channel; the link must survive.
    let ctx = BuildContext {
        existing: Some(linked),
        ..Default::default()
    };
    let rebuilt = build_activity(&record, ctx).unwrap();
    let onchain = rebuilt.as_onchain().unwrap();
    assert!(onchain.is_transfer);
    assert_eq!(onchain.channel_id.as_deref(), Some("chan1"));
}

#[test]
fn replaced_row_does_not_resurrect_on_rebuild() {
    let record = onchain_record("p1", PaymentDirection::Sent);
    let mut first = build_activity(&record, BuildContext::default()).unwrap();
    if let Activity::Onchain(ref mut a) = first {
        a.does_exist = false;
        a.boost_tx_ids = vec!["tx-old".to_string()];
        a.is_boosted = true;
    }

    let ctx = BuildContext {
        existing: Some(first),
        ..Default::default()
    };
    let rebuilt = build_activity(&record, ctx).unwrap();
    let onchain = rebuilt.as_onchain().unwrap();
    assert!(!onchain.does_exist);
    assert!(onchain.is_boosted);
    assert_eq!(onchain.boost_tx_ids, vec!["tx-old"]);
}

#[test]
fn lightning_merge_keeps_preimage_created_at_and_seen_at() {
    let record = lightning_record("h1", PaymentDirection::Sent, PaymentStatus::Succeeded);
    let mut first = build_activity(
        &record,
        BuildContext {
            now: 10,
            ..Default::default()
        },
    )
    .unwrap();
    if let Activity::Lightning(ref mut a) = first {
        a.preimage = Some("preimage1".to_string());
        a.seen_at = Some(11);
    }

    let mut later = record.clone();
    later.latest_update_timestamp = 2_000;
    let ctx = BuildContext {
        existing: Some(first),
        now: 99,
        ..Default::default()
    };
    let rebuilt = build_activity(&later, ctx).unwrap();
    let ln = rebuilt.as_lightning().unwrap();
    assert_eq!(ln.preimage.as_deref(), Some("preimage1"));
    assert_eq!(ln.created_at, 10);
    assert_eq!(ln.seen_at, Some(11));
    assert_eq!(ln.updated_at, 2_000);
}

#[test]
fn confirmation_data_is_applied() {
    let record = onchain_record("p1", PaymentDirection::Sent);
    let ctx = BuildContext {
        confirmation: Some(crate::resolvers::confirmation::ConfirmationData {
            confirmed: true,
            confirm_timestamp: Some(1_200),
        }),
        ..Default::default()
    };
    let activity = build_activity(&record, ctx).unwrap();
    let onchain = activity.as_onchain().unwrap();
    assert!(onchain.confirmed);
    assert_eq!(onchain.confirm_timestamp, Some(1_200));
}
