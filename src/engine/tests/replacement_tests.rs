use super::*;
use crate::store::{ActivityFilter, ActivityStore};

async fn sync_with(h: &Harness, payments: Vec<PaymentRecord>) {
    h.source.set_payments(payments).await;
    h.engine.sync().await.unwrap();
}

#[tokio::test]
async fn replacement_marks_the_old_row_and_links_every_conflict() {
    let h = harness();
    sync_with(
        &h,
        vec![
            onchain_payment("p1", PaymentDirection::Sent, 10_000),
            onchain_payment("c1", PaymentDirection::Sent, 10_000),
            onchain_payment("c2", PaymentDirection::Sent, 10_000),
        ],
    )
    .await;
    h.engine
        .add_tags("p1", &["groceries".to_string()])
        .await
        .unwrap();

    h.engine
        .handle_transaction_replaced("tx-p1", &["tx-c1".to_string(), "tx-c2".to_string()])
        .await
        .unwrap();

    let replaced = h.engine.get_activity("p1").await.unwrap().unwrap();
    let onchain = replaced.as_onchain().unwrap();
    assert!(!onchain.does_exist);
    assert!(!onchain.is_boosted);

    for id in ["c1", "c2"] {
        let conflict = h.engine.get_activity(id).await.unwrap().unwrap();
        let onchain = conflict.as_onchain().unwrap();
        assert!(onchain.is_boosted);
        assert_eq!(onchain.boost_tx_ids, vec!["tx-p1".to_string()]);
        assert_eq!(h.engine.get_tags(id).await.unwrap(), vec!["groceries"]);
    }

    // The replaced row drops out of default listings.
    let visible = h
        .engine
        .get_activities(&ActivityFilter::default())
        .await
        .unwrap();
    assert!(visible.iter().all(|a| a.id() != "p1"));

    let with_replaced = h
        .engine
        .get_activities(&ActivityFilter {
            include_replaced: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(with_replaced.iter().any(|a| a.id() == "p1"));
}

#[tokio::test]
async fn replaying_the_same_replacement_is_a_no_op() {
    let h = harness();
    sync_with(
        &h,
        vec![
            onchain_payment("p1", PaymentDirection::Sent, 10_000),
            onchain_payment("c1", PaymentDirection::Sent, 10_000),
        ],
    )
    .await;

    let conflicts = vec!["tx-c1".to_string()];
    h.engine
        .handle_transaction_replaced("tx-p1", &conflicts)
        .await
        .unwrap();
    let first = h.engine.get_activity("c1").await.unwrap().unwrap();

    h.engine
        .handle_transaction_replaced("tx-p1", &conflicts)
        .await
        .unwrap();
    let second = h.engine.get_activity("c1").await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(
        second.as_onchain().unwrap().boost_tx_ids,
        vec!["tx-p1".to_string()]
    );
}

#[tokio::test]
async fn replacement_synthesizes_a_missing_conflict_from_the_payment_list() {
    let h = harness();
    sync_with(
        &h,
        vec![
            onchain_payment("p1", PaymentDirection::Sent, 10_000),
            onchain_payment("c1", PaymentDirection::Sent, 10_000),
        ],
    )
    .await;

    // The conflict is known upstream but missing from the ledger.
    h.store.delete_activity("c1").await.unwrap();

    h.engine
        .handle_transaction_replaced("tx-p1", &["tx-c1".to_string()])
        .await
        .unwrap();

    let synthesized = h.engine.get_activity("c1").await.unwrap().unwrap();
    let onchain = synthesized.as_onchain().unwrap();
    assert!(onchain.is_boosted);
    assert_eq!(onchain.boost_tx_ids, vec!["tx-p1".to_string()]);
}

#[tokio::test]
async fn unknown_conflict_is_queued_and_lands_on_a_later_pass() {
    let h = harness();
    sync_with(
        &h,
        vec![onchain_payment("p1", PaymentDirection::Sent, 10_000)],
    )
    .await;

    h.engine
        .handle_transaction_replaced("tx-p1", &["tx-ghost".to_string()])
        .await
        .unwrap();
    assert!(!h.engine.pending().is_empty().await);

    // The replacement payment eventually appears upstream.
    sync_with(
        &h,
        vec![
            onchain_payment("p1", PaymentDirection::Sent, 10_000),
            onchain_payment("ghost", PaymentDirection::Sent, 10_000),
        ],
    )
    .await;

    let conflict = h.engine.get_activity("ghost").await.unwrap().unwrap();
    let onchain = conflict.as_onchain().unwrap();
    assert!(onchain.is_boosted);
    assert_eq!(onchain.boost_tx_ids, vec!["tx-p1".to_string()]);
    assert!(h.engine.pending().is_empty().await);
}

#[tokio::test]
async fn replacement_for_an_unknown_transaction_defers_quietly() {
    let h = harness();
    h.engine
        .handle_transaction_replaced("tx-none", &[])
        .await
        .unwrap();
    assert!(h.engine.pending().is_empty().await);
}

#[tokio::test]
async fn ordinary_rebuild_does_not_resurrect_a_replaced_row() {
    let h = harness();
    sync_with(
        &h,
        vec![
            onchain_payment("p1", PaymentDirection::Sent, 10_000),
            onchain_payment("c1", PaymentDirection::Sent, 10_000),
        ],
    )
    .await;
    h.engine
        .handle_transaction_replaced("tx-p1", &["tx-c1".to_string()])
        .await
        .unwrap();

    // A fresher event for the replaced payment updates the row but leaves
    // it logically deleted.
    let mut record = onchain_payment("p1", PaymentDirection::Sent, 10_000);
    record.latest_update_timestamp = now_plus_one(&h).await;
    sync_with(
        &h,
        vec![
            record,
            onchain_payment("c1", PaymentDirection::Sent, 10_000),
        ],
    )
    .await;

    let replaced = h.engine.get_activity("p1").await.unwrap().unwrap();
    assert!(!replaced.as_onchain().unwrap().does_exist);
}

async fn now_plus_one(h: &Harness) -> u64 {
    let current = h.engine.get_activity("p1").await.unwrap().unwrap();
    current.updated_at() + 1
}
