//! PayoutLedger 集成测试

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use affilink::errors::AffilinkError;
use affilink::storage::PayoutStatus;
use affilink::system::ScheduledJobs;

use common::*;

#[tokio::test]
async fn test_generate_payout_sums_verified_unclaimed() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    let a = click_and_buy(&env, &link, 1, 10_000).await;
    let b = click_and_buy(&env, &link, 2, 20_000).await;
    let (start, end) = around_now();

    let payout = env
        .ctx
        .payouts
        .generate_payout("alice", start, end, "bank_transfer")
        .await
        .unwrap();
    assert_eq!(payout.amount, a.commission_amount + b.commission_amount);
    assert_eq!(payout.amount, 1_500);
    assert_eq!(payout.conversion_count, 2);
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(payout.currency, "USD");

    for id in [&a.id, &b.id] {
        let conversion = env.storage().find_conversion(id).await.unwrap().unwrap();
        assert_eq!(conversion.payout_id.as_deref(), Some(payout.id.as_str()));
    }
}

#[tokio::test]
async fn test_no_double_counting() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    click_and_buy(&env, &link, 1, 10_000).await;
    let (start, end) = around_now();

    env.ctx
        .payouts
        .generate_payout("alice", start, end, "bank_transfer")
        .await
        .unwrap();

    // 同一周期：已有结算单
    let err = env
        .ctx
        .payouts
        .generate_payout("alice", start, end, "bank_transfer")
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::Duplicate(_)));

    // 重叠周期：转化已被认领
    let err = env
        .ctx
        .payouts
        .generate_payout("alice", start - Duration::hours(1), end, "bank_transfer")
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::NoEligibleCommissions(_)));
}

#[tokio::test]
async fn test_empty_payout_is_rejected() {
    let env = setup().await;
    let (start, end) = around_now();

    let err = env
        .ctx
        .payouts
        .generate_payout("nobody", start, end, "bank_transfer")
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::NoEligibleCommissions(_)));

    // 锁已回滚，之后有佣金时仍可生成
    let link = create_link(&env, "nobody").await;
    click_and_buy(&env, &link, 1, 4_000).await;
    let payout = env
        .ctx
        .payouts
        .generate_payout("nobody", start, end, "bank_transfer")
        .await
        .unwrap();
    assert_eq!(payout.amount, 200);
}

#[tokio::test]
async fn test_generate_payout_validates_input() {
    let env = setup().await;
    let (start, end) = around_now();

    let err = env
        .ctx
        .payouts
        .generate_payout("alice", end, start, "bank_transfer")
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::Validation(_)));

    let err = env
        .ctx
        .payouts
        .generate_payout("alice", start, end, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::Validation(_)));
}

#[tokio::test]
async fn test_status_lifecycle() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    click_and_buy(&env, &link, 1, 10_000).await;
    let (start, end) = around_now();
    let payout = env
        .ctx
        .payouts
        .generate_payout("alice", start, end, "bank_transfer")
        .await
        .unwrap();
    let ledger = &env.ctx.payouts;

    let err = ledger
        .update_payout_status(&payout.id, PayoutStatus::Paid, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::InvalidTransition(_)));

    let processing = ledger
        .update_payout_status(&payout.id, PayoutStatus::Processing, None)
        .await
        .unwrap();
    assert_eq!(processing.status, PayoutStatus::Processing);
    assert!(processing.processed_at.is_none());

    let paid = ledger
        .update_payout_status(&payout.id, PayoutStatus::Paid, Some("tx-123"))
        .await
        .unwrap();
    assert_eq!(paid.status, PayoutStatus::Paid);
    assert_eq!(paid.external_transaction_id.as_deref(), Some("tx-123"));
    assert!(paid.processed_at.is_some());

    // 重复提交同一状态是幂等的
    let again = ledger
        .update_payout_status(&payout.id, PayoutStatus::Paid, None)
        .await
        .unwrap();
    assert_eq!(again, paid);

    let err = ledger
        .update_payout_status(&payout.id, PayoutStatus::Failed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::InvalidTransition(_)));

    let err = ledger
        .update_payout_status("missing", PayoutStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AffilinkError::NotFound(_)));
}

#[tokio::test]
async fn test_failed_payout_releases_claims() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    let conversion = click_and_buy(&env, &link, 1, 10_000).await;
    let (start, end) = around_now();
    let ledger = &env.ctx.payouts;

    let first = ledger
        .generate_payout("alice", start, end, "bank_transfer")
        .await
        .unwrap();
    ledger
        .update_payout_status(&first.id, PayoutStatus::Processing, None)
        .await
        .unwrap();
    let failed = ledger.fail_payout(&first.id, "bank rejected").await.unwrap();
    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("bank rejected"));

    let released = env
        .storage()
        .find_conversion(&conversion.id)
        .await
        .unwrap()
        .unwrap();
    assert!(released.payout_id.is_none());

    // 同一周期可以重新结算
    let retry = ledger
        .generate_payout("alice", start, end, "bank_transfer")
        .await
        .unwrap();
    assert_eq!(retry.amount, first.amount);
    assert_ne!(retry.id, first.id);
}

#[tokio::test]
async fn test_cancel_from_pending() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    click_and_buy(&env, &link, 1, 10_000).await;
    let (start, end) = around_now();

    let payout = env
        .ctx
        .payouts
        .generate_payout("alice", start, end, "paypal")
        .await
        .unwrap();
    let cancelled = env
        .ctx
        .payouts
        .update_payout_status(&payout.id, PayoutStatus::Cancelled, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, PayoutStatus::Cancelled);

    let listed = env.ctx.payouts.list_payouts("alice").await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_generate_period_payouts() {
    let env = setup().await;
    let alice = create_link(&env, "alice").await;
    let bob = create_link(&env, "bob").await;
    click_and_buy(&env, &alice, 1, 10_000).await;
    click_and_buy(&env, &bob, 2, 30_000).await;
    let (start, end) = around_now();

    let report = env
        .ctx
        .payouts
        .generate_period_payouts(start, end, "bank_transfer")
        .await
        .unwrap();
    assert_eq!(report.created.len(), 2);
    assert_eq!(report.total_amount(), 500 + 1_500);
    assert_eq!(report.failed, 0);

    let rerun = env
        .ctx
        .payouts
        .generate_period_payouts(start, end, "bank_transfer")
        .await
        .unwrap();
    assert!(rerun.created.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generate_payout_single_winner() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    click_and_buy(&env, &link, 1, 10_000).await;
    click_and_buy(&env, &link, 2, 10_000).await;
    let (start, end) = around_now();
    let ledger = Arc::clone(&env.ctx.payouts);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .generate_payout("alice", start, end, "bank_transfer")
                    .await
            })
        })
        .collect();

    let mut created = Vec::new();
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(payout) => created.push(payout),
            Err(AffilinkError::Duplicate(_)) => duplicates += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created.len(), 1);
    assert_eq!(duplicates, 5);
    assert_eq!(created[0].amount, 1_000);
    assert_eq!(created[0].conversion_count, 2);
    assert_eq!(env.ctx.payouts.list_payouts("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_scheduled_jobs_run_period_batch() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    click_and_buy(&env, &link, 1, 10_000).await;
    let jobs = ScheduledJobs::from_context(&env.ctx, &env.config.payout);

    // 明天执行时，今天是最近一个完整周期
    let tomorrow = Utc::now() + Duration::days(1);
    let report = jobs.run_once_at(tomorrow).await;
    let batch = report.payouts.expect("payout batch should run");
    assert_eq!(batch.created.len(), 1);
    assert_eq!(batch.total_amount(), 500);
    assert!(report.cleanup.is_some());
    assert!(report.rules_loaded.unwrap() > 0);

    // 同一天再次执行不会重复结算
    let rerun = jobs.run_once_at(tomorrow).await;
    assert!(rerun.payouts.unwrap().created.is_empty());
    assert_eq!(env.ctx.payouts.list_payouts("alice").await.unwrap().len(), 1);

    let mut config = env.config.payout.clone();
    config.batch_enabled = false;
    let disabled = ScheduledJobs::from_context(&env.ctx, &config);
    assert!(disabled.run_once_at(tomorrow).await.payouts.is_none());
}
