//! AttributionResolver 集成测试

mod common;

use std::sync::Arc;

use affilink::config::StaticConfig;
use affilink::services::PurchaseEvent;
use affilink::storage::FraudRecordStatus;

use common::*;

#[tokio::test]
async fn test_attribute_conversion_happy_path() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    let conversion = click_and_buy(&env, &link, 1, 10_000).await;
    assert_eq!(conversion.referral_id, link.id);
    assert_eq!(conversion.referrer_id, "alice");
    // Bronze 5%
    assert_eq!(conversion.commission_amount, 500);
    assert_eq!(conversion.tier_level, 1);
    assert_eq!(conversion.currency, "USD");
    assert!(conversion.is_verified);
    assert!(conversion.click_id.is_some());

    let stored = env
        .storage()
        .find_conversion_by_purchase(&conversion.purchase_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, conversion.id);
}

#[tokio::test]
async fn test_no_cookie_yields_none() {
    let env = setup().await;
    let result = env
        .ctx
        .attribution
        .attribute_conversion(PurchaseEvent {
            purchase_id: "order-1".into(),
            amount: 1_000,
            ip: "198.51.100.1".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(result.is_none());

    let result = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-2", 1_000, "not-a-real-cookie", 1))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_converted_cookie_yields_none() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    let receipt = click(&env, &link, 1).await;

    let first = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-a", 5_000, &receipt.cookie_value, 1))
        .await
        .unwrap();
    assert!(first.is_some());

    let second = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-b", 5_000, &receipt.cookie_value, 2))
        .await
        .unwrap();
    assert!(second.is_none());
    assert!(
        env.storage()
            .find_conversion_by_purchase("order-b")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_expired_cookie_yields_none() {
    let mut config = StaticConfig::default();
    config.tracking.cookie_ttl_days = 0;
    let env = setup_with(config).await;
    let link = create_link(&env, "alice").await;
    let receipt = click(&env, &link, 1).await;

    let result = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-late", 5_000, &receipt.cookie_value, 1))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_duplicate_purchase_yields_none() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    let first_cookie = click(&env, &link, 1).await;
    let second_cookie = click(&env, &link, 2).await;

    let first = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-dup", 8_000, &first_cookie.cookie_value, 1))
        .await
        .unwrap();
    assert!(first.is_some());

    let second = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-dup", 8_000, &second_cookie.cookie_value, 2))
        .await
        .unwrap();
    assert!(second.is_none());

    // 第二个 Cookie 没有被消费
    let cookie = env
        .storage()
        .find_cookie(&second_cookie.cookie_value)
        .await
        .unwrap()
        .unwrap();
    assert!(cookie.converted_at.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_cookie_single_conversion() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    let receipt = click(&env, &link, 1).await;
    let resolver = Arc::clone(&env.ctx.attribution);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let resolver = Arc::clone(&resolver);
            let event = purchase(&format!("order-race-{}", i), 3_000, &receipt.cookie_value, 1);
            tokio::spawn(async move { resolver.attribute_conversion(event).await })
        })
        .collect();

    let mut attributed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            attributed += 1;
        }
    }
    assert_eq!(attributed, 1);
}

#[tokio::test]
async fn test_repeat_visitor_conversion_is_blocked_and_not_counted() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    let first = click_and_buy(&env, &link, 7, 10_000).await;
    assert!(first.is_verified);

    // 同一 IP + UA 第二次购买：重复转化 + 过快转化
    let receipt = click(&env, &link, 7).await;
    let second = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-repeat", 10_000, &receipt.cookie_value, 7))
        .await
        .unwrap()
        .expect("blocked conversions are still stored");
    assert!(!second.is_verified);
    assert!(second.fraud_score >= 0.7);

    assert_eq!(
        env.storage()
            .count_verified_conversions("alice")
            .await
            .unwrap(),
        1
    );

    let records = env
        .ctx
        .referrals
        .list_flagged_activity("alice", 10)
        .await
        .unwrap();
    let blocked = records
        .iter()
        .find(|r| r.conversion_id.as_deref() == Some(second.id.as_str()))
        .expect("blocked conversion has a fraud record");
    assert_eq!(blocked.status, FraudRecordStatus::Blocked);
}

#[tokio::test]
async fn test_negative_amount_propagates_commission_error() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    let receipt = click(&env, &link, 1).await;

    let err = env
        .ctx
        .attribution
        .attribute_conversion(purchase("order-neg", -100, &receipt.cookie_value, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, affilink::errors::AffilinkError::Commission(_)));

    // Cookie 仍可使用
    let cookie = env
        .storage()
        .find_cookie(&receipt.cookie_value)
        .await
        .unwrap()
        .unwrap();
    assert!(cookie.converted_at.is_none());
}
