//! CommissionEngine 集成测试

mod common;

use affilink::storage::RewardType;

use common::*;

#[tokio::test]
async fn test_new_referrer_is_bronze() {
    let env = setup().await;
    let tier = env.ctx.commission.get_tier("nobody").await.unwrap();
    assert_eq!(tier.name, "Bronze");
    assert_eq!(tier.percentage_bps, 500);
    assert_eq!(tier.verified_conversions, 0);

    let next = tier.next.expect("Bronze has a next tier");
    assert_eq!(next.name, "Silver");
    assert_eq!(next.remaining_conversions, 10);
    assert_eq!(next.percent, 0.0);
}

#[tokio::test]
async fn test_tier_progress_counts_verified_only() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;
    for n in 1..=3 {
        click_and_buy(&env, &link, n, 2_000).await;
    }

    let tier = env.ctx.commission.get_tier("alice").await.unwrap();
    assert_eq!(tier.verified_conversions, 3);
    let next = tier.next.unwrap();
    assert_eq!(next.remaining_conversions, 7);
    assert!((next.percent - 30.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_tier_thresholds() {
    let env = setup().await;
    let engine = &env.ctx.commission;

    assert_eq!(engine.tier_for_count(9).name, "Bronze");
    assert_eq!(engine.tier_for_count(10).name, "Silver");
    assert_eq!(engine.tier_for_count(50).percentage_bps, 1_000);
    let top = engine.tier_for_count(10_000);
    assert_eq!(top.name, "Platinum");
    assert_eq!(top.bonus_amount, 50_000);
    assert!(top.next.is_none());
}

#[tokio::test]
async fn test_fixed_and_override_links() {
    let env = setup().await;

    let mut fixed = percentage_request("bob", 750);
    fixed.reward_type = RewardType::Fixed;
    let fixed_link = env.ctx.referrals.generate_referral_code(fixed).await.unwrap();
    let conversion = click_and_buy(&env, &fixed_link, 1, 12_345).await;
    assert_eq!(conversion.commission_amount, 750);

    let mut custom = percentage_request("bob", 2_000);
    custom.override_tier_rate = true;
    let custom_link = env.ctx.referrals.generate_referral_code(custom).await.unwrap();
    let conversion = click_and_buy(&env, &custom_link, 2, 12_345).await;
    // 12345 × 20% = 2469
    assert_eq!(conversion.commission_amount, 2_469);
}
