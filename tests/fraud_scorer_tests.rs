//! FraudScorer 集成测试（窗口统计来自真实数据库）

mod common;

use chrono::{Duration, Utc};

use affilink::services::ConversionContext;
use affilink::storage::{ClickEvent, FraudRule, FraudType, GeoInfo, ReferralLink, TrackingCookie};
use affilink::utils::hash_user_agent;

use common::*;

fn conversion_ctx(referral_id: &str, seconds: i64) -> ConversionContext {
    ConversionContext {
        referral_id: referral_id.to_string(),
        purchase_id: format!("order-{}", seconds),
        ip: "192.0.2.44".to_string(),
        user_agent: Some(CHROME_UA.to_string()),
        time_since_click: Some(Duration::seconds(seconds)),
        purchase_amount: Some(4_999),
    }
}

#[tokio::test]
async fn test_51_clicks_from_one_ip_is_ip_abuse() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    for _ in 0..51 {
        env.ctx
            .click_tracker
            .record_click(&link.code, meta("203.0.113.50", CHROME_UA))
            .await
            .unwrap();
    }

    let analysis = env
        .ctx
        .scorer
        .analyze_click(&link.id, "203.0.113.50", Some(CHROME_UA), None)
        .await;
    assert!(analysis.risk_score >= 0.4, "score {}", analysis.risk_score);
    assert!(analysis.has_type(FraudType::IpAbuse));
    assert!(analysis.has_type(FraudType::ClickSpam));
}

/// 直接写入一条历史点击（绕过 ClickTracker 的 clicked_at = now）
async fn insert_past_click(env: &TestEnv, link: &ReferralLink, ip: &str, n: i64) {
    let clicked_at = Utc::now() - Duration::hours(2) - Duration::minutes(n * 20);
    let click = ClickEvent {
        id: format!("past-click-{}", n),
        referral_id: link.id.clone(),
        referral_code: link.code.clone(),
        visitor_ip: ip.to_string(),
        user_agent: Some(CHROME_UA.to_string()),
        user_agent_hash: hash_user_agent(CHROME_UA),
        fingerprint: format!("{:016x}", n),
        referrer_url: None,
        landing_page: None,
        geo: GeoInfo::default(),
        clicked_at,
    };
    let cookie = TrackingCookie {
        cookie_value: format!("past-cookie-{}", n),
        referral_id: link.id.clone(),
        referral_code: link.code.clone(),
        click_id: click.id.clone(),
        fingerprint: click.fingerprint.clone(),
        created_at: clicked_at,
        expires_at: clicked_at + Duration::days(30),
        converted_at: None,
    };
    assert!(env.storage().record_click_with_cookie(&click, &cookie).await.unwrap());
}

#[tokio::test]
async fn test_51_clicks_spread_over_a_day_is_ip_abuse() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    // 2h 到约 19h 之前，最近一小时没有任何点击
    for n in 0..51 {
        insert_past_click(&env, &link, "203.0.113.50", n).await;
    }

    let analysis = env
        .ctx
        .scorer
        .analyze_click(&link.id, "203.0.113.50", Some(CHROME_UA), None)
        .await;
    assert!(analysis.risk_score >= 0.4, "score {}", analysis.risk_score);
    assert_eq!(analysis.fraud_types, vec![FraudType::IpAbuse]);
    assert!(!analysis.should_flag);
}

#[tokio::test]
async fn test_clean_click_scores_zero() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    let analysis = env
        .ctx
        .scorer
        .analyze_click(&link.id, "198.51.100.10", Some(CHROME_UA), Some("https://news.example.com"))
        .await;
    assert_eq!(analysis.risk_score, 0.0);
    assert!(analysis.fraud_types.is_empty());
    assert!(!analysis.should_flag);
}

#[tokio::test]
async fn test_eight_second_conversion_is_suspicious() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    let analysis = env
        .ctx
        .scorer
        .analyze_conversion(&conversion_ctx(&link.id, 8))
        .await;
    assert!(analysis.has_type(FraudType::SuspiciousPattern));
    assert!(analysis.should_flag);
    assert!(!analysis.should_block);
}

#[tokio::test]
async fn test_fast_conversion_scores_above_slow() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    let fast = env
        .ctx
        .scorer
        .analyze_conversion(&conversion_ctx(&link.id, 5))
        .await;
    let slow = env
        .ctx
        .scorer
        .analyze_conversion(&conversion_ctx(&link.id, 120))
        .await;
    assert!(fast.risk_score > slow.risk_score);
    assert!((0.0..=1.0).contains(&fast.risk_score));
}

#[tokio::test]
async fn test_rule_changes_apply_after_reload() {
    let env = setup().await;
    let link = create_link(&env, "alice").await;

    let before = env
        .ctx
        .scorer
        .analyze_conversion(&conversion_ctx(&link.id, 8))
        .await;

    env.storage()
        .upsert_fraud_rule(&FraudRule {
            rule_type: "conversion_too_fast_penalty".into(),
            threshold: 10.0,
            weight: 0.3,
            active: false,
        })
        .await
        .unwrap();
    env.ctx.scorer.reload_policy().await.unwrap();

    let after = env
        .ctx
        .scorer
        .analyze_conversion(&conversion_ctx(&link.id, 8))
        .await;
    assert!((before.risk_score - after.risk_score - 0.3).abs() < 1e-9);
    assert!(!after.should_flag);
}

#[tokio::test]
async fn test_default_rules_are_seeded_once() {
    let env = setup().await;
    let rules = env.storage().load_fraud_rules().await.unwrap();
    assert!(!rules.is_empty());

    // 再次初始化不会覆盖已调整的规则
    env.storage()
        .upsert_fraud_rule(&FraudRule {
            rule_type: "click_flag".into(),
            threshold: 0.9,
            weight: 1.0,
            active: true,
        })
        .await
        .unwrap();
    env.ctx.scorer.initialize().await.unwrap();
    let rules = env.storage().load_fraud_rules().await.unwrap();
    let flag = rules.iter().find(|r| r.rule_type == "click_flag").unwrap();
    assert_eq!(flag.threshold, 0.9);
}
