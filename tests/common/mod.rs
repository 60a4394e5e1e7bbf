//! 集成测试共用的初始化与数据构造
#![allow(dead_code)]

use std::sync::{Arc, Once};

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use affilink::config::{StaticConfig, init_config};
use affilink::services::{ClickMeta, ClickReceipt, GenerateReferralRequest, PurchaseEvent};
use affilink::storage::{Conversion, GeoInfo, ReferralLink, RetryPolicy, RewardType, SeaOrmStorage};
use affilink::system::{StartupContext, build_services};

static INIT: Once = Once::new();

pub fn init_test_config() {
    INIT.call_once(|| {
        init_config();
    });
}

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub struct TestEnv {
    pub ctx: StartupContext,
    pub config: StaticConfig,
    _dir: TempDir,
}

impl TestEnv {
    pub fn storage(&self) -> &Arc<SeaOrmStorage> {
        &self.ctx.storage
    }
}

pub async fn setup() -> TestEnv {
    setup_with(StaticConfig::default()).await
}

/// 临时 SQLite 数据库 + 完整服务
pub async fn setup_with(config: StaticConfig) -> TestEnv {
    init_test_config();

    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("affilink_test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let storage = Arc::new(
        SeaOrmStorage::new(&db_url, "sqlite", 5, RetryPolicy::default())
            .await
            .expect("Failed to create storage"),
    );
    let ctx = build_services(storage, &config)
        .await
        .expect("Failed to build services");

    TestEnv {
        ctx,
        config,
        _dir: dir,
    }
}

pub fn percentage_request(referrer_id: &str, bps: i64) -> GenerateReferralRequest {
    GenerateReferralRequest {
        referrer_id: referrer_id.to_string(),
        product_id: Some("prod-1".to_string()),
        shop_id: None,
        reward_type: RewardType::Percentage,
        reward_value: bps,
        override_tier_rate: false,
        target_url: None,
        expires_in_days: Some(30),
    }
}

pub async fn create_link(env: &TestEnv, referrer_id: &str) -> ReferralLink {
    env.ctx
        .referrals
        .generate_referral_code(percentage_request(referrer_id, 500))
        .await
        .expect("Failed to create referral link")
}

/// 每个访客使用不同的 IP 和 UA，避免触发重复转化规则
pub fn visitor(n: u32) -> (String, String) {
    (
        format!("198.51.100.{}", n % 250 + 1),
        format!("{} Visitor/{}", CHROME_UA, n),
    )
}

pub fn meta(ip: &str, user_agent: &str) -> ClickMeta {
    ClickMeta {
        ip: ip.to_string(),
        user_agent: Some(user_agent.to_string()),
        referrer_url: Some("https://blog.example.com/review".to_string()),
        landing_page: Some("/products/prod-1".to_string()),
        geo: Some(GeoInfo {
            country: Some("US".to_string()),
            city: None,
        }),
    }
}

pub async fn click(env: &TestEnv, link: &ReferralLink, n: u32) -> ClickReceipt {
    let (ip, ua) = visitor(n);
    env.ctx
        .click_tracker
        .record_click(&link.code, meta(&ip, &ua))
        .await
        .expect("Failed to record click")
}

pub fn purchase(purchase_id: &str, amount: i64, cookie: &str, n: u32) -> PurchaseEvent {
    let (ip, ua) = visitor(n);
    PurchaseEvent {
        purchase_id: purchase_id.to_string(),
        amount,
        currency: None,
        cookie_value: Some(cookie.to_string()),
        ip,
        user_agent: Some(ua),
    }
}

/// 点击 + 购买，返回已归因的转化
pub async fn click_and_buy(env: &TestEnv, link: &ReferralLink, n: u32, amount: i64) -> Conversion {
    let receipt = click(env, link, n).await;
    env.ctx
        .attribution
        .attribute_conversion(purchase(
            &format!("order-{}-{}", link.code, n),
            amount,
            &receipt.cookie_value,
            n,
        ))
        .await
        .expect("Attribution failed")
        .expect("Purchase should be attributed")
}

/// 覆盖所有测试数据的结算区间
pub fn around_now() -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    (now - chrono::Duration::hours(1), now + chrono::Duration::hours(1))
}
