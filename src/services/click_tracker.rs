//! Click tracking service
//!
//! 记录推荐链接的点击、签发归因 Cookie，并在提交后做点击风控。
//! 风控失败只记日志，不影响点击本身。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::TrackingConfig;
use crate::errors::{AffilinkError, Result};
use crate::services::fraud::FraudScorer;
use crate::services::reputation::ReputationProvider;
use crate::storage::{ClickEvent, GeoInfo, ReferralLink, SeaOrmStorage, TrackingCookie};
use crate::utils::codes::generate_cookie_value;
use crate::utils::ip::{is_private_or_local, parse_visitor_ip};
use crate::utils::{fingerprint, hash_user_agent, is_valid_referral_code};

/// 点击请求的上下文
#[derive(Debug, Clone, Default)]
pub struct ClickMeta {
    pub ip: String,
    pub user_agent: Option<String>,
    pub referrer_url: Option<String>,
    pub landing_page: Option<String>,
    /// 调用方已知的地理信息；缺省时向信誉服务查询
    pub geo: Option<GeoInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickReceipt {
    /// ClickEvent id
    pub tracking_id: String,
    pub cookie_value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortLinkResolution {
    pub redirect_url: String,
    pub referral_id: String,
    pub code: String,
}

pub struct ClickTracker {
    storage: Arc<SeaOrmStorage>,
    scorer: Arc<FraudScorer>,
    reputation: ReputationProvider,
    config: TrackingConfig,
}

impl ClickTracker {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        scorer: Arc<FraudScorer>,
        reputation: ReputationProvider,
        config: TrackingConfig,
    ) -> Self {
        Self {
            storage,
            scorer,
            reputation,
            config,
        }
    }

    /// 记录一次点击并签发归因 Cookie
    ///
    /// 点击风控只产生审计记录：即使 should_block，点击仍会计数，签发的 Cookie
    /// 之后仍可归因，由转化风控决定是否计佣。
    pub async fn record_click(&self, code: &str, meta: ClickMeta) -> Result<ClickReceipt> {
        if !is_valid_referral_code(code) {
            return Err(AffilinkError::validation(format!(
                "Invalid referral code format: '{}'",
                code
            )));
        }

        let now = Utc::now();
        let link = self
            .storage
            .find_referral_by_code(code)
            .await?
            .filter(|l| l.active)
            .ok_or_else(|| AffilinkError::not_found(format!("Referral code not found: {}", code)))?;
        if link.is_expired_at(now) {
            return Err(AffilinkError::expired(format!(
                "Referral code has expired: {}",
                code
            )));
        }

        let geo = match meta.geo.clone() {
            Some(geo) => geo,
            None => self.lookup_geo(&meta.ip).await,
        };

        let ua = meta.user_agent.as_deref().unwrap_or("");
        let visitor_fp = fingerprint(ua, &meta.ip, &self.config.fingerprint_salt);
        let click = ClickEvent {
            id: uuid::Uuid::new_v4().to_string(),
            referral_id: link.id.clone(),
            referral_code: link.code.clone(),
            visitor_ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            user_agent_hash: hash_user_agent(ua),
            fingerprint: visitor_fp.clone(),
            referrer_url: meta.referrer_url.clone(),
            landing_page: meta.landing_page.clone(),
            geo,
            clicked_at: now,
        };
        let cookie = TrackingCookie {
            cookie_value: generate_cookie_value(),
            referral_id: link.id.clone(),
            referral_code: link.code.clone(),
            click_id: click.id.clone(),
            fingerprint: visitor_fp,
            created_at: now,
            expires_at: now + Duration::days(self.config.cookie_ttl_days),
            converted_at: None,
        };

        if !self.storage.record_click_with_cookie(&click, &cookie).await? {
            // 校验之后链接被停用或刚好过期
            return Err(if link.is_expired_at(Utc::now()) {
                AffilinkError::expired(format!("Referral code has expired: {}", code))
            } else {
                AffilinkError::not_found(format!("Referral code is no longer active: {}", code))
            });
        }

        let analysis = self
            .scorer
            .analyze_click(
                &link.id,
                &meta.ip,
                meta.user_agent.as_deref(),
                meta.referrer_url.as_deref(),
            )
            .await;
        if let Err(e) = self
            .scorer
            .persist_click_analysis(&analysis, &link.id, &click.id)
            .await
        {
            warn!("Failed to persist fraud record for click {}: {}", click.id, e);
        }

        Ok(ClickReceipt {
            tracking_id: click.id,
            cookie_value: cookie.cookie_value,
            expires_at: cookie.expires_at,
        })
    }

    /// 短链接跳转：计数 +1 并给出带 ref 参数的目标地址
    ///
    /// 这里只累加 click_count，不写 ClickEvent、不签发 Cookie。落地页收到 ref
    /// 后调用 `record_click` 会再计一次，因此同一次访问在 click_count 中记两次；
    /// 点击明细（风控窗口、分析报表）只包含 `record_click` 写入的那一条。
    pub async fn resolve_short_link(&self, short_code: &str) -> Result<ShortLinkResolution> {
        let now = Utc::now();
        let not_found =
            || AffilinkError::not_found(format!("Short link not found: {}", short_code));

        let link = self
            .storage
            .find_referral_by_short_code(short_code)
            .await?
            .filter(|l| l.active && !l.is_expired_at(now))
            .ok_or_else(not_found)?;

        if !self.storage.increment_referral_clicks(&link.id, now).await? {
            return Err(not_found());
        }

        let redirect_url = redirect_url(&link, &self.config.storefront_base_url)?;
        debug!("Short link {} -> {}", short_code, redirect_url);

        Ok(ShortLinkResolution {
            redirect_url,
            referral_id: link.id,
            code: link.code,
        })
    }

    async fn lookup_geo(&self, ip: &str) -> GeoInfo {
        if parse_visitor_ip(ip).is_none_or(|addr| is_private_or_local(&addr)) {
            return GeoInfo::default();
        }
        self.reputation
            .lookup(ip)
            .await
            .map(|rep| rep.geo)
            .unwrap_or_default()
    }
}

/// 跳转目标：target_url，否则商品页、店铺页或商城首页；总是追加 ref 参数
fn redirect_url(link: &ReferralLink, storefront: &str) -> Result<String> {
    let base = match (&link.target_url, &link.product_id, &link.shop_id) {
        (Some(target), _, _) => target.clone(),
        (None, Some(product), _) => format!("{}/products/{}", storefront.trim_end_matches('/'), product),
        (None, None, Some(shop)) => format!("{}/shops/{}", storefront.trim_end_matches('/'), shop),
        (None, None, None) => storefront.to_string(),
    };

    let mut url = Url::parse(&base).map_err(|e| {
        AffilinkError::validation(format!("Invalid redirect target '{}': {}", base, e))
    })?;
    url.query_pairs_mut().append_pair("ref", &link.code);
    Ok(url.into())
}
