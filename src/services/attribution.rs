//! Purchase attribution
//!
//! 购买事件到达时，通过追踪 Cookie 找到应得佣金的推荐链接。
//! Cookie 只能被消费一次；同一 purchase_id 只会产生一条转化。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::{AffilinkError, Result};
use crate::services::commission::CommissionEngine;
use crate::services::fraud::{ConversionContext, FraudScorer};
use crate::storage::{AttributionWrite, Conversion, SeaOrmStorage};
use crate::utils::hash_user_agent;

/// 电商侧上报的购买完成事件
#[derive(Debug, Clone, Default)]
pub struct PurchaseEvent {
    pub purchase_id: String,
    /// 最小货币单位
    pub amount: i64,
    pub currency: Option<String>,
    pub cookie_value: Option<String>,
    pub ip: String,
    pub user_agent: Option<String>,
}

pub struct AttributionResolver {
    storage: Arc<SeaOrmStorage>,
    scorer: Arc<FraudScorer>,
    commission: Arc<CommissionEngine>,
    default_currency: String,
}

impl AttributionResolver {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        scorer: Arc<FraudScorer>,
        commission: Arc<CommissionEngine>,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            scorer,
            commission,
            default_currency: default_currency.into(),
        }
    }

    /// 返回 None 表示没有可归因的推荐（无 Cookie、已过期、已消费或重复购买）
    ///
    /// 佣金计算失败会直接返回错误；风控失败按零风险处理。
    pub async fn attribute_conversion(&self, event: PurchaseEvent) -> Result<Option<Conversion>> {
        if event.purchase_id.trim().is_empty() {
            return Err(AffilinkError::validation("purchase_id must not be empty"));
        }

        let Some(cookie_value) = event.cookie_value.as_deref().filter(|v| !v.is_empty()) else {
            debug!("Purchase {} has no tracking cookie", event.purchase_id);
            return Ok(None);
        };

        if self
            .storage
            .find_conversion_by_purchase(&event.purchase_id)
            .await?
            .is_some()
        {
            debug!("Purchase {} already attributed", event.purchase_id);
            return Ok(None);
        }

        let now = Utc::now();
        let Some(cookie) = self.storage.find_cookie(cookie_value).await? else {
            debug!(
                "Unknown cookie for purchase {}, treating as unattributed",
                event.purchase_id
            );
            return Ok(None);
        };
        if !cookie.is_active_at(now) {
            debug!(
                "Cookie for purchase {} is {}, treating as unattributed",
                event.purchase_id,
                if cookie.converted_at.is_some() { "already converted" } else { "expired" }
            );
            return Ok(None);
        }

        let Some(link) = self.storage.find_referral_by_id(&cookie.referral_id).await? else {
            warn!(
                "Cookie for purchase {} points at missing referral {}",
                event.purchase_id, cookie.referral_id
            );
            return Ok(None);
        };

        let clicked_at = match self.storage.find_click(&cookie.click_id).await {
            Ok(Some(click)) => click.clicked_at,
            Ok(None) => cookie.created_at,
            Err(e) => {
                warn!("Failed to load click {}: {}", cookie.click_id, e);
                cookie.created_at
            }
        };

        let analysis = self
            .scorer
            .analyze_conversion(&ConversionContext {
                referral_id: link.id.clone(),
                purchase_id: event.purchase_id.clone(),
                ip: event.ip.clone(),
                user_agent: event.user_agent.clone(),
                time_since_click: Some(now - clicked_at),
                purchase_amount: Some(event.amount),
            })
            .await;

        let tier = self.commission.get_tier(&link.referrer_id).await?;
        let commission_amount = CommissionEngine::compute_commission(event.amount, &tier, &link)?;

        let conversion = Conversion {
            id: uuid::Uuid::new_v4().to_string(),
            referral_id: link.id.clone(),
            referrer_id: link.referrer_id.clone(),
            purchase_id: event.purchase_id.clone(),
            click_id: Some(cookie.click_id.clone()),
            purchase_amount: event.amount,
            commission_amount,
            currency: event
                .currency
                .clone()
                .unwrap_or_else(|| self.default_currency.clone()),
            fraud_score: analysis.risk_score,
            is_verified: !analysis.should_block,
            tier_level: tier.level,
            visitor_ip: event.ip.clone(),
            user_agent_hash: hash_user_agent(event.user_agent.as_deref().unwrap_or("")),
            payout_id: None,
            created_at: now,
        };
        let record = FraudScorer::build_record(
            &analysis,
            &link.id,
            Some(&cookie.click_id),
            Some(&conversion.id),
            now,
        );

        match self
            .storage
            .commit_attribution(cookie_value, &conversion, record.as_ref())
            .await?
        {
            AttributionWrite::Committed => {
                if analysis.should_block {
                    warn!(
                        "Conversion for purchase {} blocked by fraud screening (score {:.2})",
                        conversion.purchase_id, conversion.fraud_score
                    );
                } else {
                    info!(
                        "Purchase {} attributed to {} (tier {}, commission {})",
                        conversion.purchase_id, link.code, tier.name, commission_amount
                    );
                }
                Ok(Some(conversion))
            }
            AttributionWrite::CookieUnavailable | AttributionWrite::DuplicatePurchase => Ok(None),
        }
    }
}
