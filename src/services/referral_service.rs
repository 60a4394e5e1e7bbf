//! Referral link management, analytics and manual fraud review

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{AffilinkError, Result};
use crate::storage::{
    BPS_DENOMINATOR, FraudRecord, FraudRecordStatus, ReferralLink, RewardType, SeaOrmStorage,
};
use crate::utils::codes::{generate_referral_code, generate_short_code};

/// 生成链接时撞上唯一索引的最大重试次数
const MAX_CODE_ATTEMPTS: usize = 5;
const MAX_EXPIRES_IN_DAYS: i64 = 365;

// ============ Request/Response DTOs ============

#[derive(Debug, Clone)]
pub struct GenerateReferralRequest {
    pub referrer_id: String,
    pub product_id: Option<String>,
    pub shop_id: Option<String>,
    pub reward_type: RewardType,
    /// percentage: bps；fixed: 最小货币单位
    pub reward_value: i64,
    pub override_tier_rate: bool,
    pub target_url: Option<String>,
    /// 1..=365，None 表示永不过期
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkAnalytics {
    pub referral_id: String,
    pub code: String,
    pub short_code: String,
    pub active: bool,
    pub clicks: u64,
    pub verified_conversions: u64,
    pub unverified_conversions: u64,
    pub conversion_rate: f64,
    pub earned_commission: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralAnalytics {
    pub referrer_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub clicks: u64,
    pub unique_visitors: u64,
    pub verified_conversions: u64,
    pub unverified_conversions: u64,
    /// 已验证转化 / 点击
    pub conversion_rate: f64,
    pub earned_commission: i64,
    pub paid_commission: i64,
    pub pending_commission: i64,
    pub flagged_events: u64,
    pub links: Vec<LinkAnalytics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    /// 误报：被拦截的转化恢复为已验证
    Dismiss,
    /// 确认作弊：已验证的转化撤销验证
    Confirm,
}

impl ReviewDecision {
    fn target_status(self) -> FraudRecordStatus {
        match self {
            ReviewDecision::Dismiss => FraudRecordStatus::Dismissed,
            ReviewDecision::Confirm => FraudRecordStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOutcome {
    pub record: FraudRecord,
    /// 关联转化的 is_verified 是否被修改
    pub conversion_updated: bool,
}

fn conversion_rate(conversions: u64, clicks: u64) -> f64 {
    if clicks == 0 {
        0.0
    } else {
        conversions as f64 / clicks as f64
    }
}

// ============ ReferralService ============

pub struct ReferralService {
    storage: Arc<SeaOrmStorage>,
    code_prefix: String,
}

impl ReferralService {
    pub fn new(storage: Arc<SeaOrmStorage>, code_prefix: impl Into<String>) -> Self {
        Self {
            storage,
            code_prefix: code_prefix.into(),
        }
    }

    pub async fn generate_referral_code(
        &self,
        req: GenerateReferralRequest,
    ) -> Result<ReferralLink> {
        validate_request(&req)?;

        let now = Utc::now();
        let expires_at = req.expires_in_days.map(|days| now + Duration::days(days));

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let link = ReferralLink {
                id: uuid::Uuid::new_v4().to_string(),
                referrer_id: req.referrer_id.clone(),
                product_id: req.product_id.clone(),
                shop_id: req.shop_id.clone(),
                code: generate_referral_code(&self.code_prefix),
                short_code: generate_short_code(),
                reward_type: req.reward_type,
                reward_value: req.reward_value,
                override_tier_rate: req.override_tier_rate,
                target_url: req.target_url.clone(),
                active: true,
                click_count: 0,
                created_at: now,
                expires_at,
                revoked_at: None,
            };

            match self.storage.insert_referral_link(&link).await {
                Ok(()) => return Ok(link),
                Err(AffilinkError::Duplicate(msg)) => {
                    debug!("Code collision (attempt {}): {}", attempt, msg);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AffilinkError::duplicate(format!(
            "Could not allocate a unique referral code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// 停用链接；重复停用直接返回当前状态
    pub async fn revoke_referral_link(&self, link_id: &str) -> Result<ReferralLink> {
        let now = Utc::now();
        if self.storage.revoke_referral_link(link_id, now).await? {
            info!("Referral link revoked: {}", link_id);
        }
        self.storage
            .find_referral_by_id(link_id)
            .await?
            .ok_or_else(|| AffilinkError::not_found(format!("Referral link not found: {}", link_id)))
    }

    pub async fn list_referral_links(&self, referrer_id: &str) -> Result<Vec<ReferralLink>> {
        self.storage.list_referral_links(referrer_id).await
    }

    /// [start, end) 内的推荐效果
    pub async fn get_referral_analytics(
        &self,
        referrer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReferralAnalytics> {
        if start >= end {
            return Err(AffilinkError::validation(format!(
                "Analytics range is empty: {} .. {}",
                start, end
            )));
        }

        let links = self.storage.list_referral_links(referrer_id).await?;
        let ids: Vec<String> = links.iter().map(|l| l.id.clone()).collect();

        let activity = self
            .storage
            .referrer_activity(referrer_id, &ids, start, end)
            .await?;
        let flagged_events = self
            .storage
            .count_fraud_records_between(&ids, start, end)
            .await?;

        let per_link = links
            .iter()
            .map(|link| {
                let stats = activity
                    .links
                    .iter()
                    .find(|a| a.referral_id == link.id)
                    .cloned()
                    .unwrap_or_default();
                LinkAnalytics {
                    referral_id: link.id.clone(),
                    code: link.code.clone(),
                    short_code: link.short_code.clone(),
                    active: link.active && !link.is_expired_at(end.min(Utc::now())),
                    clicks: stats.clicks,
                    verified_conversions: stats.verified_conversions,
                    unverified_conversions: stats.unverified_conversions,
                    conversion_rate: conversion_rate(stats.verified_conversions, stats.clicks),
                    earned_commission: stats.earned_commission,
                }
            })
            .collect();

        Ok(ReferralAnalytics {
            referrer_id: referrer_id.to_string(),
            period_start: start,
            period_end: end,
            clicks: activity.clicks,
            unique_visitors: activity.unique_visitors,
            verified_conversions: activity.verified_conversions,
            unverified_conversions: activity.unverified_conversions,
            conversion_rate: conversion_rate(activity.verified_conversions, activity.clicks),
            earned_commission: activity.earned_commission,
            paid_commission: activity.paid_commission,
            pending_commission: activity.pending_commission(),
            flagged_events,
            links: per_link,
        })
    }

    /// 推荐人名下最近的风控记录
    pub async fn list_flagged_activity(
        &self,
        referrer_id: &str,
        limit: u64,
    ) -> Result<Vec<FraudRecord>> {
        let ids: Vec<String> = self
            .storage
            .list_referral_links(referrer_id)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        self.storage.list_fraud_records(&ids, limit).await
    }

    /// 人工复核
    ///
    /// 只有 pending_review / blocked 可以复核；同一结论重复提交是幂等的。
    /// 关联转化已被结算单认领时不再修改 is_verified。
    pub async fn review_fraud_record(
        &self,
        record_id: &str,
        decision: ReviewDecision,
    ) -> Result<ReviewOutcome> {
        let record = self
            .storage
            .find_fraud_record(record_id)
            .await?
            .ok_or_else(|| {
                AffilinkError::not_found(format!("Fraud record not found: {}", record_id))
            })?;
        let target = decision.target_status();

        if record.status == target {
            return Ok(ReviewOutcome {
                record,
                conversion_updated: false,
            });
        }
        let reviewable = [FraudRecordStatus::PendingReview, FraudRecordStatus::Blocked];
        if !reviewable.contains(&record.status) {
            return Err(AffilinkError::invalid_transition(format!(
                "Fraud record {} was already reviewed as {}",
                record_id, record.status
            )));
        }

        if !self
            .storage
            .transition_fraud_record(record_id, &[record.status], target, Utc::now())
            .await?
        {
            return Err(AffilinkError::invalid_transition(format!(
                "Fraud record {} was reviewed concurrently",
                record_id
            )));
        }

        let conversion_updated = match (&record.conversion_id, decision) {
            (Some(conversion_id), ReviewDecision::Dismiss)
                if record.status == FraudRecordStatus::Blocked =>
            {
                self.storage
                    .set_conversion_verified(conversion_id, true)
                    .await?
            }
            (Some(conversion_id), ReviewDecision::Confirm) => {
                self.storage
                    .set_conversion_verified(conversion_id, false)
                    .await?
            }
            _ => false,
        };

        if decision == ReviewDecision::Confirm && record.conversion_id.is_some() && !conversion_updated
        {
            warn!(
                "Fraud record {} confirmed but its conversion was already claimed or unverified",
                record_id
            );
        }
        info!(
            "Fraud record {} reviewed: {} -> {} (conversion updated: {})",
            record_id, record.status, target, conversion_updated
        );

        let record = self
            .storage
            .find_fraud_record(record_id)
            .await?
            .ok_or_else(|| {
                AffilinkError::not_found(format!("Fraud record not found: {}", record_id))
            })?;
        Ok(ReviewOutcome {
            record,
            conversion_updated,
        })
    }
}

fn validate_request(req: &GenerateReferralRequest) -> Result<()> {
    if req.referrer_id.trim().is_empty() {
        return Err(AffilinkError::validation("referrer_id must not be empty"));
    }

    match req.reward_type {
        RewardType::Percentage if !(1..=BPS_DENOMINATOR).contains(&req.reward_value) => {
            return Err(AffilinkError::validation(format!(
                "Percentage reward must be between 1 and {} bps, got {}",
                BPS_DENOMINATOR, req.reward_value
            )));
        }
        RewardType::Fixed if req.reward_value <= 0 => {
            return Err(AffilinkError::validation(format!(
                "Fixed reward must be positive, got {}",
                req.reward_value
            )));
        }
        _ => {}
    }

    if let Some(days) = req.expires_in_days
        && !(1..=MAX_EXPIRES_IN_DAYS).contains(&days)
    {
        return Err(AffilinkError::validation(format!(
            "expires_in_days must be between 1 and {}, got {}",
            MAX_EXPIRES_IN_DAYS, days
        )));
    }

    if let Some(target) = &req.target_url {
        let parsed = Url::parse(target).map_err(|e| {
            AffilinkError::validation(format!("Invalid target URL '{}': {}", target, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AffilinkError::validation(format!(
                "Target URL must use http or https: {}",
                target
            )));
        }
    }

    Ok(())
}
