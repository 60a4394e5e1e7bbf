//! 佣金等级与佣金计算
//!
//! 等级由推荐人累计的已验证转化数决定。佣金规则：
//! - fixed：佣金 = 链接的 reward_value，与金额无关
//! - percentage：默认使用等级费率；链接设置了 override_tier_rate 时使用链接自己的费率
//!
//! 等级奖金只用于展示，不会叠加到单笔佣金上。

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::{CommissionConfig, TierConfig};
use crate::errors::{AffilinkError, Result};
use crate::storage::{BPS_DENOMINATOR, ReferralLink, RewardType, SeaOrmStorage};

/// 下一等级的进度
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierProgress {
    pub level: i32,
    pub name: String,
    pub min_conversions: u64,
    pub remaining_conversions: u64,
    /// 从当前等级门槛到下一等级门槛的完成度，0-100
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommissionTier {
    pub level: i32,
    pub name: String,
    pub percentage_bps: u32,
    pub bonus_amount: i64,
    pub min_conversions: u64,
    pub verified_conversions: u64,
    pub next: Option<TierProgress>,
}

/// `amount × bps / 10000`，四舍五入到最小货币单位
pub fn apply_bps(amount: i64, bps: u32) -> Result<i64> {
    if amount < 0 {
        return Err(AffilinkError::commission(format!(
            "Purchase amount must not be negative: {}",
            amount
        )));
    }
    let denominator = BPS_DENOMINATOR as i128;
    let scaled = (amount as i128) * (bps as i128) + denominator / 2;
    i64::try_from(scaled / denominator).map_err(|_| {
        AffilinkError::commission(format!("Commission overflows for amount {}", amount))
    })
}

pub struct CommissionEngine {
    storage: Arc<SeaOrmStorage>,
    /// 按 min_conversions 升序
    tiers: Vec<TierConfig>,
}

impl CommissionEngine {
    pub fn new(storage: Arc<SeaOrmStorage>, config: &CommissionConfig) -> Result<Self> {
        Ok(Self {
            storage,
            tiers: validate_tiers(&config.tiers)?,
        })
    }

    pub async fn get_tier(&self, referrer_id: &str) -> Result<CommissionTier> {
        let verified = self.storage.count_verified_conversions(referrer_id).await?;
        let tier = self.tier_for_count(verified);
        debug!(
            "Referrer {} has {} verified conversions, tier {}",
            referrer_id, verified, tier.name
        );
        Ok(tier)
    }

    /// 根据已验证转化数定位等级
    pub fn tier_for_count(&self, verified: u64) -> CommissionTier {
        let index = self
            .tiers
            .iter()
            .rposition(|t| verified >= t.min_conversions)
            .unwrap_or(0);
        let current = &self.tiers[index];

        let next = self.tiers.get(index + 1).map(|n| {
            let span = n.min_conversions.saturating_sub(current.min_conversions).max(1);
            let done = verified.saturating_sub(current.min_conversions);
            TierProgress {
                level: n.level,
                name: n.name.clone(),
                min_conversions: n.min_conversions,
                remaining_conversions: n.min_conversions.saturating_sub(verified),
                percent: (done as f64 / span as f64 * 100.0).min(100.0),
            }
        });

        CommissionTier {
            level: current.level,
            name: current.name.clone(),
            percentage_bps: current.percentage_bps,
            bonus_amount: current.bonus_amount,
            min_conversions: current.min_conversions,
            verified_conversions: verified,
            next,
        }
    }

    /// 计算单笔转化的佣金（资金路径，错误直接返回）
    pub fn compute_commission(
        purchase_amount: i64,
        tier: &CommissionTier,
        link: &ReferralLink,
    ) -> Result<i64> {
        if purchase_amount < 0 {
            return Err(AffilinkError::commission(format!(
                "Purchase amount must not be negative: {}",
                purchase_amount
            )));
        }

        match link.reward_type {
            RewardType::Fixed => {
                if link.reward_value < 0 {
                    return Err(AffilinkError::commission(format!(
                        "Referral {} has a negative fixed reward",
                        link.code
                    )));
                }
                Ok(link.reward_value)
            }
            RewardType::Percentage => {
                let bps = if link.override_tier_rate {
                    u32::try_from(link.reward_value)
                        .ok()
                        .filter(|bps| *bps as i64 <= BPS_DENOMINATOR)
                        .ok_or_else(|| {
                            AffilinkError::commission(format!(
                                "Referral {} has an invalid percentage {}",
                                link.code, link.reward_value
                            ))
                        })?
                } else {
                    tier.percentage_bps
                };
                apply_bps(purchase_amount, bps)
            }
        }
    }
}

fn validate_tiers(tiers: &[TierConfig]) -> Result<Vec<TierConfig>> {
    let mut sorted = tiers.to_vec();
    sorted.sort_by_key(|t| t.min_conversions);

    let Some(first) = sorted.first() else {
        return Err(AffilinkError::validation("Commission tier table is empty"));
    };
    if first.min_conversions != 0 {
        return Err(AffilinkError::validation(
            "The lowest commission tier must start at 0 conversions",
        ));
    }
    if sorted
        .windows(2)
        .any(|w| w[0].min_conversions == w[1].min_conversions)
    {
        return Err(AffilinkError::validation(
            "Commission tiers must have distinct thresholds",
        ));
    }
    if let Some(bad) = sorted
        .iter()
        .find(|t| t.percentage_bps as i64 > BPS_DENOMINATOR || t.bonus_amount < 0)
    {
        return Err(AffilinkError::validation(format!(
            "Commission tier {} has an invalid rate or bonus",
            bad.name
        )));
    }
    Ok(sorted)
}
