use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::FraudAnalysis;
use super::rules::{FraudPolicy, FraudRuleType};
use super::signals::{
    ClickPatternSignals, Composite, IpSignals, composite_click, composite_conversion,
    duplicate_conversion, score_click_pattern, score_conversion_pattern, score_ip,
    score_user_agent,
};
use crate::errors::Result;
use crate::services::reputation::ReputationProvider;
use crate::storage::{FraudRecord, FraudRecordStatus, FraudType, SeaOrmStorage};
use crate::utils::hash_user_agent;
use crate::utils::ip::{is_private_or_local, parse_visitor_ip};

/// 转化风控所需的上下文
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    pub referral_id: String,
    pub purchase_id: String,
    pub ip: String,
    pub user_agent: Option<String>,
    /// 点击到购买的间隔
    pub time_since_click: Option<Duration>,
    pub purchase_amount: Option<i64>,
}

/// 风控评分服务
///
/// 窗口统计直接读存储，不加锁；策略通过 ArcSwap 热替换。
pub struct FraudScorer {
    storage: Arc<SeaOrmStorage>,
    reputation: ReputationProvider,
    policy: ArcSwap<FraudPolicy>,
}

impl FraudScorer {
    pub fn new(storage: Arc<SeaOrmStorage>, reputation: ReputationProvider) -> Self {
        Self {
            storage,
            reputation,
            policy: ArcSwap::from_pointee(FraudPolicy::default()),
        }
    }

    /// 写入默认规则并加载策略
    pub async fn initialize(&self) -> Result<()> {
        self.storage
            .seed_fraud_rules(&FraudPolicy::default_rules())
            .await?;
        self.reload_policy().await?;
        Ok(())
    }

    /// 从 fraud_rules 重新加载策略，返回规则条数
    pub async fn reload_policy(&self) -> Result<usize> {
        let rows = self.storage.load_fraud_rules().await?;
        let count = rows.len();
        self.policy.store(Arc::new(FraudPolicy::from_rules(&rows)));
        info!("Fraud policy reloaded ({} rules)", count);
        Ok(count)
    }

    pub fn policy(&self) -> Arc<FraudPolicy> {
        self.policy.load_full()
    }

    /// 点击风控；任何存储错误都降级为零风险
    pub async fn analyze_click(
        &self,
        referral_id: &str,
        ip: &str,
        user_agent: Option<&str>,
        referrer_url: Option<&str>,
    ) -> FraudAnalysis {
        match self
            .try_analyze_click(referral_id, ip, user_agent, Utc::now())
            .await
        {
            Ok(analysis) => {
                debug!(
                    "Click analysis for referral {} from {} (referrer {:?}): score {:.2}, types {:?}",
                    referral_id, ip, referrer_url, analysis.risk_score, analysis.fraud_types
                );
                analysis
            }
            Err(e) => {
                warn!(
                    "Click fraud analysis failed for referral {}: {}; treating as zero risk",
                    referral_id, e
                );
                FraudAnalysis::clear()
            }
        }
    }

    async fn try_analyze_click(
        &self,
        referral_id: &str,
        ip: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<FraudAnalysis> {
        let policy = self.policy();
        let hour_ago = now - Duration::hours(1);
        let ua_hash = hash_user_agent(user_agent.unwrap_or(""));

        let ip_signals = self.ip_signals(ip, now).await?;
        let pattern_signals = ClickPatternSignals {
            referral_clicks_1h: self
                .storage
                .count_referral_clicks_since(referral_id, hour_ago)
                .await?,
            same_ip_clicks_1h: self
                .storage
                .count_referral_clicks_by_ip_since(referral_id, ip, hour_ago)
                .await?,
            same_ua_clicks_1h: self
                .storage
                .count_referral_clicks_by_ua_since(referral_id, &ua_hash, hour_ago)
                .await?,
        };

        let ip_score = score_ip(&policy, &ip_signals);
        let ua_score = score_user_agent(&policy, user_agent);
        let pattern_score = score_click_pattern(&policy, &pattern_signals);
        let composite = composite_click(&policy, &ip_score, &ua_score, &pattern_score);

        Ok(decide(
            &policy,
            composite,
            FraudRuleType::ClickBlock,
            FraudRuleType::ClickFlag,
        ))
    }

    /// 转化风控；任何存储错误都降级为零风险
    pub async fn analyze_conversion(&self, ctx: &ConversionContext) -> FraudAnalysis {
        match self.try_analyze_conversion(ctx, Utc::now()).await {
            Ok(analysis) => {
                debug!(
                    "Conversion analysis for purchase {}: score {:.2}, types {:?}",
                    ctx.purchase_id, analysis.risk_score, analysis.fraud_types
                );
                analysis
            }
            Err(e) => {
                warn!(
                    "Conversion fraud analysis failed for purchase {}: {}; treating as zero risk",
                    ctx.purchase_id, e
                );
                FraudAnalysis::clear()
            }
        }
    }

    async fn try_analyze_conversion(
        &self,
        ctx: &ConversionContext,
        now: DateTime<Utc>,
    ) -> Result<FraudAnalysis> {
        let policy = self.policy();
        let day_ago = now - Duration::hours(24);
        let ua_hash = hash_user_agent(ctx.user_agent.as_deref().unwrap_or(""));
        let seconds_since_click = ctx.time_since_click.map(|d| d.num_seconds().max(0));

        let ip_signals = self.ip_signals(&ctx.ip, now).await?;
        let (same_ip, same_ua) = self
            .storage
            .count_referral_duplicates_since(&ctx.referral_id, &ctx.ip, &ua_hash, day_ago)
            .await?;

        let ip_score = score_ip(&policy, &ip_signals);
        let ua_score = score_user_agent(&policy, ctx.user_agent.as_deref());
        let pattern_score =
            score_conversion_pattern(&policy, seconds_since_click, ctx.purchase_amount);
        let duplicate = duplicate_conversion(same_ip, same_ua);

        let composite = composite_conversion(
            &policy,
            &ip_score,
            &ua_score,
            &pattern_score,
            duplicate.as_ref(),
            seconds_since_click,
        );

        Ok(decide(
            &policy,
            composite,
            FraudRuleType::ConversionBlock,
            FraudRuleType::ConversionFlag,
        ))
    }

    async fn ip_signals(&self, ip: &str, now: DateTime<Utc>) -> Result<IpSignals> {
        let day_ago = now - Duration::hours(24);
        let private_network = parse_visitor_ip(ip).is_some_and(|addr| is_private_or_local(&addr));

        // 私有地址没有公网信誉可查
        let reputation = if private_network {
            None
        } else {
            self.reputation.lookup(ip).await
        };

        Ok(IpSignals {
            ip: ip.to_string(),
            clicks_24h: self.storage.count_clicks_by_ip_since(ip, day_ago).await?,
            conversions_24h: self
                .storage
                .count_conversions_by_ip_since(ip, day_ago)
                .await?,
            private_network,
            reputation,
        })
    }

    /// should_flag 时生成风控记录
    pub fn build_record(
        analysis: &FraudAnalysis,
        referral_id: &str,
        click_id: Option<&str>,
        conversion_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<FraudRecord> {
        if !analysis.should_flag {
            return None;
        }

        Some(FraudRecord {
            id: uuid::Uuid::new_v4().to_string(),
            referral_id: referral_id.to_string(),
            conversion_id: conversion_id.map(str::to_string),
            click_id: click_id.map(str::to_string),
            fraud_type: analysis
                .primary_type()
                .unwrap_or(FraudType::SuspiciousPattern),
            risk_score: analysis.risk_score,
            details: analysis.details.clone(),
            flagged: true,
            status: if analysis.should_block {
                FraudRecordStatus::Blocked
            } else {
                FraudRecordStatus::PendingReview
            },
            created_at: now,
            reviewed_at: None,
        })
    }

    /// 点击路径：被标记的分析写入审计记录
    pub async fn persist_click_analysis(
        &self,
        analysis: &FraudAnalysis,
        referral_id: &str,
        click_id: &str,
    ) -> Result<Option<FraudRecord>> {
        let Some(record) =
            Self::build_record(analysis, referral_id, Some(click_id), None, Utc::now())
        else {
            return Ok(None);
        };

        self.storage.insert_fraud_record(&record).await?;
        warn!(
            "Click {} on referral {} flagged as {} (score {:.2}, blocked {})",
            click_id, referral_id, record.fraud_type, record.risk_score, analysis.should_block
        );
        Ok(Some(record))
    }
}

fn decide(
    policy: &FraudPolicy,
    composite: Composite,
    block_rule: FraudRuleType,
    flag_rule: FraudRuleType,
) -> FraudAnalysis {
    let should_block = policy.decides(block_rule, composite.risk_score);
    let should_flag = should_block || policy.decides(flag_rule, composite.risk_score);
    let fraud_types: Vec<FraudType> = composite.contributions.iter().map(|(t, _)| *t).collect();

    FraudAnalysis {
        recommendations: recommendations(&fraud_types, should_block, should_flag),
        risk_score: composite.risk_score,
        fraud_types,
        details: composite.details,
        should_block,
        should_flag,
    }
}

fn recommendations(types: &[FraudType], should_block: bool, should_flag: bool) -> Vec<String> {
    let mut out: Vec<String> = types
        .iter()
        .map(|t| {
            match t {
                FraudType::IpAbuse => "Rate-limit or review traffic from this IP address",
                FraudType::ProxyNetwork => "Treat traffic from proxy or hosting networks as unverified",
                FraudType::BotTraffic => "Exclude automated user agents from attribution",
                FraudType::ClickSpam => "Inspect click bursts on this referral link",
                FraudType::SuspiciousPattern => "Verify the purchase before releasing commission",
                FraudType::DuplicateConversion => "Check for repeat purchases from the same visitor",
            }
            .to_string()
        })
        .collect();

    if should_block {
        out.push("Withhold commission for this activity".to_string());
    } else if should_flag {
        out.push("Queue for manual review".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FraudRule;

    fn composite(score: f64) -> Composite {
        Composite {
            risk_score: score,
            contributions: vec![(FraudType::ClickSpam, score)],
            details: vec![],
        }
    }

    #[test]
    fn test_click_thresholds() {
        let policy = FraudPolicy::default();
        let flagged = decide(
            &policy,
            composite(0.5),
            FraudRuleType::ClickBlock,
            FraudRuleType::ClickFlag,
        );
        assert!(flagged.should_flag && !flagged.should_block);

        let blocked = decide(
            &policy,
            composite(0.8),
            FraudRuleType::ClickBlock,
            FraudRuleType::ClickFlag,
        );
        assert!(blocked.should_flag && blocked.should_block);

        let clean = decide(
            &policy,
            composite(0.49),
            FraudRuleType::ClickBlock,
            FraudRuleType::ClickFlag,
        );
        assert!(!clean.should_flag && !clean.should_block);
    }

    #[test]
    fn test_conversion_thresholds() {
        let policy = FraudPolicy::default();
        let flagged = decide(
            &policy,
            composite(0.4),
            FraudRuleType::ConversionBlock,
            FraudRuleType::ConversionFlag,
        );
        assert!(flagged.should_flag && !flagged.should_block);
        let blocked = decide(
            &policy,
            composite(0.7),
            FraudRuleType::ConversionBlock,
            FraudRuleType::ConversionFlag,
        );
        assert!(blocked.should_block);
    }

    #[test]
    fn test_block_without_active_flag_rule_still_flags() {
        let policy = FraudPolicy::from_rules(&[FraudRule {
            rule_type: "click_flag".into(),
            threshold: 0.5,
            weight: 1.0,
            active: false,
        }]);
        let blocked = decide(
            &policy,
            composite(0.9),
            FraudRuleType::ClickBlock,
            FraudRuleType::ClickFlag,
        );
        assert!(blocked.should_block && blocked.should_flag);
    }

    #[test]
    fn test_build_record_status() {
        let now = Utc::now();
        let mut analysis = FraudAnalysis::clear();
        assert!(FraudScorer::build_record(&analysis, "r", None, None, now).is_none());

        analysis.should_flag = true;
        analysis.risk_score = 0.55;
        analysis.fraud_types = vec![FraudType::BotTraffic];
        let record = FraudScorer::build_record(&analysis, "r", Some("c"), None, now).unwrap();
        assert_eq!(record.status, FraudRecordStatus::PendingReview);
        assert_eq!(record.fraud_type, FraudType::BotTraffic);
        assert_eq!(record.click_id.as_deref(), Some("c"));

        analysis.should_block = true;
        let record = FraudScorer::build_record(&analysis, "r", None, Some("v"), now).unwrap();
        assert_eq!(record.status, FraudRecordStatus::Blocked);
    }

    #[test]
    fn test_recommendations_follow_decision() {
        let recs = recommendations(&[FraudType::BotTraffic], true, true);
        assert_eq!(recs.len(), 2);
        assert!(recs.last().unwrap().contains("Withhold"));
        assert!(recommendations(&[], false, false).is_empty());
    }
}
