//! 风控策略表
//!
//! 每条规则包含 threshold / weight / active。信号规则的 weight 是命中时增加的
//! 子分数，权重规则的 weight 是子分数在综合分中的系数，决策规则只使用 threshold。
//! 规则存放在 fraud_rules 表中，启动时写入默认值，运行时可重新加载。

use std::collections::HashMap;

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::warn;

use crate::storage::FraudRule;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum FraudRuleType {
    // IP 信号（24h）
    IpClicksHigh,
    IpClicksElevated,
    IpConversionsHigh,
    IpConversionsElevated,
    IpPrivateNetwork,
    IpProxy,
    IpDatacenter,
    // UA 信号
    UaBotSignature,
    UaCrawler,
    UaTooShort,
    UaNoBrowserToken,
    // 点击模式（最近 1 小时，单个推荐链接）
    ClickReferralBurst,
    ClickSameIpBurst,
    ClickSameUaBurst,
    // 转化模式
    ConversionTooFast,
    ConversionFast,
    ConversionLargeAmount,
    // 综合分权重
    ClickWeightIp,
    ClickWeightUa,
    ClickWeightPattern,
    ConversionWeightIp,
    ConversionWeightUa,
    ConversionWeightPattern,
    ConversionDuplicatePenalty,
    ConversionTooFastPenalty,
    /// 24h 同 IP 点击数超过 threshold 时，点击综合分至少为 weight
    ClickIpVolumeFloor,
    // 决策阈值
    ClickBlock,
    ClickFlag,
    ConversionBlock,
    ConversionFlag,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleParams {
    pub threshold: f64,
    pub weight: f64,
    pub active: bool,
}

const fn rule(threshold: f64, weight: f64) -> RuleParams {
    RuleParams {
        threshold,
        weight,
        active: true,
    }
}

impl FraudRuleType {
    pub fn default_params(self) -> RuleParams {
        use FraudRuleType::*;
        match self {
            IpClicksHigh => rule(50.0, 0.4),
            IpClicksElevated => rule(20.0, 0.2),
            IpConversionsHigh => rule(5.0, 0.3),
            IpConversionsElevated => rule(2.0, 0.15),
            IpPrivateNetwork => rule(0.0, 0.1),
            IpProxy => rule(0.0, 0.3),
            IpDatacenter => rule(0.0, 0.2),
            UaBotSignature => rule(0.0, 0.8),
            UaCrawler => rule(0.0, 0.5),
            UaTooShort => rule(20.0, 0.3),
            UaNoBrowserToken => rule(0.0, 0.2),
            ClickReferralBurst => rule(100.0, 0.4),
            ClickSameIpBurst => rule(10.0, 0.6),
            ClickSameUaBurst => rule(20.0, 0.3),
            ConversionTooFast => rule(10.0, 0.8),
            ConversionFast => rule(30.0, 0.4),
            ConversionLargeAmount => rule(100_000.0, 0.1),
            ClickWeightIp => rule(0.0, 0.4),
            ClickWeightUa => rule(0.0, 0.3),
            ClickWeightPattern => rule(0.0, 0.3),
            ConversionWeightIp => rule(0.0, 0.3),
            ConversionWeightUa => rule(0.0, 0.2),
            ConversionWeightPattern => rule(0.0, 0.3),
            ConversionDuplicatePenalty => rule(0.0, 0.4),
            ConversionTooFastPenalty => rule(10.0, 0.3),
            ClickIpVolumeFloor => rule(50.0, 0.4),
            ClickBlock => rule(0.8, 1.0),
            ClickFlag => rule(0.5, 1.0),
            ConversionBlock => rule(0.7, 1.0),
            ConversionFlag => rule(0.4, 1.0),
        }
    }
}

/// 当前生效的风控策略
#[derive(Debug, Clone)]
pub struct FraudPolicy {
    rules: HashMap<FraudRuleType, RuleParams>,
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            rules: FraudRuleType::iter()
                .map(|t| (t, t.default_params()))
                .collect(),
        }
    }
}

impl FraudPolicy {
    /// 以默认值为基础，用表中的规则覆盖；未知的 rule_type 忽略
    pub fn from_rules(rows: &[FraudRule]) -> Self {
        let mut policy = Self::default();
        for row in rows {
            match row.rule_type.parse::<FraudRuleType>() {
                Ok(rule_type) => {
                    policy.rules.insert(
                        rule_type,
                        RuleParams {
                            threshold: row.threshold,
                            weight: row.weight,
                            active: row.active,
                        },
                    );
                }
                Err(_) => warn!("Ignoring unknown fraud rule type '{}'", row.rule_type),
            }
        }
        policy
    }

    /// 默认规则（写入 fraud_rules 表的种子数据）
    pub fn default_rules() -> Vec<FraudRule> {
        FraudRuleType::iter()
            .map(|t| {
                let p = t.default_params();
                FraudRule {
                    rule_type: t.as_ref().to_string(),
                    threshold: p.threshold,
                    weight: p.weight,
                    active: p.active,
                }
            })
            .collect()
    }

    pub fn params(&self, rule_type: FraudRuleType) -> RuleParams {
        self.rules
            .get(&rule_type)
            .copied()
            .unwrap_or_else(|| rule_type.default_params())
    }

    /// 停用的规则权重为 0
    pub fn weight(&self, rule_type: FraudRuleType) -> f64 {
        let p = self.params(rule_type);
        if p.active { p.weight } else { 0.0 }
    }

    pub fn threshold(&self, rule_type: FraudRuleType) -> f64 {
        self.params(rule_type).threshold
    }

    /// 计数类信号：value > threshold
    pub fn exceeds(&self, rule_type: FraudRuleType, value: f64) -> bool {
        let p = self.params(rule_type);
        p.active && value > p.threshold
    }

    /// 时间 / 长度类信号：value < threshold
    pub fn below(&self, rule_type: FraudRuleType, value: f64) -> bool {
        let p = self.params(rule_type);
        p.active && value < p.threshold
    }

    /// 金额类信号：value >= threshold
    pub fn reaches(&self, rule_type: FraudRuleType, value: f64) -> bool {
        let p = self.params(rule_type);
        p.active && value >= p.threshold
    }

    /// 布尔信号：规则启用且条件成立
    pub fn applies(&self, rule_type: FraudRuleType, condition: bool) -> bool {
        condition && self.params(rule_type).active
    }

    /// 决策规则：score >= threshold，停用的决策规则永不触发
    pub fn decides(&self, rule_type: FraudRuleType, score: f64) -> bool {
        self.reaches(rule_type, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_type_names_roundtrip() {
        for t in FraudRuleType::iter() {
            assert_eq!(t.as_ref().parse::<FraudRuleType>().unwrap(), t);
        }
        assert_eq!(FraudRuleType::IpClicksHigh.as_ref(), "ip_clicks_high");
    }

    #[test]
    fn test_default_rules_cover_every_type() {
        let rules = FraudPolicy::default_rules();
        assert_eq!(rules.len(), FraudRuleType::iter().count());
        assert!(rules.iter().all(|r| r.active));
    }

    #[test]
    fn test_from_rules_overrides_and_ignores_unknown() {
        let policy = FraudPolicy::from_rules(&[
            FraudRule {
                rule_type: "click_flag".into(),
                threshold: 0.3,
                weight: 1.0,
                active: true,
            },
            FraudRule {
                rule_type: "ua_crawler".into(),
                threshold: 0.0,
                weight: 0.5,
                active: false,
            },
            FraudRule {
                rule_type: "moon_phase".into(),
                threshold: 1.0,
                weight: 1.0,
                active: true,
            },
        ]);
        assert_eq!(policy.threshold(FraudRuleType::ClickFlag), 0.3);
        assert_eq!(policy.weight(FraudRuleType::UaCrawler), 0.0);
        assert!(!policy.applies(FraudRuleType::UaCrawler, true));
        assert_eq!(policy.threshold(FraudRuleType::ClickBlock), 0.8);
    }

    #[test]
    fn test_inactive_decision_rule_never_fires() {
        let policy = FraudPolicy::from_rules(&[FraudRule {
            rule_type: "conversion_block".into(),
            threshold: 0.0,
            weight: 1.0,
            active: false,
        }]);
        assert!(!policy.decides(FraudRuleType::ConversionBlock, 1.0));
        assert!(policy.decides(FraudRuleType::ConversionFlag, 0.4));
        assert!(!policy.decides(FraudRuleType::ConversionFlag, 0.39));
    }
}
