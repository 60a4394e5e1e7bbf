//! 风控评分模块
//!
//! - rules: 可调的策略表（fraud_rules）
//! - signals: 各类信号的纯函数计算
//! - scorer: 从存储收集窗口统计并给出综合判定

mod rules;
mod scorer;
pub mod signals;

use serde::Serialize;

pub use rules::{FraudPolicy, FraudRuleType, RuleParams};
pub use scorer::{ConversionContext, FraudScorer};

use crate::storage::{FraudDetails, FraudType};

/// 一次点击或转化的风控结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudAnalysis {
    /// [0,1]
    pub risk_score: f64,
    /// 按贡献从大到小排列
    pub fraud_types: Vec<FraudType>,
    pub details: Vec<FraudDetails>,
    pub recommendations: Vec<String>,
    pub should_block: bool,
    pub should_flag: bool,
}

impl FraudAnalysis {
    /// 分析失败时的降级结果：零风险
    pub fn clear() -> Self {
        Self {
            risk_score: 0.0,
            fraud_types: Vec::new(),
            details: Vec::new(),
            recommendations: Vec::new(),
            should_block: false,
            should_flag: false,
        }
    }

    /// 贡献最大的类型，用作风控记录的 fraud_type
    pub fn primary_type(&self) -> Option<FraudType> {
        self.fraud_types.first().copied()
    }

    pub fn has_type(&self, fraud_type: FraudType) -> bool {
        self.fraud_types.contains(&fraud_type)
    }
}
