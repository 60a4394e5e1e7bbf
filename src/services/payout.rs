//! Payout ledger
//!
//! 把已验证、未认领的佣金按推荐人和周期汇总成结算单，并维护结算状态机：
//!
//! ```text
//! pending ──► processing ──► paid
//!    │            │
//!    │            └────────► failed
//!    └────────────┴────────► cancelled
//! ```
//!
//! failed / cancelled 会释放认领的转化，下次生成时重新结算。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::{AffilinkError, Result};
use crate::storage::{NewPayout, Payout, PayoutStatus, SeaOrmStorage, StatusChange};

/// 结算状态通知（发出即忘，失败不影响结算）
#[async_trait]
pub trait PayoutNotifier: Send + Sync {
    /// previous 为 None 表示新建
    async fn payout_changed(&self, payout: &Payout, previous: Option<PayoutStatus>);

    fn name(&self) -> &'static str;
}

/// 只写日志的通知实现
pub struct LogNotifier;

#[async_trait]
impl PayoutNotifier for LogNotifier {
    async fn payout_changed(&self, payout: &Payout, previous: Option<PayoutStatus>) {
        match previous {
            None => info!(
                "Payout {} created for {}: {} {} ({} conversions)",
                payout.id, payout.referrer_id, payout.amount, payout.currency, payout.conversion_count
            ),
            Some(prev) => info!(
                "Payout {} for {}: {} -> {}",
                payout.id, payout.referrer_id, prev, payout.status
            ),
        }
    }

    fn name(&self) -> &'static str {
        "Log"
    }
}

/// 批量结算的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct PayoutBatchReport {
    pub created: Vec<Payout>,
    /// 无可结算佣金或周期已有结算单
    pub skipped: usize,
    pub failed: usize,
}

impl PayoutBatchReport {
    pub fn total_amount(&self) -> i64 {
        self.created.iter().map(|p| p.amount).sum()
    }
}

pub struct PayoutLedger {
    storage: Arc<SeaOrmStorage>,
    notifier: Arc<dyn PayoutNotifier>,
    currency: String,
}

impl PayoutLedger {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        notifier: Arc<dyn PayoutNotifier>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            notifier,
            currency: currency.into(),
        }
    }

    /// 结算 [period_start, period_end) 内的已验证佣金
    pub async fn generate_payout(
        &self,
        referrer_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        method: &str,
    ) -> Result<Payout> {
        if referrer_id.trim().is_empty() {
            return Err(AffilinkError::validation("referrer_id must not be empty"));
        }
        if method.trim().is_empty() {
            return Err(AffilinkError::validation("Payout method must not be empty"));
        }
        if period_start >= period_end {
            return Err(AffilinkError::validation(format!(
                "Payout period is empty: {} .. {}",
                period_start, period_end
            )));
        }

        let new = NewPayout {
            id: uuid::Uuid::new_v4().to_string(),
            referrer_id: referrer_id.to_string(),
            currency: self.currency.clone(),
            method: method.to_string(),
            period_start,
            period_end,
            created_at: Utc::now(),
        };
        let payout = self.storage.create_payout_with_claims(&new).await?;
        self.notify(&payout, None);
        Ok(payout)
    }

    /// 调度任务：为周期内每个有佣金的推荐人生成结算单
    pub async fn generate_period_payouts(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        method: &str,
    ) -> Result<PayoutBatchReport> {
        let referrers = self
            .storage
            .referrers_with_unclaimed(period_start, period_end)
            .await?;
        let mut report = PayoutBatchReport::default();

        for referrer_id in referrers {
            match self
                .generate_payout(&referrer_id, period_start, period_end, method)
                .await
            {
                Ok(payout) => report.created.push(payout),
                Err(AffilinkError::NoEligibleCommissions(_)) | Err(AffilinkError::Duplicate(_)) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    error!("Payout generation failed for {}: {}", referrer_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Payout batch {} .. {}: {} created ({} total), {} skipped, {} failed",
            period_start,
            period_end,
            report.created.len(),
            report.total_amount(),
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    pub async fn update_payout_status(
        &self,
        payout_id: &str,
        status: PayoutStatus,
        external_transaction_id: Option<&str>,
    ) -> Result<Payout> {
        self.transition(payout_id, status, external_transaction_id, None)
            .await
    }

    /// 标记失败并记录原因
    pub async fn fail_payout(&self, payout_id: &str, reason: &str) -> Result<Payout> {
        self.transition(payout_id, PayoutStatus::Failed, None, Some(reason))
            .await
    }

    pub async fn get_payout(&self, payout_id: &str) -> Result<Payout> {
        self.storage
            .find_payout(payout_id)
            .await?
            .ok_or_else(|| AffilinkError::not_found(format!("Payout not found: {}", payout_id)))
    }

    pub async fn list_payouts(&self, referrer_id: &str) -> Result<Vec<Payout>> {
        self.storage.list_payouts(referrer_id).await
    }

    async fn transition(
        &self,
        payout_id: &str,
        status: PayoutStatus,
        external_transaction_id: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Payout> {
        let current = self.get_payout(payout_id).await?;

        // 重复提交同一状态视为成功
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(AffilinkError::invalid_transition(format!(
                "Payout {} cannot move from {} to {}",
                payout_id, current.status, status
            )));
        }

        let change = StatusChange {
            payout_id: payout_id.to_string(),
            from: current.status,
            to: status,
            external_transaction_id: external_transaction_id.map(str::to_string),
            failure_reason: failure_reason.map(str::to_string),
            at: Utc::now(),
        };

        if !self.storage.apply_payout_status(&change).await? {
            // 并发修改：对方已经写入了同一状态则同样视为成功
            let latest = self.get_payout(payout_id).await?;
            if latest.status == status {
                return Ok(latest);
            }
            warn!(
                "Payout {} changed concurrently to {} while applying {}",
                payout_id, latest.status, status
            );
            return Err(AffilinkError::invalid_transition(format!(
                "Payout {} is now {}, cannot apply {}",
                payout_id, latest.status, status
            )));
        }

        let updated = self.get_payout(payout_id).await?;
        self.notify(&updated, Some(current.status));
        Ok(updated)
    }

    fn notify(&self, payout: &Payout, previous: Option<PayoutStatus>) {
        let notifier = Arc::clone(&self.notifier);
        let payout = payout.clone();
        tokio::spawn(async move {
            notifier.payout_changed(&payout, previous).await;
        });
    }
}
