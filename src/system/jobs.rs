//! 定时任务：数据保留清理、风控规则重载与周期结算

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::config::PayoutConfig;
use crate::services::{CleanupReport, FraudScorer, PayoutBatchReport, PayoutLedger, RetentionTask};
use crate::system::StartupContext;

/// 周期结算参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutSchedule {
    pub period_days: i64,
    pub method: String,
}

impl PayoutSchedule {
    /// 未启用或周期非法时返回 None
    pub fn from_config(config: &PayoutConfig) -> Option<Self> {
        if !config.batch_enabled {
            return None;
        }
        if config.batch_period_days < 1 {
            error!(
                "payout.batch_period_days must be at least 1 (got {}); payout batch disabled",
                config.batch_period_days
            );
            return None;
        }
        Some(Self {
            period_days: config.batch_period_days,
            method: config.batch_method.clone(),
        })
    }

    /// now 之前最近一个完整周期：[今天 00:00 - period_days, 今天 00:00)
    ///
    /// 同一天内重复执行得到同一个周期，已生成的结算单会被跳过。
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        (end - Duration::days(self.period_days), end)
    }
}

/// 一轮任务的结果；失败的任务为 None
#[derive(Debug, Default)]
pub struct JobRunReport {
    pub cleanup: Option<CleanupReport>,
    pub rules_loaded: Option<usize>,
    pub payouts: Option<PayoutBatchReport>,
}

pub struct ScheduledJobs {
    retention: Arc<RetentionTask>,
    scorer: Arc<FraudScorer>,
    payouts: Arc<PayoutLedger>,
    payout_schedule: Option<PayoutSchedule>,
}

impl ScheduledJobs {
    pub fn new(
        retention: Arc<RetentionTask>,
        scorer: Arc<FraudScorer>,
        payouts: Arc<PayoutLedger>,
        payout_schedule: Option<PayoutSchedule>,
    ) -> Self {
        Self {
            retention,
            scorer,
            payouts,
            payout_schedule,
        }
    }

    pub fn from_context(ctx: &StartupContext, config: &PayoutConfig) -> Self {
        Self::new(
            ctx.retention.clone(),
            ctx.scorer.clone(),
            ctx.payouts.clone(),
            PayoutSchedule::from_config(config),
        )
    }

    pub async fn run_once(&self) -> JobRunReport {
        self.run_once_at(Utc::now()).await
    }

    /// 执行一轮任务；单个任务失败只记录日志
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> JobRunReport {
        let mut report = JobRunReport::default();

        match self.retention.run_cleanup_at(now).await {
            Ok(cleanup) => report.cleanup = Some(cleanup),
            Err(e) => error!("Retention cleanup failed: {}", e),
        }
        match self.scorer.reload_policy().await {
            Ok(count) => report.rules_loaded = Some(count),
            Err(e) => error!("Fraud rule reload failed: {}", e),
        }
        if let Some(schedule) = &self.payout_schedule {
            let (start, end) = schedule.window(now);
            match self
                .payouts
                .generate_period_payouts(start, end, &schedule.method)
                .await
            {
                Ok(batch) => report.payouts = Some(batch),
                Err(e) => error!("Payout batch {} .. {} failed: {}", start, end, e),
            }
        }

        report
    }
}

/// 按固定间隔循环执行，直到进程退出
///
/// 首个 tick 立即触发。
pub async fn run_scheduled_jobs(jobs: ScheduledJobs, interval_secs: u64) {
    let mut ticker = interval(StdDuration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Scheduled jobs started (interval: {}s, payout batch: {})",
        interval_secs,
        jobs.payout_schedule.is_some()
    );

    loop {
        ticker.tick().await;
        jobs.run_once().await;
    }
}
