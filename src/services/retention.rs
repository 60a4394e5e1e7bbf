//! 数据保留：清理过期 Cookie 和过旧的点击明细
//!
//! 转化、风控记录和结算单永不删除。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::TrackingConfig;
use crate::errors::{AffilinkError, Result};
use crate::storage::SeaOrmStorage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub cookies_deleted: u64,
    pub clicks_deleted: u64,
}

pub struct RetentionTask {
    storage: Arc<SeaOrmStorage>,
    click_retention: Duration,
    cookie_grace: Duration,
}

impl RetentionTask {
    pub fn new(storage: Arc<SeaOrmStorage>, config: &TrackingConfig) -> Result<Self> {
        if config.click_retention_days < 1 {
            return Err(AffilinkError::validation(format!(
                "click_retention_days must be at least 1, got {}",
                config.click_retention_days
            )));
        }
        if config.cookie_grace_days < 0 {
            return Err(AffilinkError::validation(format!(
                "cookie_grace_days must not be negative, got {}",
                config.cookie_grace_days
            )));
        }

        Ok(Self {
            storage,
            click_retention: Duration::days(config.click_retention_days),
            cookie_grace: Duration::days(config.cookie_grace_days),
        })
    }

    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        self.run_cleanup_at(Utc::now()).await
    }

    pub async fn run_cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let cookies_deleted = self
            .storage
            .purge_cookies_expired_before(now - self.cookie_grace)
            .await?;
        let clicks_deleted = self
            .storage
            .purge_clicks_before(now - self.click_retention)
            .await?;

        let report = CleanupReport {
            cookies_deleted,
            clicks_deleted,
        };
        info!(
            "Retention cleanup: {} cookies, {} clicks deleted",
            report.cookies_deleted, report.clicks_deleted
        );
        Ok(report)
    }
}
