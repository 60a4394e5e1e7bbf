//! Click events: recording, rolling-window counts and retention
//!
//! 窗口统计都是只读聚合，不加锁，读到的是查询时刻可见的数据。

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use tracing::debug;

use super::SeaOrmStorage;
use super::converters::{click_to_active_model, cookie_to_active_model, model_to_click};
use super::referrals::increment_click_count;
use crate::errors::Result;
use crate::storage::models::{ClickEvent, TrackingCookie};

use migration::entities::{click_event, tracking_cookie};

/// 单次删除批量
const PURGE_BATCH_SIZE: u64 = 5_000;
/// 防止无限循环
const PURGE_MAX_ITERATIONS: u32 = 1_000;

impl SeaOrmStorage {
    /// 在一个事务里：点击计数 +1、写入点击事件、签发追踪 Cookie
    ///
    /// 返回 false 表示链接在校验之后被停用或过期，事务已回滚。
    pub async fn record_click_with_cookie(
        &self,
        click: &ClickEvent,
        cookie: &TrackingCookie,
    ) -> Result<bool> {
        let db = &self.db;
        let recorded = self
            .retry
            .run(&format!("record_click({})", click.referral_code), || async {
                let txn = db.begin().await?;

                if !increment_click_count(&txn, &click.referral_id, click.clicked_at).await? {
                    txn.rollback().await?;
                    return Ok::<bool, DbErr>(false);
                }

                click_event::Entity::insert(click_to_active_model(click))
                    .exec_without_returning(&txn)
                    .await?;
                tracking_cookie::Entity::insert(cookie_to_active_model(cookie))
                    .exec_without_returning(&txn)
                    .await?;

                txn.commit().await?;
                Ok(true)
            })
            .await?;

        if recorded {
            debug!(
                "Click {} recorded for referral {}",
                click.id, click.referral_code
            );
        }
        Ok(recorded)
    }

    pub async fn find_click(&self, id: &str) -> Result<Option<ClickEvent>> {
        let db = &self.db;
        let model = self
            .retry
            .run("find_click", || async {
                click_event::Entity::find_by_id(id.to_string()).one(db).await
            })
            .await?;
        Ok(model.map(model_to_click))
    }

    /// 某 IP 在全站范围内 since 之后的点击数
    pub async fn count_clicks_by_ip_since(&self, ip: &str, since: DateTime<Utc>) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .retry
            .run("count_clicks_by_ip_since", || async {
                click_event::Entity::find()
                    .filter(click_event::Column::VisitorIp.eq(ip))
                    .filter(click_event::Column::ClickedAt.gte(since))
                    .count(db)
                    .await
            })
            .await?)
    }

    pub async fn count_referral_clicks_since(
        &self,
        referral_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .retry
            .run("count_referral_clicks_since", || async {
                click_event::Entity::find()
                    .filter(click_event::Column::ReferralId.eq(referral_id))
                    .filter(click_event::Column::ClickedAt.gte(since))
                    .count(db)
                    .await
            })
            .await?)
    }

    pub async fn count_referral_clicks_by_ip_since(
        &self,
        referral_id: &str,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .retry
            .run("count_referral_clicks_by_ip_since", || async {
                click_event::Entity::find()
                    .filter(click_event::Column::ReferralId.eq(referral_id))
                    .filter(click_event::Column::VisitorIp.eq(ip))
                    .filter(click_event::Column::ClickedAt.gte(since))
                    .count(db)
                    .await
            })
            .await?)
    }

    pub async fn count_referral_clicks_by_ua_since(
        &self,
        referral_id: &str,
        user_agent_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .retry
            .run("count_referral_clicks_by_ua_since", || async {
                click_event::Entity::find()
                    .filter(click_event::Column::ReferralId.eq(referral_id))
                    .filter(click_event::Column::UserAgentHash.eq(user_agent_hash))
                    .filter(click_event::Column::ClickedAt.gte(since))
                    .count(db)
                    .await
            })
            .await?)
    }

    /// 分批删除 cutoff 之前的点击事件，避免长事务
    pub async fn purge_clicks_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let db = &self.db;
        let mut total_deleted = 0u64;

        for iteration in 1..=PURGE_MAX_ITERATIONS {
            let ids: Vec<String> = click_event::Entity::find()
                .select_only()
                .column(click_event::Column::Id)
                .filter(click_event::Column::ClickedAt.lt(cutoff))
                .order_by_asc(click_event::Column::ClickedAt)
                .limit(PURGE_BATCH_SIZE)
                .into_tuple()
                .all(db)
                .await?;

            if ids.is_empty() {
                break;
            }

            let deleted = click_event::Entity::delete_many()
                .filter(click_event::Column::Id.is_in(ids))
                .exec(db)
                .await?
                .rows_affected;
            total_deleted += deleted;

            debug!(
                "Click purge batch {}: deleted {} rows (total {})",
                iteration, deleted, total_deleted
            );

            if deleted < PURGE_BATCH_SIZE {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(50)).await;
        }

        Ok(total_deleted)
    }
}
