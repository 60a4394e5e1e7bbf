//! Referral analytics 相关的数据库查询
//!
//! 金额在 Rust 侧求和，避免不同后端 SUM 返回类型不一致。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter, QuerySelect,
};
use serde::Serialize;

use crate::errors::Result;
use crate::storage::models::{PayoutStatus, parse_stored};

use migration::entities::{click_event, conversion, payout};

// ============ 查询结果类型 ============

/// 每个链接的点击数
#[derive(Debug, FromQueryResult)]
struct ClickCountRow {
    referral_id: String,
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct ConversionRow {
    referral_id: String,
    commission_amount: i64,
    is_verified: bool,
    payout_id: Option<String>,
}

/// 单个链接在统计区间内的表现
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkActivity {
    pub referral_id: String,
    pub clicks: u64,
    pub verified_conversions: u64,
    pub unverified_conversions: u64,
    pub earned_commission: i64,
}

/// 推荐人在统计区间内的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferrerActivity {
    pub clicks: u64,
    pub unique_visitors: u64,
    pub verified_conversions: u64,
    pub unverified_conversions: u64,
    /// 已验证转化的佣金总和
    pub earned_commission: i64,
    /// 其中已由 paid 结算单支付的部分
    pub paid_commission: i64,
    pub links: Vec<LinkActivity>,
}

impl ReferrerActivity {
    pub fn pending_commission(&self) -> i64 {
        self.earned_commission - self.paid_commission
    }
}

// ============ SeaOrmStorage Analytics 方法 ============

impl super::SeaOrmStorage {
    /// 汇总 [start, end) 内推荐人名下链接的点击与转化
    pub async fn referrer_activity(
        &self,
        referrer_id: &str,
        referral_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReferrerActivity> {
        let mut per_link: HashMap<String, LinkActivity> = referral_ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    LinkActivity {
                        referral_id: id.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        let mut activity = ReferrerActivity::default();
        let db = &self.db;

        if !referral_ids.is_empty() {
            let click_rows = self
                .retry
                .run("referrer_activity.clicks", || async {
                    click_event::Entity::find()
                        .select_only()
                        .column(click_event::Column::ReferralId)
                        .column_as(click_event::Column::Id.count(), "count")
                        .filter(click_event::Column::ReferralId.is_in(referral_ids.iter().cloned()))
                        .filter(click_event::Column::ClickedAt.gte(start))
                        .filter(click_event::Column::ClickedAt.lt(end))
                        .group_by(click_event::Column::ReferralId)
                        .into_model::<ClickCountRow>()
                        .all(db)
                        .await
                })
                .await?;

            for row in click_rows {
                let clicks = row.count.max(0) as u64;
                activity.clicks += clicks;
                if let Some(link) = per_link.get_mut(&row.referral_id) {
                    link.clicks = clicks;
                }
            }

            activity.unique_visitors = self
                .retry
                .run("referrer_activity.unique_visitors", || async {
                    click_event::Entity::find()
                        .select_only()
                        .column(click_event::Column::Fingerprint)
                        .distinct()
                        .filter(click_event::Column::ReferralId.is_in(referral_ids.iter().cloned()))
                        .filter(click_event::Column::ClickedAt.gte(start))
                        .filter(click_event::Column::ClickedAt.lt(end))
                        .count(db)
                        .await
                })
                .await?;
        }

        let conversions = self
            .retry
            .run("referrer_activity.conversions", || async {
                conversion::Entity::find()
                    .select_only()
                    .column(conversion::Column::ReferralId)
                    .column(conversion::Column::CommissionAmount)
                    .column(conversion::Column::IsVerified)
                    .column(conversion::Column::PayoutId)
                    .filter(conversion::Column::ReferrerId.eq(referrer_id))
                    .filter(conversion::Column::CreatedAt.gte(start))
                    .filter(conversion::Column::CreatedAt.lt(end))
                    .into_model::<ConversionRow>()
                    .all(db)
                    .await
            })
            .await?;

        let payout_ids: Vec<String> = conversions
            .iter()
            .filter_map(|c| c.payout_id.clone())
            .collect();
        let statuses = self.payout_statuses(&payout_ids).await?;

        for row in conversions {
            let link = per_link
                .entry(row.referral_id.clone())
                .or_insert_with(|| LinkActivity {
                    referral_id: row.referral_id.clone(),
                    ..Default::default()
                });

            if !row.is_verified {
                activity.unverified_conversions += 1;
                link.unverified_conversions += 1;
                continue;
            }

            activity.verified_conversions += 1;
            activity.earned_commission += row.commission_amount;
            link.verified_conversions += 1;
            link.earned_commission += row.commission_amount;

            let paid = row
                .payout_id
                .as_ref()
                .and_then(|id| statuses.get(id))
                .is_some_and(|s| *s == PayoutStatus::Paid);
            if paid {
                activity.paid_commission += row.commission_amount;
            }
        }

        let mut links: Vec<LinkActivity> = per_link.into_values().collect();
        links.sort_by(|a, b| {
            b.clicks
                .cmp(&a.clicks)
                .then_with(|| a.referral_id.cmp(&b.referral_id))
        });
        activity.links = links;

        Ok(activity)
    }

    async fn payout_statuses(&self, ids: &[String]) -> Result<HashMap<String, PayoutStatus>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let db = &self.db;
        let rows: Vec<(String, String)> = self
            .retry
            .run("payout_statuses", || async {
                payout::Entity::find()
                    .select_only()
                    .column(payout::Column::Id)
                    .column(payout::Column::Status)
                    .filter(payout::Column::Id.is_in(ids.iter().cloned()))
                    .into_tuple()
                    .all(db)
                    .await
            })
            .await?;

        rows.into_iter()
            .map(|(id, status)| Ok((id, parse_stored("status", &status)?)))
            .collect()
    }
}
