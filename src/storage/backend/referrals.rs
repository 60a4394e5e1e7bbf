//! Referral link persistence
//!
//! click_count 只通过单条 `UPDATE ... SET click_count = click_count + 1` 修改，
//! WHERE 子句同时校验 active 与过期时间。

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, ExprTrait, QueryFilter,
    QueryOrder, sea_query::Expr,
};
use tracing::info;

use super::converters::{link_to_active_model, model_to_link};
use super::{SeaOrmStorage, is_unique_violation};
use crate::errors::{AffilinkError, Result};
use crate::storage::models::ReferralLink;

use migration::entities::referral_link;

/// 原子自增点击计数，返回是否命中（链接仍有效）
pub(super) async fn increment_click_count<C: ConnectionTrait>(
    conn: &C,
    referral_id: &str,
    now: DateTime<Utc>,
) -> std::result::Result<bool, DbErr> {
    let result = referral_link::Entity::update_many()
        .col_expr(
            referral_link::Column::ClickCount,
            Expr::col(referral_link::Column::ClickCount).add(Expr::val(1i64)),
        )
        .filter(referral_link::Column::Id.eq(referral_id))
        .filter(referral_link::Column::Active.eq(true))
        .filter(
            Condition::any()
                .add(referral_link::Column::ExpiresAt.is_null())
                .add(referral_link::Column::ExpiresAt.gt(now)),
        )
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

impl SeaOrmStorage {
    /// 插入新链接；code / short_code 冲突返回 Duplicate 供调用方重新生成
    pub async fn insert_referral_link(&self, link: &ReferralLink) -> Result<()> {
        let db = &self.db;
        let result = self
            .retry
            .run(&format!("insert_referral_link({})", link.code), || async {
                referral_link::Entity::insert(link_to_active_model(link))
                    .exec_without_returning(db)
                    .await
            })
            .await;

        match result {
            Ok(_) => {
                info!(
                    "Referral link created: {} ({}) for referrer {}",
                    link.code, link.short_code, link.referrer_id
                );
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(AffilinkError::duplicate(format!(
                "Referral code already taken: {} / {}",
                link.code, link.short_code
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_referral_by_id(&self, id: &str) -> Result<Option<ReferralLink>> {
        self.find_referral_by(referral_link::Column::Id, id).await
    }

    pub async fn find_referral_by_code(&self, code: &str) -> Result<Option<ReferralLink>> {
        self.find_referral_by(referral_link::Column::Code, code)
            .await
    }

    pub async fn find_referral_by_short_code(
        &self,
        short_code: &str,
    ) -> Result<Option<ReferralLink>> {
        self.find_referral_by(referral_link::Column::ShortCode, short_code)
            .await
    }

    async fn find_referral_by(
        &self,
        column: referral_link::Column,
        value: &str,
    ) -> Result<Option<ReferralLink>> {
        let db = &self.db;
        let model = self
            .retry
            .run("find_referral", || async {
                referral_link::Entity::find()
                    .filter(column.eq(value))
                    .one(db)
                    .await
            })
            .await?;

        model.map(model_to_link).transpose()
    }

    pub async fn list_referral_links(&self, referrer_id: &str) -> Result<Vec<ReferralLink>> {
        let db = &self.db;
        let models = self
            .retry
            .run("list_referral_links", || async {
                referral_link::Entity::find()
                    .filter(referral_link::Column::ReferrerId.eq(referrer_id))
                    .order_by_asc(referral_link::Column::CreatedAt)
                    .all(db)
                    .await
            })
            .await?;

        models.into_iter().map(model_to_link).collect()
    }

    /// 短链接跳转时的计数（事务外单语句）
    pub async fn increment_referral_clicks(
        &self,
        referral_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let db = &self.db;
        Ok(self
            .retry
            .run("increment_referral_clicks", || {
                increment_click_count(db, referral_id, now)
            })
            .await?)
    }

    /// 停用链接，返回是否真的发生了变更（已停用的链接返回 false）
    pub async fn revoke_referral_link(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let db = &self.db;
        let result = self
            .retry
            .run(&format!("revoke_referral_link({})", id), || async {
                referral_link::Entity::update_many()
                    .col_expr(referral_link::Column::Active, Expr::value(false))
                    .col_expr(referral_link::Column::RevokedAt, Expr::value(Some(now)))
                    .filter(referral_link::Column::Id.eq(id))
                    .filter(referral_link::Column::Active.eq(true))
                    .exec(db)
                    .await
            })
            .await?;

        Ok(result.rows_affected == 1)
    }
}
