//! Conversion persistence
//!
//! purchase_id 上有唯一索引，重复写入在这里被识别为“已归因”而不是错误。

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
    sea_query::Expr,
};
use tracing::{debug, info};

use super::converters::{
    conversion_to_active_model, fraud_record_to_active_model, model_to_conversion,
};
use super::cookies::consume_cookie;
use super::{SeaOrmStorage, is_unique_violation};
use crate::errors::Result;
use crate::storage::models::{Conversion, FraudRecord};

use migration::entities::{conversion, fraud_record};

/// 归因事务的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionWrite {
    Committed,
    /// Cookie 已被并发请求消费（或刚好过期）
    CookieUnavailable,
    /// 同一 purchase_id 已存在转化
    DuplicatePurchase,
}

impl SeaOrmStorage {
    /// 一个事务内：Cookie CAS → 写入转化 → 写入风控记录
    ///
    /// 先写后读，SQLite 下事务一开始就拿到写锁。
    pub async fn commit_attribution(
        &self,
        cookie_value: &str,
        conversion: &Conversion,
        fraud_record: Option<&FraudRecord>,
    ) -> Result<AttributionWrite> {
        let fraud_model = fraud_record.map(fraud_record_to_active_model).transpose()?;
        let db = &self.db;

        let outcome = self
            .retry
            .run(&format!("commit_attribution({})", conversion.purchase_id), || {
                let fraud_model = fraud_model.clone();
                async move {
                    let txn = db.begin().await?;

                    if !consume_cookie(&txn, cookie_value, conversion.created_at).await? {
                        txn.rollback().await?;
                        return Ok::<_, DbErr>(AttributionWrite::CookieUnavailable);
                    }

                    if let Err(e) = conversion::Entity::insert(conversion_to_active_model(conversion))
                        .exec_without_returning(&txn)
                        .await
                    {
                        txn.rollback().await?;
                        if is_unique_violation(&e) {
                            return Ok(AttributionWrite::DuplicatePurchase);
                        }
                        return Err(e);
                    }

                    if let Some(model) = fraud_model {
                        fraud_record::Entity::insert(model)
                            .exec_without_returning(&txn)
                            .await?;
                    }

                    txn.commit().await?;
                    Ok(AttributionWrite::Committed)
                }
            })
            .await?;

        match outcome {
            AttributionWrite::Committed => info!(
                "Conversion {} attributed to referral {} (commission {}, verified {})",
                conversion.purchase_id,
                conversion.referral_id,
                conversion.commission_amount,
                conversion.is_verified
            ),
            other => debug!(
                "Attribution for purchase {} not committed: {:?}",
                conversion.purchase_id, other
            ),
        }
        Ok(outcome)
    }

    pub async fn find_conversion(&self, id: &str) -> Result<Option<Conversion>> {
        let db = &self.db;
        let model = self
            .retry
            .run("find_conversion", || async {
                conversion::Entity::find_by_id(id.to_string()).one(db).await
            })
            .await?;
        Ok(model.map(model_to_conversion))
    }

    pub async fn find_conversion_by_purchase(
        &self,
        purchase_id: &str,
    ) -> Result<Option<Conversion>> {
        let db = &self.db;
        let model = self
            .retry
            .run("find_conversion_by_purchase", || async {
                conversion::Entity::find()
                    .filter(conversion::Column::PurchaseId.eq(purchase_id))
                    .one(db)
                    .await
            })
            .await?;
        Ok(model.map(model_to_conversion))
    }

    /// 推荐人累计的已验证转化数（决定佣金等级）
    pub async fn count_verified_conversions(&self, referrer_id: &str) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .retry
            .run("count_verified_conversions", || async {
                conversion::Entity::find()
                    .filter(conversion::Column::ReferrerId.eq(referrer_id))
                    .filter(conversion::Column::IsVerified.eq(true))
                    .count(db)
                    .await
            })
            .await?)
    }

    /// 某 IP 在全站范围内 since 之后的转化数
    pub async fn count_conversions_by_ip_since(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let db = &self.db;
        Ok(self
            .retry
            .run("count_conversions_by_ip_since", || async {
                conversion::Entity::find()
                    .filter(conversion::Column::VisitorIp.eq(ip))
                    .filter(conversion::Column::CreatedAt.gte(since))
                    .count(db)
                    .await
            })
            .await?)
    }

    /// 同一推荐链接下相同 IP 或相同 UA 的既有转化，返回 (ip 命中数, ua 命中数)
    pub async fn count_referral_duplicates_since(
        &self,
        referral_id: &str,
        ip: &str,
        user_agent_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let db = &self.db;
        let same_ip = self
            .retry
            .run("count_referral_duplicates_ip", || async {
                conversion::Entity::find()
                    .filter(conversion::Column::ReferralId.eq(referral_id))
                    .filter(conversion::Column::VisitorIp.eq(ip))
                    .filter(conversion::Column::CreatedAt.gte(since))
                    .count(db)
                    .await
            })
            .await?;
        let same_ua = self
            .retry
            .run("count_referral_duplicates_ua", || async {
                conversion::Entity::find()
                    .filter(conversion::Column::ReferralId.eq(referral_id))
                    .filter(conversion::Column::UserAgentHash.eq(user_agent_hash))
                    .filter(conversion::Column::CreatedAt.gte(since))
                    .count(db)
                    .await
            })
            .await?;
        Ok((same_ip, same_ua))
    }

    /// 人工复核后修改验证状态；已被结算单认领的转化不可修改
    pub async fn set_conversion_verified(&self, id: &str, verified: bool) -> Result<bool> {
        let db = &self.db;
        let result = self
            .retry
            .run(&format!("set_conversion_verified({})", id), || async {
                conversion::Entity::update_many()
                    .col_expr(conversion::Column::IsVerified, Expr::value(verified))
                    .filter(conversion::Column::Id.eq(id))
                    .filter(conversion::Column::PayoutId.is_null())
                    .filter(conversion::Column::IsVerified.ne(verified))
                    .exec(db)
                    .await
            })
            .await?;
        Ok(result.rows_affected == 1)
    }
}
