//! Payout ledger persistence
//!
//! 生成结算单在一个事务中完成：先插入带 period_lock 的结算单（唯一索引保证
//! 同一推荐人同一周期只有一条有效结算单），再认领转化，最后回填金额。
//! 认领使用 `payout_id IS NULL` 作为条件，影响行数必须与查询结果一致。

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, sea_query::Expr,
};
use tracing::{debug, info, warn};

use super::converters::model_to_payout;
use super::{SeaOrmStorage, is_unique_violation};
use crate::errors::{AffilinkError, Result};
use crate::storage::models::{Payout, PayoutStatus};

use migration::entities::{conversion, payout};

/// 待创建的结算单
#[derive(Debug, Clone)]
pub struct NewPayout {
    pub id: String,
    pub referrer_id: String,
    pub currency: String,
    pub method: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewPayout {
    pub fn period_lock(&self) -> String {
        format!(
            "{}|{}|{}",
            self.referrer_id,
            self.period_start.timestamp(),
            self.period_end.timestamp()
        )
    }
}

/// 一次状态变更（以当前状态做 compare-and-set）
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub payout_id: String,
    pub from: PayoutStatus,
    pub to: PayoutStatus,
    pub external_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub at: DateTime<Utc>,
}

enum GenerateOutcome {
    Created(payout::Model),
    PeriodTaken,
    NothingToPay,
    ClaimConflict,
    Overflow,
}

impl SeaOrmStorage {
    pub async fn create_payout_with_claims(&self, new: &NewPayout) -> Result<Payout> {
        let db = &self.db;
        let lock = new.period_lock();

        let outcome = self
            .retry
            .run(&format!("generate_payout({})", lock), || async {
                let txn = db.begin().await?;

                let model = payout::ActiveModel {
                    id: Set(new.id.clone()),
                    referrer_id: Set(new.referrer_id.clone()),
                    amount: Set(0),
                    currency: Set(new.currency.clone()),
                    conversion_count: Set(0),
                    method: Set(new.method.clone()),
                    period_start: Set(new.period_start),
                    period_end: Set(new.period_end),
                    period_lock: Set(Some(lock.clone())),
                    status: Set(PayoutStatus::Pending.as_ref().to_string()),
                    external_transaction_id: Set(None),
                    failure_reason: Set(None),
                    created_at: Set(new.created_at),
                    updated_at: Set(new.created_at),
                    processed_at: Set(None),
                };

                if let Err(e) = payout::Entity::insert(model)
                    .exec_without_returning(&txn)
                    .await
                {
                    txn.rollback().await?;
                    if is_unique_violation(&e) {
                        return Ok::<_, DbErr>(GenerateOutcome::PeriodTaken);
                    }
                    return Err(e);
                }

                let eligible: Vec<(String, i64)> = conversion::Entity::find()
                    .select_only()
                    .column(conversion::Column::Id)
                    .column(conversion::Column::CommissionAmount)
                    .filter(conversion::Column::ReferrerId.eq(new.referrer_id.as_str()))
                    .filter(conversion::Column::IsVerified.eq(true))
                    .filter(conversion::Column::PayoutId.is_null())
                    .filter(conversion::Column::CreatedAt.gte(new.period_start))
                    .filter(conversion::Column::CreatedAt.lt(new.period_end))
                    .into_tuple()
                    .all(&txn)
                    .await?;

                let Some(total) = eligible
                    .iter()
                    .try_fold(0i64, |acc, (_, amount)| acc.checked_add(*amount))
                else {
                    txn.rollback().await?;
                    return Ok(GenerateOutcome::Overflow);
                };

                if total <= 0 {
                    txn.rollback().await?;
                    return Ok(GenerateOutcome::NothingToPay);
                }

                let ids: Vec<String> = eligible.into_iter().map(|(id, _)| id).collect();
                let claimed = conversion::Entity::update_many()
                    .col_expr(conversion::Column::PayoutId, Expr::value(Some(new.id.clone())))
                    .filter(conversion::Column::Id.is_in(ids.iter().cloned()))
                    .filter(conversion::Column::PayoutId.is_null())
                    .exec(&txn)
                    .await?
                    .rows_affected;

                if claimed != ids.len() as u64 {
                    txn.rollback().await?;
                    return Ok(GenerateOutcome::ClaimConflict);
                }

                payout::Entity::update_many()
                    .col_expr(payout::Column::Amount, Expr::value(total))
                    .col_expr(payout::Column::ConversionCount, Expr::value(ids.len() as i32))
                    .filter(payout::Column::Id.eq(new.id.as_str()))
                    .exec(&txn)
                    .await?;

                let created = payout::Entity::find_by_id(new.id.clone())
                    .one(&txn)
                    .await?
                    .ok_or_else(|| DbErr::RecordNotFound(new.id.clone()))?;

                txn.commit().await?;
                Ok(GenerateOutcome::Created(created))
            })
            .await?;

        match outcome {
            GenerateOutcome::Created(model) => {
                let payout = model_to_payout(model)?;
                info!(
                    "Payout {} generated for {}: {} {} over {} conversions",
                    payout.id, payout.referrer_id, payout.amount, payout.currency,
                    payout.conversion_count
                );
                Ok(payout)
            }
            GenerateOutcome::PeriodTaken => Err(AffilinkError::duplicate(format!(
                "A live payout already exists for {} in [{}, {})",
                new.referrer_id, new.period_start, new.period_end
            ))),
            GenerateOutcome::NothingToPay => Err(AffilinkError::no_eligible_commissions(format!(
                "No verified unclaimed commissions for {} in [{}, {})",
                new.referrer_id, new.period_start, new.period_end
            ))),
            GenerateOutcome::ClaimConflict => {
                warn!(
                    "Conversions for {} were claimed concurrently, payout {} rolled back",
                    new.referrer_id, new.id
                );
                Err(AffilinkError::duplicate(format!(
                    "Commissions for {} were claimed by another payout",
                    new.referrer_id
                )))
            }
            GenerateOutcome::Overflow => Err(AffilinkError::commission(format!(
                "Payout total for {} overflows",
                new.referrer_id
            ))),
        }
    }

    /// 以当前状态为条件更新；失败 / 取消时在同一事务中释放认领和周期锁
    ///
    /// 返回 false 表示状态已被并发修改，未做任何变更。
    pub async fn apply_payout_status(&self, change: &StatusChange) -> Result<bool> {
        let db = &self.db;

        let applied = self
            .retry
            .run(&format!("update_payout_status({})", change.payout_id), || async {
                let txn = db.begin().await?;

                let mut update = payout::Entity::update_many()
                    .col_expr(payout::Column::Status, Expr::value(change.to.as_ref()))
                    .col_expr(payout::Column::UpdatedAt, Expr::value(change.at));

                if let Some(tx_id) = &change.external_transaction_id {
                    update = update.col_expr(
                        payout::Column::ExternalTransactionId,
                        Expr::value(Some(tx_id.clone())),
                    );
                }
                if let Some(reason) = &change.failure_reason {
                    update = update
                        .col_expr(payout::Column::FailureReason, Expr::value(Some(reason.clone())));
                }
                if change.to.is_terminal() {
                    update = update.col_expr(payout::Column::ProcessedAt, Expr::value(Some(change.at)));
                }
                if change.to.releases_claims() {
                    update = update
                        .col_expr(payout::Column::PeriodLock, Expr::value(Option::<String>::None));
                }

                let rows = update
                    .filter(payout::Column::Id.eq(change.payout_id.as_str()))
                    .filter(payout::Column::Status.eq(change.from.as_ref()))
                    .exec(&txn)
                    .await?
                    .rows_affected;

                if rows == 0 {
                    txn.rollback().await?;
                    return Ok::<bool, DbErr>(false);
                }

                if change.to.releases_claims() {
                    let released = conversion::Entity::update_many()
                        .col_expr(conversion::Column::PayoutId, Expr::value(Option::<String>::None))
                        .filter(conversion::Column::PayoutId.eq(change.payout_id.as_str()))
                        .exec(&txn)
                        .await?
                        .rows_affected;
                    debug!(
                        "Payout {} released {} conversions",
                        change.payout_id, released
                    );
                }

                txn.commit().await?;
                Ok(true)
            })
            .await?;

        Ok(applied)
    }

    pub async fn find_payout(&self, id: &str) -> Result<Option<Payout>> {
        let db = &self.db;
        let model = self
            .retry
            .run("find_payout", || async {
                payout::Entity::find_by_id(id.to_string()).one(db).await
            })
            .await?;
        model.map(model_to_payout).transpose()
    }

    pub async fn list_payouts(&self, referrer_id: &str) -> Result<Vec<Payout>> {
        let db = &self.db;
        let models = self
            .retry
            .run("list_payouts", || async {
                payout::Entity::find()
                    .filter(payout::Column::ReferrerId.eq(referrer_id))
                    .order_by_desc(payout::Column::CreatedAt)
                    .all(db)
                    .await
            })
            .await?;
        models.into_iter().map(model_to_payout).collect()
    }

    /// 周期内有可结算佣金的推荐人
    pub async fn referrers_with_unclaimed(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let db = &self.db;
        Ok(self
            .retry
            .run("referrers_with_unclaimed", || async {
                conversion::Entity::find()
                    .select_only()
                    .column(conversion::Column::ReferrerId)
                    .distinct()
                    .filter(conversion::Column::IsVerified.eq(true))
                    .filter(conversion::Column::PayoutId.is_null())
                    .filter(conversion::Column::CreatedAt.gte(start))
                    .filter(conversion::Column::CreatedAt.lt(end))
                    .order_by_asc(conversion::Column::ReferrerId)
                    .into_tuple::<String>()
                    .all(db)
                    .await
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_lock_is_stable_per_period() {
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let a = NewPayout {
            id: "p1".into(),
            referrer_id: "alice".into(),
            currency: "USD".into(),
            method: "bank_transfer".into(),
            period_start: start,
            period_end: end,
            created_at: Utc::now(),
        };
        let b = NewPayout {
            id: "p2".into(),
            ..a.clone()
        };
        assert_eq!(a.period_lock(), b.period_lock());
        assert!(a.period_lock().starts_with("alice|"));

        let other_period = NewPayout {
            period_end: end + chrono::Duration::days(1),
            ..a.clone()
        };
        assert_ne!(a.period_lock(), other_period.period_lock());
    }
}
