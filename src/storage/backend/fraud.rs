//! Fraud audit trail and fraud policy rules

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, sea_query::Expr, sea_query::OnConflict,
};
use tracing::{debug, info};

use super::SeaOrmStorage;
use super::converters::{fraud_record_to_active_model, model_to_fraud_record, model_to_fraud_rule};
use crate::errors::Result;
use crate::storage::models::{FraudRecord, FraudRecordStatus, FraudRule};

use migration::entities::{fraud_record, fraud_rule};

impl SeaOrmStorage {
    /// 写入风控记录（点击路径；转化路径在归因事务中写入）
    pub async fn insert_fraud_record(&self, record: &FraudRecord) -> Result<()> {
        let model = fraud_record_to_active_model(record)?;
        let db = &self.db;
        self.retry
            .run(&format!("insert_fraud_record({})", record.id), || async {
                fraud_record::Entity::insert(model.clone())
                    .exec_without_returning(db)
                    .await
            })
            .await?;

        debug!(
            "Fraud record {} ({}, score {:.2}) stored for referral {}",
            record.id, record.fraud_type, record.risk_score, record.referral_id
        );
        Ok(())
    }

    pub async fn find_fraud_record(&self, id: &str) -> Result<Option<FraudRecord>> {
        let db = &self.db;
        let model = self
            .retry
            .run("find_fraud_record", || async {
                fraud_record::Entity::find_by_id(id.to_string()).one(db).await
            })
            .await?;
        model.map(model_to_fraud_record).transpose()
    }

    /// 一组推荐链接下最新的风控记录
    pub async fn list_fraud_records(
        &self,
        referral_ids: &[String],
        limit: u64,
    ) -> Result<Vec<FraudRecord>> {
        if referral_ids.is_empty() {
            return Ok(Vec::new());
        }

        let db = &self.db;
        let models = self
            .retry
            .run("list_fraud_records", || async {
                fraud_record::Entity::find()
                    .filter(fraud_record::Column::ReferralId.is_in(referral_ids.iter().cloned()))
                    .order_by_desc(fraud_record::Column::CreatedAt)
                    .limit(limit)
                    .all(db)
                    .await
            })
            .await?;

        models.into_iter().map(model_to_fraud_record).collect()
    }

    pub async fn count_fraud_records_between(
        &self,
        referral_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        if referral_ids.is_empty() {
            return Ok(0);
        }

        let db = &self.db;
        Ok(self
            .retry
            .run("count_fraud_records_between", || async {
                fraud_record::Entity::find()
                    .filter(fraud_record::Column::ReferralId.is_in(referral_ids.iter().cloned()))
                    .filter(fraud_record::Column::Flagged.eq(true))
                    .filter(fraud_record::Column::CreatedAt.gte(start))
                    .filter(fraud_record::Column::CreatedAt.lt(end))
                    .count(db)
                    .await
            })
            .await?)
    }

    /// 复核状态的 compare-and-set：只有当前状态在 `from` 中时才更新
    pub async fn transition_fraud_record(
        &self,
        id: &str,
        from: &[FraudRecordStatus],
        to: FraudRecordStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let db = &self.db;
        let result = self
            .retry
            .run(&format!("transition_fraud_record({})", id), || async {
                fraud_record::Entity::update_many()
                    .col_expr(fraud_record::Column::Status, Expr::value(to.as_ref()))
                    .col_expr(fraud_record::Column::ReviewedAt, Expr::value(Some(now)))
                    .filter(fraud_record::Column::Id.eq(id))
                    .filter(
                        fraud_record::Column::Status
                            .is_in(from.iter().map(|s| s.as_ref().to_string())),
                    )
                    .exec(db)
                    .await
            })
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn load_fraud_rules(&self) -> Result<Vec<FraudRule>> {
        let db = &self.db;
        let models = self
            .retry
            .run("load_fraud_rules", || async {
                fraud_rule::Entity::find()
                    .order_by_asc(fraud_rule::Column::RuleType)
                    .all(db)
                    .await
            })
            .await?;
        Ok(models.into_iter().map(model_to_fraud_rule).collect())
    }

    /// 写入默认规则，已存在的规则保持不变；返回新插入的条数
    pub async fn seed_fraud_rules(&self, rules: &[FraudRule]) -> Result<u64> {
        let now = Utc::now();
        let mut inserted = 0u64;

        for rule in rules {
            let model = fraud_rule::ActiveModel {
                rule_type: Set(rule.rule_type.clone()),
                threshold: Set(rule.threshold),
                weight: Set(rule.weight),
                active: Set(rule.active),
                updated_at: Set(now),
            };

            let result = fraud_rule::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(fraud_rule::Column::RuleType)
                        .do_nothing()
                        .to_owned(),
                )
                .exec(&self.db)
                .await;

            match result {
                Ok(_) => inserted += 1,
                Err(sea_orm::DbErr::RecordNotInserted) => {}
                Err(e) => {
                    // 某些后端在 do_nothing 时返回 "no rows" 类错误
                    let err_str = e.to_string().to_lowercase();
                    if !(err_str.contains("no rows") || err_str.contains("record not inserted")) {
                        return Err(e.into());
                    }
                }
            }
        }

        if inserted > 0 {
            info!("Seeded {} default fraud rules", inserted);
        }
        Ok(inserted)
    }

    /// 运行时调整规则
    pub async fn upsert_fraud_rule(&self, rule: &FraudRule) -> Result<()> {
        let db = &self.db;
        let now = Utc::now();
        self.retry
            .run(&format!("upsert_fraud_rule({})", rule.rule_type), || async {
                let model = fraud_rule::ActiveModel {
                    rule_type: Set(rule.rule_type.clone()),
                    threshold: Set(rule.threshold),
                    weight: Set(rule.weight),
                    active: Set(rule.active),
                    updated_at: Set(now),
                };
                fraud_rule::Entity::insert(model)
                    .on_conflict(
                        OnConflict::column(fraud_rule::Column::RuleType)
                            .update_columns([
                                fraud_rule::Column::Threshold,
                                fraud_rule::Column::Weight,
                                fraud_rule::Column::Active,
                                fraud_rule::Column::UpdatedAt,
                            ])
                            .to_owned(),
                    )
                    .exec_without_returning(db)
                    .await
            })
            .await?;

        info!(
            "Fraud rule {} updated (threshold {}, weight {}, active {})",
            rule.rule_type, rule.threshold, rule.weight, rule.active
        );
        Ok(())
    }
}
