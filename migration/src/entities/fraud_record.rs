//! Fraud audit trail entity. Rows are never deleted.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "fraud_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub referral_id: String,
    pub conversion_id: Option<String>,
    pub click_id: Option<String>,
    pub fraud_type: String,
    pub risk_score: f64,
    /// JSON array of tagged fraud details
    #[sea_orm(column_type = "Text")]
    pub details: String,
    pub flagged: bool,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub reviewed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
