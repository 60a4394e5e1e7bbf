use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "payouts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub referrer_id: String,
    pub amount: i64,
    pub currency: String,
    pub conversion_count: i32,
    pub method: String,
    pub period_start: DateTimeUtc,
    pub period_end: DateTimeUtc,
    /// `referrer|start|end` while the payout is live, NULL once failed or cancelled
    #[sea_orm(unique)]
    pub period_lock: Option<String>,
    pub status: String,
    pub external_transaction_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub failure_reason: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
