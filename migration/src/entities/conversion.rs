use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub referral_id: String,
    pub referrer_id: String,
    #[sea_orm(unique)]
    pub purchase_id: String,
    pub click_id: Option<String>,
    pub purchase_amount: i64,
    pub commission_amount: i64,
    pub currency: String,
    pub fraud_score: f64,
    pub is_verified: bool,
    pub tier_level: i32,
    pub visitor_ip: String,
    pub user_agent_hash: String,
    /// Payout that claimed this commission
    pub payout_id: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
