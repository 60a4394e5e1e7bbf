use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "referral_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub referrer_id: String,
    pub product_id: Option<String>,
    pub shop_id: Option<String>,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(unique)]
    pub short_code: String,
    /// "percentage" | "fixed"
    pub reward_type: String,
    /// Basis points for percentage rewards, minor units for fixed rewards
    pub reward_value: i64,
    pub override_tier_rate: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub target_url: Option<String>,
    pub active: bool,
    pub click_count: i64,
    pub created_at: DateTimeUtc,
    pub expires_at: Option<DateTimeUtc>,
    pub revoked_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
