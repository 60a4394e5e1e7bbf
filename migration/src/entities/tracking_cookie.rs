use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "tracking_cookies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cookie_value: String,
    pub referral_id: String,
    pub referral_code: String,
    pub click_id: String,
    pub fingerprint: String,
    pub created_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
    /// Set exactly once when the cookie is consumed by an attribution
    pub converted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
