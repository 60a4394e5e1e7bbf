//! Click event entity (append-only)

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub referral_id: String,
    pub referral_code: String,
    pub visitor_ip: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    /// xxHash64 of the raw user agent
    pub user_agent_hash: String,
    pub fingerprint: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub landing_page: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub clicked_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
