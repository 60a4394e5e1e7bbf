pub mod click_event;
pub mod conversion;
pub mod fraud_record;
pub mod fraud_rule;
pub mod payout;
pub mod referral_link;
pub mod tracking_cookie;

pub use click_event::Entity as ClickEventEntity;
pub use conversion::Entity as ConversionEntity;
pub use fraud_record::Entity as FraudRecordEntity;
pub use fraud_rule::Entity as FraudRuleEntity;
pub use payout::Entity as PayoutEntity;
pub use referral_link::Entity as ReferralLinkEntity;
pub use tracking_cookie::Entity as TrackingCookieEntity;
