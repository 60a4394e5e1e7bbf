//! Domain models shared by storage and services.
//!
//! Money is always an `i64` in currency minor units; rates are basis points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::{AffilinkError, Result};

/// 10000 bps = 100%
pub const BPS_DENOMINATOR: i64 = 10_000;

// ============ Referral links ============

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RewardType {
    /// reward_value is in basis points
    Percentage,
    /// reward_value is a flat amount in minor units
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub id: String,
    pub referrer_id: String,
    pub product_id: Option<String>,
    pub shop_id: Option<String>,
    pub code: String,
    pub short_code: String,
    pub reward_type: RewardType,
    pub reward_value: i64,
    /// Use the link's own percentage instead of the referrer's tier rate
    pub override_tier_rate: bool,
    pub target_url: Option<String>,
    pub active: bool,
    pub click_count: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ReferralLink {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

// ============ Clicks & cookies ============

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// ISO 3166-1 alpha-2
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub id: String,
    pub referral_id: String,
    pub referral_code: String,
    pub visitor_ip: String,
    pub user_agent: Option<String>,
    pub user_agent_hash: String,
    pub fingerprint: String,
    pub referrer_url: Option<String>,
    pub landing_page: Option<String>,
    pub geo: GeoInfo,
    pub clicked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingCookie {
    pub cookie_value: String,
    pub referral_id: String,
    pub referral_code: String,
    pub click_id: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub converted_at: Option<DateTime<Utc>>,
}

impl TrackingCookie {
    /// Inside the attribution window and not yet consumed
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.converted_at.is_none() && self.expires_at > now
    }
}

// ============ Conversions ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: String,
    pub referral_id: String,
    pub referrer_id: String,
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
    pub payout_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============ Fraud ============

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FraudType {
    IpAbuse,
    ProxyNetwork,
    BotTraffic,
    ClickSpam,
    SuspiciousPattern,
    DuplicateConversion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAbuseDetails {
    pub ip: String,
    pub clicks_24h: u64,
    pub conversions_24h: u64,
    pub private_network: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyNetworkDetails {
    pub ip: String,
    pub proxy: bool,
    pub datacenter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotTrafficDetails {
    pub user_agent: String,
    /// Name of the matched signature, if any
    pub signature: Option<String>,
    pub crawler_category: bool,
    pub too_short: bool,
    pub missing_browser_token: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickSpamDetails {
    pub referral_clicks_1h: u64,
    pub same_ip_clicks_1h: u64,
    pub same_ua_clicks_1h: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousPatternDetails {
    pub seconds_since_click: Option<i64>,
    pub purchase_amount: Option<i64>,
    pub large_purchase: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateConversionDetails {
    pub same_ip_conversions_24h: u64,
    pub same_ua_conversions_24h: u64,
}

/// Evidence behind a fraud decision, one variant per fraud type.
///
/// Stored as a JSON array with a `type` tag on each element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FraudDetails {
    IpAbuse(IpAbuseDetails),
    ProxyNetwork(ProxyNetworkDetails),
    BotTraffic(BotTrafficDetails),
    ClickSpam(ClickSpamDetails),
    SuspiciousPattern(SuspiciousPatternDetails),
    DuplicateConversion(DuplicateConversionDetails),
}

impl FraudDetails {
    pub fn fraud_type(&self) -> FraudType {
        match self {
            FraudDetails::IpAbuse(_) => FraudType::IpAbuse,
            FraudDetails::ProxyNetwork(_) => FraudType::ProxyNetwork,
            FraudDetails::BotTraffic(_) => FraudType::BotTraffic,
            FraudDetails::ClickSpam(_) => FraudType::ClickSpam,
            FraudDetails::SuspiciousPattern(_) => FraudType::SuspiciousPattern,
            FraudDetails::DuplicateConversion(_) => FraudType::DuplicateConversion,
        }
    }

    pub fn encode_all(details: &[FraudDetails]) -> Result<String> {
        Ok(serde_json::to_string(details)?)
    }

    /// Parse a stored payload; unknown tags or malformed fields are rejected.
    pub fn decode_all(payload: &str) -> Result<Vec<FraudDetails>> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FraudRecordStatus {
    /// Flagged, commission still credited, awaiting manual review
    PendingReview,
    /// Over the block threshold, commission withheld
    Blocked,
    /// Reviewer cleared the activity
    Dismissed,
    /// Reviewer confirmed the activity as fraud
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRecord {
    pub id: String,
    pub referral_id: String,
    pub conversion_id: Option<String>,
    pub click_id: Option<String>,
    pub fraud_type: FraudType,
    pub risk_score: f64,
    pub details: Vec<FraudDetails>,
    pub flagged: bool,
    pub status: FraudRecordStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// One row of the tunable fraud policy table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRule {
    pub rule_type: String,
    pub threshold: f64,
    pub weight: f64,
    pub active: bool,
}

// ============ Payouts ============

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PayoutStatus::Paid | PayoutStatus::Failed | PayoutStatus::Cancelled
        )
    }

    /// pending → processing → {paid | failed}; cancelled from pending or processing
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Paid)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }

    /// Whether entering this status gives the claimed commissions back
    pub fn releases_claims(self) -> bool {
        matches!(self, PayoutStatus::Failed | PayoutStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub referrer_id: String,
    pub amount: i64,
    pub currency: String,
    pub conversion_count: u32,
    pub method: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: PayoutStatus,
    pub external_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Parse a stored enum column, reporting the column on failure
pub fn parse_stored<T: std::str::FromStr>(column: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        AffilinkError::serialization(format!("Unknown value '{}' in column {}", value, column))
    })
}
