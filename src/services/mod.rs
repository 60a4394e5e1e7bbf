//! Service layer for business logic
//!
//! Each service owns an `Arc<SeaOrmStorage>` and is shared between the
//! binary's subcommands, the job loop and embedding applications.

pub mod attribution;
pub mod click_tracker;
pub mod commission;
pub mod fraud;
pub mod payout;
pub mod referral_service;
pub mod reputation;
pub mod retention;

pub use attribution::{AttributionResolver, PurchaseEvent};
pub use click_tracker::{ClickMeta, ClickReceipt, ClickTracker, ShortLinkResolution};
pub use commission::{CommissionEngine, CommissionTier, TierProgress};
pub use fraud::{ConversionContext, FraudAnalysis, FraudPolicy, FraudScorer};
pub use payout::{LogNotifier, PayoutBatchReport, PayoutLedger, PayoutNotifier};
pub use referral_service::{
    GenerateReferralRequest, LinkAnalytics, ReferralAnalytics, ReferralService, ReviewDecision,
    ReviewOutcome,
};
pub use reputation::{IpReputation, IpReputationLookup, ReputationProvider};
pub use retention::{CleanupReport, RetentionTask};
