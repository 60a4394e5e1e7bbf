pub mod codes;
pub mod fingerprint;
pub mod ip;

pub use codes::{generate_random_code, is_valid_referral_code};
pub use fingerprint::{fingerprint, hash_user_agent};
