//! Affilink - referral attribution and fraud-scoring engine
//!
//! Tracks clicks on referral links, attributes purchases through one-time
//! tracking cookies, scores clicks and conversions for fraud, computes tiered
//! commissions and batches them into payouts.
//!
//! # Architecture
//! - `storage`: SeaORM persistence (SQLite, MySQL, PostgreSQL)
//! - `services`: click tracking, attribution, fraud scoring, commission, payouts
//! - `config`: static configuration (TOML + environment)
//! - `system`: logging, service wiring and scheduled jobs
//! - `utils`: code generation, fingerprints, IP helpers

pub mod cli;
pub mod config;
pub mod errors;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
