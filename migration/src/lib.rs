pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20261001_000001_referral_links;
mod m20261001_000002_click_tracking;
mod m20261001_000003_conversions;
mod m20261001_000004_fraud;
mod m20261001_000005_payouts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_referral_links::Migration),
            Box::new(m20261001_000002_click_tracking::Migration),
            Box::new(m20261001_000003_conversions::Migration),
            Box::new(m20261001_000004_fraud::Migration),
            Box::new(m20261001_000005_payouts::Migration),
        ]
    }
}
