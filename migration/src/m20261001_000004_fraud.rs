//! 风控表迁移
//!
//! - fraud_records: 风控审计记录（只增不删）
//! - fraud_rules: 可在线调整的风控策略（阈值 / 权重 / 开关）

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FraudRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FraudRecords::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FraudRecords::ReferralId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudRecords::ConversionId)
                            .string_len(36)
                            .null(),
                    )
                    .col(ColumnDef::new(FraudRecords::ClickId).string_len(36).null())
                    .col(
                        ColumnDef::new(FraudRecords::FraudType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(FraudRecords::RiskScore).double().not_null())
                    .col(ColumnDef::new(FraudRecords::Details).text().not_null())
                    .col(ColumnDef::new(FraudRecords::Flagged).boolean().not_null())
                    .col(
                        ColumnDef::new(FraudRecords::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudRecords::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_fraud_records_referral_time")
                    .table(FraudRecords::Table)
                    .col(FraudRecords::ReferralId)
                    .col(FraudRecords::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FraudRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FraudRules::RuleType)
                            .string_len(48)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FraudRules::Threshold).double().not_null())
                    .col(ColumnDef::new(FraudRules::Weight).double().not_null())
                    .col(
                        ColumnDef::new(FraudRules::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(FraudRules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FraudRules::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_fraud_records_referral_time")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(FraudRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FraudRecords {
    #[sea_orm(iden = "fraud_records")]
    Table,
    Id,
    ReferralId,
    ConversionId,
    ClickId,
    FraudType,
    RiskScore,
    Details,
    Flagged,
    Status,
    CreatedAt,
    ReviewedAt,
}

#[derive(DeriveIden)]
enum FraudRules {
    #[sea_orm(iden = "fraud_rules")]
    Table,
    RuleType,
    Threshold,
    Weight,
    Active,
    UpdatedAt,
}
