//! 转化表迁移
//!
//! purchase_id 唯一索引保证每笔订单最多一条转化记录。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversions::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Conversions::ReferralId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversions::ReferrerId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversions::PurchaseId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversions::ClickId).string_len(36).null())
                    .col(
                        ColumnDef::new(Conversions::PurchaseAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversions::CommissionAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversions::Currency)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversions::FraudScore).double().not_null())
                    .col(
                        ColumnDef::new(Conversions::IsVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Conversions::TierLevel)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Conversions::VisitorIp)
                            .string_len(45)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversions::UserAgentHash)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversions::PayoutId).string_len(36).null())
                    .col(
                        ColumnDef::new(Conversions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversions_purchase_id")
                    .table(Conversions::Table)
                    .col(Conversions::PurchaseId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 结算与分级：按推荐人 + 时间
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversions_referrer_time")
                    .table(Conversions::Table)
                    .col(Conversions::ReferrerId)
                    .col(Conversions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // 重复转化检测：按推荐链接 + 时间
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversions_referral_time")
                    .table(Conversions::Table)
                    .col(Conversions::ReferralId)
                    .col(Conversions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversions_payout")
                    .table(Conversions::Table)
                    .col(Conversions::PayoutId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_conversions_payout",
            "idx_conversions_referral_time",
            "idx_conversions_referrer_time",
            "idx_conversions_purchase_id",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(Conversions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Conversions {
    #[sea_orm(iden = "conversions")]
    Table,
    Id,
    ReferralId,
    ReferrerId,
    PurchaseId,
    ClickId,
    PurchaseAmount,
    CommissionAmount,
    Currency,
    FraudScore,
    IsVerified,
    TierLevel,
    VisitorIp,
    UserAgentHash,
    PayoutId,
    CreatedAt,
}
