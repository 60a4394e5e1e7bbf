//! 佣金结算表迁移
//!
//! period_lock 唯一索引：同一推荐人同一结算周期最多一条有效结算单。
//! 失败 / 取消的结算单会把 period_lock 置空，NULL 不参与唯一约束。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Payouts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payouts::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payouts::ReferrerId).string_len(64).not_null())
                    .col(ColumnDef::new(Payouts::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Payouts::Currency).string_len(3).not_null())
                    .col(
                        ColumnDef::new(Payouts::ConversionCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Payouts::Method).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Payouts::PeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payouts::PeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payouts::PeriodLock).string_len(160).null())
                    .col(ColumnDef::new(Payouts::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Payouts::ExternalTransactionId)
                            .string_len(128)
                            .null(),
                    )
                    .col(ColumnDef::new(Payouts::FailureReason).text().null())
                    .col(
                        ColumnDef::new(Payouts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payouts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payouts::ProcessedAt)
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
                    .name("idx_payouts_period_lock")
                    .table(Payouts::Table)
                    .col(Payouts::PeriodLock)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payouts_referrer")
                    .table(Payouts::Table)
                    .col(Payouts::ReferrerId)
                    .col(Payouts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_payouts_referrer").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_payouts_period_lock").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Payouts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Payouts {
    #[sea_orm(iden = "payouts")]
    Table,
    Id,
    ReferrerId,
    Amount,
    Currency,
    ConversionCount,
    Method,
    PeriodStart,
    PeriodEnd,
    PeriodLock,
    Status,
    ExternalTransactionId,
    FailureReason,
    CreatedAt,
    UpdatedAt,
    ProcessedAt,
}
