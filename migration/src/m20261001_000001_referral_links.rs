//! 推荐链接表迁移
//!
//! 创建 referral_links 表：
//! - code / short_code 唯一索引
//! - referrer_id 索引（按推荐人查询链接）

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReferralLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReferralLinks::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::ReferrerId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReferralLinks::ProductId).string_len(64).null())
                    .col(ColumnDef::new(ReferralLinks::ShopId).string_len(64).null())
                    .col(ColumnDef::new(ReferralLinks::Code).string_len(32).not_null())
                    .col(
                        ColumnDef::new(ReferralLinks::ShortCode)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::RewardType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::RewardValue)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::OverrideTierRate)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ReferralLinks::TargetUrl).text().null())
                    .col(
                        ColumnDef::new(ReferralLinks::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::ClickCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ReferralLinks::RevokedAt)
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
                    .name("idx_referral_links_code")
                    .table(ReferralLinks::Table)
                    .col(ReferralLinks::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_referral_links_short_code")
                    .table(ReferralLinks::Table)
                    .col(ReferralLinks::ShortCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_referral_links_referrer")
                    .table(ReferralLinks::Table)
                    .col(ReferralLinks::ReferrerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_referral_links_referrer").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_referral_links_short_code")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_referral_links_code").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ReferralLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReferralLinks {
    #[sea_orm(iden = "referral_links")]
    Table,
    Id,
    ReferrerId,
    ProductId,
    ShopId,
    Code,
    ShortCode,
    RewardType,
    RewardValue,
    OverrideTierRate,
    TargetUrl,
    Active,
    ClickCount,
    CreatedAt,
    ExpiresAt,
    RevokedAt,
}
