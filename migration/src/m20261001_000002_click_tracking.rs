//! 点击事件与追踪 Cookie 表迁移
//!
//! - click_events: 追加写入的点击明细（IP / UA / 指纹 / 地理位置）
//! - tracking_cookies: 归因 Cookie，converted_at 只允许设置一次

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::ReferralId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::ReferralCode)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::VisitorIp)
                            .string_len(45)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::UserAgent).text().null())
                    .col(
                        ColumnDef::new(ClickEvents::UserAgentHash)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::Fingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::ReferrerUrl).text().null())
                    .col(ColumnDef::new(ClickEvents::LandingPage).text().null())
                    .col(ColumnDef::new(ClickEvents::Country).string_len(2).null())
                    .col(ColumnDef::new(ClickEvents::City).string_len(100).null())
                    .col(
                        ColumnDef::new(ClickEvents::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 滑动窗口查询：单个推荐链接的近期点击
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_referral_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ReferralId)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        // 滑动窗口查询：单个 IP 的近期点击
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_ip_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::VisitorIp)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        // 保留期清理
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_clicked_at")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TrackingCookies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrackingCookies::CookieValue)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TrackingCookies::ReferralId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingCookies::ReferralCode)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingCookies::ClickId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingCookies::Fingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingCookies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingCookies::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingCookies::ConvertedAt)
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
                    .name("idx_tracking_cookies_expires_at")
                    .table(TrackingCookies::Table)
                    .col(TrackingCookies::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_tracking_cookies_expires_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(TrackingCookies::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_click_events_clicked_at").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_click_events_ip_time").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_click_events_referral_time")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClickEvents {
    #[sea_orm(iden = "click_events")]
    Table,
    Id,
    ReferralId,
    ReferralCode,
    VisitorIp,
    UserAgent,
    UserAgentHash,
    Fingerprint,
    ReferrerUrl,
    LandingPage,
    Country,
    City,
    ClickedAt,
}

#[derive(DeriveIden)]
enum TrackingCookies {
    #[sea_orm(iden = "tracking_cookies")]
    Table,
    CookieValue,
    ReferralId,
    ReferralCode,
    ClickId,
    Fingerprint,
    CreatedAt,
    ExpiresAt,
    ConvertedAt,
}
