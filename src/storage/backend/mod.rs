//! SeaORM storage backend
//!
//! This module provides database storage using SeaORM,
//! supporting SQLite, MySQL/MariaDB, and PostgreSQL.

mod analytics;
mod clicks;
mod connection;
mod conversions;
mod converters;
mod cookies;
mod fraud;
mod payouts;
mod referrals;
pub mod retry;

use sea_orm::{DatabaseConnection, DbErr, SqlErr};
use tracing::info;

use crate::errors::{AffilinkError, Result};

pub use analytics::{LinkActivity, ReferrerActivity};
pub use conversions::AttributionWrite;
pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use converters::{
    click_to_active_model, conversion_to_active_model, cookie_to_active_model,
    fraud_record_to_active_model, link_to_active_model, model_to_click, model_to_conversion,
    model_to_cookie, model_to_fraud_record, model_to_fraud_rule, model_to_link, model_to_payout,
};
pub use payouts::{NewPayout, StatusChange};
pub use retry::RetryPolicy;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(AffilinkError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// 唯一索引冲突（purchase_id、code、period_lock 等）
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    retry: RetryPolicy,
}

impl SeaOrmStorage {
    pub async fn new(
        database_url: &str,
        backend_name: &str,
        pool_size: u32,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if database_url.is_empty() {
            return Err(AffilinkError::database_config(
                "DATABASE_URL 未设置".to_string(),
            ));
        }

        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, backend_name, pool_size).await?
        };

        let storage = SeaOrmStorage {
            db,
            backend_name: backend_name.to_string(),
            retry,
        };

        run_migrations(&storage.db).await?;

        info!(
            "{} Storage initialized.",
            storage.backend_name.to_uppercase()
        );
        Ok(storage)
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// 获取数据库连接
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}
