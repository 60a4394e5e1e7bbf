use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{debug, info};

use crate::errors::{AffilinkError, Result};
use migration::{Migrator, MigratorTrait};

/// 归因写入在同一事务内完成（点击 + Cookie、转化 + 认领），锁等待上限
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// 服务端数据库连接池参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl PoolSettings {
    /// 定时任务（清理、结算批次）与请求路径共用一个池，至少保留 2 个常驻连接
    pub fn for_pool_size(pool_size: u32) -> Self {
        let max_connections = pool_size.max(2);
        Self {
            max_connections,
            min_connections: (max_connections / 4).clamp(2, 5),
            acquire_timeout: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
        }
    }

    fn apply(&self, opt: &mut ConnectOptions) {
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.acquire_timeout)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .sqlx_logging(false);
    }
}

/// 裸文件路径补全为 sqlite URL
pub fn sqlite_url(database_url: &str) -> String {
    if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", database_url)
    }
}

/// 打开 affilink 的 SQLite 存储（WAL，写冲突时等待 busy_timeout）
pub async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
    use sea_orm::SqlxSqliteConnector;
    use sea_orm::sqlx::SqlitePool;
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
    use std::str::FromStr;

    let url = sqlite_url(database_url);
    let opt = SqliteConnectOptions::from_str(&url)
        .map_err(|e| {
            AffilinkError::database_config(format!("affilink SQLite URL 无效 ({}): {}", url, e))
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(SQLITE_BUSY_TIMEOUT)
        // click_events 扫描（风控窗口、分析报表）依赖页缓存
        .pragma("cache_size", "-64000")
        .pragma("temp_store", "memory");

    let pool = SqlitePool::connect_with(opt).await.map_err(|e| {
        AffilinkError::database_connection(format!("无法打开 affilink SQLite 存储: {}", e))
    })?;

    debug!(
        "affilink SQLite store opened (journal: WAL, busy_timeout: {}s)",
        SQLITE_BUSY_TIMEOUT.as_secs()
    );
    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// 连接 MySQL/PostgreSQL 上的 affilink 存储
pub async fn connect_generic(
    database_url: &str,
    backend_name: &str,
    pool_size: u32,
) -> Result<DatabaseConnection> {
    let settings = PoolSettings::for_pool_size(pool_size);
    let mut opt = ConnectOptions::new(database_url.to_owned());
    settings.apply(&mut opt);

    let db = Database::connect(opt).await.map_err(|e| {
        AffilinkError::database_connection(format!(
            "无法连接 affilink {} 存储: {}",
            backend_name.to_uppercase(),
            e
        ))
    })?;

    debug!(
        "affilink {} pool ready (max: {}, min: {}, acquire_timeout: {}s)",
        backend_name,
        settings.max_connections,
        settings.min_connections,
        settings.acquire_timeout.as_secs()
    );
    Ok(db)
}

/// 建立/升级联盟营销表结构（推荐链接、点击、Cookie、转化、风控、结算）
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    let known = Migrator::migrations().len();
    Migrator::up(db, None)
        .await
        .map_err(|e| AffilinkError::persistence(format!("affilink 表结构迁移失败: {}", e)))?;

    info!("affilink schema up to date ({} migrations)", known);
    Ok(())
}
