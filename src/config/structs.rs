use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - database: 数据库连接与重试
/// - logging: 日志
/// - tracking: 点击追踪与归因 Cookie
/// - fraud: 风控与 IP 信誉查询
/// - commission: 佣金分级表
/// - payout: 结算
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub fraud: FraudConfig,
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub payout: PayoutConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：AFL，分隔符：__
    /// 示例：AFL__DATABASE__DATABASE_URL=postgres://...
    pub fn load() -> Self {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("AFL")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" | "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 点击追踪配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 归因窗口（Cookie 有效期）
    #[serde(default = "default_cookie_ttl_days")]
    pub cookie_ttl_days: i64,
    /// 指纹哈希盐值
    #[serde(default = "default_fingerprint_salt")]
    pub fingerprint_salt: String,
    /// 短链接未配置 target_url 时的跳转基础地址
    #[serde(default = "default_storefront_base_url")]
    pub storefront_base_url: String,
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,
    /// 点击明细保留天数
    #[serde(default = "default_click_retention_days")]
    pub click_retention_days: i64,
    /// 已过期 Cookie 在被清理前额外保留的天数
    #[serde(default = "default_cookie_grace_days")]
    pub cookie_grace_days: i64,
}

/// 风控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    #[serde(default = "default_reputation_enabled")]
    pub reputation_enabled: bool,
    /// 使用 {ip} 作为占位符
    #[serde(default = "default_reputation_api_url")]
    pub reputation_api_url: String,
    /// 外部信誉查询超时，超时视为未知（不加分）
    #[serde(default = "default_reputation_timeout_ms")]
    pub reputation_timeout_ms: u64,
    #[serde(default = "default_reputation_cache_ttl_secs")]
    pub reputation_cache_ttl_secs: u64,
    /// 已知代理 / VPN 出口（CIDR 或单个 IP），不依赖外部查询
    #[serde(default)]
    pub proxy_cidrs: Vec<String>,
    /// 已知数据中心网段
    #[serde(default)]
    pub datacenter_cidrs: Vec<String>,
}

/// 单个佣金等级
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierConfig {
    pub level: i32,
    pub name: String,
    /// 达到该等级所需的已验证转化数
    pub min_conversions: u64,
    /// 基点（100 = 1%）
    pub percentage_bps: u32,
    /// 最小货币单位
    pub bonus_amount: i64,
}

/// 佣金配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

/// 结算配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// run-jobs 循环的间隔
    #[serde(default = "default_jobs_interval_secs")]
    pub jobs_interval_secs: u64,
    /// run-jobs 中是否自动生成周期结算单
    #[serde(default = "default_batch_enabled")]
    pub batch_enabled: bool,
    /// 结算周期长度，按 UTC 零点对齐
    #[serde(default = "default_batch_period_days")]
    pub batch_period_days: i64,
    #[serde(default = "default_batch_method")]
    pub batch_method: String,
}

// ============================================================
// Default value functions
// ============================================================

fn default_database_url() -> String {
    "affilink.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_cookie_ttl_days() -> i64 {
    30
}

fn default_fingerprint_salt() -> String {
    "affilink-fingerprint".to_string()
}

fn default_storefront_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_code_prefix() -> String {
    "REF".to_string()
}

fn default_click_retention_days() -> i64 {
    90
}

fn default_cookie_grace_days() -> i64 {
    7
}

fn default_reputation_enabled() -> bool {
    false
}

fn default_reputation_api_url() -> String {
    "http://ip-api.com/json/{ip}?fields=status,countryCode,city,proxy,hosting".to_string()
}

fn default_reputation_timeout_ms() -> u64 {
    800
}

fn default_reputation_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            level: 1,
            name: "Bronze".to_string(),
            min_conversions: 0,
            percentage_bps: 500,
            bonus_amount: 0,
        },
        TierConfig {
            level: 2,
            name: "Silver".to_string(),
            min_conversions: 10,
            percentage_bps: 750,
            bonus_amount: 2_500,
        },
        TierConfig {
            level: 3,
            name: "Gold".to_string(),
            min_conversions: 50,
            percentage_bps: 1_000,
            bonus_amount: 10_000,
        },
        TierConfig {
            level: 4,
            name: "Platinum".to_string(),
            min_conversions: 200,
            percentage_bps: 1_250,
            bonus_amount: 50_000,
        },
    ]
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_jobs_interval_secs() -> u64 {
    3600
}

fn default_batch_enabled() -> bool {
    true
}

fn default_batch_period_days() -> i64 {
    1
}

fn default_batch_method() -> String {
    "bank_transfer".to_string()
}

// ============================================================
// Default implementations
// ============================================================

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            cookie_ttl_days: default_cookie_ttl_days(),
            fingerprint_salt: default_fingerprint_salt(),
            storefront_base_url: default_storefront_base_url(),
            code_prefix: default_code_prefix(),
            click_retention_days: default_click_retention_days(),
            cookie_grace_days: default_cookie_grace_days(),
        }
    }
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            reputation_enabled: default_reputation_enabled(),
            reputation_api_url: default_reputation_api_url(),
            reputation_timeout_ms: default_reputation_timeout_ms(),
            reputation_cache_ttl_secs: default_reputation_cache_ttl_secs(),
            proxy_cidrs: Vec::new(),
            datacenter_cidrs: Vec::new(),
        }
    }
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            jobs_interval_secs: default_jobs_interval_secs(),
            batch_enabled: default_batch_enabled(),
            batch_period_days: default_batch_period_days(),
            batch_method: default_batch_method(),
        }
    }
}
