use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffilinkError {
    Validation(String),
    NotFound(String),
    Expired(String),
    Duplicate(String),
    FraudBlocked(String),
    NoEligibleCommissions(String),
    InvalidTransition(String),
    Commission(String),
    Persistence(String),
    TransientPersistence(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    Serialization(String),
    DateParse(String),
}

impl AffilinkError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            AffilinkError::Validation(_) => "E001",
            AffilinkError::NotFound(_) => "E002",
            AffilinkError::Expired(_) => "E003",
            AffilinkError::Duplicate(_) => "E004",
            AffilinkError::FraudBlocked(_) => "E005",
            AffilinkError::NoEligibleCommissions(_) => "E006",
            AffilinkError::InvalidTransition(_) => "E007",
            AffilinkError::Commission(_) => "E008",
            AffilinkError::Persistence(_) => "E009",
            AffilinkError::TransientPersistence(_) => "E010",
            AffilinkError::DatabaseConfig(_) => "E011",
            AffilinkError::DatabaseConnection(_) => "E012",
            AffilinkError::Serialization(_) => "E013",
            AffilinkError::DateParse(_) => "E014",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            AffilinkError::Validation(_) => "Validation Error",
            AffilinkError::NotFound(_) => "Resource Not Found",
            AffilinkError::Expired(_) => "Resource Expired",
            AffilinkError::Duplicate(_) => "Duplicate Resource",
            AffilinkError::FraudBlocked(_) => "Blocked By Fraud Screening",
            AffilinkError::NoEligibleCommissions(_) => "No Eligible Commissions",
            AffilinkError::InvalidTransition(_) => "Invalid State Transition",
            AffilinkError::Commission(_) => "Commission Calculation Error",
            AffilinkError::Persistence(_) => "Persistence Error",
            AffilinkError::TransientPersistence(_) => "Transient Persistence Error",
            AffilinkError::DatabaseConfig(_) => "Database Configuration Error",
            AffilinkError::DatabaseConnection(_) => "Database Connection Error",
            AffilinkError::Serialization(_) => "Serialization Error",
            AffilinkError::DateParse(_) => "Date Parse Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            AffilinkError::Validation(msg)
            | AffilinkError::NotFound(msg)
            | AffilinkError::Expired(msg)
            | AffilinkError::Duplicate(msg)
            | AffilinkError::FraudBlocked(msg)
            | AffilinkError::NoEligibleCommissions(msg)
            | AffilinkError::InvalidTransition(msg)
            | AffilinkError::Commission(msg)
            | AffilinkError::Persistence(msg)
            | AffilinkError::TransientPersistence(msg)
            | AffilinkError::DatabaseConfig(msg)
            | AffilinkError::DatabaseConnection(msg)
            | AffilinkError::Serialization(msg)
            | AffilinkError::DateParse(msg) => msg,
        }
    }

    /// 是否为可重试的瞬时错误（死锁、锁等待、连接中断）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AffilinkError::TransientPersistence(_) | AffilinkError::DatabaseConnection(_)
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for AffilinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for AffilinkError {}

// 便捷的构造函数
impl AffilinkError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        AffilinkError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        AffilinkError::NotFound(msg.into())
    }

    pub fn expired<T: Into<String>>(msg: T) -> Self {
        AffilinkError::Expired(msg.into())
    }

    pub fn duplicate<T: Into<String>>(msg: T) -> Self {
        AffilinkError::Duplicate(msg.into())
    }

    pub fn fraud_blocked<T: Into<String>>(msg: T) -> Self {
        AffilinkError::FraudBlocked(msg.into())
    }

    pub fn no_eligible_commissions<T: Into<String>>(msg: T) -> Self {
        AffilinkError::NoEligibleCommissions(msg.into())
    }

    pub fn invalid_transition<T: Into<String>>(msg: T) -> Self {
        AffilinkError::InvalidTransition(msg.into())
    }

    pub fn commission<T: Into<String>>(msg: T) -> Self {
        AffilinkError::Commission(msg.into())
    }

    pub fn persistence<T: Into<String>>(msg: T) -> Self {
        AffilinkError::Persistence(msg.into())
    }

    pub fn transient_persistence<T: Into<String>>(msg: T) -> Self {
        AffilinkError::TransientPersistence(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        AffilinkError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        AffilinkError::DatabaseConnection(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        AffilinkError::Serialization(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        AffilinkError::DateParse(msg.into())
    }
}

// 存储错误按是否可重试分类
impl From<sea_orm::DbErr> for AffilinkError {
    fn from(err: sea_orm::DbErr) -> Self {
        if crate::storage::backend::retry::is_retryable_error(&err) {
            AffilinkError::TransientPersistence(err.to_string())
        } else {
            AffilinkError::Persistence(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AffilinkError {
    fn from(err: serde_json::Error) -> Self {
        AffilinkError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for AffilinkError {
    fn from(err: chrono::ParseError) -> Self {
        AffilinkError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AffilinkError>;
