//! IP 信誉查询模块
//!
//! 为风控提供代理 / VPN / 数据中心判定以及国家城市信息，支持：
//! - 外部 HTTP JSON API（默认 ip-api.com）
//! - 配置的静态网段列表
//! - 空实现（全部视为未知）

mod external_api;
mod provider;
mod static_ranges;

pub use external_api::ExternalApiReputation;
pub use provider::{IpReputation, IpReputationLookup, NullReputation, ReputationProvider};
pub use static_ranges::StaticRangeReputation;
