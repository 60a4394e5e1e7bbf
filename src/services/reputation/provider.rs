//! IP 信誉 Provider 抽象层
//!
//! 根据配置选择实现：
//! 1. reputation_enabled → ExternalApiReputation
//! 2. 配置了 proxy_cidrs / datacenter_cidrs → StaticRangeReputation
//! 3. 否则 → NullReputation
//!
//! 所有查询都带超时，超时或失败视为“未知”，不贡献风险分。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::external_api::ExternalApiReputation;
use super::static_ranges::StaticRangeReputation;
use crate::config::FraudConfig;
use crate::storage::GeoInfo;

/// IP 信誉信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpReputation {
    /// VPN / 代理 / Tor 出口
    pub proxy: bool,
    /// 托管 / 数据中心网段
    pub datacenter: bool,
    pub geo: GeoInfo,
}

/// IP 信誉查询 trait
#[async_trait]
pub trait IpReputationLookup: Send + Sync {
    /// 查询 IP 信誉，None 表示未知
    async fn lookup(&self, ip: &str) -> Option<IpReputation>;

    /// 获取 provider 名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 不做任何查询
pub struct NullReputation;

#[async_trait]
impl IpReputationLookup for NullReputation {
    async fn lookup(&self, _ip: &str) -> Option<IpReputation> {
        None
    }

    fn name(&self) -> &'static str {
        "Null"
    }
}

/// 带超时的统一 Provider
#[derive(Clone)]
pub struct ReputationProvider {
    inner: Arc<dyn IpReputationLookup>,
    timeout: Duration,
}

impl ReputationProvider {
    pub fn from_config(config: &FraudConfig) -> Self {
        let inner: Arc<dyn IpReputationLookup> = if config.reputation_enabled {
            Arc::new(ExternalApiReputation::new(
                &config.reputation_api_url,
                Duration::from_secs(config.reputation_cache_ttl_secs),
            ))
        } else if !config.proxy_cidrs.is_empty() || !config.datacenter_cidrs.is_empty() {
            Arc::new(StaticRangeReputation::new(
                config.proxy_cidrs.clone(),
                config.datacenter_cidrs.clone(),
            ))
        } else {
            Arc::new(NullReputation)
        };

        info!("IP reputation: Initialized with {} provider", inner.name());
        Self::new(inner, Duration::from_millis(config.reputation_timeout_ms))
    }

    pub fn new(inner: Arc<dyn IpReputationLookup>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn null() -> Self {
        Self::new(Arc::new(NullReputation), Duration::from_millis(1))
    }

    /// 有界查询：超时返回 None
    pub async fn lookup(&self, ip: &str) -> Option<IpReputation> {
        match tokio::time::timeout(self.timeout, self.inner.lookup(ip)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    "IP reputation lookup for {} timed out after {:?} ({})",
                    ip,
                    self.timeout,
                    self.inner.name()
                );
                None
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}
