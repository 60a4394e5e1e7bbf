//! 外部 IP 信誉 API 实现
//!
//! 使用外部 HTTP JSON API 查询代理 / 托管标记（如 ip-api.com 的 proxy、hosting 字段）
//! 内置缓存 + Singleflight 语义，避免重复查询

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{trace, warn};
use ureq::Agent;

use super::provider::{IpReputation, IpReputationLookup};
use crate::storage::GeoInfo;

/// 缓存最大容量
const REPUTATION_CACHE_MAX_CAPACITY: u64 = 10_000;
/// HTTP 请求超时时间（外层还有 ReputationProvider 的超时）
const HTTP_TIMEOUT_SECS: u64 = 2;

/// 全局 HTTP Agent（ureq 的 Agent 是 Send + Sync）
static HTTP_AGENT: OnceLock<Agent> = OnceLock::new();

fn get_agent() -> &'static Agent {
    HTTP_AGENT.get_or_init(|| {
        Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(HTTP_TIMEOUT_SECS)))
            .build()
            .into()
    })
}

/// 外部 API 信誉 Provider
///
/// - LRU 淘汰策略，最大 10000 条
/// - TTL 可配置
/// - Singleflight：同一 IP 的并发请求只发一次 HTTP
pub struct ExternalApiReputation {
    api_url_template: String,
    /// IP → 信誉缓存（Option 用于负缓存）
    cache: Cache<String, Option<IpReputation>>,
}

impl ExternalApiReputation {
    /// `api_url_template` 使用 `{ip}` 作为占位符
    pub fn new(api_url_template: &str, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(REPUTATION_CACHE_MAX_CAPACITY)
            .build();

        Self {
            api_url_template: api_url_template.to_string(),
            cache,
        }
    }

    /// 解析 API 响应；`{"status":"fail"}` 视为未知
    fn parse_response(json: &serde_json::Value) -> Option<IpReputation> {
        if json["status"].as_str() == Some("fail") {
            trace!("Reputation API returned fail status");
            return None;
        }

        let proxy = json["proxy"].as_bool().unwrap_or(false)
            || json["vpn"].as_bool().unwrap_or(false)
            || json["tor"].as_bool().unwrap_or(false);
        let datacenter = json["hosting"].as_bool().unwrap_or(false)
            || json["datacenter"].as_bool().unwrap_or(false);

        let country = json["countryCode"]
            .as_str()
            .or_else(|| json["country_code"].as_str())
            .map(String::from);
        let city = json["city"].as_str().map(String::from);

        Some(IpReputation {
            proxy,
            datacenter,
            geo: GeoInfo { country, city },
        })
    }

    /// 同步请求，在 spawn_blocking 中调用
    fn fetch_from_api_sync(url: String) -> Option<IpReputation> {
        let agent = get_agent();

        let resp = match agent.get(&url).call() {
            Ok(r) => r,
            Err(e) => {
                warn!("Reputation API request to \"{}\" failed: {}", url, e);
                return None;
            }
        };

        let json: serde_json::Value = match resp.into_body().read_json() {
            Ok(j) => j,
            Err(e) => {
                warn!("Reputation API response from \"{}\" parse failed: {}", url, e);
                return None;
            }
        };

        Self::parse_response(&json)
    }

    async fn fetch_from_api(&self, ip: &str) -> Option<IpReputation> {
        let url = self.api_url_template.replace("{ip}", ip);

        tokio::task::spawn_blocking(move || Self::fetch_from_api_sync(url))
            .await
            .unwrap_or_else(|e| {
                warn!("Reputation spawn_blocking failed: {}", e);
                None
            })
    }
}

#[async_trait]
impl IpReputationLookup for ExternalApiReputation {
    async fn lookup(&self, ip: &str) -> Option<IpReputation> {
        // get_with 自带 singleflight 语义
        self.cache
            .get_with(ip.to_string(), async {
                trace!("Reputation cache miss for {}, fetching from API", ip);
                self.fetch_from_api(ip).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ExternalAPI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_api_response() {
        let json = serde_json::json!({
            "status": "success",
            "countryCode": "DE",
            "city": "Frankfurt am Main",
            "proxy": false,
            "hosting": true
        });
        let rep = ExternalApiReputation::parse_response(&json).unwrap();
        assert!(!rep.proxy);
        assert!(rep.datacenter);
        assert_eq!(rep.geo.country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_parse_fail_status_is_unknown() {
        let json = serde_json::json!({"status": "fail", "message": "private range"});
        assert!(ExternalApiReputation::parse_response(&json).is_none());
    }

    #[test]
    fn test_parse_alternate_field_names() {
        let json = serde_json::json!({"vpn": true, "country_code": "US"});
        let rep = ExternalApiReputation::parse_response(&json).unwrap();
        assert!(rep.proxy);
        assert_eq!(rep.geo.country.as_deref(), Some("US"));
    }

    /// 依赖外部网络服务，CI 环境可能失败
    #[tokio::test]
    #[ignore]
    async fn test_external_api_lookup() {
        let provider = ExternalApiReputation::new(
            "http://ip-api.com/json/{ip}?fields=status,countryCode,city,proxy,hosting",
            Duration::from_secs(60),
        );
        let first = provider.lookup("8.8.8.8").await;
        assert!(first.is_some());
        assert_eq!(first, provider.lookup("8.8.8.8").await);
    }
}
