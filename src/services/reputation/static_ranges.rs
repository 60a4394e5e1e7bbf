use async_trait::async_trait;

use super::provider::{IpReputation, IpReputationLookup};
use crate::utils::ip::{ip_in_any, parse_visitor_ip};

/// 基于配置网段的离线判定
pub struct StaticRangeReputation {
    proxy_ranges: Vec<String>,
    datacenter_ranges: Vec<String>,
}

impl StaticRangeReputation {
    pub fn new(proxy_ranges: Vec<String>, datacenter_ranges: Vec<String>) -> Self {
        Self {
            proxy_ranges,
            datacenter_ranges,
        }
    }
}

#[async_trait]
impl IpReputationLookup for StaticRangeReputation {
    async fn lookup(&self, ip: &str) -> Option<IpReputation> {
        let addr = parse_visitor_ip(ip)?;
        Some(IpReputation {
            proxy: ip_in_any(&addr, &self.proxy_ranges),
            datacenter: ip_in_any(&addr, &self.datacenter_ranges),
            geo: Default::default(),
        })
    }

    fn name(&self) -> &'static str {
        "StaticRanges"
    }
}
