//! IP 地址处理工具
//!
//! - 访客 IP 解析（支持 ip:port）
//! - CIDR 匹配
//! - 私有 IP 检测

use std::net::{IpAddr, SocketAddr};

/// 解析访客 IP，允许带端口
pub fn parse_visitor_ip(ip: &str) -> Option<IpAddr> {
    let ip = ip.trim();
    if let Ok(socket_addr) = ip.parse::<SocketAddr>() {
        Some(socket_addr.ip())
    } else {
        ip.parse::<IpAddr>().ok()
    }
}

/// 检查 IP 是否为私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            // IPv6 私有地址：
            // - fc00::/7 (ULA, RFC 4193)
            // - fe80::/10 (Link-local)
            // - ::1 (Loopback)
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// CIDR 检查
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };

    let Ok(prefix_len): Result<u8, _> = prefix_len.parse() else {
        return false;
    };

    let Ok(network_addr) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network_addr) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix_len > 32 {
                return false;
            }
            let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
            let ip_bits = u32::from_be_bytes(ip.octets());
            let net_bits = u32::from_be_bytes(net.octets());
            (ip_bits & mask) == (net_bits & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix_len > 128 {
                return false;
            }
            let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
            let ip_bits = u128::from_be_bytes(ip.octets());
            let net_bits = u128::from_be_bytes(net.octets());
            (ip_bits & mask) == (net_bits & mask)
        }
        _ => false, // IPv4 vs IPv6 不匹配
    }
}

/// IP 是否落在任一 CIDR（或单个 IP）中
pub fn ip_in_any(ip: &IpAddr, ranges: &[String]) -> bool {
    ranges.iter().any(|range| {
        if range.contains('/') {
            ip_in_cidr(ip, range)
        } else {
            range.parse::<IpAddr>().is_ok_and(|single| single == *ip)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_visitor_ip() {
        assert_eq!(
            parse_visitor_ip("203.0.113.5:443"),
            Some("203.0.113.5".parse().unwrap())
        );
        assert_eq!(parse_visitor_ip(" ::1 "), Some("::1".parse().unwrap()));
        assert_eq!(parse_visitor_ip("not-an-ip"), None);
    }

    #[test]
    fn test_is_private_or_local_ipv4() {
        for ip in ["10.0.0.1", "172.16.5.4", "192.168.1.1", "127.0.0.1", "169.254.0.9"] {
            assert!(is_private_or_local(&ip.parse().unwrap()), "{ip}");
        }
        for ip in ["8.8.8.8", "203.0.113.7", "172.32.0.1"] {
            assert!(!is_private_or_local(&ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn test_is_private_or_local_ipv6() {
        for ip in ["::1", "fc00::1", "fd12:3456::1", "fe80::1"] {
            assert!(is_private_or_local(&ip.parse().unwrap()), "{ip}");
        }
        assert!(!is_private_or_local(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_ip_in_cidr() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        assert!(ip_in_cidr(&ip, "192.168.1.0/24"));
        assert!(!ip_in_cidr(&ip, "192.168.2.0/24"));
        assert!(ip_in_cidr(&ip, "0.0.0.0/0"));
        assert!(!ip_in_cidr(&ip, "192.168.1.0/33"));
        assert!(!ip_in_cidr(&ip, "garbage"));

        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(ip_in_cidr(&v6, "2001:db8::/32"));
        assert!(!ip_in_cidr(&v6, "192.168.1.0/24"));
    }

    #[test]
    fn test_ip_in_any() {
        let ip: IpAddr = "34.120.1.9".parse().unwrap();
        let ranges = vec!["10.0.0.0/8".to_string(), "34.120.0.0/14".to_string()];
        assert!(ip_in_any(&ip, &ranges));
        assert!(ip_in_any(&ip, &["34.120.1.9".to_string()]));
        assert!(!ip_in_any(&ip, &["10.0.0.0/8".to_string()]));
    }
}
