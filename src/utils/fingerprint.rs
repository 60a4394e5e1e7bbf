use xxhash_rust::xxh64::xxh64;

/// 16 位十六进制 xxHash64
fn hex_hash(s: &str) -> String {
    format!("{:016x}", xxh64(s.as_bytes(), 0))
}

pub fn hash_user_agent(user_agent: &str) -> String {
    hex_hash(user_agent)
}

/// 访客指纹：`xxh64(user_agent | ip | salt)`，不直接保存原始 UA/IP 组合
pub fn fingerprint(user_agent: &str, ip: &str, salt: &str) -> String {
    hex_hash(&format!("{}|{}|{}", user_agent, ip, salt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("Mozilla/5.0", "203.0.113.7", "salt");
        let b = fingerprint("Mozilla/5.0", "203.0.113.7", "salt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_depends_on_every_part() {
        let base = fingerprint("Mozilla/5.0", "203.0.113.7", "salt");
        assert_ne!(base, fingerprint("Mozilla/5.1", "203.0.113.7", "salt"));
        assert_ne!(base, fingerprint("Mozilla/5.0", "203.0.113.8", "salt"));
        assert_ne!(base, fingerprint("Mozilla/5.0", "203.0.113.7", "pepper"));
    }

    #[test]
    fn test_hash_user_agent() {
        assert_eq!(hash_user_agent(""), format!("{:016x}", xxh64(b"", 0)));
        assert_ne!(hash_user_agent("curl/8.0"), hash_user_agent("curl/8.1"));
    }
}
