//! 推荐码与短码生成

use base64::Engine;
use rand::RngExt;

const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// 推荐码随机部分长度（不含前缀）
pub const REFERRAL_CODE_RANDOM_LEN: usize = 8;
pub const SHORT_CODE_LEN: usize = 7;

const MAX_CODE_LEN: usize = 64;

pub fn generate_random_code(length: usize) -> String {
    use std::iter;

    iter::repeat_with(|| CODE_CHARS[rand::random_range(0..CODE_CHARS.len())] as char)
        .take(length)
        .collect()
}

/// `{prefix}{8 位字母数字}`
pub fn generate_referral_code(prefix: &str) -> String {
    format!("{}{}", prefix, generate_random_code(REFERRAL_CODE_RANDOM_LEN))
}

pub fn generate_short_code() -> String {
    generate_random_code(SHORT_CODE_LEN)
}

/// 追踪 Cookie 值（32 bytes = 256 bits，Base64 URL 编码）
pub fn generate_cookie_value() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// 推荐码 / 短码格式校验：4-64 位，字母数字与 `-` `_`
pub fn is_valid_referral_code(code: &str) -> bool {
    (4..=MAX_CODE_LEN).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_referral_code_shape() {
        let code = generate_referral_code("REF");
        assert_eq!(code.len(), 3 + REFERRAL_CODE_RANDOM_LEN);
        assert!(code.starts_with("REF"));
        assert!(code[3..].bytes().all(|b| b.is_ascii_alphanumeric()));
        assert!(is_valid_referral_code(&code));
    }

    #[test]
    fn test_generate_short_code_shape() {
        let code = generate_short_code();
        assert_eq!(code.len(), SHORT_CODE_LEN);
        assert!(is_valid_referral_code(&code));
    }

    #[test]
    fn test_cookie_value_is_url_safe_and_random() {
        let a = generate_cookie_value();
        let b = generate_cookie_value();
        assert_eq!(a.len(), 43);
        assert!(
            a.bytes()
                .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_')
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_valid_referral_code() {
        assert!(is_valid_referral_code("REFab12CD34"));
        assert!(is_valid_referral_code("summer-sale_1"));
        assert!(!is_valid_referral_code("abc"));
        assert!(!is_valid_referral_code("REF 1234"));
        assert!(!is_valid_referral_code("REF<script>"));
        assert!(!is_valid_referral_code(&"a".repeat(65)));
        assert!(!is_valid_referral_code(""));
    }
}
