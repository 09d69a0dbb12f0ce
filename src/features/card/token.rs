use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// token 固定长度：16 字节随机数的 base64url（无填充）编码
pub const TOKEN_LEN: usize = 22;

/// 生成分享链接使用的不可猜测 token
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 校验 token 格式：恰好 22 个 `[A-Za-z0-9_-]` 字符
pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_valid_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(is_valid_token(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_wrong_length_or_charset() {
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("abc"));
        assert!(!is_valid_token("AAAAAAAAAAAAAAAAAAAAA=")); // 长度为 22，但不允许填充字符
        assert!(!is_valid_token("AAAAAAAAAAAAAAAAAAAAA/"));
        assert!(is_valid_token("AAAAAAAAAAAAAAAAAAAA-_"));
    }
}
