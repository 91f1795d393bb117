//! Token 声明解码
//!
//! 只解析 JWT 中段的 claims，不做任何签名校验。结果仅用于调度和提示，
//! 访问控制必须由签发方服务端重新校验。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

/// 默认的"即将过期"阈值（秒）
pub const DEFAULT_EXPIRING_SOON_SECS: i64 = 300;

/// 未经校验的 Token 声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "sub", default)]
    pub subject: String,
    #[serde(default, alias = "tenant_id", alias = "org_id")]
    pub tenant: Option<String>,
    #[serde(rename = "iat", default)]
    pub issued_at: Option<i64>,
    #[serde(rename = "exp", default)]
    pub expires_at: Option<i64>,
}

/// 解码 Token 声明，任何格式问题都返回 `None`
pub fn decode(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// 相对给定时间点的剩余有效秒数
pub fn expires_in_seconds_at(token: &str, now: i64) -> Option<i64> {
    let expires_at = decode(token)?.expires_at?;
    Some(expires_at.saturating_sub(now).max(0))
}

/// 剩余有效秒数，没有 claims 或没有过期时间时返回 `None`
pub fn expires_in_seconds(token: &str) -> Option<i64> {
    expires_in_seconds_at(token, chrono::Utc::now().timestamp())
}

/// 是否已过期（无法判断时按已过期处理）
pub fn is_expired(token: &str) -> bool {
    expires_in_seconds(token).map_or(true, |secs| secs <= 0)
}

/// 是否将在阈值内过期（无法判断时按即将过期处理）
pub fn is_expiring_soon(token: &str, threshold_secs: i64) -> bool {
    expires_in_seconds(token).map_or(true, |secs| secs <= threshold_secs)
}

#[cfg(test)]
pub(crate) fn encode_for_test(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn test_decode_valid_token() {
        let token = encode_for_test(&json!({
            "sub": "user-1",
            "tenant_id": "org-9",
            "iat": 1_700_000_000,
            "exp": 1_700_000_900
        }));

        let claims = decode(&token).unwrap();
        assert_eq!(claims.subject, "user-1");
        assert_eq!(claims.tenant.as_deref(), Some("org-9"));
        assert_eq!(claims.issued_at, Some(1_700_000_000));
        assert_eq!(claims.expires_at, Some(1_700_000_900));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("only.two"), None);
        assert_eq!(decode("a.b.c.d"), None);
        assert_eq!(decode("a.!!!not-base64!!!.c"), None);

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert_eq!(decode(&not_json), None);
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"u"}"#);
        assert!(payload.ends_with('='));
        let claims = decode(&format!("h.{payload}.s")).unwrap();
        assert_eq!(claims.subject, "u");
    }

    #[test]
    fn test_fresh_token_is_not_expired() {
        let token = encode_for_test(&json!({"sub": "u", "exp": now() + 3600}));

        assert!(!is_expired(&token));
        let remaining = expires_in_seconds(&token).unwrap();
        assert!((3595..=3600).contains(&remaining));
    }

    #[test]
    fn test_past_token_is_expired() {
        let token = encode_for_test(&json!({"sub": "u", "exp": now() - 1}));

        assert!(is_expired(&token));
        assert_eq!(expires_in_seconds(&token), Some(0));
    }

    #[test]
    fn test_missing_expiry_counts_as_expired() {
        let token = encode_for_test(&json!({"sub": "u"}));

        assert_eq!(expires_in_seconds(&token), None);
        assert!(is_expired(&token));
        assert!(is_expiring_soon(&token, 60));
        assert!(is_expiring_soon("garbage", DEFAULT_EXPIRING_SOON_SECS));
    }

    #[test]
    fn test_expiring_soon_threshold() {
        let at = 1_000_000;
        let token = encode_for_test(&json!({"sub": "u", "exp": at + 60}));
        assert_eq!(expires_in_seconds_at(&token, at), Some(60));

        let soon = encode_for_test(&json!({"sub": "u", "exp": now() + 30}));
        let later = encode_for_test(&json!({"sub": "u", "exp": now() + 3600}));
        assert!(is_expiring_soon(&soon, 60));
        assert!(!is_expiring_soon(&later, 60));
        assert!(is_expiring_soon(&later, 7200));
    }

    #[test]
    fn test_extreme_expiry_values_do_not_overflow() {
        let ancient = encode_for_test(&json!({"sub": "u", "exp": i64::MIN}));
        assert_eq!(expires_in_seconds_at(&ancient, 1_700_000_000), Some(0));
        assert!(is_expired(&ancient));
        assert!(is_expiring_soon(&ancient, DEFAULT_EXPIRING_SOON_SECS));

        let distant = encode_for_test(&json!({"sub": "u", "exp": i64::MAX}));
        assert_eq!(
            expires_in_seconds_at(&distant, -1_700_000_000),
            Some(i64::MAX)
        );
        assert!(!is_expired(&distant));
        assert!(!is_expiring_soon(&distant, DEFAULT_EXPIRING_SOON_SECS));
    }
}
