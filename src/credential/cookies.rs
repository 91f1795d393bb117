//! 凭证 Cookie 读写
//!
//! access/refresh 两个 Cookie 的解析、构造和清除

use axum_extra::extract::cookie::{Cookie, SameSite};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};
use std::sync::Arc;
use time::Duration;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// 一对凭证
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: non_empty(access_token.into()),
            refresh_token: non_empty(refresh_token.into()),
        }
    }

    /// 带有非空 access token 才算已认证
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// 两个 token 都没有，视为从未登录
    pub fn is_anonymous(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Cookie 名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieNames {
    pub access: String,
    pub refresh: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            access: ACCESS_TOKEN_COOKIE.to_string(),
            refresh: REFRESH_TOKEN_COOKIE.to_string(),
        }
    }
}

/// 解析请求中的全部 `cookie` 头
pub fn parse_cookie_header(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| {
            Cookie::split_parse(raw.to_string())
                .filter_map(Result::ok)
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// 从请求头读取凭证
pub fn read_credentials(headers: &HeaderMap, names: &CookieNames) -> CredentialPair {
    let mut pair = CredentialPair::default();
    for (name, value) in parse_cookie_header(headers) {
        if name == names.access {
            pair.access_token = non_empty(value);
        } else if name == names.refresh {
            pair.refresh_token = non_empty(value);
        }
    }
    pair
}

/// 重建 `cookie` 头，把指定 Cookie 替换为新值（不存在则追加）
pub fn cookie_header_with(headers: &HeaderMap, name: &str, value: &str) -> Option<HeaderValue> {
    let mut replaced = false;
    let mut pairs: Vec<String> = parse_cookie_header(headers)
        .into_iter()
        .map(|(k, v)| {
            if k == name {
                replaced = true;
                format!("{k}={value}")
            } else {
                format!("{k}={v}")
            }
        })
        .collect();
    if !replaced {
        pairs.push(format!("{name}={value}"));
    }
    HeaderValue::from_str(&pairs.join("; ")).ok()
}

/// 只携带指定 Cookie 的 `cookie` 头
pub fn single_cookie_header(name: &str, value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{name}={value}")).ok()
}

/// 从响应的 `set-cookie` 头中取出指定 Cookie 的值
pub fn extract_set_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| Cookie::parse(raw.to_string()).ok())
        .find(|c| c.name() == name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}

/// 响应中全部 `set-cookie` 头的原始值
pub fn set_cookie_values(headers: &HeaderMap) -> Vec<HeaderValue> {
    headers.get_all(SET_COOKIE).iter().cloned().collect()
}

/// 构造凭证 Cookie
pub fn credential_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// 构造清除用的 Cookie（Max-Age=0）
pub fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .http_only(true)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// 基于 Cookie 的凭证存储
///
/// 每次调用都从这里读取当前凭证，刷新后写回
#[derive(Debug, Clone, Default)]
pub struct CookieCredentials {
    inner: Arc<RwLock<CredentialPair>>,
}

impl CookieCredentials {
    pub fn new(pair: CredentialPair) -> Self {
        Self {
            inner: Arc::new(RwLock::new(pair)),
        }
    }

    /// 从入站请求的 `cookie` 头构造
    pub fn from_headers(headers: &HeaderMap, names: &CookieNames) -> Self {
        Self::new(read_credentials(headers, names))
    }

    pub fn credentials(&self) -> CredentialPair {
        self.inner.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.read().refresh_token.clone()
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        self.inner.write().access_token = non_empty(token.into());
    }

    pub fn set_refresh_token(&self, token: impl Into<String>) {
        self.inner.write().refresh_token = non_empty(token.into());
    }

    pub fn replace(&self, pair: CredentialPair) {
        *self.inner.write() = pair;
    }

    pub fn clear(&self) {
        *self.inner.write() = CredentialPair::default();
    }
}
