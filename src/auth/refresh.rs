//! 认证服务调用
//!
//! refresh 和 token-info 两个接口，以及供刷新调度器使用的 [`HttpTokenApi`]。

use crate::config::AuthConfig;
use crate::credential::{
    extract_set_cookie, set_cookie_values, single_cookie_header, CookieCredentials, CookieNames,
    TokenApi,
};
use crate::error::GatewayError;
use crate::resilience::{Retrier, RetryConfig};
use crate::transport::{OutboundRequest, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;

/// 刷新得到的新凭证
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// 认证服务轮换了 refresh token 时才有
    pub refresh_token: Option<String>,
    /// refresh 响应中的全部 `set-cookie`，需要转发给浏览器
    pub set_cookies: Vec<HeaderValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfoResponse {
    expires_in: i64,
}

/// 认证服务客户端
pub struct TokenRefresher {
    transport: Arc<dyn Transport>,
    refresh_url: String,
    token_info_url: String,
    cookie_names: CookieNames,
    retrier: Retrier,
}

impl TokenRefresher {
    /// `retry` 为外层重试配置，刷新请求沿用其退避参数，重试次数取 `auth.refresh_retries`
    pub fn new(
        transport: Arc<dyn Transport>,
        auth_base_url: &str,
        auth: &AuthConfig,
        retry: &RetryConfig,
    ) -> Self {
        let base = auth_base_url.trim_end_matches('/');
        Self {
            transport,
            refresh_url: format!("{}{}", base, auth.refresh_path),
            token_info_url: format!("{}{}", base, auth.token_info_path),
            cookie_names: auth.cookie_names(),
            retrier: Retrier::new(retry.clone().with_max_retries(auth.refresh_retries)),
        }
    }

    pub fn cookie_names(&self) -> &CookieNames {
        &self.cookie_names
    }

    /// 用 refresh token 换取新的 access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, GatewayError> {
        let headers = cookie_headers(&self.cookie_names.refresh, refresh_token)?;

        let outcome = self
            .retrier
            .execute_with_retry(move || {
                let request = OutboundRequest::new(Method::POST, &self.refresh_url)
                    .with_headers(headers.clone());
                self.transport.send(request)
            })
            .await;

        let resp = outcome.map_err(|e| GatewayError::TokenRefresh(e.to_string()))?;
        if !resp.is_success() {
            return Err(GatewayError::TokenRefresh(format!(
                "认证服务返回 {}",
                resp.status
            )));
        }

        let access_token = extract_set_cookie(&resp.headers, &self.cookie_names.access)
            .ok_or_else(|| GatewayError::TokenRefresh("响应中没有新的 access token".to_string()))?;
        let refresh_token = extract_set_cookie(&resp.headers, &self.cookie_names.refresh);

        tracing::info!(
            "[AUTH_REFRESH] 刷新成功，refresh token {}",
            if refresh_token.is_some() { "已轮换" } else { "未变" }
        );

        Ok(RefreshedTokens {
            access_token,
            refresh_token,
            set_cookies: set_cookie_values(&resp.headers),
        })
    }

    /// 查询 access token 的剩余有效秒数
    pub async fn token_info(&self, access_token: &str) -> Result<i64, GatewayError> {
        let headers = cookie_headers(&self.cookie_names.access, access_token)?;
        let request =
            OutboundRequest::new(Method::GET, &self.token_info_url).with_headers(headers);

        let resp = self
            .transport
            .send(request)
            .await
            .map_err(|e| GatewayError::TokenInfo(e.to_string()))?;
        if !resp.is_success() {
            return Err(GatewayError::TokenInfo(format!(
                "认证服务返回 {}",
                resp.status
            )));
        }

        let info: TokenInfoResponse = serde_json::from_slice(&resp.body)
            .map_err(|e| GatewayError::TokenInfo(format!("响应格式无效: {e}")))?;
        Ok(info.expires_in)
    }
}

fn cookie_headers(name: &str, value: &str) -> Result<HeaderMap, GatewayError> {
    let cookie = single_cookie_header(name, value)
        .ok_or_else(|| GatewayError::Internal(format!("无法构造 {name} cookie")))?;
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, cookie);
    Ok(headers)
}

/// 基于 HTTP 接口和 Cookie 凭证存储的 [`TokenApi`]
pub struct HttpTokenApi {
    refresher: Arc<TokenRefresher>,
    credentials: CookieCredentials,
}

impl HttpTokenApi {
    pub fn new(refresher: Arc<TokenRefresher>, credentials: CookieCredentials) -> Self {
        Self {
            refresher,
            credentials,
        }
    }
}

#[async_trait]
impl TokenApi for HttpTokenApi {
    async fn token_info(&self) -> Result<i64, GatewayError> {
        match self.credentials.access_token() {
            Some(token) => self.refresher.token_info(&token).await,
            None => Ok(0),
        }
    }

    async fn refresh(&self) -> Result<(), GatewayError> {
        let refresh_token = self
            .credentials
            .refresh_token()
            .ok_or_else(|| GatewayError::TokenRefresh("没有 refresh token".to_string()))?;

        let tokens = self.refresher.refresh(&refresh_token).await?;
        self.credentials.set_access_token(tokens.access_token);
        if let Some(rotated) = tokens.refresh_token {
            self.credentials.set_refresh_token(rotated);
        }
        Ok(())
    }
}
