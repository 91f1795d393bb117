//! 认证请求客户端
//!
//! 每次调用都带上当前 access token。遇到凭证过期的 401 时用 refresh token
//! 换取新 token，并把原请求重放一次。整个过程外层包一层重试，瞬时故障
//! 在 401 处理之前就会被重试。

use super::refresh::TokenRefresher;
use crate::config::AuthConfig;
use crate::credential::codec::{self, DEFAULT_EXPIRING_SOON_SECS};
use crate::credential::{cookie_header_with, CookieCredentials};
use crate::resilience::{Classify, ErrorKind, Retrier, RetryConfig};
use crate::transport::{NetworkFailure, OutboundRequest, Transport, UpstreamResponse};
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, COOKIE};
use reqwest::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// 认证调用失败
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    /// 没有收到后端响应
    #[error(transparent)]
    Network(#[from] NetworkFailure),

    /// 需要重新登录（没有凭证，或刷新失败）
    #[error("需要重新登录")]
    LoginRequired,
}

/// 认证调用的成功结果
#[derive(Debug, Clone)]
pub struct AuthenticatedResponse {
    pub response: UpstreamResponse,
    /// 本次调用中刷新得到的 `set-cookie`，需要转发给浏览器
    pub set_cookies: Vec<HeaderValue>,
}

impl AuthenticatedResponse {
    fn plain(response: UpstreamResponse) -> Self {
        Self {
            response,
            set_cookies: Vec::new(),
        }
    }

    /// 是否经过了 token 刷新
    pub fn refreshed(&self) -> bool {
        !self.set_cookies.is_empty()
    }
}

pub type AuthOutcome = Result<AuthenticatedResponse, AuthError>;

impl Classify for AuthOutcome {
    fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Ok(resp) => resp.response.failure_kind(),
            Err(AuthError::Network(_)) => Some(ErrorKind::Network),
            Err(AuthError::LoginRequired) => Some(ErrorKind::Unauthorized),
        }
    }
}

/// 认证请求客户端
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    refresher: Arc<TokenRefresher>,
    retrier: Retrier,
    /// 小写的过期标记
    expiry_markers: Vec<String>,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        refresher: Arc<TokenRefresher>,
        retry: RetryConfig,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            transport,
            refresher,
            retrier: Retrier::new(retry),
            expiry_markers: auth
                .expiry_markers
                .iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn refresher(&self) -> &Arc<TokenRefresher> {
        &self.refresher
    }

    /// 发起认证请求
    ///
    /// 凭证从 `credentials` 中按次读取，刷新成功后写回
    pub async fn fetch(&self, request: OutboundRequest, credentials: &CookieCredentials) -> AuthOutcome {
        if credentials.credentials().is_anonymous() {
            tracing::info!("[AUTH_CLIENT] 没有任何凭证，需要登录");
            return Err(AuthError::LoginRequired);
        }

        if let Some(token) = credentials.access_token() {
            // 本地解码只作提示，是否过期以后端的 401 为准
            if codec::is_expiring_soon(&token, DEFAULT_EXPIRING_SOON_SECS) {
                tracing::debug!("[AUTH_CLIENT] access token 即将过期或无法解码");
            }
        }

        let issued = Mutex::new(Vec::new());
        let outcome = self
            .retrier
            .execute_with_retry(|| self.attempt(request.clone(), credentials, &issued))
            .await;

        outcome.map(|mut resp| {
            resp.set_cookies = issued.into_inner();
            resp
        })
    }

    async fn attempt(
        &self,
        request: OutboundRequest,
        credentials: &CookieCredentials,
        issued: &Mutex<Vec<HeaderValue>>,
    ) -> AuthOutcome {
        let pair = credentials.credentials();
        let names = self.refresher.cookie_names();

        let first = match &pair.access_token {
            Some(token) => with_cookie(request.clone(), &names.access, token),
            None => request.clone(),
        };
        let resp = self.transport.send(first).await?;

        if resp.status != StatusCode::UNAUTHORIZED {
            return Ok(AuthenticatedResponse::plain(resp));
        }

        if !self.is_credential_expired(&resp) {
            tracing::debug!("[AUTH_CLIENT] 业务 401，原样返回");
            return Ok(AuthenticatedResponse::plain(resp));
        }

        let Some(refresh_token) = pair.refresh_token else {
            tracing::info!("[AUTH_CLIENT] access token 已过期且没有 refresh token");
            return Err(AuthError::LoginRequired);
        };

        let tokens = match self.refresher.refresh(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!("[AUTH_CLIENT] 刷新失败，需要重新登录: {}", e);
                return Err(AuthError::LoginRequired);
            }
        };

        credentials.set_access_token(tokens.access_token.clone());
        if let Some(rotated) = &tokens.refresh_token {
            credentials.set_refresh_token(rotated.clone());
        }
        issued.lock().extend(tokens.set_cookies);

        tracing::info!("[AUTH_CLIENT] token 已刷新，重放原请求");
        let replay = with_cookie(request, &names.access, &tokens.access_token);
        let resp = self.transport.send(replay).await?;
        Ok(AuthenticatedResponse::plain(resp))
    }

    /// 401 响应体包含任一过期标记（不区分大小写）
    fn is_credential_expired(&self, resp: &UpstreamResponse) -> bool {
        let body = resp.text().to_lowercase();
        self.expiry_markers.iter().any(|m| body.contains(m.as_str()))
    }
}

fn with_cookie(mut request: OutboundRequest, name: &str, value: &str) -> OutboundRequest {
    if let Some(cookie) = cookie_header_with(&request.headers, name, value) {
        request.headers.insert(COOKIE, cookie);
    }
    request
}
