//! 代理请求处理
//!
//! 把入站请求转发到目标服务，并把后端响应按内容类型重建后返回。
//! Mock 模式下直接返回 fixture，不访问网络。

use super::outbound::{build_client, ClientBuildError};
use super::headers::{forwardable_request_headers, relayable_response_headers};
use super::mock::MockFixture;
use crate::auth::{AuthError, AuthenticatedClient, TokenRefresher};
use crate::config::GatewayConfig;
use crate::credential::{clear_cookie, CookieCredentials, CookieNames};
use crate::error::GatewayError;
use crate::logger::preview_body;
use crate::transport::{NetworkFailure, OutboundRequest, ReqwestTransport, Transport, UpstreamResponse};
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 单次调用的路由配置
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub service: String,
    /// 以 `/` 开头，包含查询串
    pub path: String,
    pub method: Method,
    pub mock_fixture: Option<MockFixture>,
}

impl RouteConfig {
    pub fn new(service: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            service: service.into(),
            path,
            method,
            mock_fixture: None,
        }
    }

    pub fn with_mock_fixture(mut self, fixture: Option<MockFixture>) -> Self {
        self.mock_fixture = fixture;
        self
    }
}

/// 入站请求（body 已读入内存，空 body 视为没有 body）
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(headers: HeaderMap, body: Bytes) -> Self {
        Self { headers, body }
    }
}

/// 代理请求处理器
pub struct ProxyHandler {
    services: BTreeMap<String, String>,
    mock_mode: bool,
    direct_forward: bool,
    transport: Arc<dyn Transport>,
    auth_client: Option<Arc<AuthenticatedClient>>,
    cookie_names: CookieNames,
    login_path: String,
}

impl ProxyHandler {
    pub fn new(
        config: &GatewayConfig,
        transport: Arc<dyn Transport>,
        auth_client: Option<Arc<AuthenticatedClient>>,
    ) -> Self {
        Self {
            services: config.services.clone(),
            mock_mode: config.mock.enabled,
            direct_forward: config.proxy.direct_forward,
            transport,
            auth_client,
            cookie_names: config.auth.cookie_names(),
            login_path: config.auth.login_path.clone(),
        }
    }

    /// 按配置创建出站客户端、认证客户端和处理器
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ClientBuildError> {
        let client = build_client(&config.proxy)?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(client));

        let auth_client = config.auth_base_url().map(|base| {
            let refresher = Arc::new(TokenRefresher::new(
                transport.clone(),
                base,
                &config.auth,
                &config.retry,
            ));
            Arc::new(AuthenticatedClient::new(
                transport.clone(),
                refresher,
                config.retry.clone(),
                &config.auth,
            ))
        });
        if config.proxy.direct_forward || (auth_client.is_none() && !config.mock.enabled) {
            tracing::warn!("[PROXY] 认证流程已关闭，所有请求直接转发");
        }

        Ok(Self::new(config, transport, auth_client))
    }

    pub fn mock_mode(&self) -> bool {
        self.mock_mode
    }

    pub fn auth_client(&self) -> Option<&Arc<AuthenticatedClient>> {
        self.auth_client.as_ref()
    }

    /// 服务的基础 URL
    pub fn service_url(&self, service: &str) -> Option<&str> {
        self.services
            .get(service)
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    /// 处理一次代理请求
    pub async fn handle(&self, inbound: InboundRequest, route: RouteConfig) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        match self.dispatch(inbound, &route, &request_id).await {
            Ok(response) => response,
            Err(err) => {
                err.log_with_context(&request_id);
                err.into_response()
            }
        }
    }

    async fn dispatch(
        &self,
        inbound: InboundRequest,
        route: &RouteConfig,
        request_id: &str,
    ) -> Result<Response, GatewayError> {
        if self.mock_mode {
            return match &route.mock_fixture {
                Some(fixture) => {
                    tracing::info!(
                        "[PROXY] [{}] mock {} {}{}",
                        request_id,
                        route.method,
                        route.service,
                        route.path
                    );
                    Ok(fixture.to_response())
                }
                None => Err(GatewayError::MockNotConfigured {
                    service: route.service.clone(),
                    method: route.method.to_string(),
                    path: route.path.clone(),
                }),
            };
        }

        let base = self
            .service_url(&route.service)
            .ok_or_else(|| GatewayError::ServiceUrlMissing {
                service: route.service.clone(),
            })?;
        let url = format!("{}{}", base, route.path);

        let body = buffer_body(&inbound);
        let headers = forwardable_request_headers(&inbound.headers, body.as_ref().map(Bytes::len));
        let request = OutboundRequest::new(route.method.clone(), &url)
            .with_headers(headers)
            .with_body(body);

        tracing::info!(
            "[PROXY] [{}] {} {} -> {}",
            request_id,
            route.method,
            route.path,
            route.service
        );

        let (upstream, issued) = match (&self.auth_client, self.direct_forward) {
            (Some(client), false) => {
                let credentials = CookieCredentials::from_headers(&inbound.headers, &self.cookie_names);
                match client.fetch(request, &credentials).await {
                    Ok(resp) => (resp.response, resp.set_cookies),
                    Err(AuthError::LoginRequired) => {
                        tracing::info!("[PROXY] [{}] 需要重新登录，跳转 {}", request_id, self.login_path);
                        return Ok(self.login_redirect());
                    }
                    Err(AuthError::Network(failure)) => {
                        return Err(network_error(&route.service, failure))
                    }
                }
            }
            _ => {
                let resp = self
                    .transport
                    .send(request)
                    .await
                    .map_err(|failure| network_error(&route.service, failure))?;
                (resp, Vec::new())
            }
        };

        Ok(build_response(upstream, issued, request_id))
    }

    /// 303 跳转到登录页，同时清除两个凭证 Cookie
    pub fn login_redirect(&self) -> Response {
        let mut response = StatusCode::SEE_OTHER.into_response();
        let headers = response.headers_mut();
        if let Ok(location) = HeaderValue::from_str(&self.login_path) {
            headers.insert(LOCATION, location);
        }
        for name in [&self.cookie_names.access, &self.cookie_names.refresh] {
            if let Ok(value) = HeaderValue::from_str(&clear_cookie(name).to_string()) {
                headers.append(SET_COOKIE, value);
            }
        }
        response
    }
}

/// 读入请求体，空 body 不转发
fn buffer_body(inbound: &InboundRequest) -> Option<Bytes> {
    if inbound.body.is_empty() {
        return None;
    }
    let is_multipart = inbound
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("multipart/"));
    if is_multipart {
        tracing::debug!("[PROXY] 缓冲 multipart 请求体 {} 字节", inbound.body.len());
    }
    Some(inbound.body.clone())
}

fn network_error(service: &str, failure: NetworkFailure) -> GatewayError {
    if failure.is_connection_refused() {
        GatewayError::ServiceUnavailable {
            service: service.to_string(),
        }
    } else {
        GatewayError::UpstreamFetchFailed {
            service: service.to_string(),
            reason: failure.to_string(),
        }
    }
}

fn is_json(media_type: &str) -> bool {
    media_type == "application/json" || media_type.ends_with("+json")
}

fn is_binary(media_type: &str) -> bool {
    media_type.starts_with("image/") || media_type == "application/octet-stream"
}

/// 按后端响应重建返回给浏览器的响应
///
/// `issued` 为刷新 token 时得到的 `set-cookie`，排在后端自己的 Cookie 之前
pub fn build_response(upstream: UpstreamResponse, issued: Vec<HeaderValue>, request_id: &str) -> Response {
    let status = upstream.status;
    let media_type = upstream.media_type().unwrap_or_default();

    let mut headers = HeaderMap::new();
    for cookie in issued {
        headers.append(SET_COOKIE, cookie);
    }
    for (name, value) in relayable_response_headers(&upstream.headers).iter() {
        headers.append(name.clone(), value.clone());
    }

    let body = if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        Body::empty()
    } else if is_json(&media_type) {
        match serde_json::from_slice::<serde_json::Value>(&upstream.body) {
            Ok(value) => {
                if !status.is_success() {
                    tracing::debug!(
                        "[PROXY] [{}] 后端返回 {}: {}",
                        request_id,
                        status,
                        preview_body(&value.to_string(), 200)
                    );
                }
                Body::from(value.to_string())
            }
            Err(e) => {
                tracing::warn!("[PROXY] [{}] JSON 响应解析失败，原样返回: {}", request_id, e);
                Body::from(upstream.body)
            }
        }
    } else if is_binary(&media_type) {
        tracing::info!(
            "[PROXY] [{}] 二进制响应 {} 字节 ({})",
            request_id,
            upstream.body.len(),
            media_type
        );
        Body::from(upstream.body)
    } else {
        if !status.is_success() {
            tracing::debug!(
                "[PROXY] [{}] 后端返回 {}: {}",
                request_id,
                status,
                preview_body(&upstream.text(), 200)
            );
        }
        Body::from(upstream.body)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
