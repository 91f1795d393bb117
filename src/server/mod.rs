//! HTTP 服务器
//!
//! 路由：
//! - `ANY /api/:service/*path` 代理到后端服务
//! - `POST /auth/logout` 登出
//! - `GET /healthz` 健康检查

pub mod handlers;

use crate::config::GatewayConfig;
use crate::credential::CredentialPair;
use crate::proxy::{ClientBuildError, ProxyHandler};
use crate::session::GatewaySession;
use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub proxy: Arc<ProxyHandler>,
    /// 网关自身持有凭证时的会话（登出时取消其刷新定时器）
    pub session: Option<GatewaySession>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, ClientBuildError> {
        let proxy = ProxyHandler::from_config(&config)?;
        let session = service_account_session(&config, &proxy);
        Ok(Self {
            config: Arc::new(config),
            proxy: Arc::new(proxy),
            session,
        })
    }

    /// 开启服务账号会话的主动刷新，没有会话时什么都不做
    pub async fn start_session(&self) -> Option<Duration> {
        let session = self.session.as_ref()?;
        let delay = session.start().await;
        match delay {
            Some(delay) => tracing::info!("[SERVER] 服务账号刷新已启动，{:?} 后刷新", delay),
            None => tracing::warn!("[SERVER] 服务账号凭证无法续期，未启动主动刷新"),
        }
        delay
    }

    pub fn with_session(mut self, session: GatewaySession) -> Self {
        self.session = Some(session);
        self
    }
}

/// 配置了服务账号且认证流程可用时创建会话
fn service_account_session(config: &GatewayConfig, proxy: &ProxyHandler) -> Option<GatewaySession> {
    let account = config.auth.service_account.as_ref()?;
    if config.mock.enabled {
        return None;
    }
    let Some(client) = proxy.auth_client() else {
        tracing::warn!("[SERVER] 认证服务不可用，忽略服务账号配置");
        return None;
    };
    Some(GatewaySession::new(
        client.clone(),
        CredentialPair::new(account.access_token.clone(), account.refresh_token.clone()),
        config.auth.refresh_before_secs,
    ))
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/api/:service/*path", any(handlers::proxy_request))
        .route("/auth/logout", post(handlers::logout))
        .route("/healthz", get(handlers::healthz))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}

/// 启动服务器，Ctrl-C 时优雅退出
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "[SERVER] 监听 {} (mock 模式: {})",
        addr,
        state.config.mock.enabled
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[SERVER] 监听 Ctrl-C 失败: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[SERVER] 收到 Ctrl-C，正在关闭");
}
