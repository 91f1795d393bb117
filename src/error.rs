//! 网关错误类型
//!
//! 定义调用方可见的错误分类，以及到 HTTP 响应的映射

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// 网关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// 后端拒绝连接
    #[error("{service} unavailable")]
    ServiceUnavailable { service: String },

    /// 其他传输层失败
    #[error("Upstream fetch failed")]
    UpstreamFetchFailed { service: String, reason: String },

    /// 目标服务地址未配置
    #[error("Service URL not defined for '{service}'")]
    ServiceUrlMissing { service: String },

    /// Mock 模式下路由没有配置 fixture
    #[error("Mock not configured for {method} {service}{path}")]
    MockNotConfigured {
        service: String,
        method: String,
        path: String,
    },

    /// Token 刷新失败
    #[error("Token 刷新失败: {0}")]
    TokenRefresh(String),

    /// Token 信息查询失败
    #[error("Token 信息查询失败: {0}")]
    TokenInfo(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl GatewayError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamFetchFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ServiceUrlMissing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::MockNotConfigured { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::TokenRefresh(_) => StatusCode::UNAUTHORIZED,
            GatewayError::TokenInfo(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::ServiceUnavailable { .. } => "service_unavailable",
            GatewayError::UpstreamFetchFailed { .. } => "upstream_fetch_failed",
            GatewayError::ServiceUrlMissing { .. } => "service_misconfigured",
            GatewayError::MockNotConfigured { .. } => "service_misconfigured",
            GatewayError::TokenRefresh(_) => "token_refresh_failed",
            GatewayError::TokenInfo(_) => "token_info_failed",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// 调用方是否可以安全重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::ServiceUnavailable { .. } | GatewayError::UpstreamFetchFailed { .. }
        )
    }

    /// 转换为 JSON 错误响应体
    ///
    /// 传输失败不暴露底层原因，细节只写入服务端日志
    pub fn to_json(&self) -> serde_json::Value {
        let details = match self {
            GatewayError::ServiceUnavailable { .. } => "Connection refused".to_string(),
            GatewayError::UpstreamFetchFailed { .. } => "See server logs".to_string(),
            GatewayError::ServiceUrlMissing { service } => {
                format!("No base URL configured for service '{service}'")
            }
            GatewayError::MockNotConfigured { .. } => {
                "Mock mode is enabled but this route has no fixture".to_string()
            }
            other => other.to_string(),
        };
        serde_json::json!({
            "error": self.to_string(),
            "details": details,
            "type": self.error_type(),
        })
    }

    /// 记录带上下文的错误日志
    pub fn log_with_context(&self, request_id: &str) {
        let reason = match self {
            GatewayError::UpstreamFetchFailed { reason, .. } => reason.as_str(),
            _ => "",
        };
        tracing::error!(
            request_id = %request_id,
            error_type = %self.error_type(),
            error_message = %self,
            reason = %reason,
            "Gateway request failed"
        );
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
