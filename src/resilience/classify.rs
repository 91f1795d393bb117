//! 错误分类
//!
//! 把一次调用的结果归入封闭的错误类型集合。是否重试只由这里决定。

use crate::transport::{Outcome, UpstreamResponse};
use std::fmt;

/// 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 没有收到响应（连接拒绝、DNS、超时）
    Network,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 5xx
    ServerError,
    /// 其他 4xx
    ClientError,
    /// 其他状态码
    Unknown,
}

impl ErrorKind {
    /// 根据状态码分类
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            500..=599 => ErrorKind::ServerError,
            400..=499 => ErrorKind::ClientError,
            _ => ErrorKind::Unknown,
        }
    }

    /// 只有网络错误和服务端错误可以重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::ServerError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::ClientError => "CLIENT_ERROR",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对调用结果分类
///
/// 成功的响应出现在错误位置时归为 `Unknown`
pub fn classify(outcome: &Outcome) -> ErrorKind {
    match outcome {
        Err(_) => ErrorKind::Network,
        Ok(resp) => ErrorKind::from_status(resp.status.as_u16()),
    }
}

/// 可被重试器判定成败的调用结果
pub trait Classify {
    /// `None` 表示成功
    fn failure_kind(&self) -> Option<ErrorKind>;
}

impl Classify for UpstreamResponse {
    fn failure_kind(&self) -> Option<ErrorKind> {
        if self.is_success() {
            None
        } else {
            Some(ErrorKind::from_status(self.status.as_u16()))
        }
    }
}

impl Classify for Outcome {
    fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Ok(resp) => resp.failure_kind(),
            Err(_) => Some(ErrorKind::Network),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NetworkFailure;
    use reqwest::StatusCode;

    fn response(status: u16) -> Outcome {
        Ok(UpstreamResponse::new(StatusCode::from_u16(status).unwrap()))
    }

    #[test]
    fn test_classify_network_failure() {
        let outcome: Outcome = Err(NetworkFailure::connection_refused("refused"));
        assert_eq!(classify(&outcome), ErrorKind::Network);
        assert!(classify(&outcome).is_retryable());
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(classify(&response(401)), ErrorKind::Unauthorized);
        assert_eq!(classify(&response(403)), ErrorKind::Forbidden);
        assert_eq!(classify(&response(404)), ErrorKind::NotFound);
        assert_eq!(classify(&response(500)), ErrorKind::ServerError);
        assert_eq!(classify(&response(503)), ErrorKind::ServerError);
        assert_eq!(classify(&response(599)), ErrorKind::ServerError);
        assert_eq!(classify(&response(400)), ErrorKind::ClientError);
        assert_eq!(classify(&response(429)), ErrorKind::ClientError);
        assert_eq!(classify(&response(200)), ErrorKind::Unknown);
        assert_eq!(classify(&response(302)), ErrorKind::Unknown);
    }

    #[test]
    fn test_only_network_and_server_errors_retry() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::ServerError.is_retryable());
        assert!(!ErrorKind::Unauthorized.is_retryable());
        assert!(!ErrorKind::Forbidden.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::ClientError.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_failure_kind_success_is_none() {
        assert_eq!(response(200).failure_kind(), None);
        assert_eq!(response(204).failure_kind(), None);
        assert_eq!(response(502).failure_kind(), Some(ErrorKind::ServerError));
    }
}
