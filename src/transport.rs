//! 传输层
//!
//! 出站 HTTP 调用的统一结果类型：要么拿到后端响应，要么是没有响应的网络失败。
//! 分类器和重试器都只对这个封闭类型做模式匹配。

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// 出站请求
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Option<Bytes>) -> Self {
        self.body = body;
        self
    }
}

/// 后端返回的完整响应（body 已读入内存）
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// body 的 UTF-8 文本视图（非法字节被替换）
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// content-type 的媒体类型部分（小写，去掉参数）
    pub fn media_type(&self) -> Option<String> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
    }
}

/// 网络失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailureKind {
    /// 连接被拒绝（后端未监听）
    ConnectionRefused,
    /// 连接或请求超时
    Timeout,
    /// 其他连接错误（DNS、TLS 等）
    Connect,
    /// 读取响应体失败
    Body,
    /// 其他错误
    Other,
}

impl NetworkFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkFailureKind::ConnectionRefused => "connection_refused",
            NetworkFailureKind::Timeout => "timeout",
            NetworkFailureKind::Connect => "connect",
            NetworkFailureKind::Body => "body",
            NetworkFailureKind::Other => "other",
        }
    }
}

impl fmt::Display for NetworkFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 没有收到任何 HTTP 响应的失败
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct NetworkFailure {
    pub kind: NetworkFailureKind,
    pub message: String,
}

impl NetworkFailure {
    pub fn new(kind: NetworkFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::new(NetworkFailureKind::ConnectionRefused, message)
    }

    pub fn is_connection_refused(&self) -> bool {
        self.kind == NetworkFailureKind::ConnectionRefused
    }
}

impl From<reqwest::Error> for NetworkFailure {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkFailureKind::Timeout
        } else if is_connection_refused(&err) {
            NetworkFailureKind::ConnectionRefused
        } else if err.is_connect() {
            NetworkFailureKind::Connect
        } else if err.is_body() || err.is_decode() {
            NetworkFailureKind::Body
        } else {
            NetworkFailureKind::Other
        };
        Self::new(kind, format_error_chain(&err))
    }
}

/// 沿 source 链查找 `ConnectionRefused` 的 io 错误
fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = current.source();
    }
    err.is_connect() && format_error_chain(err).contains("Connection refused")
}

fn format_error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(current) = source {
        message.push_str(": ");
        message.push_str(&current.to_string());
        source = current.source();
    }
    message
}

/// 单次调用的结果
pub type Outcome = Result<UpstreamResponse, NetworkFailure>;

/// 出站传输
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Outcome;
}

/// 基于 reqwest 的传输实现
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Outcome {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| {
            let mut failure = NetworkFailure::from(e);
            failure.kind = NetworkFailureKind::Body;
            failure
        })?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
