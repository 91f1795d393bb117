//! 出站客户端
//!
//! 按 `proxy` 配置构建访问后端的 reqwest 客户端。不跟随重定向，
//! 后端的 3xx 原样交给浏览器。

use crate::config::ProxyConfig;
use reqwest::{redirect, Client, ClientBuilder, Proxy};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// 支持的出站代理协议
const EGRESS_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("出站代理地址无效 '{url}': {reason}")]
    InvalidEgressProxy { url: String, reason: String },

    #[error("不支持的出站代理协议 '{0}'")]
    UnsupportedEgressScheme(String),

    #[error("出站客户端构建失败: {0}")]
    Build(#[from] reqwest::Error),
}

/// 校验出站代理地址，返回解析后的 URL
pub fn parse_egress_proxy(proxy_url: &str) -> Result<Url, ClientBuildError> {
    let parsed = Url::parse(proxy_url.trim()).map_err(|e| ClientBuildError::InvalidEgressProxy {
        url: proxy_url.to_string(),
        reason: e.to_string(),
    })?;
    if !EGRESS_SCHEMES.contains(&parsed.scheme()) {
        return Err(ClientBuildError::UnsupportedEgressScheme(
            parsed.scheme().to_string(),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(ClientBuildError::InvalidEgressProxy {
            url: proxy_url.to_string(),
            reason: "缺少主机名".to_string(),
        });
    }
    Ok(parsed)
}

/// 配置里的出站代理，空字符串视为未配置
fn configured_egress_proxy(config: &ProxyConfig) -> Option<&str> {
    config
        .egress_proxy
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
}

/// 带超时、出站代理和重定向策略的 builder，调用方可以继续调整
pub fn client_builder(config: &ProxyConfig) -> Result<ClientBuilder, ClientBuildError> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .redirect(redirect::Policy::none());

    if let Some(proxy_url) = configured_egress_proxy(config) {
        let parsed = parse_egress_proxy(proxy_url)?;
        tracing::info!(
            "[OUTBOUND] 使用 {} 出站代理 {}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default()
        );
        builder = builder.proxy(Proxy::all(parsed.as_str())?);
    }

    Ok(builder)
}

/// 访问后端服务的客户端
pub fn build_client(config: &ProxyConfig) -> Result<Client, ClientBuildError> {
    Ok(client_builder(config)?.build()?)
}
