//! 认证模块
//!
//! 认证请求客户端和认证服务（refresh / token-info）调用

mod client;
mod refresh;

pub use client::{AuthError, AuthOutcome, AuthenticatedClient, AuthenticatedResponse};
pub use refresh::{HttpTokenApi, RefreshedTokens, TokenRefresher};
