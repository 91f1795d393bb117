//! webgate
//!
//! 多服务 Web 后端的认证网关：把浏览器请求转发到各个后端服务，
//! 透明地维护 access/refresh token，并对瞬时故障做指数退避重试。

pub mod auth;
pub mod config;
pub mod credential;
pub mod error;
pub mod logger;
pub mod proxy;
pub mod resilience;
pub mod server;
pub mod session;
pub mod transport;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::{build_router, serve, AppState};
