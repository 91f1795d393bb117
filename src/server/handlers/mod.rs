//! 路由处理器

mod auth_api;
mod proxy_api;

pub use auth_api::{healthz, logout};
pub use proxy_api::proxy_request;
