//! 容错机制模块
//!
//! 提供错误分类和指数退避重试

mod classify;
mod retry;

pub use classify::{classify, Classify, ErrorKind};
pub use retry::{default_should_retry, Retrier, RetryConfig, RetryState};
