//! 重试机制实现
//!
//! 提供确定性的指数退避重试（不加抖动）

use super::classify::{Classify, ErrorKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// 重试配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大重试次数（不含首次请求）
    pub max_retries: u32,
    /// 首次退避延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 退避倍数
    pub backoff_factor: f64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 10000,
        }
    }
}

impl RetryConfig {
    /// 创建新的重试配置（倍数为 2）
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            ..Self::default()
        }
    }

    /// 设置退避倍数
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// 设置最大重试次数
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// 一次失败后、下一次尝试前的状态
#[derive(Debug)]
pub struct RetryState<'a, T> {
    /// 即将进行的是第几次重试（从 1 开始）
    pub attempt: u32,
    /// 本次失败的分类
    pub kind: ErrorKind,
    /// 下一次尝试前的等待时间
    pub next_delay: Duration,
    /// 本次失败的结果
    pub last_outcome: &'a T,
}

/// 默认重试策略：交给错误分类决定
pub fn default_should_retry<T>(_outcome: &T, kind: ErrorKind) -> bool {
    kind.is_retryable()
}

/// 重试器
#[derive(Debug, Clone)]
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    /// 创建新的重试器
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// 使用默认配置创建重试器
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// 获取配置
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 计算第 N 次尝试（从 0 开始）失败后的退避时间
    ///
    /// 公式: min(initial_delay * backoff_factor^attempt, max_delay)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_delay_ms as f64;
        let max = self.config.max_delay_ms as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        let exponential = initial * self.config.backoff_factor.powi(exponent);
        let delay = if exponential.is_finite() {
            exponential.min(max)
        } else {
            max
        };

        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// 计算完整的退避序列
    pub fn compute_backoff_sequence(&self) -> Vec<Duration> {
        (0..self.config.max_retries)
            .map(|attempt| self.backoff_delay(attempt))
            .collect()
    }

    /// 带重试执行异步操作，使用默认重试策略
    ///
    /// 返回第一个成功的结果；重试耗尽或遇到不可重试的失败时原样返回最后一次结果
    pub async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        T: Classify,
    {
        self.execute_with_policy(operation, default_should_retry, |_| {})
            .await
    }

    /// 带重试执行异步操作，可自定义重试判断和重试回调
    pub async fn execute_with_policy<F, Fut, T, S, R>(
        &self,
        mut operation: F,
        should_retry: S,
        mut on_retry: R,
    ) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        T: Classify,
        S: Fn(&T, ErrorKind) -> bool,
        R: FnMut(RetryState<'_, T>),
    {
        let mut attempt = 0u32;

        loop {
            let outcome = operation().await;

            let Some(kind) = outcome.failure_kind() else {
                return outcome;
            };

            if attempt >= self.config.max_retries || !should_retry(&outcome, kind) {
                tracing::debug!(
                    "[RETRY] 第 {} 次尝试失败 ({})，不再重试",
                    attempt + 1,
                    kind
                );
                return outcome;
            }

            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                "[RETRY] 第 {} 次尝试失败 ({})，{:?} 后重试",
                attempt + 1,
                kind,
                delay
            );
            on_retry(RetryState {
                attempt: attempt + 1,
                kind,
                next_delay: delay,
                last_outcome: &outcome,
            });

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::transport::{NetworkFailure, Outcome, UpstreamResponse};
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn status_outcome(status: u16, body: &str) -> Outcome {
        let mut resp = UpstreamResponse::new(StatusCode::from_u16(status).unwrap());
        resp.body = Bytes::from(body.to_string());
        Ok(resp)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.backoff_factor, 2.0);
        assert_eq!(config.max_delay_ms, 10000);
    }

    #[test]
    fn test_backoff_delay() {
        let retrier = Retrier::new(RetryConfig::new(5, 1000, 30000));

        assert_eq!(retrier.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(retrier.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(retrier.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(retrier.backoff_delay(3), Duration::from_millis(8000));
        assert_eq!(retrier.backoff_delay(4), Duration::from_millis(16000));
    }

    #[test]
    fn test_backoff_delay_custom_factor() {
        let retrier = Retrier::new(RetryConfig::new(3, 100, 10000).with_backoff_factor(3.0));

        assert_eq!(retrier.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(retrier.backoff_delay(1), Duration::from_millis(300));
        assert_eq!(retrier.backoff_delay(2), Duration::from_millis(900));
    }

    #[test]
    fn test_backoff_delay_max_cap() {
        let retrier = Retrier::new(RetryConfig::default());

        assert_eq!(retrier.backoff_delay(4), Duration::from_millis(10000));
        assert_eq!(retrier.backoff_delay(100), Duration::from_millis(10000));
        assert_eq!(retrier.backoff_delay(u32::MAX), Duration::from_millis(10000));
    }

    #[test]
    fn test_compute_backoff_sequence() {
        let retrier = Retrier::with_defaults();

        let sequence = retrier.compute_backoff_sequence();
        assert_eq!(
            sequence,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_success_first_try() {
        let retrier = Retrier::with_defaults();
        let calls = AtomicU32::new(0);

        let outcome = retrier
            .execute_with_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { status_outcome(200, "ok") }
            })
            .await;

        assert_eq!(outcome.unwrap().text(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_non_retryable_error() {
        let retrier = Retrier::with_defaults();
        let calls = AtomicU32::new(0);

        let outcome = retrier
            .execute_with_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { status_outcome(404, "missing") }
            })
            .await;

        // 只尝试一次，原样返回
        assert_eq!(outcome.unwrap().status, StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_until_success() {
        let retrier = Retrier::with_defaults();
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = retrier
            .execute_with_retry(|| {
                let calls = calls.clone();
                async move {
                    let current = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if current < 3 {
                        status_outcome(503, "busy")
                    } else {
                        status_outcome(200, "ok")
                    }
                }
            })
            .await;

        assert!(outcome.unwrap().is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_returns_last_outcome_when_exhausted() {
        let retrier = Retrier::with_defaults();
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = retrier
            .execute_with_retry(|| {
                let calls = calls.clone();
                async move {
                    let current = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<UpstreamResponse, _>(NetworkFailure::connection_refused(format!(
                        "attempt-{current}"
                    )))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.unwrap_err().message, "attempt-4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_reports_attempts_and_delays() {
        let retrier = Retrier::with_defaults();
        let mut seen = Vec::new();

        let started = tokio::time::Instant::now();
        let outcome = retrier
            .execute_with_policy(
                || async { status_outcome(500, "boom") },
                default_should_retry,
                |state| seen.push((state.attempt, state.next_delay, state.kind)),
            )
            .await;

        assert_eq!(outcome.unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            seen,
            vec![
                (1, Duration::from_millis(1000), ErrorKind::ServerError),
                (2, Duration::from_millis(2000), ErrorKind::ServerError),
                (3, Duration::from_millis(4000), ErrorKind::ServerError),
            ]
        );
        assert!(started.elapsed() >= Duration::from_millis(7000));
    }

    #[tokio::test]
    async fn test_custom_should_retry_stops_immediately() {
        let retrier = Retrier::with_defaults();
        let calls = AtomicU32::new(0);

        let outcome = retrier
            .execute_with_policy(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { status_outcome(502, "bad gateway") }
                },
                |_, _| false,
                |_| panic!("on_retry must not run"),
            )
            .await;

        assert_eq!(outcome.unwrap().status, StatusCode::BAD_GATEWAY);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_single_attempt() {
        let retrier = Retrier::new(RetryConfig::default().with_max_retries(0));
        let calls = AtomicU32::new(0);

        let outcome = retrier
            .execute_with_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { status_outcome(503, "busy") }
            })
            .await;

        assert_eq!(outcome.unwrap().status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
