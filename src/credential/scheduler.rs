//! Token 主动刷新调度
//!
//! 在 access token 过期前触发一次刷新，刷新成功后按新 token 的有效期重新排期。
//! 同一时刻最多只有一个待触发的定时器。

use crate::error::GatewayError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 默认提前刷新的秒数
pub const DEFAULT_REFRESH_BEFORE_SECS: u64 = 60;

/// 调度器依赖的 Token 接口
#[async_trait]
pub trait TokenApi: Send + Sync {
    /// 当前 access token 的剩余有效秒数（以服务端时钟为准）
    async fn token_info(&self) -> Result<i64, GatewayError>;

    /// 用 refresh token 换取新的 access token
    async fn refresh(&self) -> Result<(), GatewayError>;
}

#[derive(Default)]
struct TimerState {
    handle: Option<JoinHandle<()>>,
    /// 每次取消或重新排期都会递增，过期的定时任务据此放弃
    generation: u64,
}

struct SchedulerInner {
    api: Arc<dyn TokenApi>,
    state: Mutex<TimerState>,
}

/// Token 刷新调度器
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

impl RefreshScheduler {
    pub fn new(api: Arc<dyn TokenApi>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                api,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// 安排下一次刷新
    ///
    /// 先取消已有定时器，再查询剩余有效期；有效期已耗尽时保持空闲。
    /// 返回定时器的等待时间，未排期时返回 `None`。
    pub fn schedule_refresh(&self, refresh_before_secs: u64) -> BoxFuture<'static, Option<Duration>> {
        self.schedule_inner(refresh_before_secs, None)
    }

    /// 取消待触发的定时器（可重复调用）
    pub fn cancel_refresh(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(handle) = state.handle.take() {
            handle.abort();
            tracing::info!("[REFRESH_SCHEDULER] 已取消待触发的刷新");
        }
    }

    /// 是否有待触发的定时器
    pub fn is_scheduled(&self) -> bool {
        self.inner
            .state
            .lock()
            .handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn schedule_inner(
        &self,
        refresh_before_secs: u64,
        expected_generation: Option<u64>,
    ) -> BoxFuture<'static, Option<Duration>> {
        let scheduler = self.clone();
        Box::pin(async move {
            let generation = {
                let mut state = scheduler.inner.state.lock();
                if expected_generation.is_some_and(|g| g != state.generation) {
                    return None;
                }
                state.generation += 1;
                if let Some(handle) = state.handle.take() {
                    handle.abort();
                }
                state.generation
            };

            let remaining = match scheduler.inner.api.token_info().await {
                Ok(secs) => secs,
                Err(e) => {
                    tracing::warn!("[REFRESH_SCHEDULER] 查询 token 信息失败，不安排刷新: {}", e);
                    return None;
                }
            };

            if remaining <= 0 {
                tracing::info!("[REFRESH_SCHEDULER] token 已过期，不安排刷新");
                return None;
            }

            let before = i64::try_from(refresh_before_secs).unwrap_or(i64::MAX);
            let delay = Duration::from_secs(remaining.saturating_sub(before).max(0) as u64);

            let mut state = scheduler.inner.state.lock();
            if state.generation != generation {
                tracing::debug!("[REFRESH_SCHEDULER] 排期已被更新的调用取代");
                return None;
            }
            if let Some(handle) = state.handle.take() {
                handle.abort();
            }
            let task = scheduler.clone();
            state.handle = Some(tokio::spawn(async move {
                task.fire(generation, delay, refresh_before_secs).await;
            }));

            tracing::info!(
                "[REFRESH_SCHEDULER] token 剩余 {}s，将在 {:?} 后刷新",
                remaining,
                delay
            );
            Some(delay)
        })
    }

    async fn fire(self, generation: u64, delay: Duration, refresh_before_secs: u64) {
        tokio::time::sleep(delay).await;

        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return;
            }
            // 进入触发阶段，之后的重新排期不能取消自身
            state.handle = None;
        }

        match self.inner.api.refresh().await {
            Ok(()) => {
                tracing::info!("[REFRESH_SCHEDULER] 主动刷新成功，重新排期");
                self.schedule_inner(refresh_before_secs, Some(generation))
                    .await;
            }
            Err(e) => {
                tracing::warn!("[REFRESH_SCHEDULER] 主动刷新失败，停止调度: {}", e);
            }
        }
    }
}
