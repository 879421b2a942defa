// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{EngineType, ScrapeJob};

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 队列后端不可用（瞬时错误，调用方可退避重试）
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 领取已过期或被其他工作器接管
    #[error("Claim on job {0} is no longer held")]
    ClaimLost(Uuid),

    /// 任务状态不允许该操作
    #[error("Invalid job for queue operation: {0}")]
    InvalidJob(String),
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

/// 已领取的任务
///
/// 领取期间任务只对持有者可见；超过领取时长未确认时会被重新投递。
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: ScrapeJob,
    pub claim_token: Uuid,
}

/// 重新入队的结果
#[derive(Debug, Clone)]
pub enum RequeueOutcome {
    /// 已放回队列（可能带延迟）
    Requeued(ScrapeJob),
    /// 重试次数用尽，已从队列移除
    Exhausted(ScrapeJob),
}

/// 队列统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// 可立即领取的任务数
    pub ready: usize,
    /// 延迟中的任务数
    pub delayed: usize,
    /// 已领取未确认的任务数
    pub in_flight: usize,
}

/// 任务队列特质
///
/// 每种引擎一个队列。按优先级从高到低出队，同优先级近似先进先出；
/// 至少投递一次，领取具有排他性。
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队任务
    async fn enqueue(&self, job: &ScrapeJob) -> Result<(), QueueError>;

    /// 出队并领取一个任务
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(ClaimedJob))` - 成功领取的任务
    /// * `Ok(None)` - 在 `timeout` 内没有可领取的任务
    async fn dequeue(&self, timeout: Duration) -> Result<Option<ClaimedJob>, QueueError>;

    /// 确认任务，永久移除
    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), QueueError>;

    /// 将任务放回队列
    ///
    /// # 参数
    ///
    /// * `claimed` - 当前持有的任务，`job` 字段应为运行中状态
    /// * `delay` - 重新可见前的延迟
    /// * `count_attempt` - 是否消耗一次重试次数
    async fn requeue(
        &self,
        claimed: ClaimedJob,
        delay: Duration,
        count_attempt: bool,
    ) -> Result<RequeueOutcome, QueueError>;

    /// 队列统计
    async fn stats(&self) -> Result<QueueStats, QueueError>;

    /// 队列所服务的引擎
    fn engine(&self) -> EngineType;
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn enqueue(&self, job: &ScrapeJob) -> Result<(), QueueError> {
        (**self).enqueue(job).await
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ClaimedJob>, QueueError> {
        (**self).dequeue(timeout).await
    }

    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), QueueError> {
        (**self).acknowledge(claimed).await
    }

    async fn requeue(
        &self,
        claimed: ClaimedJob,
        delay: Duration,
        count_attempt: bool,
    ) -> Result<RequeueOutcome, QueueError> {
        (**self).requeue(claimed, delay, count_attempt).await
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        (**self).stats().await
    }

    fn engine(&self) -> EngineType {
        (**self).engine()
    }
}

/// 按引擎划分的队列集合
#[derive(Clone)]
pub struct EngineQueues {
    pub http: Arc<dyn JobQueue>,
    pub browser: Arc<dyn JobQueue>,
    pub stealth: Arc<dyn JobQueue>,
}

impl EngineQueues {
    pub fn new(
        http: Arc<dyn JobQueue>,
        browser: Arc<dyn JobQueue>,
        stealth: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            http,
            browser,
            stealth,
        }
    }

    /// 使用同一个构造函数为每种引擎创建队列
    pub fn build<F>(mut make: F) -> Self
    where
        F: FnMut(EngineType) -> Arc<dyn JobQueue>,
    {
        Self {
            http: make(EngineType::Http),
            browser: make(EngineType::Browser),
            stealth: make(EngineType::Stealth),
        }
    }

    pub fn for_engine(&self, engine: EngineType) -> &Arc<dyn JobQueue> {
        match engine {
            EngineType::Http => &self.http,
            EngineType::Browser => &self.browser,
            EngineType::Stealth => &self.stealth,
        }
    }
}

/// 由领取中的任务计算重新入队后的状态
///
/// 两种队列实现共用，保证重试预算规则一致。
pub(crate) fn next_requeue_state(
    claimed: &ClaimedJob,
    count_attempt: bool,
) -> Result<Option<ScrapeJob>, QueueError> {
    use crate::domain::models::DomainError;

    match claimed.job.clone().requeue(count_attempt) {
        Ok(job) => Ok(Some(job)),
        Err(DomainError::RetryBudgetExceeded { .. }) => Ok(None),
        Err(e) => Err(QueueError::InvalidJob(e.to_string())),
    }
}

/// 生成存入队列的任务副本，`Pending` 任务转为 `Queued`
pub(crate) fn queued_copy(job: &ScrapeJob) -> Result<ScrapeJob, QueueError> {
    use crate::domain::models::JobStatus;

    match job.status {
        JobStatus::Pending => job
            .clone()
            .mark_queued()
            .map_err(|e| QueueError::InvalidJob(e.to_string())),
        JobStatus::Queued => Ok(job.clone()),
        other => Err(QueueError::InvalidJob(format!(
            "job {} cannot be enqueued while {}",
            job.id, other
        ))),
    }
}
