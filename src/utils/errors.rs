// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::RepositoryError;
use crate::engines::browser_pool::PoolError;
use crate::engines::traits::EngineError;
use crate::queue::QueueError;

/// 任务执行错误类型
///
/// 工作器内部使用，只记录到任务上，不会越过工作器循环向外传播。
#[derive(Error, Debug)]
pub enum JobError {
    /// 浏览器资源池在限定时间内无可用句柄
    #[error("Browser pool exhausted: {0}")]
    PoolExhausted(String),

    /// 资源池已关闭（正在停机）
    #[error("Browser pool closed")]
    PoolClosed,

    /// 队列后端暂不可用
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// 引擎执行失败
    #[error("Engine execution failed: {0}")]
    EngineExecutionFailed(EngineError),

    /// 重试次数用尽
    #[error("Retry budget exceeded after {retries} retries: {last_error}")]
    RetryBudgetExceeded { retries: u32, last_error: String },

    /// 任务仓库写入失败
    #[error("Repository error: {0}")]
    Repository(String),
}

impl JobError {
    /// 记录到任务上的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            JobError::PoolExhausted(_) => "POOL_EXHAUSTED",
            JobError::PoolClosed => "POOL_CLOSED",
            JobError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            JobError::EngineExecutionFailed(e) => e.code(),
            JobError::RetryBudgetExceeded { .. } => "RETRY_BUDGET_EXCEEDED",
            JobError::Repository(_) => "REPOSITORY_ERROR",
        }
    }

    /// 是否值得再次尝试
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::PoolExhausted(_) | JobError::QueueUnavailable(_) => true,
            JobError::EngineExecutionFailed(e) => e.is_retryable(),
            JobError::PoolClosed
            | JobError::RetryBudgetExceeded { .. }
            | JobError::Repository(_) => false,
        }
    }
}

impl From<EngineError> for JobError {
    fn from(err: EngineError) -> Self {
        JobError::EngineExecutionFailed(err)
    }
}

impl From<PoolError> for JobError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted(waited) => {
                JobError::PoolExhausted(format!("no browser within {:?}", waited))
            }
            PoolError::Closed => JobError::PoolClosed,
            // A failed launch behaves like a crashed browser: retryable.
            PoolError::Launch(e) => JobError::EngineExecutionFailed(e),
        }
    }
}

impl From<QueueError> for JobError {
    fn from(err: QueueError) -> Self {
        JobError::QueueUnavailable(err.to_string())
    }
}

impl From<RepositoryError> for JobError {
    fn from(err: RepositoryError) -> Self {
        JobError::Repository(err.to_string())
    }
}
