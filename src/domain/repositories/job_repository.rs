// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::{JobResult, JobStatus, ScrapeJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 底层存储错误
    #[error("Storage error: {0}")]
    Storage(String),
    /// 记录未找到
    #[error("Job {0} not found")]
    NotFound(Uuid),
    /// 记录已存在
    #[error("Job {0} already exists")]
    AlreadyExists(Uuid),
    /// 状态回退或离开终态
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 状态更新时附带写入的字段
///
/// 值为 `None` 的字段保持不变。
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub retry_count: Option<u32>,
    pub credits_charged: Option<u64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
}

impl JobPatch {
    /// 从任务当前状态生成补丁
    pub fn from_job(job: &ScrapeJob) -> Self {
        Self {
            retry_count: Some(job.retry_count),
            credits_charged: job.credits_charged,
            error_code: job.error_code.clone(),
            error_message: job.error_message.clone(),
            worker_id: job.worker_id.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: None,
        }
    }

    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }

    /// 将补丁应用到已存储的任务上
    ///
    /// 状态校验由调用方完成；回到 `Queued` 时清除执行者信息。
    pub fn apply(&self, job: &mut ScrapeJob, status: JobStatus) {
        job.status = status;
        job.updated_at = Utc::now();
        if let Some(retry_count) = self.retry_count {
            job.retry_count = retry_count;
        }
        if job.credits_charged.is_none() {
            job.credits_charged = self.credits_charged;
        }
        if self.error_code.is_some() {
            job.error_code = self.error_code.clone();
            job.error_message = self.error_message.clone();
        }
        if self.worker_id.is_some() {
            job.worker_id = self.worker_id.clone();
        }
        if self.started_at.is_some() {
            job.started_at = self.started_at;
        }
        if self.completed_at.is_some() {
            job.completed_at = self.completed_at;
        }
        if status == JobStatus::Queued {
            job.worker_id = None;
            job.started_at = None;
        }
    }
}

/// 检查存储中的状态能否推进到目标状态
pub fn ensure_transition(from: JobStatus, to: JobStatus) -> Result<(), RepositoryError> {
    if from.can_transition_to(to) && !(from.is_terminal() && from != to) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition { from, to })
    }
}

/// 任务仓库特质
///
/// 定义任务数据访问接口，具体存储由基础设施层实现
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建新任务
    async fn create(&self, job: &ScrapeJob) -> Result<ScrapeJob, RepositoryError>;
    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeJob>, RepositoryError>;
    /// 按创建时间倒序列出账户下的任务
    async fn find_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScrapeJob>, RepositoryError>;
    /// 更新任务状态，状态只能单向推进
    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        patch: JobPatch,
    ) -> Result<(), RepositoryError>;
    /// 查找任务的抓取结果
    async fn find_result(&self, job_id: Uuid) -> Result<Option<JobResult>, RepositoryError>;
}
