// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::credits::{CreditBreakdown, CreditQuote};
use super::engine::{EngineType, ProxyTier};
use super::scrape_options::ScrapeOptions;

/// 抓取任务实体
///
/// 一个抓取请求从提交到终态的完整记录。任务 ID 使用 UUID v7，
/// 全局唯一且按时间有序。状态只能单向推进：
/// Pending → Queued → Running → Completed/Failed，
/// 唯一的例外是重试时的 Running → Queued。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 所属账户ID
    pub account_id: Uuid,
    /// 目标URL
    pub url: String,
    /// 执行引擎
    pub engine: EngineType,
    /// 代理层级
    pub proxy_tier: ProxyTier,
    /// 抓取选项
    pub options: ScrapeOptions,
    /// 当前状态
    pub status: JobStatus,
    /// 优先级，数值越大越先执行
    pub priority: u8,
    /// 已消耗的重试次数
    pub retry_count: u32,
    /// 最大重试次数
    pub max_retries: u32,
    /// 提交时估算的积分
    pub credits_estimated: u64,
    /// 积分明细
    pub credit_breakdown: CreditBreakdown,
    /// 实际扣除的积分，仅在终态时写入一次
    pub credits_charged: Option<u64>,
    /// 最近一次错误码
    pub error_code: Option<String>,
    /// 最近一次错误信息
    pub error_message: Option<String>,
    /// 当前执行该任务的工作器
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已创建，尚未入队
    #[default]
    Pending,
    /// 已入队，等待工作器领取
    Queued,
    /// 工作器正在执行
    Running,
    /// 执行成功
    Completed,
    /// 执行失败且不再重试
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 判断状态转换是否合法
    ///
    /// 同状态写入视为合法（幂等更新）。
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (JobStatus::Pending, JobStatus::Queued) => true,
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Queued) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Pending | JobStatus::Queued | JobStatus::Running, JobStatus::Failed) => {
                true
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "unknown job status: {}",
                other
            ))),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 状态转换不符合业务规则
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobStatus, to: JobStatus },

    /// 输入数据不符合领域规则
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 重试次数已用尽
    #[error("Retry budget exhausted after {retries} retries")]
    RetryBudgetExceeded { retries: u32 },
}

impl ScrapeJob {
    /// 创建一个新的抓取任务
    ///
    /// # 参数
    ///
    /// * `account_id` - 所属账户ID
    /// * `url` - 目标URL
    /// * `engine` - 已解析的执行引擎
    /// * `proxy_tier` - 已解析的代理层级
    /// * `options` - 抓取选项
    /// * `quote` - 积分报价
    ///
    /// # 返回值
    ///
    /// 返回处于 `Pending` 状态的任务
    pub fn new(
        account_id: Uuid,
        url: String,
        engine: EngineType,
        proxy_tier: ProxyTier,
        options: ScrapeOptions,
        quote: CreditQuote,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            account_id,
            url,
            engine,
            proxy_tier,
            options,
            status: JobStatus::Pending,
            priority: 0,
            retry_count: 0,
            max_retries: 3,
            credits_estimated: quote.total(),
            credit_breakdown: *quote.breakdown(),
            credits_charged: None,
            error_code: None,
            error_message: None,
            worker_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), DomainError> {
        if self.status == to || !self.status.can_transition_to(to) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 标记任务已入队
    ///
    /// 将任务状态从Pending变更为Queued
    pub fn mark_queued(mut self) -> Result<Self, DomainError> {
        if self.status != JobStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: JobStatus::Queued,
            });
        }
        self.transition(JobStatus::Queued)?;
        Ok(self)
    }

    /// 启动任务
    ///
    /// 将任务状态从Queued变更为Running，并记录执行的工作器
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeJob)` - 成功启动的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn start(mut self, worker_id: &str) -> Result<Self, DomainError> {
        self.transition(JobStatus::Running)?;
        self.worker_id = Some(worker_id.to_string());
        self.started_at = Some(self.updated_at);
        Ok(self)
    }

    /// 完成任务
    ///
    /// 将任务状态从Running变更为Completed，并按估算值扣除积分
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeJob)` - 成功完成的任务
    /// * `Err(DomainError)` - 状态转换失败或积分已被记录
    pub fn complete(mut self) -> Result<Self, DomainError> {
        if self.credits_charged.is_some() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: JobStatus::Completed,
            });
        }
        self.transition(JobStatus::Completed)?;
        self.credits_charged = Some(self.credits_estimated);
        self.error_code = None;
        self.error_message = None;
        self.completed_at = Some(self.updated_at);
        Ok(self)
    }

    /// 标记任务失败
    ///
    /// 任何非终态都可以失败，失败的任务不扣积分
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeJob)` - 失败的任务
    /// * `Err(DomainError)` - 任务已处于终态
    pub fn fail(mut self, code: &str, message: &str) -> Result<Self, DomainError> {
        if self.credits_charged.is_some() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: JobStatus::Failed,
            });
        }
        self.transition(JobStatus::Failed)?;
        self.credits_charged = Some(0);
        self.error_code = Some(code.to_string());
        self.error_message = Some(message.to_string());
        self.completed_at = Some(self.updated_at);
        Ok(self)
    }

    /// 将运行中的任务放回队列
    ///
    /// # 参数
    ///
    /// * `count_attempt` - 是否消耗一次重试次数；资源池耗尽等瞬时情况不消耗
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeJob)` - 回到Queued状态的任务
    /// * `Err(DomainError::RetryBudgetExceeded)` - 重试次数已用尽
    pub fn requeue(mut self, count_attempt: bool) -> Result<Self, DomainError> {
        if self.status != JobStatus::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: JobStatus::Queued,
            });
        }
        if count_attempt {
            if !self.can_retry() {
                return Err(DomainError::RetryBudgetExceeded {
                    retries: self.retry_count,
                });
            }
            self.retry_count += 1;
        }
        self.transition(JobStatus::Queued)?;
        self.worker_id = None;
        self.started_at = None;
        Ok(self)
    }

    /// 记录最近一次错误，不改变状态
    pub fn with_error(mut self, code: &str, message: &str) -> Self {
        self.error_code = Some(code.to_string());
        self.error_message = Some(message.to_string());
        self
    }

    /// 判断任务是否还有重试次数
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::credits::CreditBreakdown;

    fn quote(total_base: u64) -> CreditQuote {
        CreditQuote::from_breakdown(CreditBreakdown {
            base: total_base,
            ..Default::default()
        })
    }

    fn new_job() -> ScrapeJob {
        ScrapeJob::new(
            Uuid::new_v4(),
            "https://example.com".to_string(),
            EngineType::Browser,
            ProxyTier::Datacenter,
            ScrapeOptions::default(),
            quote(5),
        )
    }

    #[test]
    fn test_new_job_is_pending_with_estimate() {
        let job = new_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.credits_estimated, 5);
        assert_eq!(job.credits_charged, None);
        assert_eq!(job.id.get_version_num(), 7);
    }

    #[test]
    fn test_job_ids_are_time_sortable() {
        let first = new_job();
        let second = new_job();
        assert!(first.id < second.id);
    }

    #[test]
    fn test_happy_path_charges_estimate_once() {
        let job = new_job()
            .mark_queued()
            .unwrap()
            .start("worker-1")
            .unwrap()
            .complete()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.credits_charged, Some(5));
        assert!(job.completed_at.is_some());

        assert!(job.clone().complete().is_err());
        assert!(job.fail("X", "late failure").is_err());
    }

    #[test]
    fn test_failure_charges_nothing() {
        let job = new_job()
            .mark_queued()
            .unwrap()
            .start("worker-1")
            .unwrap()
            .fail("BLOCKED", "captcha wall")
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.credits_charged, Some(0));
        assert_eq!(job.error_code.as_deref(), Some("BLOCKED"));
        assert!(job.mark_queued().is_err());
    }

    #[test]
    fn test_cannot_skip_queue() {
        let err = new_job().start("worker-1").unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: JobStatus::Pending,
                to: JobStatus::Running
            }
        );
    }

    #[test]
    fn test_requeue_consumes_budget() {
        let job = new_job().with_max_retries(1).mark_queued().unwrap();
        let job = job.start("w").unwrap().requeue(true).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.worker_id.is_none());

        let err = job.start("w").unwrap().requeue(true).unwrap_err();
        assert_eq!(err, DomainError::RetryBudgetExceeded { retries: 1 });
    }

    #[test]
    fn test_requeue_without_counting_attempt() {
        let job = new_job().with_max_retries(0).mark_queued().unwrap();
        let job = job.start("w").unwrap().requeue(false).unwrap();
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn test_requeue_only_from_running() {
        let job = new_job().mark_queued().unwrap();
        assert!(job.requeue(false).is_err());
    }

    #[test]
    fn test_status_transition_table() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Queued));
        assert!(Running.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Queued));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Queued.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Completed));
    }
}
