// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::{QueueSettings, Settings};
use crate::domain::models::{
    CreditQuote, DomainError, EngineHint, EngineType, JobStatus, ProxyTier, ScrapeJob,
    ScrapeOptions,
};
use crate::domain::repositories::{JobPatch, JobRepository, RepositoryError};
use crate::domain::services::{resolve_engine, select_proxy_tier, CreditCalculator};
use crate::engines::validators::validate_url;
use crate::queue::{EngineQueues, QueueError};
use crate::utils::retry_policy::RetryPolicy;

// === Section: Request & Response ===

/// 客户端提交的抓取请求
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSubmission {
    pub account_id: Uuid,
    pub url: String,
    /// 引擎提示，缺省时按选项推断
    #[serde(default)]
    pub engine: Option<EngineHint>,
    #[serde(default)]
    pub options: ScrapeOptions,
    /// 优先级，越大越先执行
    #[serde(default)]
    pub priority: u8,
}

impl ScrapeSubmission {
    pub fn new(account_id: Uuid, url: impl Into<String>, options: ScrapeOptions) -> Self {
        Self {
            account_id,
            url: url.into(),
            engine: None,
            options,
            priority: 0,
        }
    }

    pub fn with_engine(mut self, hint: EngineHint) -> Self {
        self.engine = Some(hint);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// 提交前的报价
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionQuote {
    pub engine: EngineType,
    pub proxy_tier: ProxyTier,
    pub quote: CreditQuote,
}

/// 提交错误
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SubmitError {
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::InvalidUrl(_) => "INVALID_URL",
            SubmitError::InvalidOptions(_) => "INVALID_OPTIONS",
            SubmitError::Repository(_) => "REPOSITORY_ERROR",
            SubmitError::Queue(e) if e.is_transient() => "QUEUE_UNAVAILABLE",
            SubmitError::Queue(_) => "QUEUE_ERROR",
            SubmitError::Domain(_) => "DOMAIN_ERROR",
        }
    }
}

// === Section: Use Case Definition ===

/// 提交抓取任务用例
///
/// 校验地址、解析引擎与代理层级、计算报价、创建任务并放入对应引擎的队列。
pub struct SubmitScrapeUseCase {
    queues: EngineQueues,
    repository: Arc<dyn JobRepository>,
    calculator: CreditCalculator,
    queue_settings: QueueSettings,
    allow_private_networks: bool,
    max_job_timeout_ms: u64,
}

// === Section: Implementation ===

impl SubmitScrapeUseCase {
    pub fn new(queues: EngineQueues, repository: Arc<dyn JobRepository>, settings: &Settings) -> Self {
        Self {
            queues,
            repository,
            calculator: CreditCalculator::new(settings.credits.clone()),
            queue_settings: settings.queue.clone(),
            allow_private_networks: settings.http_engine.allow_private_networks,
            max_job_timeout_ms: settings.workers.max_job_timeout_ms,
        }
    }

    /// 计算报价，不产生任何副作用
    pub fn quote(&self, request: &ScrapeSubmission) -> SubmissionQuote {
        let engine = resolve_engine(request.engine, &request.options);
        let proxy_tier = select_proxy_tier(&request.options);
        let quote = self.calculator.compute(engine, proxy_tier, &request.options);
        SubmissionQuote {
            engine,
            proxy_tier,
            quote,
        }
    }

    /// 提交抓取任务
    ///
    /// 任务先以 `Pending` 创建并记为 `Queued`，再放入队列。
    /// 队列持续不可用时任务记为失败，不扣积分。
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeJob)` - 已入队的任务
    /// * `Err(SubmitError)` - 校验、存储或入队失败
    #[instrument(skip(self, request), fields(account_id = %request.account_id, url = %request.url))]
    pub async fn submit(&self, request: ScrapeSubmission) -> Result<ScrapeJob, SubmitError> {
        let url = validate_url(&request.url, self.allow_private_networks)
            .map_err(|e| SubmitError::InvalidUrl(e.to_string()))?;
        self.check_options(&request.options)?;

        let SubmissionQuote {
            engine,
            proxy_tier,
            quote,
        } = self.quote(&request);

        let job = ScrapeJob::new(
            request.account_id,
            url.to_string(),
            engine,
            proxy_tier,
            request.options,
            quote,
        )
        .with_priority(request.priority)
        .with_max_retries(self.queue_settings.max_retries.get(engine));

        self.repository.create(&job).await?;

        // Recorded as queued before it becomes visible so a fast worker
        // never observes a pending job.
        let job = job.mark_queued()?;
        self.repository
            .update_status(job.id, JobStatus::Queued, JobPatch::default())
            .await?;

        if let Err(e) = self.enqueue_with_retry(&job).await {
            error!(job_id = %job.id, "Failed to enqueue job: {}", e);
            self.mark_unqueued(job, &e).await;
            return Err(e.into());
        }

        counter!("jobs_submitted_total", "engine" => engine.as_str()).increment(1);
        info!(
            job_id = %job.id,
            engine = %engine,
            proxy_tier = %proxy_tier,
            credits_estimated = job.credits_estimated,
            "Scrape job submitted"
        );
        Ok(job)
    }

    fn check_options(&self, options: &ScrapeOptions) -> Result<(), SubmitError> {
        match options.timeout_ms {
            Some(ms) if ms == 0 || ms > self.max_job_timeout_ms => {
                Err(SubmitError::InvalidOptions(format!(
                    "timeout_ms must be between 1 and {}, got {}",
                    self.max_job_timeout_ms, ms
                )))
            }
            _ => Ok(()),
        }
    }

    async fn enqueue_with_retry(&self, job: &ScrapeJob) -> Result<(), QueueError> {
        let policy = RetryPolicy::for_enqueue(&self.queue_settings);
        let queue = self.queues.for_engine(job.engine);
        let mut attempt = 0;

        loop {
            match queue.enqueue(job).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                    attempt += 1;
                    let backoff = policy.calculate_backoff(attempt);
                    warn!(
                        job_id = %job.id,
                        attempt,
                        ?backoff,
                        "Queue unavailable, retrying enqueue: {}",
                        e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn mark_unqueued(&self, job: ScrapeJob, cause: &QueueError) {
        let code = if cause.is_transient() {
            "QUEUE_UNAVAILABLE"
        } else {
            "QUEUE_ERROR"
        };
        let job_id = job.id;
        let failed = match job.fail(code, &cause.to_string()) {
            Ok(failed) => failed,
            Err(e) => {
                warn!(%job_id, "Cannot mark unqueued job failed: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .repository
            .update_status(job_id, JobStatus::Failed, JobPatch::from_job(&failed))
            .await
        {
            error!(%job_id, "Failed to record enqueue failure: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "submit_scrape_test.rs"]
mod tests;
