// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::QueueSettings;
use crate::domain::models::{EngineType, JobResult, JobStatus, ScrapeJob};
use crate::domain::repositories::{JobPatch, JobRepository, RepositoryError};
use crate::engines::browser_pool::{BrowserHandle, BrowserPool};
use crate::engines::proxy::ProxyProvider;
use crate::engines::traits::{EngineError, ScrapeEngine, ScrapeRequest};
use crate::queue::{ClaimedJob, JobQueue, RequeueOutcome};
use crate::utils::errors::JobError;
use crate::utils::retry_policy::RetryPolicy;

/// 出队失败后的退避时间
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// 工作器依赖
///
/// 同一引擎池内的所有循环共享一份。
pub struct WorkerContext {
    pub engine_type: EngineType,
    pub queue: Arc<dyn JobQueue>,
    pub repository: Arc<dyn JobRepository>,
    pub engine: Arc<dyn ScrapeEngine>,
    /// 仅浏览器与反检测引擎持有
    pub browser_pool: Option<BrowserPool>,
    pub proxies: Arc<ProxyProvider>,
    pub queue_settings: QueueSettings,
    /// 任务未指定超时时的默认值
    pub job_timeout: Duration,
    /// 任务超时上限，必须小于队列领取时长
    pub max_job_timeout: Duration,
    pub acquire_timeout: Duration,
}

/// 单个任务处理后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    Requeued,
    /// 任务已被其他处理者终结或领取丢失，未做任何修改
    Skipped,
}

/// 引擎工作器
///
/// 一个长期运行的循环：出队、执行、记录结果、确认。
/// 任务级错误只记录到任务上，不会中断循环。
pub struct EngineWorker {
    id: String,
    ctx: Arc<WorkerContext>,
    retry_policy: RetryPolicy,
}

impl EngineWorker {
    pub fn new(id: String, ctx: Arc<WorkerContext>) -> Self {
        let retry_policy = RetryPolicy::for_engine(&ctx.queue_settings, ctx.engine_type);
        Self {
            id,
            ctx,
            retry_policy,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 运行工作循环，直到取消令牌触发
    ///
    /// 取消只在任务之间检查；正在执行的任务只会被自身超时或强制终止打断。
    pub async fn run(self, cancel: CancellationToken) {
        info!(worker_id = %self.id, engine = %self.ctx.engine_type, "Worker started");
        let dequeue_timeout = self.ctx.queue_settings.dequeue_timeout();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.ctx.queue.dequeue(dequeue_timeout) => next,
            };

            match next {
                Ok(Some(claimed)) => {
                    self.process(claimed).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker_id = %self.id, "Dequeue failed: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// 处理一个已领取的任务
    #[instrument(
        skip(self, claimed),
        fields(
            worker_id = %self.id,
            job_id = %claimed.job.id,
            engine = %self.ctx.engine_type,
            url = %claimed.job.url
        )
    )]
    pub async fn process(&self, claimed: ClaimedJob) -> JobOutcome {
        let started = Instant::now();

        let job = match claimed.job.clone().start(&self.id) {
            Ok(job) => job,
            Err(e) => {
                error!("Dequeued job cannot start: {}", e);
                self.acknowledge(&claimed).await;
                return JobOutcome::Skipped;
            }
        };

        match self
            .persist(job.id, JobStatus::Running, JobPatch::from_job(&job))
            .await
        {
            Ok(()) => {}
            Err(RepositoryError::InvalidTransition { from, .. }) => {
                info!(status = %from, "Job already finalised, dropping duplicate delivery");
                self.acknowledge(&claimed).await;
                return JobOutcome::Skipped;
            }
            Err(e) => {
                error!("Failed to mark job running: {}", e);
                let claimed = ClaimedJob { job, ..claimed };
                return self
                    .finalize_failed(claimed, JobError::from(e), true)
                    .await;
            }
        }

        let claimed = ClaimedJob { job, ..claimed };
        let outcome = self.execute(claimed).await;
        histogram!("job_duration_seconds", "engine" => self.ctx.engine_type.as_str())
            .record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn execute(&self, claimed: ClaimedJob) -> JobOutcome {
        let handle = match self.checkout_browser().await {
            Ok(handle) => handle,
            Err(JobError::PoolExhausted(reason)) => {
                warn!("Browser pool exhausted ({}), requeueing without consuming a retry", reason);
                let delay = self.ctx.queue_settings.pool_exhausted_delay();
                return self.requeue(claimed, delay, false, "pool_exhausted").await;
            }
            Err(JobError::PoolClosed) => {
                info!("Browser pool closed, returning job to the queue");
                return self.requeue(claimed, Duration::ZERO, false, "pool_closed").await;
            }
            Err(e) => return self.handle_failure(claimed, e).await,
        };

        let request = ScrapeRequest::from_job(
            &claimed.job,
            self.ctx.job_timeout,
            self.ctx.max_job_timeout,
        )
        .with_proxy(
            self.ctx
                .proxies
                .proxy_for(claimed.job.proxy_tier, claimed.job.options.country.as_deref()),
        );
        let timeout = request.timeout;

        let result = match tokio::time::timeout(
            timeout,
            self.ctx.engine.scrape(&request, handle.as_ref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(timeout)),
        };

        if let (Some(pool), Some(handle)) = (&self.ctx.browser_pool, handle) {
            pool.release(handle).await;
        }

        match result {
            Ok(result) => self.handle_success(claimed, result).await,
            Err(e) => self.handle_failure(claimed, JobError::from(e)).await,
        }
    }

    async fn checkout_browser(&self) -> Result<Option<BrowserHandle>, JobError> {
        match &self.ctx.browser_pool {
            Some(pool) if self.ctx.engine_type.requires_browser() => {
                let handle = pool.acquire(self.ctx.acquire_timeout).await?;
                debug!(browser_id = handle.id(), "Browser checked out");
                Ok(Some(handle))
            }
            _ => Ok(None),
        }
    }

    async fn handle_success(&self, claimed: ClaimedJob, result: JobResult) -> JobOutcome {
        let job = match claimed.job.clone().complete() {
            Ok(job) => job,
            Err(e) => {
                error!("Cannot complete job: {}", e);
                self.acknowledge(&claimed).await;
                return JobOutcome::Skipped;
            }
        };

        let patch = JobPatch::from_job(&job).with_result(result);
        if let Err(e) = self.persist(job.id, JobStatus::Completed, patch).await {
            error!("Failed to record completed job: {}", e);
            return self
                .finalize_failed(claimed, JobError::from(e), true)
                .await;
        }

        self.acknowledge(&claimed).await;
        let engine = self.ctx.engine_type.as_str();
        counter!("jobs_completed_total", "engine" => engine).increment(1);
        counter!("credits_charged_total", "engine" => engine)
            .increment(job.credits_charged.unwrap_or(0));
        info!(credits = job.credits_estimated, "Job completed");
        JobOutcome::Completed
    }

    async fn handle_failure(&self, claimed: ClaimedJob, error: JobError) -> JobOutcome {
        if !error.is_retryable() {
            warn!(code = error.code(), "Job failed terminally: {}", error);
            return self.finalize_failed(claimed, error, true).await;
        }

        let attempt = claimed.job.retry_count + 1;
        let delay = self.retry_policy.calculate_backoff(attempt);
        warn!(
            code = error.code(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Job failed, scheduling retry: {}",
            error
        );

        let job = claimed
            .job
            .clone()
            .with_error(error.code(), &error.to_string());
        let claimed = ClaimedJob { job, ..claimed };

        match self.ctx.queue.requeue(claimed.clone(), delay, true).await {
            Ok(RequeueOutcome::Requeued(job)) => {
                counter!(
                    "jobs_requeued_total",
                    "engine" => self.ctx.engine_type.as_str(),
                    "reason" => "retry"
                )
                .increment(1);
                self.record_requeued(&job).await;
                JobOutcome::Requeued
            }
            Ok(RequeueOutcome::Exhausted(job)) => {
                let exhausted = JobError::RetryBudgetExceeded {
                    retries: job.retry_count,
                    last_error: error.to_string(),
                };
                // The queue has already dropped the job.
                self.finalize_failed(ClaimedJob { job, ..claimed }, exhausted, false)
                    .await
            }
            Err(e) => {
                error!("Failed to requeue job, leaving it to claim expiry: {}", e);
                JobOutcome::Skipped
            }
        }
    }

    async fn requeue(
        &self,
        claimed: ClaimedJob,
        delay: Duration,
        count_attempt: bool,
        reason: &'static str,
    ) -> JobOutcome {
        match self
            .ctx
            .queue
            .requeue(claimed.clone(), delay, count_attempt)
            .await
        {
            Ok(RequeueOutcome::Requeued(job)) => {
                counter!(
                    "jobs_requeued_total",
                    "engine" => self.ctx.engine_type.as_str(),
                    "reason" => reason
                )
                .increment(1);
                self.record_requeued(&job).await;
                JobOutcome::Requeued
            }
            Ok(RequeueOutcome::Exhausted(job)) => {
                let error = JobError::RetryBudgetExceeded {
                    retries: job.retry_count,
                    last_error: reason.to_string(),
                };
                self.finalize_failed(ClaimedJob { job, ..claimed }, error, false)
                    .await
            }
            Err(e) => {
                error!("Failed to requeue job, leaving it to claim expiry: {}", e);
                JobOutcome::Skipped
            }
        }
    }

    async fn record_requeued(&self, job: &ScrapeJob) {
        if let Err(e) = self
            .persist(job.id, JobStatus::Queued, JobPatch::from_job(job))
            .await
        {
            // The queue copy is authoritative for scheduling; the record catches up on the next attempt.
            warn!("Failed to record requeued job: {}", e);
        }
    }

    /// 将任务终结为失败并扣除零积分
    async fn finalize_failed(
        &self,
        claimed: ClaimedJob,
        error: JobError,
        acknowledge: bool,
    ) -> JobOutcome {
        let code = error.code();
        let message = error.to_string();

        match claimed.job.clone().fail(code, &message) {
            Ok(job) => {
                if let Err(e) = self
                    .persist(job.id, JobStatus::Failed, JobPatch::from_job(&job))
                    .await
                {
                    error!("Failed to record failed job: {}", e);
                }
            }
            Err(e) => error!("Cannot fail job: {}", e),
        }

        if acknowledge {
            self.acknowledge(&claimed).await;
        }
        counter!(
            "jobs_failed_total",
            "engine" => self.ctx.engine_type.as_str(),
            "code" => code
        )
        .increment(1);
        JobOutcome::Failed
    }

    async fn acknowledge(&self, claimed: &ClaimedJob) {
        if let Err(e) = self.ctx.queue.acknowledge(claimed).await {
            warn!("Failed to acknowledge job: {}", e);
        }
    }

    /// 写入任务状态，存储错误时重试一次
    async fn persist(
        &self,
        job_id: Uuid,
        status: JobStatus,
        patch: JobPatch,
    ) -> Result<(), RepositoryError> {
        match self
            .ctx
            .repository
            .update_status(job_id, status, patch.clone())
            .await
        {
            Err(RepositoryError::Storage(e)) => {
                warn!(status = %status, "Repository write failed, retrying once: {}", e);
                self.ctx.repository.update_status(job_id, status, patch).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "engine_worker_test.rs"]
mod tests;
