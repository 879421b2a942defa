// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::models::{JobResult, JobStatus, ScrapeJob};
use crate::domain::repositories::job_repository::{
    ensure_transition, JobPatch, JobRepository, RepositoryError,
};

/// 内存任务仓库
///
/// 用于测试和单进程部署。状态检查与写入在同一把分片锁内完成。
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<Uuid, ScrapeJob>,
    results: DashMap<Uuid, JobResult>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &ScrapeJob) -> Result<ScrapeJob, RepositoryError> {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(job.clone())
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeJob>, RepositoryError> {
        Ok(self.jobs.get(&id).map(|job| job.clone()))
    }

    async fn find_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScrapeJob>, RepositoryError> {
        let mut jobs: Vec<ScrapeJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        patch: JobPatch,
    ) -> Result<(), RepositoryError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(RepositoryError::NotFound(job_id))?;
        ensure_transition(job.status, status)?;
        patch.apply(&mut job, status);
        if let Some(result) = patch.result {
            self.results.insert(job_id, result);
        }
        Ok(())
    }

    async fn find_result(&self, job_id: Uuid) -> Result<Option<JobResult>, RepositoryError> {
        Ok(self.results.get(&job_id).map(|result| result.clone()))
    }
}
