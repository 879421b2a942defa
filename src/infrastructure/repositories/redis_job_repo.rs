// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{JobResult, JobStatus, ScrapeJob};
use crate::domain::repositories::job_repository::{
    ensure_transition, JobPatch, JobRepository, RepositoryError,
};
use crate::infrastructure::redis_client::RedisClient;

impl From<redis::RedisError> for RepositoryError {
    fn from(err: redis::RedisError) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}

/// 并发更新冲突时的最大重试次数
const MAX_CAS_ATTEMPTS: usize = 5;

const COMPARE_AND_SET_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
if ARGV[3] ~= '' then
  redis.call('SET', KEYS[2], ARGV[3])
end
return 1
"#;

/// Redis 任务仓库
///
/// 任务以 JSON 存于 `{prefix}:job:{id}`，账户索引为按创建时间排序的
/// 有序集合 `{prefix}:account:{id}:jobs`，结果存于 `{prefix}:result:{id}`。
/// 状态更新使用比较并交换脚本，保证状态单向推进。
#[derive(Clone)]
pub struct RedisJobRepository {
    client: RedisClient,
    cas_script: Script,
}

impl RedisJobRepository {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            cas_script: Script::new(COMPARE_AND_SET_SCRIPT),
        }
    }

    fn job_key(&self, id: Uuid) -> String {
        self.client.key(&["job", &id.to_string()])
    }

    fn result_key(&self, id: Uuid) -> String {
        self.client.key(&["result", &id.to_string()])
    }

    fn account_key(&self, account_id: Uuid) -> String {
        self.client.key(&["account", &account_id.to_string(), "jobs"])
    }
}

#[async_trait]
impl JobRepository for RedisJobRepository {
    async fn create(&self, job: &ScrapeJob) -> Result<ScrapeJob, RepositoryError> {
        let payload = serde_json::to_string(job)?;
        let mut con = self.client.connection();

        let created: Option<String> = redis::cmd("SET")
            .arg(self.job_key(job.id))
            .arg(&payload)
            .arg("NX")
            .query_async(&mut con)
            .await?;
        if created.is_none() {
            return Err(RepositoryError::AlreadyExists(job.id));
        }

        let _: () = con
            .zadd(
                self.account_key(job.account_id),
                job.id.to_string(),
                job.created_at.timestamp_millis(),
            )
            .await?;
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeJob>, RepositoryError> {
        let mut con = self.client.connection();
        let raw: Option<String> = con.get(self.job_key(id)).await?;
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(RepositoryError::from)
    }

    async fn find_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ScrapeJob>, RepositoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut con = self.client.connection();
        let ids: Vec<String> = con
            .zrevrange(self.account_key(account_id), 0, limit as isize - 1)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.client.key(&["job", id]))
            .collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut con)
            .await?;

        let mut jobs = Vec::with_capacity(raws.len());
        for raw in raws.into_iter().flatten() {
            jobs.push(serde_json::from_str(&raw)?);
        }
        Ok(jobs)
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        patch: JobPatch,
    ) -> Result<(), RepositoryError> {
        let job_key = self.job_key(job_id);
        let result_payload = match &patch.result {
            Some(result) => serde_json::to_string(result)?,
            None => String::new(),
        };
        let mut con = self.client.connection();

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw: Option<String> = con.get(&job_key).await?;
            let raw = raw.ok_or(RepositoryError::NotFound(job_id))?;
            let mut job: ScrapeJob = serde_json::from_str(&raw)?;
            ensure_transition(job.status, status)?;
            patch.apply(&mut job, status);
            let updated = serde_json::to_string(&job)?;

            let swapped: i32 = self
                .cas_script
                .key(&job_key)
                .key(self.result_key(job_id))
                .arg(&raw)
                .arg(updated)
                .arg(&result_payload)
                .invoke_async(&mut con)
                .await?;
            if swapped == 1 {
                return Ok(());
            }
            debug!(job_id = %job_id, attempt, "Concurrent job update, retrying");
        }

        Err(RepositoryError::Storage(format!(
            "job {} kept changing during update",
            job_id
        )))
    }

    async fn find_result(&self, job_id: Uuid) -> Result<Option<JobResult>, RepositoryError> {
        let mut con = self.client.connection();
        let raw: Option<String> = con.get(self.result_key(job_id)).await?;
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(RepositoryError::from)
    }
}
