// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use redis::Script;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::models::{EngineType, ScrapeJob};
use crate::infrastructure::redis_client::RedisClient;
use crate::queue::job_queue::{
    next_requeue_state, queued_copy, ClaimedJob, JobQueue, QueueError, QueueStats,
    RequeueOutcome,
};

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

/// Width of the enqueue-time component of a ready score.
const PRIORITY_STRIDE: u64 = 10_000_000_000_000;

const ENQUEUE_SCRIPT: &str = r#"
if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
  return 0
end
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
return 1
"#;

const DEQUEUE_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])

local function ready_score(id)
  local raw = redis.call('HGET', KEYS[4], id)
  if not raw then
    return nil
  end
  local priority = tonumber(cjson.decode(raw)['priority']) or 0
  return string.format('%.0f', (255 - priority) * 10000000000000 + now)
end

for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now, 'LIMIT', 0, 100)) do
  redis.call('ZREM', KEYS[2], id)
  local score = ready_score(id)
  if score then
    redis.call('ZADD', KEYS[1], score, id)
  end
end

for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now, 'LIMIT', 0, 100)) do
  redis.call('ZREM', KEYS[3], id)
  redis.call('HDEL', KEYS[5], id)
  local score = ready_score(id)
  if score then
    redis.call('ZADD', KEYS[1], score, id)
  end
end

while true do
  local popped = redis.call('ZPOPMIN', KEYS[1])
  if #popped == 0 then
    return false
  end
  local id = popped[1]
  local raw = redis.call('HGET', KEYS[4], id)
  if raw then
    redis.call('ZADD', KEYS[3], ARGV[2], id)
    redis.call('HSET', KEYS[5], id, ARGV[3])
    return raw
  end
end
"#;

const ACK_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
return 1
"#;

const REQUEUE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[3], ARGV[1], ARGV[3])
if ARGV[4] == 'delayed' then
  redis.call('ZADD', KEYS[5], ARGV[5], ARGV[1])
else
  redis.call('ZADD', KEYS[4], ARGV[5], ARGV[1])
end
return 1
"#;

/// 就绪集合的分数：优先级高的在前，同优先级按入队时间先后
pub(crate) fn ready_score(priority: u8, now_ms: u64) -> u64 {
    (255 - priority as u64) * PRIORITY_STRIDE + now_ms
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Debug, Clone)]
struct QueueKeys {
    ready: String,
    delayed: String,
    processing: String,
    jobs: String,
    claims: String,
}

impl QueueKeys {
    fn new(client: &RedisClient, engine: EngineType) -> Self {
        let base = ["queue", engine.as_str()];
        let key = |suffix: &str| client.key(&[base[0], base[1], suffix]);
        Self {
            ready: key("ready"),
            delayed: key("delayed"),
            processing: key("processing"),
            jobs: key("jobs"),
            claims: key("claims"),
        }
    }
}

/// Redis 任务队列
///
/// 键布局（每个引擎一组）：
/// - `ready`：就绪任务有序集合
/// - `delayed`：延迟任务有序集合，分数为到期时间
/// - `processing`：已领取任务有序集合，分数为领取到期时间
/// - `jobs`：任务 JSON 哈希
/// - `claims`：领取令牌哈希
///
/// 领取、确认和重新入队都通过 Lua 脚本原子执行。
pub struct RedisJobQueue {
    client: RedisClient,
    engine: EngineType,
    keys: QueueKeys,
    claim_ttl: Duration,
    poll_interval: Duration,
    enqueue_script: Script,
    dequeue_script: Script,
    ack_script: Script,
    requeue_script: Script,
}

impl RedisJobQueue {
    pub fn new(
        client: RedisClient,
        engine: EngineType,
        claim_ttl: Duration,
        poll_interval: Duration,
    ) -> Self {
        let keys = QueueKeys::new(&client, engine);
        Self {
            client,
            engine,
            keys,
            claim_ttl,
            poll_interval: poll_interval.max(Duration::from_millis(10)),
            enqueue_script: Script::new(ENQUEUE_SCRIPT),
            dequeue_script: Script::new(DEQUEUE_SCRIPT),
            ack_script: Script::new(ACK_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
        }
    }

    async fn try_claim(&self) -> Result<Option<ClaimedJob>, QueueError> {
        let mut con = self.client.connection();
        let now = now_ms();
        let token = Uuid::new_v4();
        let claim_expiry = now + self.claim_ttl.as_millis() as u64;

        let raw: Option<String> = self
            .dequeue_script
            .key(&self.keys.ready)
            .key(&self.keys.delayed)
            .key(&self.keys.processing)
            .key(&self.keys.jobs)
            .key(&self.keys.claims)
            .arg(now)
            .arg(claim_expiry)
            .arg(token.to_string())
            .invoke_async(&mut con)
            .await?;

        match raw {
            Some(raw) => {
                let job: ScrapeJob = serde_json::from_str(&raw)?;
                debug!(job_id = %job.id, engine = %self.engine, "Claimed job");
                Ok(Some(ClaimedJob {
                    job,
                    claim_token: token,
                }))
            }
            None => Ok(None),
        }
    }

    async fn release_claim(&self, claimed: &ClaimedJob) -> Result<(), QueueError> {
        let mut con = self.client.connection();
        let removed: i32 = self
            .ack_script
            .key(&self.keys.processing)
            .key(&self.keys.claims)
            .key(&self.keys.jobs)
            .arg(claimed.job.id.to_string())
            .arg(claimed.claim_token.to_string())
            .invoke_async(&mut con)
            .await?;

        if removed == 0 {
            warn!(job_id = %claimed.job.id, "Claim lost before acknowledge");
            return Err(QueueError::ClaimLost(claimed.job.id));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &ScrapeJob) -> Result<(), QueueError> {
        let stored = queued_copy(job)?;
        let payload = serde_json::to_string(&stored)?;
        let mut con = self.client.connection();

        let inserted: i32 = self
            .enqueue_script
            .key(&self.keys.jobs)
            .key(&self.keys.ready)
            .arg(job.id.to_string())
            .arg(payload)
            .arg(ready_score(job.priority, now_ms()))
            .invoke_async(&mut con)
            .await?;

        if inserted == 0 {
            return Err(QueueError::InvalidJob(format!(
                "job {} is already queued",
                job.id
            )));
        }
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ClaimedJob>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(claimed) = self.try_claim().await? {
                return Ok(Some(claimed));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), QueueError> {
        self.release_claim(claimed).await
    }

    async fn requeue(
        &self,
        claimed: ClaimedJob,
        delay: Duration,
        count_attempt: bool,
    ) -> Result<RequeueOutcome, QueueError> {
        let Some(job) = next_requeue_state(&claimed, count_attempt)? else {
            self.release_claim(&claimed).await?;
            return Ok(RequeueOutcome::Exhausted(claimed.job));
        };

        let payload = serde_json::to_string(&job)?;
        let now = now_ms();
        let (target, score) = if delay.is_zero() {
            ("ready", ready_score(job.priority, now))
        } else {
            ("delayed", now + delay.as_millis() as u64)
        };

        let mut con = self.client.connection();
        let moved: i32 = self
            .requeue_script
            .key(&self.keys.processing)
            .key(&self.keys.claims)
            .key(&self.keys.jobs)
            .key(&self.keys.ready)
            .key(&self.keys.delayed)
            .arg(job.id.to_string())
            .arg(claimed.claim_token.to_string())
            .arg(payload)
            .arg(target)
            .arg(score)
            .invoke_async(&mut con)
            .await?;

        if moved == 0 {
            return Err(QueueError::ClaimLost(job.id));
        }
        Ok(RequeueOutcome::Requeued(job))
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut con = self.client.connection();
        let (ready, delayed, in_flight): (usize, usize, usize) = redis::pipe()
            .zcard(&self.keys.ready)
            .zcard(&self.keys.delayed)
            .zcard(&self.keys.processing)
            .query_async(&mut con)
            .await?;
        Ok(QueueStats {
            ready,
            delayed,
            in_flight,
        })
    }

    fn engine(&self) -> EngineType {
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_score_orders_priority_then_time() {
        let now = 1_735_689_600_000;
        assert!(ready_score(5, now + 60_000) < ready_score(0, now));
        assert!(ready_score(0, now) < ready_score(0, now + 1));
        // Exact in an f64 sorted-set score.
        assert!(ready_score(0, now) < (1u64 << 53));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn test_round_trip_against_redis() {
        use crate::domain::models::{CreditQuote, ProxyTier, ScrapeOptions};

        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let prefix = format!("scrapifie-test-{}", Uuid::new_v4());
        let client = RedisClient::connect(&url, &prefix).await.unwrap();
        let queue = RedisJobQueue::new(
            client,
            EngineType::Http,
            Duration::from_secs(30),
            Duration::from_millis(20),
        );

        let job = ScrapeJob::new(
            Uuid::new_v4(),
            "https://example.com".to_string(),
            EngineType::Http,
            ProxyTier::Datacenter,
            ScrapeOptions::default(),
            CreditQuote::from_breakdown(Default::default()),
        )
        .with_max_retries(1);
        queue.enqueue(&job).await.unwrap();
        assert!(queue.enqueue(&job).await.is_err());

        let mut claimed = queue
            .dequeue(Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.job.id, job.id);
        claimed.job = claimed.job.start("w").unwrap();

        let outcome = queue
            .requeue(claimed, Duration::ZERO, true)
            .await
            .unwrap();
        assert!(matches!(outcome, RequeueOutcome::Requeued(ref j) if j.retry_count == 1));

        let claimed = queue
            .dequeue(Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        queue.acknowledge(&claimed).await.unwrap();
        assert_eq!(queue.stats().await.unwrap(), QueueStats::default());
    }
}
