// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{EngineType, ScrapeJob};
use crate::queue::job_queue::{
    next_requeue_state, queued_copy, ClaimedJob, JobQueue, QueueError, QueueStats,
    RequeueOutcome,
};

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, ScrapeJob>,
    /// (优先级倒序, 入队序号) → 任务ID
    ready: BTreeMap<(Reverse<u8>, u64), Uuid>,
    /// (到期时间, 入队序号) → 任务ID
    delayed: BTreeMap<(Instant, u64), Uuid>,
    /// 任务ID → (领取令牌, 领取到期时间)
    claimed: HashMap<Uuid, (Uuid, Instant)>,
    seq: u64,
}

impl QueueState {
    fn push_ready(&mut self, id: Uuid, priority: u8) {
        self.seq += 1;
        self.ready.insert((Reverse(priority), self.seq), id);
    }

    fn push_delayed(&mut self, id: Uuid, due: Instant) {
        self.seq += 1;
        self.delayed.insert((due, self.seq), id);
    }

    fn priority_of(&self, id: &Uuid) -> u8 {
        self.jobs.get(id).map(|job| job.priority).unwrap_or(0)
    }

    /// 将到期的延迟任务和过期的领取放回就绪队列
    fn promote(&mut self, now: Instant) {
        loop {
            let next = self.delayed.first_key_value().map(|(key, id)| (*key, *id));
            let Some(((due, seq), id)) = next else {
                break;
            };
            if due > now {
                break;
            }
            self.delayed.remove(&(due, seq));
            let priority = self.priority_of(&id);
            self.push_ready(id, priority);
        }

        let expired: Vec<Uuid> = self
            .claimed
            .iter()
            .filter(|(_, (_, expiry))| *expiry <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.claimed.remove(&id);
            debug!(job_id = %id, "Claim expired, redelivering job");
            let priority = self.priority_of(&id);
            self.push_ready(id, priority);
        }
    }

    /// 下一个需要重新检查的时间点
    fn next_wakeup(&self) -> Option<Instant> {
        let next_delayed = self.delayed.keys().next().map(|(due, _)| *due);
        let next_expiry = self.claimed.values().map(|(_, expiry)| *expiry).min();
        match (next_delayed, next_expiry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn holds_claim(&self, claimed: &ClaimedJob) -> bool {
        self.claimed
            .get(&claimed.job.id)
            .is_some_and(|(token, _)| *token == claimed.claim_token)
    }
}

/// 内存任务队列
///
/// 单进程使用（测试与本地开发），语义与 Redis 队列一致。
pub struct InMemoryJobQueue {
    engine: EngineType,
    claim_ttl: Duration,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryJobQueue {
    pub fn new(engine: EngineType, claim_ttl: Duration) -> Self {
        Self {
            engine,
            claim_ttl,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    fn try_claim(&self) -> (Option<ClaimedJob>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.promote(now);

        while let Some((_, id)) = state.ready.pop_first() {
            let Some(job) = state.jobs.get(&id).cloned() else {
                continue;
            };
            let token = Uuid::new_v4();
            state.claimed.insert(id, (token, now + self.claim_ttl));
            return (
                Some(ClaimedJob {
                    job,
                    claim_token: token,
                }),
                None,
            );
        }
        (None, state.next_wakeup())
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &ScrapeJob) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            if state.jobs.contains_key(&job.id) {
                return Err(QueueError::InvalidJob(format!(
                    "job {} is already queued",
                    job.id
                )));
            }
            let stored = queued_copy(job)?;
            state.jobs.insert(job.id, stored);
            state.push_ready(job.id, job.priority);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ClaimedJob>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (claimed, next_wakeup) = self.try_claim();
            if let Some(claimed) = claimed {
                return Ok(Some(claimed));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }

            let wake_at = next_wakeup.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, claimed: &ClaimedJob) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if !state.holds_claim(claimed) {
            return Err(QueueError::ClaimLost(claimed.job.id));
        }
        state.claimed.remove(&claimed.job.id);
        state.jobs.remove(&claimed.job.id);
        Ok(())
    }

    async fn requeue(
        &self,
        claimed: ClaimedJob,
        delay: Duration,
        count_attempt: bool,
    ) -> Result<RequeueOutcome, QueueError> {
        let outcome = {
            let mut state = self.state.lock();
            if !state.holds_claim(&claimed) {
                return Err(QueueError::ClaimLost(claimed.job.id));
            }
            let id = claimed.job.id;

            match next_requeue_state(&claimed, count_attempt)? {
                Some(job) => {
                    state.claimed.remove(&id);
                    let priority = job.priority;
                    state.jobs.insert(id, job.clone());
                    if delay.is_zero() {
                        state.push_ready(id, priority);
                    } else {
                        state.push_delayed(id, Instant::now() + delay);
                    }
                    RequeueOutcome::Requeued(job)
                }
                None => {
                    state.claimed.remove(&id);
                    state.jobs.remove(&id);
                    RequeueOutcome::Exhausted(claimed.job)
                }
            }
        };
        self.notify.notify_waiters();
        Ok(outcome)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let state = self.state.lock();
        Ok(QueueStats {
            ready: state.ready.len(),
            delayed: state.delayed.len(),
            in_flight: state.claimed.len(),
        })
    }

    fn engine(&self) -> EngineType {
        self.engine
    }
}
