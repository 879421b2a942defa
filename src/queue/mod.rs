// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 按引擎划分的任务队列：特质定义、Redis 实现与内存实现
pub mod job_queue;
pub mod memory_queue;
pub mod redis_queue;

pub use job_queue::{ClaimedJob, EngineQueues, JobQueue, QueueError, QueueStats, RequeueOutcome};
pub use memory_queue::InMemoryJobQueue;
pub use redis_queue::RedisJobQueue;
