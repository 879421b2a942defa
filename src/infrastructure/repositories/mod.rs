// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 提供领域仓库接口的具体实现：内存版与 Redis 版
pub mod memory_job_repo;
pub mod redis_job_repo;

pub use memory_job_repo::InMemoryJobRepository;
pub use redis_job_repo::RedisJobRepository;
