// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，遵循依赖倒置原则。
/// 具体实现（内存、Redis）由基础设施层提供。
pub mod job_repository;

pub use job_repository::{JobPatch, JobRepository, RepositoryError};
