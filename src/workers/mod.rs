// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供按引擎划分的工作器池和编排器
/// 包括任务执行、工作器生命周期管理和优雅停机
pub mod engine_worker;
pub mod manager;
pub mod pool;

pub use engine_worker::{EngineWorker, JobOutcome, WorkerContext};
pub use manager::{
    wait_for_shutdown_signal, OrchestratorDeps, StopReport, WorkerOrchestrator, WorkerSetInfo,
};
pub use pool::{DrainReport, WorkerPool};
