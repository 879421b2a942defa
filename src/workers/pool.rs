// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::gauge;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::models::EngineType;
use crate::workers::engine_worker::{EngineWorker, WorkerContext};

/// 引擎池排空结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 在时限内自行退出的循环数
    pub drained: usize,
    /// 超时后被强制终止的循环数
    pub aborted: usize,
}

/// 单个引擎的工作器池
///
/// 持有 N 个工作循环任务，不持有任何任务数据。
pub struct WorkerPool {
    engine: EngineType,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 启动工作器池
    ///
    /// # 参数
    ///
    /// * `ctx` - 池内工作器共享的依赖
    /// * `concurrency` - 循环数
    /// * `generation` - 编排器启动代数，用于生成工作器 ID
    /// * `parent` - 编排器级取消令牌
    pub fn start(
        ctx: Arc<WorkerContext>,
        concurrency: usize,
        generation: u64,
        parent: &CancellationToken,
    ) -> Self {
        let engine = ctx.engine_type;
        let cancel = parent.child_token();
        let tasks = (0..concurrency)
            .map(|index| {
                let worker = EngineWorker::new(
                    format!("{}-{}-{}", engine, generation, index),
                    ctx.clone(),
                );
                tokio::spawn(worker.run(cancel.clone()))
            })
            .collect();

        gauge!("workers_running", "engine" => engine.as_str()).set(concurrency as f64);
        info!(engine = %engine, concurrency, generation, "Worker pool started");
        Self {
            engine,
            cancel,
            tasks,
        }
    }

    pub fn engine(&self) -> EngineType {
        self.engine
    }

    /// 配置的循环数
    pub fn concurrency(&self) -> usize {
        self.tasks.len()
    }

    /// 仍在运行的循环数
    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// 通知所有循环在当前任务结束后退出
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 等待循环退出，截止时间后强制终止剩余循环
    pub async fn drain(self, deadline: Instant) -> DrainReport {
        self.cancel.cancel();
        let mut report = DrainReport::default();

        for mut task in self.tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, &mut task).await {
                Ok(Ok(())) => report.drained += 1,
                Ok(Err(e)) => {
                    warn!(engine = %self.engine, "Worker task ended abnormally: {}", e);
                    report.drained += 1;
                }
                Err(_) => {
                    task.abort();
                    // Wait for the abort so dropped browser handles free their slots.
                    let _ = task.await;
                    report.aborted += 1;
                }
            }
        }

        gauge!("workers_running", "engine" => self.engine.as_str()).set(0.0);
        if report.aborted > 0 {
            warn!(
                engine = %self.engine,
                aborted = report.aborted,
                "Force-cancelled workers after drain timeout"
            );
        } else {
            info!(engine = %self.engine, drained = report.drained, "Worker pool drained");
        }
        report
    }
}
