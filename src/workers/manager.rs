// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::settings::Settings;
use crate::domain::models::EngineType;
use crate::domain::repositories::JobRepository;
use crate::engines::browser_pool::{BrowserPool, BrowserPoolConfig, CloseReport, PoolStats};
use crate::engines::proxy::ProxyProvider;
use crate::engines::registry::EngineRegistry;
use crate::engines::traits::BrowserLauncher;
use crate::queue::EngineQueues;
use crate::workers::engine_worker::WorkerContext;
use crate::workers::pool::WorkerPool;

/// 编排器依赖
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub queues: EngineQueues,
    pub repository: Arc<dyn JobRepository>,
    pub engines: EngineRegistry,
    pub proxies: Arc<ProxyProvider>,
    /// 每次启动都会用它创建新的浏览器资源池
    pub launcher: Arc<dyn BrowserLauncher>,
}

/// 一次启动所产生的工作器集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSetInfo {
    /// 启动代数，每次 `start_all` 新建集合时递增
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub workers: Vec<(EngineType, usize)>,
}

impl WorkerSetInfo {
    pub fn workers_for(&self, engine: EngineType) -> usize {
        self.workers
            .iter()
            .find(|(e, _)| *e == engine)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total_workers(&self) -> usize {
        self.workers.iter().map(|(_, n)| n).sum()
    }
}

/// 停机结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    pub generation: u64,
    /// 在排空时限内退出的循环数
    pub drained: usize,
    /// 被强制终止的循环数
    pub aborted: usize,
    /// 浏览器资源池关闭结果
    pub browsers: CloseReport,
}

struct RunningSet {
    info: WorkerSetInfo,
    cancel: CancellationToken,
    pools: Vec<WorkerPool>,
    browser_pool: BrowserPool,
}

/// 工作器编排器
///
/// 把三个引擎池作为一个整体启动和停止。显式构造、按引用传递，
/// 不存在全局实例。
pub struct WorkerOrchestrator {
    deps: OrchestratorDeps,
    settings: Settings,
    generation: AtomicU64,
    running: Mutex<Option<RunningSet>>,
}

impl WorkerOrchestrator {
    pub fn new(deps: OrchestratorDeps, settings: Settings) -> Self {
        Self {
            deps,
            settings,
            generation: AtomicU64::new(0),
            running: Mutex::new(None),
        }
    }

    /// 启动全部工作器池
    ///
    /// 幂等：已在运行时直接返回现有集合的信息。
    /// 每次新建集合都会创建新的浏览器资源池。
    pub async fn start_all(&self) -> WorkerSetInfo {
        let mut running = self.running.lock().await;
        if let Some(set) = running.as_ref() {
            debug!(generation = set.info.generation, "Workers already running");
            return set.info.clone();
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let browser_pool = BrowserPool::new(
            BrowserPoolConfig::from(&self.settings.browser_pool),
            self.deps.launcher.clone(),
        );
        let cancel = CancellationToken::new();

        let mut pools = Vec::new();
        let mut workers = Vec::new();
        for engine in EngineType::ALL {
            let concurrency = self.settings.workers.concurrency.get(engine);
            workers.push((engine, concurrency));
            if concurrency == 0 {
                warn!(engine = %engine, "No workers configured for engine");
                continue;
            }

            let ctx = Arc::new(WorkerContext {
                engine_type: engine,
                queue: self.deps.queues.for_engine(engine).clone(),
                repository: self.deps.repository.clone(),
                engine: self.deps.engines.for_engine(engine),
                browser_pool: engine.requires_browser().then(|| browser_pool.clone()),
                proxies: self.deps.proxies.clone(),
                queue_settings: self.settings.queue.clone(),
                job_timeout: self.settings.workers.job_timeout(),
                max_job_timeout: self.settings.workers.max_job_timeout(),
                acquire_timeout: self.settings.browser_pool.acquire_timeout(),
            });
            pools.push(WorkerPool::start(ctx, concurrency, generation, &cancel));
        }

        let info = WorkerSetInfo {
            generation,
            started_at: Utc::now(),
            workers,
        };
        info!(
            generation,
            total = info.total_workers(),
            "All worker pools started"
        );

        *running = Some(RunningSet {
            info: info.clone(),
            cancel,
            pools,
            browser_pool,
        });
        info
    }

    /// 停止全部工作器池
    ///
    /// 先通知所有循环退出，在 `drain_timeout` 内等待在途任务完成，
    /// 超时后强制终止剩余循环，最后总是关闭浏览器资源池。
    ///
    /// # 返回值
    ///
    /// * `Some(StopReport)` - 停止结果
    /// * `None` - 未在运行，不做任何事
    pub async fn stop_all(&self, drain_timeout: Duration) -> Option<StopReport> {
        let mut running = self.running.lock().await;
        let set = running.take()?;
        let generation = set.info.generation;
        info!(generation, ?drain_timeout, "Stopping all worker pools");

        set.cancel.cancel();
        let deadline = Instant::now() + drain_timeout;
        let mut report = StopReport {
            generation,
            ..Default::default()
        };
        for pool in set.pools {
            let drained = pool.drain(deadline).await;
            report.drained += drained.drained;
            report.aborted += drained.aborted;
        }

        report.browsers = set.browser_pool.close_all().await;
        if report.browsers.failed > 0 {
            error!(
                failed = report.browsers.failed,
                "Some browsers failed to close cleanly"
            );
        }

        info!(
            generation,
            drained = report.drained,
            aborted = report.aborted,
            browsers_closed = report.browsers.closed,
            "All worker pools stopped"
        );
        Some(report)
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// 当前运行中的工作器集合
    pub async fn current(&self) -> Option<WorkerSetInfo> {
        self.running.lock().await.as_ref().map(|set| set.info.clone())
    }

    /// 当前浏览器资源池的状态
    pub async fn browser_pool_stats(&self) -> Option<PoolStats> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|set| set.browser_pool.stats())
    }

    /// 当前仍在运行的工作循环数
    pub async fn active_workers(&self) -> usize {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|set| set.pools.iter().map(WorkerPool::active).sum())
            .unwrap_or(0)
    }
}

/// 等待关闭信号
///
/// 监听 Ctrl-C 与 SIGTERM，任一到达即返回
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
