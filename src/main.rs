// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Context;
use scrapifie::config::settings::Settings;
use scrapifie::domain::models::EngineType;
use scrapifie::domain::repositories::JobRepository;
use scrapifie::engines::proxy::ProxyProvider;
use scrapifie::engines::registry::EngineRegistry;
use scrapifie::infrastructure::browser::ChromiumLauncher;
use scrapifie::infrastructure::metrics::init_metrics;
use scrapifie::infrastructure::redis_client::RedisClient;
use scrapifie::infrastructure::repositories::RedisJobRepository;
use scrapifie::queue::{EngineQueues, JobQueue, RedisJobQueue};
use scrapifie::utils::telemetry;
use scrapifie::workers::{wait_for_shutdown_signal, OrchestratorDeps, WorkerOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 主函数
///
/// 工作器进程入口：初始化日志、配置、指标与 Redis，
/// 启动全部引擎池，收到关闭信号后在限定时间内停机
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting scrapifie worker...");

    // 2. Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded");

    // 3. Initialize Prometheus metrics
    init_metrics(&settings.metrics)?;

    // 4. Connect to Redis
    let redis = RedisClient::connect(&settings.redis.url, &settings.redis.key_prefix)
        .await
        .context("failed to connect to Redis")?;
    info!("Redis client initialized");

    // 5. Initialize components
    let claim_ttl = settings.queue.claim_ttl();
    let poll_interval = Duration::from_millis(settings.queue.poll_interval_ms);
    let queues = EngineQueues::build(|engine: EngineType| -> Arc<dyn JobQueue> {
        Arc::new(RedisJobQueue::new(
            redis.clone(),
            engine,
            claim_ttl,
            poll_interval,
        ))
    });
    let repository: Arc<dyn JobRepository> = Arc::new(RedisJobRepository::new(redis.clone()));

    let deps = OrchestratorDeps {
        queues,
        repository,
        engines: EngineRegistry::from_settings(&settings.http_engine),
        proxies: Arc::new(ProxyProvider::new(settings.proxy.clone())),
        launcher: Arc::new(ChromiumLauncher::new(settings.browser_pool.clone())),
    };
    let drain_timeout = settings.workers.drain_timeout();
    let shutdown_timeout = settings.workers.shutdown_timeout();
    let orchestrator = WorkerOrchestrator::new(deps, settings);

    // 6. Start workers
    let workers = orchestrator.start_all().await;
    info!(
        generation = workers.generation,
        total = workers.total_workers(),
        "Worker process ready"
    );

    // 7. Wait for shutdown
    wait_for_shutdown_signal().await;

    match tokio::time::timeout(shutdown_timeout, orchestrator.stop_all(drain_timeout)).await {
        Ok(Some(report)) => {
            info!(
                drained = report.drained,
                aborted = report.aborted,
                "Shutdown complete"
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(_) => {
            error!(?shutdown_timeout, "Shutdown timed out, exiting");
            std::process::exit(1);
        }
    }
}
