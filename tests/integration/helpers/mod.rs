// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use scrapifie::application::usecases::SubmitScrapeUseCase;
use scrapifie::config::settings::{PerEngine, Settings};
use scrapifie::domain::models::{JobResult, ScrapeJob};
use scrapifie::domain::repositories::JobRepository;
use scrapifie::engines::proxy::ProxyProvider;
use scrapifie::engines::registry::EngineRegistry;
use scrapifie::engines::traits::{BrowserLauncher, BrowserProcess, EngineError, RenderRequest};
use scrapifie::infrastructure::repositories::InMemoryJobRepository;
use scrapifie::queue::{EngineQueues, InMemoryJobQueue, JobQueue};
use scrapifie::workers::{OrchestratorDeps, WorkerOrchestrator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 假浏览器的共享计数
#[derive(Default)]
pub struct BrowserStats {
    pub launched: AtomicUsize,
    pub closed: AtomicUsize,
    pub renders: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    /// 每次渲染收到的代理
    pub proxies: Mutex<Vec<Option<String>>>,
}

impl BrowserStats {
    pub fn live(&self) -> usize {
        self.launched
            .load(Ordering::SeqCst)
            .saturating_sub(self.closed.load(Ordering::SeqCst))
    }
}

/// 不启动真实浏览器的进程，渲染时记录并发数
pub struct FakeBrowser {
    stats: Arc<BrowserStats>,
    render_delay: Duration,
}

#[async_trait]
impl BrowserProcess for FakeBrowser {
    async fn render(&self, request: &RenderRequest) -> Result<JobResult, EngineError> {
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(self.render_delay).await;
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        self.stats.proxies.lock().push(request.proxy.clone());

        Ok(JobResult {
            status_code: 200,
            content: format!("<html><body>rendered {}</body></html>", request.url),
            content_type: "text/html".to_string(),
            final_url: request.url.clone(),
            screenshot: request.screenshot.as_ref().map(|_| "c2NyZWVu".to_string()),
            ..Default::default()
        })
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub stats: Arc<BrowserStats>,
    pub render_delay: Duration,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserProcess>, EngineError> {
        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeBrowser {
            stats: self.stats.clone(),
            render_delay: self.render_delay,
        }))
    }
}

/// 测试用配置：本机地址可访问，超时与退避都很短
pub fn test_settings() -> Settings {
    let mut settings = Settings::defaults().expect("default settings");
    settings.http_engine.allow_private_networks = true;
    settings.queue.dequeue_timeout_ms = 50;
    settings.queue.retry_backoff_ms = PerEngine {
        http: 20,
        browser: 20,
        stealth: 20,
    };
    settings.queue.pool_exhausted_delay_ms = 20;
    settings.queue.enqueue_backoff_ms = 1;
    settings.workers.concurrency = PerEngine {
        http: 2,
        browser: 2,
        stealth: 1,
    };
    settings.workers.job_timeout_ms = 5_000;
    settings.browser_pool.max_size = 1;
    settings.browser_pool.acquire_timeout_ms = 50;
    settings
}

pub struct TestStack {
    pub queues: EngineQueues,
    pub repository: Arc<InMemoryJobRepository>,
    pub submit: SubmitScrapeUseCase,
    pub orchestrator: WorkerOrchestrator,
    pub browsers: Arc<BrowserStats>,
}

pub fn build_stack(settings: Settings, render_delay: Duration) -> TestStack {
    let claim_ttl = settings.queue.claim_ttl();
    let queues = EngineQueues::build(|engine| -> Arc<dyn JobQueue> {
        Arc::new(InMemoryJobQueue::new(engine, claim_ttl))
    });
    let repository = Arc::new(InMemoryJobRepository::new());
    let browsers = Arc::new(BrowserStats::default());

    let deps = OrchestratorDeps {
        queues: queues.clone(),
        repository: repository.clone(),
        engines: EngineRegistry::from_settings(&settings.http_engine),
        proxies: Arc::new(ProxyProvider::new(settings.proxy.clone())),
        launcher: Arc::new(FakeLauncher {
            stats: browsers.clone(),
            render_delay,
        }),
    };

    TestStack {
        submit: SubmitScrapeUseCase::new(queues.clone(), repository.clone(), &settings),
        orchestrator: WorkerOrchestrator::new(deps, settings),
        queues,
        repository,
        browsers,
    }
}

/// 轮询直到任务进入终态
pub async fn wait_for_terminal(
    repository: &InMemoryJobRepository,
    job_id: Uuid,
    timeout: Duration,
) -> ScrapeJob {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = repository
            .find_by_id(job_id)
            .await
            .expect("repository read")
            .expect("job exists");
        if job.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {} after {:?}",
            job_id,
            job.status,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
