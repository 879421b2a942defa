// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::settings::BrowserPoolSettings;
use crate::domain::models::JobResult;
use crate::engines::traits::{BrowserLauncher, BrowserProcess, EngineError, RenderRequest};

/// 资源池错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// 在限定时间内没有可用句柄
    #[error("Browser pool exhausted after waiting {0:?}")]
    Exhausted(Duration),
    /// 资源池已关闭
    #[error("Browser pool is closed")]
    Closed,
    /// 启动浏览器失败
    #[error("Failed to launch browser: {0}")]
    Launch(EngineError),
}

/// 资源池配置
#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    /// 同时存在的浏览器实例上限
    pub max_size: usize,
    /// 单个实例最多服务的任务数
    pub max_uses: u32,
    /// 空闲回收时长
    pub idle_ttl: Duration,
    /// 实例最大存活时长
    pub max_age: Duration,
}

impl From<&BrowserPoolSettings> for BrowserPoolConfig {
    fn from(settings: &BrowserPoolSettings) -> Self {
        Self {
            max_size: settings.max_size,
            max_uses: settings.max_uses,
            idle_ttl: settings.idle_ttl(),
            max_age: settings.max_age(),
        }
    }
}

/// 资源池状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_size: usize,
    /// 存活实例数（空闲 + 借出）
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    /// 累计创建数
    pub created: u64,
    /// 累计回收数
    pub retired: u64,
    pub closed: bool,
}

struct PooledBrowser {
    id: u64,
    process: Arc<dyn BrowserProcess>,
    created_at: Instant,
    last_used: Instant,
    uses: u32,
}

struct PoolInner {
    config: BrowserPoolConfig,
    launcher: Arc<dyn BrowserLauncher>,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<PooledBrowser>>,
    in_use: Mutex<HashMap<u64, Arc<dyn BrowserProcess>>>,
    live: AtomicUsize,
    closed: AtomicBool,
    next_id: AtomicU64,
    created: AtomicU64,
    retired: AtomicU64,
}

impl PoolInner {
    fn is_expired(&self, browser: &PooledBrowser, now: Instant) -> bool {
        now.duration_since(browser.created_at) >= self.config.max_age
            || now.duration_since(browser.last_used) >= self.config.idle_ttl
    }

    fn is_worn_out(&self, browser: &PooledBrowser) -> bool {
        browser.uses >= self.config.max_uses
            || browser.created_at.elapsed() >= self.config.max_age
    }

    async fn retire(&self, browser: PooledBrowser, reason: &'static str) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.retired.fetch_add(1, Ordering::Relaxed);
        counter!("browser_pool_retired_total", "reason" => reason).increment(1);
        debug!(
            browser_id = browser.id,
            uses = browser.uses,
            reason,
            "Retiring browser instance"
        );
        if let Err(e) = browser.process.close().await {
            warn!(browser_id = browser.id, "Failed to close browser instance: {}", e);
        }
        self.publish_gauges();
    }

    fn publish_gauges(&self) {
        gauge!("browser_pool_live").set(self.live.load(Ordering::Acquire) as f64);
        gauge!("browser_pool_idle").set(self.idle.lock().len() as f64);
        gauge!("browser_pool_in_use").set(self.in_use.lock().len() as f64);
    }
}

/// 浏览器资源池
///
/// 浏览器与反检测工作器共享的有界实例集合。计数信号量限制同时借出的句柄数，
/// 空闲实例保存在空闲列表中复用。实例在达到使用次数、空闲时长或存活时长后被回收，
/// 不健康的实例在归还时被丢弃，之后按需重新创建。
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

impl BrowserPool {
    pub fn new(config: BrowserPoolConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let max_size = config.max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                config: BrowserPoolConfig { max_size, ..config },
                launcher,
                semaphore: Arc::new(Semaphore::new(max_size)),
                idle: Mutex::new(VecDeque::new()),
                in_use: Mutex::new(HashMap::new()),
                live: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                created: AtomicU64::new(0),
                retired: AtomicU64::new(0),
            }),
        }
    }

    /// 借出一个浏览器句柄
    ///
    /// # 参数
    ///
    /// * `timeout` - 等待空闲名额的最长时间
    ///
    /// # 返回值
    ///
    /// * `Ok(BrowserHandle)` - 独占的浏览器句柄
    /// * `Err(PoolError::Exhausted)` - 等待超时
    /// * `Err(PoolError::Closed)` - 资源池已关闭
    pub async fn acquire(&self, timeout: Duration) -> Result<BrowserHandle, PoolError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let permit = match tokio::time::timeout(timeout, inner.semaphore.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                counter!("browser_pool_exhausted_total").increment(1);
                return Err(PoolError::Exhausted(timeout));
            }
        };

        self.evict_expired().await;

        // Most recently used first so cold instances age out.
        loop {
            let candidate = inner.idle.lock().pop_back();
            let Some(browser) = candidate else {
                break;
            };
            if inner.is_worn_out(&browser) {
                inner.retire(browser, "worn_out").await;
                continue;
            }
            return Ok(self.check_out(browser, permit));
        }

        let process = inner.launcher.launch().await.map_err(|e| {
            warn!("Failed to launch browser instance: {}", e);
            PoolError::Launch(e)
        })?;

        if inner.closed.load(Ordering::Acquire) {
            if let Err(e) = process.close().await {
                warn!("Failed to close browser launched during shutdown: {}", e);
            }
            return Err(PoolError::Closed);
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        inner.live.fetch_add(1, Ordering::AcqRel);
        inner.created.fetch_add(1, Ordering::Relaxed);
        counter!("browser_pool_created_total").increment(1);
        info!(browser_id = id, "Launched browser instance");

        let now = Instant::now();
        let browser = PooledBrowser {
            id,
            process,
            created_at: now,
            last_used: now,
            uses: 0,
        };
        Ok(self.check_out(browser, permit))
    }

    fn check_out(&self, mut browser: PooledBrowser, permit: OwnedSemaphorePermit) -> BrowserHandle {
        browser.uses += 1;
        browser.last_used = Instant::now();
        self.inner
            .in_use
            .lock()
            .insert(browser.id, browser.process.clone());
        self.inner.publish_gauges();

        BrowserHandle {
            id: browser.id,
            process: browser.process.clone(),
            browser: Some(browser),
            permit: Some(permit),
            pool: self.inner.clone(),
        }
    }

    /// 归还句柄
    ///
    /// 归还时检查健康状况，不健康或已达回收条件的实例被关闭，名额随即释放。
    pub async fn release(&self, mut handle: BrowserHandle) {
        let Some(mut browser) = handle.browser.take() else {
            return;
        };
        let permit = handle.permit.take();
        let inner = &self.inner;

        let still_tracked = inner.in_use.lock().remove(&browser.id).is_some();
        if !still_tracked {
            // Force-closed by close_all while checked out.
            inner.live.fetch_sub(1, Ordering::AcqRel);
            inner.retired.fetch_add(1, Ordering::Relaxed);
            drop(permit);
            return;
        }

        if inner.closed.load(Ordering::Acquire) {
            inner.retire(browser, "pool_closed").await;
        } else if !browser.process.is_healthy().await {
            warn!(browser_id = browser.id, "Discarding unhealthy browser instance");
            inner.retire(browser, "unhealthy").await;
        } else if inner.is_worn_out(&browser) {
            inner.retire(browser, "worn_out").await;
        } else {
            browser.last_used = Instant::now();
            inner.idle.lock().push_back(browser);
            inner.publish_gauges();
        }

        // Idle list is updated before the slot is handed to the next waiter.
        drop(permit);
    }

    /// 回收空闲过久或存活过久的实例
    async fn evict_expired(&self) {
        let now = Instant::now();
        let expired: Vec<PooledBrowser> = {
            let mut idle = self.inner.idle.lock();
            let (expired, keep): (Vec<_>, Vec<_>) =
                idle.drain(..).partition(|b| self.inner.is_expired(b, now));
            idle.extend(keep);
            expired
        };
        for browser in expired {
            self.inner.retire(browser, "expired").await;
        }
    }

    /// 关闭资源池
    ///
    /// 终止所有存活实例（包括已借出的），之后的借出请求全部失败。
    /// 单个实例关闭失败只记录日志，不中断整体关闭。
    pub async fn close_all(&self) -> CloseReport {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return CloseReport::default();
        }
        inner.semaphore.close();

        let idle: Vec<PooledBrowser> = inner.idle.lock().drain(..).collect();
        let checked_out: Vec<(u64, Arc<dyn BrowserProcess>)> = inner.in_use.lock().drain().collect();

        let mut report = CloseReport::default();
        for browser in idle {
            inner.live.fetch_sub(1, Ordering::AcqRel);
            inner.retired.fetch_add(1, Ordering::Relaxed);
            match browser.process.close().await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    warn!(browser_id = browser.id, "Failed to close idle browser: {}", e);
                    report.failed += 1;
                }
            }
        }
        for (id, process) in checked_out {
            match process.close().await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    warn!(browser_id = id, "Failed to close checked-out browser: {}", e);
                    report.failed += 1;
                }
            }
        }

        inner.publish_gauges();
        info!(
            closed = report.closed,
            failed = report.failed,
            "Browser pool closed"
        );
        report
    }

    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        PoolStats {
            max_size: inner.config.max_size,
            live: inner.live.load(Ordering::Acquire),
            idle: inner.idle.lock().len(),
            in_use: inner.in_use.lock().len(),
            created: inner.created.load(Ordering::Relaxed),
            retired: inner.retired.load(Ordering::Relaxed),
            closed: inner.closed.load(Ordering::Acquire),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// 关闭结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: usize,
    pub failed: usize,
}

/// 借出的浏览器句柄
///
/// 同一时刻只有一个持有者。未归还就被丢弃时（例如工作器被强制取消），
/// 实例在后台关闭并释放名额。
pub struct BrowserHandle {
    id: u64,
    process: Arc<dyn BrowserProcess>,
    browser: Option<PooledBrowser>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl BrowserHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 本实例已服务的任务数（含当前任务）
    pub fn uses(&self) -> u32 {
        self.browser.as_ref().map(|b| b.uses).unwrap_or(0)
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<JobResult, EngineError> {
        self.process.render(request).await
    }
}

impl std::fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserHandle")
            .field("id", &self.id)
            .field("uses", &self.uses())
            .finish()
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        let Some(browser) = self.browser.take() else {
            return;
        };
        let pool = self.pool.clone();
        let tracked = pool.in_use.lock().remove(&browser.id).is_some();
        pool.live.fetch_sub(1, Ordering::AcqRel);
        pool.retired.fetch_add(1, Ordering::Relaxed);
        warn!(browser_id = browser.id, "Browser handle dropped without release");

        if tracked {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = browser.process.close().await {
                            warn!(browser_id = browser.id, "Failed to close abandoned browser: {}", e);
                        }
                    });
                }
                Err(_) => warn!(browser_id = browser.id, "No runtime to close abandoned browser"),
            }
        }
        // The permit field drops after this, freeing the slot.
    }
}

#[cfg(test)]
#[path = "browser_pool_test.rs"]
mod tests;
