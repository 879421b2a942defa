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

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::models::{EngineType, ProxyTier};

/// 应用程序配置设置
///
/// 包含 Redis、队列、工作器、浏览器资源池、积分费率、HTTP 引擎、代理和指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Redis配置
    pub redis: RedisSettings,
    /// 队列配置
    pub queue: QueueSettings,
    /// 工作器配置
    pub workers: WorkerSettings,
    /// 浏览器资源池配置
    pub browser_pool: BrowserPoolSettings,
    /// 积分费率表
    pub credits: CreditSettings,
    /// HTTP 引擎配置
    pub http_engine: HttpEngineSettings,
    /// 代理配置
    #[serde(default)]
    pub proxy: ProxySettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 按引擎类型区分的配置值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PerEngine<T> {
    pub http: T,
    pub browser: T,
    pub stealth: T,
}

impl<T: Copy> PerEngine<T> {
    pub fn get(&self, engine: EngineType) -> T {
        match engine {
            EngineType::Http => self.http,
            EngineType::Browser => self.browser,
            EngineType::Stealth => self.stealth,
        }
    }
}

/// Redis配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis连接URL
    pub url: String,
    /// 所有键的前缀
    pub key_prefix: String,
}

/// 队列配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// 工作器单次出队的最长等待时间（毫秒）
    pub dequeue_timeout_ms: u64,
    /// 无任务时轮询 Redis 的间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 任务被领取后的独占时长（秒），超时未确认则重新投递
    pub claim_ttl_secs: u64,
    /// 各引擎的最大重试次数
    pub max_retries: PerEngine<u32>,
    /// 各引擎的首次重试退避（毫秒）
    pub retry_backoff_ms: PerEngine<u64>,
    /// 重试退避上限（毫秒）
    pub max_backoff_ms: u64,
    /// 浏览器资源池耗尽时的重新入队延迟（毫秒）
    pub pool_exhausted_delay_ms: u64,
    /// 入队失败时的本地重试次数
    pub enqueue_attempts: u32,
    /// 入队本地重试的初始退避（毫秒）
    pub enqueue_backoff_ms: u64,
}

impl QueueSettings {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }

    pub fn pool_exhausted_delay(&self) -> Duration {
        Duration::from_millis(self.pool_exhausted_delay_ms)
    }
}

/// 工作器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// 每个引擎池的并发循环数
    pub concurrency: PerEngine<usize>,
    /// 单个任务的默认执行超时（毫秒）
    pub job_timeout_ms: u64,
    /// 客户端可指定的单任务超时上限（毫秒）
    pub max_job_timeout_ms: u64,
    /// 优雅停机时等待在途任务完成的时长（秒）
    pub drain_timeout_secs: u64,
    /// 进程整体停机时限（秒），超时后以非零状态退出
    pub shutdown_timeout_secs: u64,
}

impl WorkerSettings {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn max_job_timeout(&self) -> Duration {
        Duration::from_millis(self.max_job_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// 浏览器资源池配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserPoolSettings {
    /// 同时存在的浏览器实例上限
    pub max_size: usize,
    /// 借出句柄的最长等待时间（毫秒）
    pub acquire_timeout_ms: u64,
    /// 单个实例最多服务的任务数
    pub max_uses: u32,
    /// 空闲超过该时长（秒）的实例被回收
    pub idle_ttl_secs: u64,
    /// 实例存活超过该时长（秒）后被回收
    pub max_age_secs: u64,
    /// 是否以无头模式启动
    pub headless: bool,
    /// 远程 DevTools 地址，设置后不在本地启动浏览器
    #[serde(default)]
    pub remote_url: Option<String>,
    /// 浏览器可执行文件路径
    #[serde(default)]
    pub executable_path: Option<String>,
    /// DevTools 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl BrowserPoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// 积分费率表
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreditSettings {
    /// 各引擎的基础费用
    pub base: PerEngine<u64>,
    /// 代理附加费用
    pub proxy: ProxyRates,
    /// 功能附加费用
    pub features: FeatureRates,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyRates {
    pub residential: u64,
    pub mobile: u64,
    pub isp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeatureRates {
    pub screenshot: u64,
    pub pdf: u64,
    pub captcha: u64,
}

/// HTTP 引擎配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct HttpEngineSettings {
    /// 默认桌面 User-Agent
    pub user_agent: String,
    /// 移动代理请求使用的 User-Agent
    pub mobile_user_agent: String,
    /// 最大重定向次数
    pub max_redirects: usize,
    /// 是否允许访问内网地址
    pub allow_private_networks: bool,
}

/// 代理配置设置
///
/// 未配置的层级直接出网。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySettings {
    #[serde(default)]
    pub datacenter_url: Option<String>,
    #[serde(default)]
    pub residential_url: Option<String>,
    #[serde(default)]
    pub mobile_url: Option<String>,
    #[serde(default)]
    pub isp_url: Option<String>,
}

impl ProxySettings {
    pub fn url_for(&self, tier: ProxyTier) -> Option<&str> {
        match tier {
            ProxyTier::Datacenter => self.datacenter_url.as_deref(),
            ProxyTier::Residential => self.residential_url.as_deref(),
            ProxyTier::Mobile => self.mobile_url.as_deref(),
            ProxyTier::Isp => self.isp_url.as_deref(),
        }
    }
}

/// 指标导出配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启动 Prometheus 导出端点
    pub enabled: bool,
    /// 监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 从环境变量加载配置，支持默认值
    ///
    /// 加载顺序：内置默认值 → `config/default` → `config/{APP_ENVIRONMENT}` →
    /// `SCRAPIFIE__` 前缀的环境变量。
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("SCRAPIFIE").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 仅使用内置默认值构建配置，不读取文件和环境变量
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults(Config::builder())?
            .build()?
            .try_deserialize()
    }

    /// 在给定的构建器上注册全部内置默认值
    pub fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            // Redis
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.key_prefix", "scrapifie")?
            // Queue
            .set_default("queue.dequeue_timeout_ms", 1000)?
            .set_default("queue.poll_interval_ms", 100)?
            .set_default("queue.claim_ttl_secs", 180)?
            .set_default("queue.max_retries.http", 2)?
            .set_default("queue.max_retries.browser", 1)?
            .set_default("queue.max_retries.stealth", 1)?
            .set_default("queue.retry_backoff_ms.http", 1000)?
            .set_default("queue.retry_backoff_ms.browser", 2000)?
            .set_default("queue.retry_backoff_ms.stealth", 3000)?
            .set_default("queue.max_backoff_ms", 60000)?
            .set_default("queue.pool_exhausted_delay_ms", 2000)?
            .set_default("queue.enqueue_attempts", 3)?
            .set_default("queue.enqueue_backoff_ms", 100)?
            // Workers
            .set_default("workers.concurrency.http", 10)?
            .set_default("workers.concurrency.browser", 5)?
            .set_default("workers.concurrency.stealth", 2)?
            .set_default("workers.job_timeout_ms", 30000)?
            .set_default("workers.max_job_timeout_ms", 120000)?
            .set_default("workers.drain_timeout_secs", 25)?
            .set_default("workers.shutdown_timeout_secs", 30)?
            // Browser pool
            .set_default("browser_pool.max_size", 10)?
            .set_default("browser_pool.acquire_timeout_ms", 30000)?
            .set_default("browser_pool.max_uses", 50)?
            .set_default("browser_pool.idle_ttl_secs", 120)?
            .set_default("browser_pool.max_age_secs", 300)?
            .set_default("browser_pool.headless", true)?
            .set_default("browser_pool.request_timeout_secs", 30)?
            // Credits
            .set_default("credits.base.http", 1)?
            .set_default("credits.base.browser", 5)?
            .set_default("credits.base.stealth", 10)?
            .set_default("credits.proxy.residential", 3)?
            .set_default("credits.proxy.mobile", 10)?
            .set_default("credits.proxy.isp", 5)?
            .set_default("credits.features.screenshot", 2)?
            .set_default("credits.features.pdf", 3)?
            .set_default("credits.features.captcha", 10)?
            // HTTP engine
            .set_default(
                "http_engine.user_agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )?
            .set_default(
                "http_engine.mobile_user_agent",
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
            )?
            .set_default("http_engine.max_redirects", 10)?
            .set_default("http_engine.allow_private_networks", false)?
            // Metrics
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9090")
    }

    /// 校验配置值的取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        for engine in EngineType::ALL {
            if self.workers.concurrency.get(engine) == 0 {
                return Err(ConfigError::Message(format!(
                    "workers.concurrency.{} must be greater than zero",
                    engine
                )));
            }
        }
        if self.browser_pool.max_size == 0 {
            return Err(ConfigError::Message(
                "browser_pool.max_size must be greater than zero".to_string(),
            ));
        }
        if self.workers.job_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "workers.job_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.workers.max_job_timeout_ms < self.workers.job_timeout_ms {
            return Err(ConfigError::Message(
                "workers.max_job_timeout_ms must not be below workers.job_timeout_ms".to_string(),
            ));
        }
        // A claim must outlive the longest attempt, including the wait for a browser.
        let longest_attempt =
            self.workers.max_job_timeout() + self.browser_pool.acquire_timeout();
        if self.queue.claim_ttl() <= longest_attempt {
            return Err(ConfigError::Message(format!(
                "queue.claim_ttl_secs must exceed workers.max_job_timeout_ms plus browser_pool.acquire_timeout_ms ({:?})",
                longest_attempt
            )));
        }
        // close_all runs after the drain, so the process deadline needs headroom.
        if self.workers.drain_timeout_secs >= self.workers.shutdown_timeout_secs {
            return Err(ConfigError::Message(
                "workers.drain_timeout_secs must be less than workers.shutdown_timeout_secs"
                    .to_string(),
            ));
        }
        if self.queue.enqueue_attempts == 0 {
            return Err(ConfigError::Message(
                "queue.enqueue_attempts must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}
