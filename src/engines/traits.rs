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

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{
    EngineType, JobResult, ProxyTier, ScenarioStep, ScrapeJob, ScrapeOptions, ScreenshotOptions,
};
use crate::engines::browser_pool::BrowserHandle;
use crate::engines::fingerprint::Viewport;

/// 引擎错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// URL 非法（非 http/https 或缺少主机）
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// 执行超时
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// 网络错误（连接失败、DNS、连接被重置等）
    #[error("Network error: {0}")]
    Network(String),
    /// 代理错误
    #[error("Proxy error: {0}")]
    Proxy(String),
    /// 上游返回了错误状态码
    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),
    /// 被目标站点拦截
    #[error("Blocked by target (status {status}): {reason}")]
    Blocked { status: u16, reason: String },
    /// 浏览器进程错误
    #[error("Browser error: {0}")]
    Browser(String),
    /// 渲染引擎未拿到浏览器句柄
    #[error("{0} engine requires a browser handle")]
    BrowserRequired(EngineType),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 超时、网络、代理、上游 5xx/429 与浏览器崩溃可重试；
    /// 非法 URL 与被拦截属于终态错误
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout(_)
            | EngineError::Network(_)
            | EngineError::Proxy(_)
            | EngineError::Browser(_) => true,
            EngineError::UpstreamStatus(status) => *status >= 500 || *status == 429,
            EngineError::InvalidUrl(_)
            | EngineError::Blocked { .. }
            | EngineError::BrowserRequired(_)
            | EngineError::Other(_) => false,
        }
    }

    /// 记录到任务上的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidUrl(_) => "INVALID_URL",
            EngineError::Timeout(_) => "TIMEOUT",
            EngineError::Network(_) => "NETWORK_ERROR",
            EngineError::Proxy(_) => "PROXY_ERROR",
            EngineError::UpstreamStatus(_) => "UPSTREAM_ERROR",
            EngineError::Blocked { .. } => "BLOCKED",
            EngineError::Browser(_) => "BROWSER_ERROR",
            EngineError::BrowserRequired(_) => "BROWSER_REQUIRED",
            EngineError::Other(_) => "ENGINE_ERROR",
        }
    }
}

/// 抓取请求
///
/// 由工作器从任务构建，引擎只读取其中的字段。
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    /// 所属任务
    pub job_id: Uuid,
    /// 目标URL
    pub url: String,
    /// 请求头
    pub headers: HashMap<String, String>,
    /// 超时时间
    pub timeout: Duration,
    /// 抓取选项
    pub options: ScrapeOptions,
    /// 代理层级
    pub proxy_tier: ProxyTier,
    /// 代理配置 (URL)
    pub proxy: Option<String>,
}

impl ScrapeRequest {
    /// 从任务构建请求
    ///
    /// 任务未指定超时时使用默认值；指定值被限制在 `1ms..=max_timeout` 内，
    /// 保证执行时长不会超过队列领取的独占时长。
    pub fn from_job(job: &ScrapeJob, default_timeout: Duration, max_timeout: Duration) -> Self {
        let timeout = job
            .options
            .timeout_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or(default_timeout)
            .min(max_timeout);
        Self {
            job_id: job.id,
            url: job.url.clone(),
            headers: job.options.headers.clone(),
            timeout,
            options: job.options.clone(),
            proxy_tier: job.proxy_tier,
            proxy: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// 浏览器渲染请求
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    /// 等待出现的选择器
    pub wait_for: Option<String>,
    /// 加载后额外等待
    pub wait_ms: Option<u64>,
    pub screenshot: Option<ScreenshotOptions>,
    pub pdf: bool,
    pub user_agent: Option<String>,
    pub viewport: Option<Viewport>,
    /// 是否模拟移动设备
    pub mobile: bool,
    /// 在页面脚本之前注入的脚本
    pub bootstrap_script: Option<String>,
    /// 导航完成后依次执行的交互步骤
    pub scenario: Vec<ScenarioStep>,
    pub proxy: Option<String>,
}

/// 抓取引擎特质
#[async_trait]
pub trait ScrapeEngine: Send + Sync {
    /// 执行抓取
    ///
    /// 渲染类引擎需要传入借出的浏览器句柄。
    async fn scrape(
        &self,
        request: &ScrapeRequest,
        browser: Option<&BrowserHandle>,
    ) -> Result<JobResult, EngineError>;

    /// 引擎类型
    fn engine_type(&self) -> EngineType;

    /// 引擎名称
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: ScrapeEngine + ?Sized> ScrapeEngine for Arc<T> {
    async fn scrape(
        &self,
        request: &ScrapeRequest,
        browser: Option<&BrowserHandle>,
    ) -> Result<JobResult, EngineError> {
        (**self).scrape(request, browser).await
    }

    fn engine_type(&self) -> EngineType {
        (**self).engine_type()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// 单个浏览器进程
///
/// 由资源池独占管理，同一时刻只会被一个工作器使用。
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    /// 在新页面中渲染目标地址
    async fn render(&self, request: &RenderRequest) -> Result<JobResult, EngineError>;

    /// 进程是否仍可用
    async fn is_healthy(&self) -> bool;

    /// 终止进程
    async fn close(&self) -> Result<(), EngineError>;
}

/// 浏览器进程启动器
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserProcess>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CreditQuote;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(EngineError::Network("connection reset".into()).is_retryable());
        assert!(EngineError::Proxy("407".into()).is_retryable());
        assert!(EngineError::UpstreamStatus(502).is_retryable());
        assert!(!EngineError::UpstreamStatus(404).is_retryable());
        assert!(!EngineError::InvalidUrl("ftp://x".into()).is_retryable());
        assert!(!EngineError::Blocked {
            status: 403,
            reason: "captcha".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_request_uses_job_timeout_when_present() {
        let mut options = ScrapeOptions::default();
        options.timeout_ms = Some(1500);
        options
            .headers
            .insert("Accept-Language".to_string(), "de-DE".to_string());
        let job = ScrapeJob::new(
            Uuid::new_v4(),
            "https://example.com".to_string(),
            EngineType::Http,
            ProxyTier::Datacenter,
            options,
            CreditQuote::from_breakdown(Default::default()),
        );

        let request =
            ScrapeRequest::from_job(&job, Duration::from_secs(30), Duration::from_secs(120));
        assert_eq!(request.timeout, Duration::from_millis(1500));
        assert_eq!(request.headers.get("Accept-Language").unwrap(), "de-DE");
        assert!(request.proxy.is_none());

        let mut job = job;
        job.options.timeout_ms = None;
        let request =
            ScrapeRequest::from_job(&job, Duration::from_secs(30), Duration::from_secs(120));
        assert_eq!(request.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_request_timeout_is_bounded() {
        let mut job = ScrapeJob::new(
            Uuid::new_v4(),
            "https://example.com".to_string(),
            EngineType::Http,
            ProxyTier::Datacenter,
            ScrapeOptions::default(),
            CreditQuote::from_breakdown(Default::default()),
        );
        let max = Duration::from_secs(120);

        job.options.timeout_ms = Some(u64::MAX);
        let request = ScrapeRequest::from_job(&job, Duration::from_secs(30), max);
        assert_eq!(request.timeout, max);

        job.options.timeout_ms = Some(0);
        let request = ScrapeRequest::from_job(&job, Duration::from_secs(30), max);
        assert_eq!(request.timeout, Duration::from_millis(1));
    }
}
