// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::models::{EngineType, JobResult};
use crate::engines::browser_pool::BrowserHandle;
use crate::engines::traits::{EngineError, RenderRequest, ScrapeEngine, ScrapeRequest};
use crate::engines::validators;

/// 从抓取请求构建基础渲染请求
///
/// 浏览器与反检测引擎共用；交互步骤与指纹由调用方按需补充。
pub(crate) fn base_render_request(
    request: &ScrapeRequest,
    allow_private_networks: bool,
) -> Result<RenderRequest, EngineError> {
    let url = validators::validate_url(&request.url, allow_private_networks)?;
    let options = &request.options;

    Ok(RenderRequest {
        url: url.to_string(),
        headers: request.headers.clone(),
        timeout: request.timeout,
        wait_for: options.wait_for.clone(),
        wait_ms: options.wait_ms.filter(|ms| *ms > 0),
        screenshot: options
            .screenshot
            .then(|| options.screenshot_options.clone().unwrap_or_default()),
        pdf: options.pdf,
        proxy: request.proxy.clone(),
        ..Default::default()
    })
}

/// 浏览器渲染引擎
///
/// 在借出的浏览器实例中打开页面，支持等待选择器、固定等待、截图与 PDF。
pub struct BrowserEngine {
    allow_private_networks: bool,
}

impl BrowserEngine {
    pub fn new(allow_private_networks: bool) -> Self {
        Self {
            allow_private_networks,
        }
    }
}

#[async_trait]
impl ScrapeEngine for BrowserEngine {
    async fn scrape(
        &self,
        request: &ScrapeRequest,
        browser: Option<&BrowserHandle>,
    ) -> Result<JobResult, EngineError> {
        let browser = browser.ok_or(EngineError::BrowserRequired(EngineType::Browser))?;
        let render = base_render_request(request, self.allow_private_networks)?;

        debug!(browser_id = browser.id(), url = %render.url, "Rendering page");
        browser.render(&render).await
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Browser
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::checked_out_handle;
    use super::*;
    use crate::domain::models::{ProxyTier, ScrapeOptions};
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    fn request(options: ScrapeOptions) -> ScrapeRequest {
        ScrapeRequest {
            job_id: Uuid::new_v4(),
            url: "https://example.com/app".to_string(),
            headers: HashMap::new(),
            timeout: Duration::from_secs(10),
            options,
            proxy_tier: ProxyTier::Datacenter,
            proxy: None,
        }
    }

    #[tokio::test]
    async fn test_requires_browser_handle() {
        let err = BrowserEngine::new(false)
            .scrape(&request(ScrapeOptions::default()), None)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::BrowserRequired(EngineType::Browser));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_render_request_carries_options() {
        let (pool, handle, process) = checked_out_handle().await;
        let options = ScrapeOptions {
            render_js: true,
            wait_for: Some("#app".to_string()),
            wait_ms: Some(0),
            screenshot: true,
            pdf: true,
            ..Default::default()
        };

        let result = BrowserEngine::new(false)
            .scrape(&request(options), Some(&handle))
            .await
            .unwrap();
        assert_eq!(result.screenshot.as_deref(), Some("aW1n"));

        let seen = process.requests.lock()[0].clone();
        assert_eq!(seen.url, "https://example.com/app");
        assert_eq!(seen.wait_for.as_deref(), Some("#app"));
        assert_eq!(seen.wait_ms, None);
        assert!(seen.screenshot.unwrap().full_page);
        assert!(seen.pdf);
        assert!(seen.bootstrap_script.is_none());
        assert!(seen.scenario.is_empty());

        pool.release(handle).await;
    }

    #[tokio::test]
    async fn test_invalid_url_is_terminal() {
        let (pool, handle, process) = checked_out_handle().await;
        let mut req = request(ScrapeOptions::default());
        req.url = "ftp://example.com".to_string();

        let err = BrowserEngine::new(false)
            .scrape(&req, Some(&handle))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidUrl(_)));
        assert!(process.requests.lock().is_empty());
        pool.release(handle).await;
    }
}
