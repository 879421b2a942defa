// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::settings::HttpEngineSettings;
use crate::domain::models::{EngineType, JobResult, ProxyTier};
use crate::engines::browser_pool::BrowserHandle;
use crate::engines::traits::{EngineError, ScrapeEngine, ScrapeRequest};
use crate::engines::validators;

/// 拦截页特征（小写匹配）
const CHALLENGE_MARKERS: &[&str] = &[
    "captcha",
    "cf-chl",
    "cf-browser-verification",
    "just a moment...",
    "attention required",
    "access denied",
    "security check",
    "please verify you are human",
    "unusual traffic",
    "automated access",
];

/// HTTP 抓取引擎
///
/// 基于 reqwest 的纯 HTTP 抓取，不执行页面脚本。
/// 每个请求使用独立客户端，保证 Cookie 与代理互不影响。
pub struct HttpEngine {
    settings: HttpEngineSettings,
}

impl HttpEngine {
    pub fn new(settings: HttpEngineSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self, request: &ScrapeRequest) -> Result<reqwest::Client, EngineError> {
        let user_agent = if request.proxy_tier == ProxyTier::Mobile {
            &self.settings.mobile_user_agent
        } else {
            &self.settings.user_agent
        };

        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent.as_str())
            .timeout(request.timeout)
            .redirect(Policy::limited(self.settings.max_redirects))
            .cookie_store(true);

        if let Some(proxy_url) = &request.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| EngineError::Proxy(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| EngineError::Other(format!("failed to build HTTP client: {}", e)))
    }

    fn classify(&self, request: &ScrapeRequest, err: reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::Timeout(request.timeout)
        } else if err.is_connect() && request.proxy.is_some() {
            EngineError::Proxy(err.to_string())
        } else if err.is_redirect() {
            EngineError::Network(format!("redirect limit exceeded: {}", err))
        } else if err.is_builder() {
            EngineError::InvalidUrl(err.to_string())
        } else {
            EngineError::Network(err.to_string())
        }
    }
}

fn build_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    for (k, v) in headers {
        match (
            HeaderName::from_bytes(k.as_bytes()),
            HeaderValue::from_str(v),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %k, "Skipping invalid request header"),
        }
    }
    map
}

/// 判断响应是否为拦截页
///
/// 只在 403/429/503 时检查内容特征，避免误判正文中恰好出现的关键词
fn detect_block(status: u16, content: &str) -> Option<String> {
    if !matches!(status, 403 | 429 | 503) {
        return None;
    }
    let lower = content.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .find(|marker| lower.contains(*marker))
        .map(|marker| format!("challenge page detected ({})", marker))
}

#[async_trait]
impl ScrapeEngine for HttpEngine {
    async fn scrape(
        &self,
        request: &ScrapeRequest,
        _browser: Option<&BrowserHandle>,
    ) -> Result<JobResult, EngineError> {
        let url = validators::validate_url(&request.url, self.settings.allow_private_networks)?;
        let client = self.build_client(request)?;

        // A User-Agent in the job headers overrides the client default.
        let headers = build_headers(&request.headers);

        let start = Instant::now();
        let response = client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| self.classify(request, e))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("text/html")
            .to_string();

        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v) = v.to_str() {
                response_headers.insert(k.as_str().to_string(), v.to_string());
            }
        }

        let content = response
            .text()
            .await
            .map_err(|e| self.classify(request, e))?;
        let response_time_ms = start.elapsed().as_millis() as u64;

        if let Some(reason) = detect_block(status_code, &content) {
            return Err(EngineError::Blocked {
                status: status_code,
                reason,
            });
        }
        if status_code >= 500 || status_code == 429 {
            return Err(EngineError::UpstreamStatus(status_code));
        }

        debug!(
            status = status_code,
            bytes = content.len(),
            elapsed_ms = response_time_ms,
            "HTTP fetch finished"
        );

        Ok(JobResult {
            status_code,
            content,
            content_type,
            headers: response_headers,
            final_url,
            screenshot: None,
            pdf: None,
            response_time_ms,
        })
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Http
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
#[path = "http_engine_test.rs"]
mod tests;
