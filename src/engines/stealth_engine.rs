// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::models::{EngineType, JobResult, ProxyTier};
use crate::engines::browser_engine::base_render_request;
use crate::engines::browser_pool::BrowserHandle;
use crate::engines::fingerprint::{self, Fingerprint};
use crate::engines::traits::{EngineError, RenderRequest, ScrapeEngine, ScrapeRequest};

/// 反检测渲染引擎
///
/// 与浏览器引擎相同的渲染流程，额外为每个任务生成独立指纹、
/// 在页面脚本前注入伪装脚本，并按顺序执行交互步骤。
pub struct StealthEngine {
    allow_private_networks: bool,
}

impl StealthEngine {
    pub fn new(allow_private_networks: bool) -> Self {
        Self {
            allow_private_networks,
        }
    }

    fn apply_fingerprint(render: &mut RenderRequest, fp: &Fingerprint) {
        if !render
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("accept-language"))
        {
            render
                .headers
                .insert("Accept-Language".to_string(), fp.accept_language());
        }
        render.user_agent = Some(fp.user_agent.clone());
        render.viewport = Some(fp.viewport);
        render.mobile = fp.mobile;
        render.bootstrap_script = Some(fp.bootstrap_script());
    }
}

#[async_trait]
impl ScrapeEngine for StealthEngine {
    async fn scrape(
        &self,
        request: &ScrapeRequest,
        browser: Option<&BrowserHandle>,
    ) -> Result<JobResult, EngineError> {
        let browser = browser.ok_or(EngineError::BrowserRequired(EngineType::Stealth))?;
        let mut render = base_render_request(request, self.allow_private_networks)?;

        let mobile = request.proxy_tier == ProxyTier::Mobile;
        let fp = fingerprint::generate(mobile, request.options.country.as_deref());
        Self::apply_fingerprint(&mut render, &fp);
        render.scenario = request.options.scenario.clone();

        debug!(
            browser_id = browser.id(),
            mobile,
            locale = %fp.locale,
            steps = render.scenario.len(),
            "Rendering page with generated fingerprint"
        );
        browser.render(&render).await
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Stealth
    }

    fn name(&self) -> &'static str {
        "stealth"
    }
}
