// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use crate::config::settings::HttpEngineSettings;
use crate::domain::models::EngineType;
use crate::engines::browser_engine::BrowserEngine;
use crate::engines::http_engine::HttpEngine;
use crate::engines::stealth_engine::StealthEngine;
use crate::engines::traits::ScrapeEngine;

/// 引擎注册表
///
/// 每种引擎类型恰好对应一个实现，按枚举穷举匹配。
#[derive(Clone)]
pub struct EngineRegistry {
    http: Arc<dyn ScrapeEngine>,
    browser: Arc<dyn ScrapeEngine>,
    stealth: Arc<dyn ScrapeEngine>,
}

impl EngineRegistry {
    pub fn new(
        http: Arc<dyn ScrapeEngine>,
        browser: Arc<dyn ScrapeEngine>,
        stealth: Arc<dyn ScrapeEngine>,
    ) -> Self {
        Self {
            http,
            browser,
            stealth,
        }
    }

    /// 使用默认实现构建注册表
    pub fn from_settings(settings: &HttpEngineSettings) -> Self {
        let allow_private = settings.allow_private_networks;
        Self::new(
            Arc::new(HttpEngine::new(settings.clone())),
            Arc::new(BrowserEngine::new(allow_private)),
            Arc::new(StealthEngine::new(allow_private)),
        )
    }

    pub fn for_engine(&self, engine: EngineType) -> Arc<dyn ScrapeEngine> {
        match engine {
            EngineType::Http => self.http.clone(),
            EngineType::Browser => self.browser.clone(),
            EngineType::Stealth => self.stealth.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::Settings;

    #[test]
    fn test_registry_maps_every_engine() {
        let settings = Settings::defaults().unwrap();
        let registry = EngineRegistry::from_settings(&settings.http_engine);
        for engine in EngineType::ALL {
            assert_eq!(registry.for_engine(engine).engine_type(), engine);
        }
    }
}
