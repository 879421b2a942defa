// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::settings::ProxySettings;
use crate::domain::models::ProxyTier;

/// 代理提供者
///
/// 将代理层级映射到配置的出口代理地址。地址中支持以下占位符：
/// `{country}` / `{COUNTRY}`（目标国家，小写/大写）与 `{session}`（每次获取唯一）。
#[derive(Debug, Clone, Default)]
pub struct ProxyProvider {
    settings: ProxySettings,
}

impl ProxyProvider {
    pub fn new(settings: ProxySettings) -> Self {
        Self { settings }
    }

    /// 获取某一层级的代理地址
    ///
    /// 该层级未配置时返回 `None`，请求直接出网。
    pub fn proxy_for(&self, tier: ProxyTier, country: Option<&str>) -> Option<String> {
        let Some(template) = self.settings.url_for(tier) else {
            if tier != ProxyTier::Datacenter {
                warn!(tier = %tier, "No proxy configured for tier, connecting directly");
            }
            return None;
        };

        let mut url = template.to_string();
        if let Some(country) = country {
            url = url
                .replace("{country}", &country.to_lowercase())
                .replace("{COUNTRY}", &country.to_uppercase());
        }
        if url.contains("{session}") {
            let session = format!("sess_{}", Uuid::new_v4().simple());
            url = url.replace("{session}", &session);
        }

        debug!(tier = %tier, "Resolved proxy for tier");
        Some(url)
    }

    pub fn is_configured(&self, tier: ProxyTier) -> bool {
        self.settings.url_for(tier).is_some()
    }
}
