// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::{EngineHint, EngineType, ProxyTier, ScrapeOptions};

/// 根据抓取选项选择执行引擎
///
/// 判定顺序：
/// 1. 存在交互脚本或要求移动代理 → `Stealth`
/// 2. 需要 JS 渲染、等待条件、截图或 PDF → `Browser`
/// 3. 其他情况 → `Http`
pub fn select_engine(options: &ScrapeOptions) -> EngineType {
    if options.has_scenario() || options.mobile_proxy {
        return EngineType::Stealth;
    }

    if options.render_js || options.has_wait_condition() || options.screenshot || options.pdf {
        return EngineType::Browser;
    }

    EngineType::Http
}

/// 根据抓取选项选择代理层级
///
/// 移动代理优先于高级代理，未指定时使用数据中心代理。
pub fn select_proxy_tier(options: &ScrapeOptions) -> ProxyTier {
    if options.mobile_proxy {
        ProxyTier::Mobile
    } else if options.premium_proxy {
        ProxyTier::Residential
    } else {
        ProxyTier::Datacenter
    }
}

/// 结合客户端提示解析最终引擎
///
/// - 无提示：按 [`select_engine`] 推断
/// - `Auto`：记录为 `Http`，计费时按自动升级规则补 JS 渲染差价
/// - 显式引擎：尊重客户端选择，但需要反检测的请求总是解析为 `Stealth`
pub fn resolve_engine(hint: Option<EngineHint>, options: &ScrapeOptions) -> EngineType {
    let requires_stealth = options.has_scenario() || options.mobile_proxy;

    match hint {
        None => select_engine(options),
        Some(EngineHint::Auto) => {
            if requires_stealth {
                EngineType::Stealth
            } else {
                EngineType::Http
            }
        }
        Some(explicit) => {
            if requires_stealth {
                EngineType::Stealth
            } else {
                explicit.explicit().unwrap_or(EngineType::Http)
            }
        }
    }
}
