// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::CreditSettings;
use crate::domain::models::{CreditBreakdown, CreditQuote, EngineType, ProxyTier, ScrapeOptions};

/// 积分计算器
///
/// 纯函数式计算，所有费率来自配置。相同输入总是得到相同报价。
#[derive(Debug, Clone)]
pub struct CreditCalculator {
    rates: CreditSettings,
}

impl CreditCalculator {
    pub fn new(rates: CreditSettings) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &CreditSettings {
        &self.rates
    }

    /// 计算一次抓取的积分报价
    ///
    /// # 参数
    ///
    /// * `engine` - 已解析的执行引擎
    /// * `proxy_tier` - 已解析的代理层级
    /// * `options` - 抓取选项
    ///
    /// # 返回值
    ///
    /// 返回总额与明细一致的报价
    pub fn compute(
        &self,
        engine: EngineType,
        proxy_tier: ProxyTier,
        options: &ScrapeOptions,
    ) -> CreditQuote {
        let base = self.rates.base.get(engine);

        // An http job that asks for JS rendering pays the browser differential.
        let js_render = if engine == EngineType::Http && options.render_js {
            self.rates
                .base
                .browser
                .saturating_sub(self.rates.base.http)
        } else {
            0
        };

        let (premium_proxy, mobile_proxy) = match proxy_tier {
            ProxyTier::Datacenter => (0, 0),
            ProxyTier::Residential => (self.rates.proxy.residential, 0),
            ProxyTier::Isp => (self.rates.proxy.isp, 0),
            ProxyTier::Mobile => (0, self.rates.proxy.mobile),
        };

        let breakdown = CreditBreakdown {
            base,
            js_render,
            premium_proxy,
            mobile_proxy,
            captcha: flat(options.solve_captcha, self.rates.features.captcha),
            screenshot: flat(options.screenshot, self.rates.features.screenshot),
            pdf: flat(options.pdf, self.rates.features.pdf),
        };

        CreditQuote::from_breakdown(breakdown)
    }
}

fn flat(enabled: bool, rate: u64) -> u64 {
    if enabled {
        rate
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{FeatureRates, PerEngine, ProxyRates};

    fn calculator() -> CreditCalculator {
        CreditCalculator::new(CreditSettings {
            base: PerEngine {
                http: 1,
                browser: 5,
                stealth: 10,
            },
            proxy: ProxyRates {
                residential: 3,
                mobile: 10,
                isp: 5,
            },
            features: FeatureRates {
                screenshot: 2,
                pdf: 3,
                captcha: 10,
            },
        })
    }

    #[test]
    fn test_browser_with_screenshot_and_premium_proxy() {
        let options = ScrapeOptions {
            screenshot: true,
            premium_proxy: true,
            ..Default::default()
        };
        let quote = calculator().compute(EngineType::Browser, ProxyTier::Residential, &options);

        assert_eq!(quote.total(), 10);
        let breakdown = quote.breakdown();
        assert_eq!(breakdown.base, 5);
        assert_eq!(breakdown.premium_proxy, 3);
        assert_eq!(breakdown.screenshot, 2);
        assert_eq!(breakdown.js_render, 0);
    }

    #[test]
    fn test_http_auto_upgrade_pays_js_render_differential() {
        let options = ScrapeOptions {
            render_js: true,
            ..Default::default()
        };
        let quote = calculator().compute(EngineType::Http, ProxyTier::Datacenter, &options);

        assert_eq!(quote.total(), 5);
        assert_eq!(quote.breakdown().base, 1);
        assert_eq!(quote.breakdown().js_render, 4);
    }

    #[test]
    fn test_premium_and_mobile_are_mutually_exclusive() {
        let calc = calculator();
        for tier in [
            ProxyTier::Datacenter,
            ProxyTier::Residential,
            ProxyTier::Mobile,
            ProxyTier::Isp,
        ] {
            let quote = calc.compute(EngineType::Stealth, tier, &ScrapeOptions::default());
            let breakdown = quote.breakdown();
            assert!(breakdown.premium_proxy == 0 || breakdown.mobile_proxy == 0);
        }

        let isp = calc.compute(EngineType::Http, ProxyTier::Isp, &ScrapeOptions::default());
        assert_eq!(isp.breakdown().premium_proxy, 5);
        let mobile = calc.compute(EngineType::Stealth, ProxyTier::Mobile, &ScrapeOptions::default());
        assert_eq!(mobile.breakdown().mobile_proxy, 10);
        assert_eq!(mobile.total(), 20);
    }

    #[test]
    fn test_every_feature_adds_its_flat_rate() {
        let options = ScrapeOptions {
            screenshot: true,
            pdf: true,
            solve_captcha: true,
            ..Default::default()
        };
        let quote = calculator().compute(EngineType::Browser, ProxyTier::Datacenter, &options);
        assert_eq!(quote.total(), 5 + 2 + 3 + 10);
        assert_eq!(quote.total(), quote.breakdown().total());
    }

    #[test]
    fn test_compute_is_deterministic() {
        let calc = calculator();
        let options = ScrapeOptions {
            render_js: true,
            premium_proxy: true,
            ..Default::default()
        };
        let first = calc.compute(EngineType::Http, ProxyTier::Residential, &options);
        let second = calc.compute(EngineType::Http, ProxyTier::Residential, &options);
        assert_eq!(first, second);
    }
}
