// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 积分明细
///
/// 每一项都是非负整数，总额等于各项之和。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBreakdown {
    /// 引擎基础费用
    pub base: u64,
    /// HTTP 请求自动升级为 JS 渲染时的差价
    pub js_render: u64,
    pub premium_proxy: u64,
    pub mobile_proxy: u64,
    pub captcha: u64,
    pub screenshot: u64,
    pub pdf: u64,
}

impl CreditBreakdown {
    pub fn total(&self) -> u64 {
        self.components().iter().map(|(_, value)| value).sum()
    }

    /// 以 (名称, 数值) 形式列出所有明细项
    pub fn components(&self) -> [(&'static str, u64); 7] {
        [
            ("base", self.base),
            ("js_render", self.js_render),
            ("premium_proxy", self.premium_proxy),
            ("mobile_proxy", self.mobile_proxy),
            ("captcha", self.captcha),
            ("screenshot", self.screenshot),
            ("pdf", self.pdf),
        ]
    }
}

/// 积分报价
///
/// 只能通过 [`CreditQuote::from_breakdown`] 构造，保证总额与明细一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditQuote {
    total: u64,
    breakdown: CreditBreakdown,
}

impl CreditQuote {
    pub fn from_breakdown(breakdown: CreditBreakdown) -> Self {
        Self {
            total: breakdown.total(),
            breakdown,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn breakdown(&self) -> &CreditBreakdown {
        &self.breakdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_sum_of_components() {
        let breakdown = CreditBreakdown {
            base: 5,
            js_render: 0,
            premium_proxy: 3,
            mobile_proxy: 0,
            captcha: 10,
            screenshot: 2,
            pdf: 3,
        };
        assert_eq!(breakdown.total(), 23);

        let quote = CreditQuote::from_breakdown(breakdown);
        assert_eq!(quote.total(), 23);
        assert_eq!(quote.breakdown().premium_proxy, 3);
    }

    #[test]
    fn test_empty_breakdown_costs_nothing() {
        assert_eq!(CreditBreakdown::default().total(), 0);
    }
}
