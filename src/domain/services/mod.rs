// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 引擎选择（engine_selector）：根据抓取选项决定引擎和代理层级
/// - 积分计算（credit_calculator）：根据费率表计算积分报价
pub mod credit_calculator;
pub mod engine_selector;

pub use credit_calculator::CreditCalculator;
pub use engine_selector::{resolve_engine, select_engine, select_proxy_tier};
