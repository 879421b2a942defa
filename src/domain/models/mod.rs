// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 引擎与代理层级（engine）：任务路由的分类维度
/// - 抓取选项（scrape_options）：客户端提交的参数
/// - 抓取任务（job）：任务实体及其状态机
/// - 积分（credits）：积分明细与报价
/// - 抓取结果（job_result）：执行成功后的输出
pub mod credits;
pub mod engine;
pub mod job;
pub mod job_result;
pub mod scrape_options;

pub use credits::{CreditBreakdown, CreditQuote};
pub use engine::{EngineHint, EngineType, ProxyTier};
pub use job::{DomainError, JobStatus, ScrapeJob};
pub use job_result::JobResult;
pub use scrape_options::{ImageFormat, ScenarioStep, ScrapeOptions, ScreenshotOptions, ScrollDirection};
