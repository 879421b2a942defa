// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抓取引擎模块
///
/// 引擎特质、三种引擎实现、浏览器资源池以及指纹与代理辅助
pub mod browser_engine;
pub mod browser_pool;
pub mod fingerprint;
pub mod http_engine;
pub mod proxy;
pub mod registry;
pub mod stealth_engine;
pub mod traits;
pub mod validators;

pub use browser_pool::{BrowserHandle, BrowserPool, BrowserPoolConfig, PoolError, PoolStats};
pub use registry::EngineRegistry;
pub use traits::{EngineError, ScrapeEngine, ScrapeRequest};
