// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，负责与外部系统的交互。
///
/// 包含的子模块：
/// - 浏览器（browser）：基于 Chromium 的浏览器进程启动器
/// - 指标（metrics）：Prometheus 指标导出
/// - Redis 客户端（redis_client）：共享的多路复用连接与键前缀
/// - 仓库实现（repositories）：任务仓库的内存与 Redis 实现
///
/// 基础设施层依赖于领域层的抽象接口，领域层不感知具体实现。
pub mod browser;
pub mod metrics;
pub mod redis_client;
pub mod repositories;
