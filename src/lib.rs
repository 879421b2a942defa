// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 包含抓取任务提交用例
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 实现 HTTP、浏览器与隐身三种抓取引擎及浏览器资源池
pub mod engines;

/// 基础设施模块
///
/// 提供外部服务集成，如 Redis、Chromium 与指标导出
pub mod infrastructure;

/// 队列模块
///
/// 实现按引擎划分的任务队列
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 实现引擎工作器池和编排器
pub mod workers;
