// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置，包括 Redis、队列、工作器、浏览器资源池和积分费率等配置
pub mod settings;
