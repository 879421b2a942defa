// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 浏览器进程实现
pub mod chromium;

pub use chromium::{ChromiumLauncher, ChromiumProcess};
