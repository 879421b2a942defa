// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::job::DomainError;

/// 执行引擎类型
///
/// 每种引擎拥有独立的队列和工作器池。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    /// 纯 HTTP 抓取
    Http,
    /// 无头浏览器渲染
    Browser,
    /// 反检测浏览器渲染
    Stealth,
}

impl EngineType {
    /// 所有引擎类型，按启动顺序排列
    pub const ALL: [EngineType; 3] = [EngineType::Http, EngineType::Browser, EngineType::Stealth];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Http => "http",
            EngineType::Browser => "browser",
            EngineType::Stealth => "stealth",
        }
    }

    /// 该引擎执行时是否需要从浏览器资源池借出句柄
    pub fn requires_browser(&self) -> bool {
        match self {
            EngineType::Http => false,
            EngineType::Browser | EngineType::Stealth => true,
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(EngineType::Http),
            "browser" => Ok(EngineType::Browser),
            "stealth" => Ok(EngineType::Stealth),
            other => Err(DomainError::ValidationError(format!(
                "unknown engine type: {}",
                other
            ))),
        }
    }
}

/// 客户端提交的引擎提示
///
/// `Auto` 表示由系统决定，但按 HTTP 记录并按自动升级规则计费。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineHint {
    Auto,
    Http,
    Browser,
    Stealth,
}

impl EngineHint {
    /// 提示中显式指定的引擎，`Auto` 返回 `None`
    pub fn explicit(&self) -> Option<EngineType> {
        match self {
            EngineHint::Auto => None,
            EngineHint::Http => Some(EngineType::Http),
            EngineHint::Browser => Some(EngineType::Browser),
            EngineHint::Stealth => Some(EngineType::Stealth),
        }
    }
}

/// 代理层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyTier {
    /// 数据中心代理，无附加费用
    #[default]
    Datacenter,
    /// 住宅代理（高级代理）
    Residential,
    /// 移动网络代理
    Mobile,
    /// ISP 代理（高级代理）
    Isp,
}

impl ProxyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyTier::Datacenter => "datacenter",
            ProxyTier::Residential => "residential",
            ProxyTier::Mobile => "mobile",
            ProxyTier::Isp => "isp",
        }
    }

    /// 是否按高级代理计费
    pub fn is_premium(&self) -> bool {
        matches!(self, ProxyTier::Residential | ProxyTier::Isp)
    }
}

impl fmt::Display for ProxyTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "datacenter" => Ok(ProxyTier::Datacenter),
            "residential" => Ok(ProxyTier::Residential),
            "mobile" => Ok(ProxyTier::Mobile),
            "isp" => Ok(ProxyTier::Isp),
            other => Err(DomainError::ValidationError(format!(
                "unknown proxy tier: {}",
                other
            ))),
        }
    }
}
