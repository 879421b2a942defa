// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 抓取选项
///
/// 由客户端提交，决定引擎选择、代理层级和计费项。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeOptions {
    /// 是否需要执行 JavaScript
    pub render_js: bool,
    /// 等待出现的 CSS 选择器
    pub wait_for: Option<String>,
    /// 页面加载后的额外等待时间（毫秒）
    pub wait_ms: Option<u64>,
    /// 单次执行超时（毫秒），未设置时使用工作器默认值
    pub timeout_ms: Option<u64>,
    pub screenshot: bool,
    pub screenshot_options: Option<ScreenshotOptions>,
    pub pdf: bool,
    /// 是否需要验证码求解（按验证码费率计费）
    pub solve_captcha: bool,
    /// 浏览器交互脚本步骤
    pub scenario: Vec<ScenarioStep>,
    pub premium_proxy: bool,
    pub mobile_proxy: bool,
    /// 代理出口国家代码，例如 "US"
    pub country: Option<String>,
    pub headers: HashMap<String, String>,
}

impl ScrapeOptions {
    pub fn has_scenario(&self) -> bool {
        !self.scenario.is_empty()
    }

    /// 是否存在显式的等待条件
    pub fn has_wait_condition(&self) -> bool {
        self.wait_for.is_some() || self.wait_ms.is_some_and(|ms| ms > 0)
    }
}

/// 截图选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    pub format: ImageFormat,
    /// JPEG 质量 (0-100)
    pub quality: Option<u8>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: true,
            format: ImageFormat::Png,
            quality: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

/// 交互脚本中的单个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    Click { selector: String },
    Type { selector: String, text: String },
    Wait { milliseconds: u64 },
    WaitFor {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Scroll { direction: ScrollDirection },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_plain_http_request() {
        let options: ScrapeOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.render_js);
        assert!(!options.has_scenario());
        assert!(!options.has_wait_condition());
    }

    #[test]
    fn test_wait_condition() {
        let options = ScrapeOptions {
            wait_ms: Some(0),
            ..Default::default()
        };
        assert!(!options.has_wait_condition());

        let options = ScrapeOptions {
            wait_for: Some("#content".to_string()),
            ..Default::default()
        };
        assert!(options.has_wait_condition());
    }

    #[test]
    fn test_scenario_step_deserializes_tagged() {
        let json = r##"[
            {"action": "click", "selector": "#login"},
            {"action": "type", "selector": "#user", "text": "alice"},
            {"action": "wait", "milliseconds": 500},
            {"action": "scroll", "direction": "bottom"}
        ]"##;
        let steps: Vec<ScenarioStep> = serde_json::from_str(json).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[0],
            ScenarioStep::Click {
                selector: "#login".to_string()
            }
        );
        assert_eq!(
            steps[3],
            ScenarioStep::Scroll {
                direction: ScrollDirection::Bottom
            }
        );
    }
}
