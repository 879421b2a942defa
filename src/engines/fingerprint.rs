// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 视口尺寸
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

/// 反检测引擎使用的浏览器指纹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone: String,
    pub platform: String,
    pub mobile: bool,
    pub hardware_concurrency: u8,
}

impl Fingerprint {
    /// `Accept-Language` 请求头
    pub fn accept_language(&self) -> String {
        match self.locale.split_once('-') {
            Some((language, _)) if language != "en" => {
                format!("{},{};q=0.9,en;q=0.8", self.locale, language)
            }
            _ => format!("{},en;q=0.9", self.locale),
        }
    }

    /// 在页面脚本执行前注入的伪装脚本
    pub fn bootstrap_script(&self) -> String {
        format!(
            r#"(() => {{
  Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});
  Object.defineProperty(navigator, 'platform', {{ get: () => '{platform}' }});
  Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => {cores} }});
  Object.defineProperty(navigator, 'languages', {{ get: () => ['{locale}', 'en'] }});
  Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
  window.chrome = window.chrome || {{ runtime: {{}} }};
  const query = window.navigator.permissions && window.navigator.permissions.query;
  if (query) {{
    window.navigator.permissions.query = (p) =>
      p && p.name === 'notifications'
        ? Promise.resolve({{ state: Notification.permission }})
        : query.call(window.navigator.permissions, p);
  }}
}})();"#,
            platform = self.platform,
            cores = self.hardware_concurrency,
            locale = self.locale,
        )
    }
}

const DESKTOP_VIEWPORTS: &[(u32, u32, f64)] = &[
    (1920, 1080, 1.0),
    (1366, 768, 1.0),
    (1536, 864, 1.25),
    (1440, 900, 2.0),
    (1280, 720, 1.0),
    (1600, 900, 1.0),
];

const MOBILE_VIEWPORTS: &[(u32, u32, f64)] = &[
    (375, 812, 3.0),
    (390, 844, 3.0),
    (412, 915, 2.625),
    (360, 800, 3.0),
    (414, 896, 2.0),
];

const DESKTOP_PROFILES: &[(&str, &str)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Win32",
    ),
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        "Win32",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "MacIntel",
    ),
    (
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Linux x86_64",
    ),
];

const MOBILE_PROFILES: &[(&str, &str)] = &[
    (
        "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
        "Linux armv8l",
    ),
    (
        "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
        "Linux armv8l",
    ),
    (
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
        "iPhone",
    ),
];

/// 国家代码对应的语言区域与时区
fn locale_for_country(country: Option<&str>) -> (&'static str, &'static str) {
    match country.map(|c| c.to_ascii_uppercase()).as_deref() {
        Some("GB") | Some("UK") => ("en-GB", "Europe/London"),
        Some("DE") => ("de-DE", "Europe/Berlin"),
        Some("FR") => ("fr-FR", "Europe/Paris"),
        Some("ES") => ("es-ES", "Europe/Madrid"),
        Some("JP") => ("ja-JP", "Asia/Tokyo"),
        Some("BR") => ("pt-BR", "America/Sao_Paulo"),
        Some("CN") => ("zh-CN", "Asia/Shanghai"),
        Some("IN") => ("en-IN", "Asia/Kolkata"),
        _ => ("en-US", "America/New_York"),
    }
}

/// 生成随机指纹
///
/// # 参数
///
/// * `mobile` - 是否生成移动设备指纹
/// * `country` - 代理出口国家，决定语言区域与时区
pub fn generate(mobile: bool, country: Option<&str>) -> Fingerprint {
    generate_with(&mut rand::rng(), mobile, country)
}

/// 使用指定随机源生成指纹
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, mobile: bool, country: Option<&str>) -> Fingerprint {
    let (profiles, viewports) = if mobile {
        (MOBILE_PROFILES, MOBILE_VIEWPORTS)
    } else {
        (DESKTOP_PROFILES, DESKTOP_VIEWPORTS)
    };

    let (user_agent, platform) = profiles.choose(rng).copied().unwrap_or(DESKTOP_PROFILES[0]);
    let (width, height, device_scale_factor) =
        viewports.choose(rng).copied().unwrap_or(DESKTOP_VIEWPORTS[0]);
    let (locale, timezone) = locale_for_country(country);
    let hardware_concurrency = *[4u8, 8, 12, 16].choose(rng).unwrap_or(&8);

    Fingerprint {
        user_agent: user_agent.to_string(),
        viewport: Viewport {
            width,
            height,
            device_scale_factor,
        },
        locale: locale.to_string(),
        timezone: timezone.to_string(),
        platform: platform.to_string(),
        mobile,
        hardware_concurrency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_fingerprint_uses_mobile_profile() {
        for _ in 0..20 {
            let fp = generate(true, None);
            assert!(fp.mobile);
            assert!(fp.viewport.width < 500);
            assert!(fp.user_agent.contains("Mobile"));
        }
    }

    #[test]
    fn test_desktop_fingerprint() {
        let fp = generate(false, Some("de"));
        assert!(!fp.mobile);
        assert!(fp.viewport.width >= 1280);
        assert_eq!(fp.locale, "de-DE");
        assert_eq!(fp.timezone, "Europe/Berlin");
        assert_eq!(fp.accept_language(), "de-DE,de;q=0.9,en;q=0.8");
    }

    #[test]
    fn test_unknown_country_falls_back_to_us() {
        let fp = generate(false, Some("ZZ"));
        assert_eq!(fp.locale, "en-US");
        assert_eq!(fp.accept_language(), "en-US,en;q=0.9");
    }

    #[test]
    fn test_bootstrap_script_hides_webdriver() {
        let fp = generate(false, None);
        let script = fp.bootstrap_script();
        assert!(script.contains("webdriver"));
        assert!(script.contains(&fp.platform));
    }
}
