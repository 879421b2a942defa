// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::net::IpAddr;
use url::{Host, Url};

use crate::engines::traits::EngineError;

/// 校验抓取目标 URL
///
/// 只接受带主机名的 http/https 地址。`allow_private_networks` 为假时，
/// 拒绝 localhost 与字面量形式的内网、环回、链路本地地址。
///
/// # 返回值
///
/// * `Ok(Url)` - 解析后的 URL
/// * `Err(EngineError::InvalidUrl)` - 地址不合法
pub fn validate_url(url_str: &str, allow_private_networks: bool) -> Result<Url, EngineError> {
    let url = Url::parse(url_str.trim())
        .map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url_str, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(EngineError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = match url.host() {
        Some(host) => host,
        None => return Err(EngineError::InvalidUrl(format!("{}: missing host", url_str))),
    };

    if !allow_private_networks {
        let private = match host {
            Host::Domain(domain) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                domain == "localhost" || domain.ends_with(".localhost")
            }
            Host::Ipv4(ip) => is_private_ip(IpAddr::V4(ip)),
            Host::Ipv6(ip) => is_private_ip(IpAddr::V6(ip)),
        };
        if private {
            return Err(EngineError::InvalidUrl(format!(
                "{}: private network targets are not allowed",
                url_str
            )));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            // 10.0.0.0/8
            octets[0] == 10
                // 172.16.0.0/12
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                // 192.168.0.0/16
                || (octets[0] == 192 && octets[1] == 168)
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_unspecified()
                // 224.0.0.0/4
                || (224..=239).contains(&octets[0])
        }
        IpAddr::V6(ipv6) => {
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // fc00::/7
                || (first & 0xfe00) == 0xfc00
                // fe80::/10
                || (first & 0xffc0) == 0xfe80
                // ff00::/8
                || (first & 0xff00) == 0xff00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_and_https() {
        assert!(validate_url("https://example.com/path?q=1", false).is_ok());
        assert!(validate_url("http://example.com", false).is_ok());
    }

    #[test]
    fn test_rejects_other_schemes() {
        for url in ["ftp://example.com", "file:///etc/passwd", "javascript:alert(1)"] {
            let err = validate_url(url, true).unwrap_err();
            assert!(matches!(err, EngineError::InvalidUrl(_)), "{}", url);
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(validate_url("not a url", true).is_err());
        assert!(validate_url("", true).is_err());
    }

    #[test]
    fn test_private_targets_depend_on_flag() {
        assert!(validate_url("http://localhost:8080", false).is_err());
        assert!(validate_url("http://127.0.0.1", false).is_err());
        assert!(validate_url("http://10.1.2.3", false).is_err());
        assert!(validate_url("http://[::1]/", false).is_err());
        assert!(validate_url("http://127.0.0.1:3000", true).is_ok());
        assert!(validate_url("http://8.8.8.8", false).is_ok());
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip("172.16.0.1".parse().unwrap()));
        assert!(is_private_ip("192.168.1.1".parse().unwrap()));
        assert!(is_private_ip("169.254.0.1".parse().unwrap()));
        assert!(!is_private_ip("172.32.0.1".parse().unwrap()));
        assert!(!is_private_ip("2606:4700::1111".parse().unwrap()));
    }
}
