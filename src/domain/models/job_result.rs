// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// 抓取结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub status_code: u16,
    pub content: String,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    /// 跟随重定向后的最终地址
    pub final_url: String,
    /// Base64 编码的截图
    pub screenshot: Option<String>,
    /// Base64 编码的 PDF
    pub pdf: Option<String>,
    pub response_time_ms: u64,
}

impl JobResult {
    /// 内容的 SHA-256 摘要（十六进制）
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }
}
