//! # 定位符模块
//!
//! ## 设计思路
//!
//! `Locator` 是“一张图片在哪里”的不可变描述：可以是绝对 URI（`https://...`、`file:///...`），
//! 也可以是相对路径（`images/a.png`）。构造时完成一次合法性校验，之后的远程判定与
//! 字符串解析都是对其字符串形态的纯函数。
//!
//! ## 实现思路
//!
//! - 字符集校验：只接受 URI 允许的 ASCII 字符，`%` 之后必须跟两位十六进制。
//! - 含合法 scheme 的输入交给 `reqwest::Url` 解析；其余视为相对引用。
//! - 远程判定默认使用子串匹配（兼容旧行为），可切换为 scheme 判定。

use std::fmt;
use std::str::FromStr;

use reqwest::Url;

use super::{ClassificationMode, ImageError};

const URI_EXTRA_CHARS: &[u8] = b"-._~:/?#[]@!$&'()*+,;=%";

/// 图片定位符。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    raw: String,
    kind: LocatorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocatorKind {
    Absolute(Url),
    Relative,
}

impl Locator {
    /// 解析字符串，不合法时返回 `None`。
    pub fn parse(text: &str) -> Option<Self> {
        text.parse().ok()
    }

    /// 从已解析的 URL 构造，总是成功。
    pub fn from_url(url: Url) -> Self {
        Self {
            raw: url.as_str().to_string(),
            kind: LocatorKind::Absolute(url),
        }
    }

    /// 构造时的字符串形态。
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 绝对 URI 时返回解析结果。
    pub fn url(&self) -> Option<&Url> {
        match &self.kind {
            LocatorKind::Absolute(url) => Some(url),
            LocatorKind::Relative => None,
        }
    }

    /// 子串判定：包含 `http://` 或 `https://` 即视为远程。
    ///
    /// 本地路径中恰好出现该子串时同样会被判为远程。
    pub fn is_remote(&self) -> bool {
        self.raw.contains("https://") || self.raw.contains("http://")
    }

    /// 按指定方式判定是否远程。
    pub fn is_remote_with(&self, mode: ClassificationMode) -> bool {
        match mode {
            ClassificationMode::Substring => self.is_remote(),
            ClassificationMode::Scheme => self
                .url()
                .is_some_and(|url| matches!(url.scheme(), "http" | "https")),
        }
    }

    /// 远程时返回完整 URI；本地时仅返回路径部分（已做百分号解码）。
    pub fn resolved_string(&self) -> String {
        self.resolved_string_with(ClassificationMode::Substring)
    }

    pub fn resolved_string_with(&self, mode: ClassificationMode) -> String {
        if self.is_remote_with(mode) {
            return self.raw.clone();
        }

        match &self.kind {
            LocatorKind::Absolute(url) => percent_decode(url.path()),
            LocatorKind::Relative => {
                let end = self.raw.find(['?', '#']).unwrap_or(self.raw.len());
                percent_decode(&self.raw[..end])
            }
        }
    }

    /// 远程请求使用的 URL。
    pub(crate) fn request_url(&self) -> Result<Url, ImageError> {
        match &self.kind {
            LocatorKind::Absolute(url) => Ok(url.clone()),
            LocatorKind::Relative => {
                // 子串判定下相对引用也可能被视为远程，此时尝试从子串起点重新解析。
                let start = self
                    .raw
                    .find("https://")
                    .or_else(|| self.raw.find("http://"))
                    .ok_or_else(|| {
                        ImageError::InvalidLocator(format!("不是远程地址：{}", self.raw))
                    })?;
                Url::parse(&self.raw[start..])
                    .map_err(|e| ImageError::InvalidLocator(format!("URL 格式错误：{}", e)))
            }
        }
    }
}

impl FromStr for Locator {
    type Err = ImageError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.is_empty() {
            return Err(ImageError::InvalidLocator("定位符为空".to_string()));
        }

        validate_uri_chars(text)?;

        if has_scheme(text) {
            let url = Url::parse(text)
                .map_err(|e| ImageError::InvalidLocator(format!("URI 解析失败：{}", e)))?;
            return Ok(Self {
                raw: text.to_string(),
                kind: LocatorKind::Absolute(url),
            });
        }

        Ok(Self {
            raw: text.to_string(),
            kind: LocatorKind::Relative,
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn validate_uri_chars(text: &str) -> Result<(), ImageError> {
    let bytes = text.as_bytes();
    let mut idx = 0;

    while idx < bytes.len() {
        let byte = bytes[idx];
        if byte == b'%' {
            let valid_escape = bytes
                .get(idx + 1..idx + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !valid_escape {
                return Err(ImageError::InvalidLocator(format!(
                    "百分号转义不完整（位置 {}）",
                    idx
                )));
            }
            idx += 3;
            continue;
        }

        if !byte.is_ascii_alphanumeric() && !URI_EXTRA_CHARS.contains(&byte) {
            return Err(ImageError::InvalidLocator(format!(
                "包含非法字符 {:?}（位置 {}）",
                char::from(byte),
                idx
            )));
        }
        idx += 1;
    }

    Ok(())
}

/// `scheme ":"` 前缀判定（RFC 3986：字母开头，后续为字母数字或 `+-.`）。
fn has_scheme(text: &str) -> bool {
    let Some(colon) = text.find(':') else {
        return false;
    };
    let scheme = &text[..colon];

    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn percent_decode(input: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(input.as_bytes())).into_owned()
}
