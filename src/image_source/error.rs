//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载图片来源链路（定位 → 下载 → 解码 → 派发）中的所有错误，
//! 避免字符串拼接式错误处理。通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! `code()` / `stage()` 提供稳定标识，供日志与上层 UI 做分类展示。

/// 图片来源统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("定位错误：{0}")]
    InvalidLocator(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("已取消：{0}")]
    Cancelled(String),

    #[error("运行时错误：{0}")]
    Runtime(String),
}

impl ImageError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidLocator(_) => "E_INVALID_LOCATOR",
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Cancelled(_) => "E_CANCELLED",
            Self::Runtime(_) => "E_RUNTIME",
        }
    }

    /// 错误发生的阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidLocator(_) => "locate",
            Self::Network(_) | Self::Timeout(_) | Self::Cancelled(_) => "download",
            Self::Decode(_) | Self::InvalidFormat(_) | Self::ResourceLimit(_) => "decode",
            Self::FileSystem(_) => "read",
            Self::Runtime(_) => "dispatch",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_stages_are_stable() {
        let err = ImageError::Network("boom".to_string());
        assert_eq!(err.code(), "E_NETWORK");
        assert_eq!(err.stage(), "download");

        let err = ImageError::FileSystem("missing".to_string());
        assert_eq!(err.code(), "E_FILE_SYSTEM");
        assert_eq!(err.stage(), "read");

        assert!(ImageError::Cancelled("x".to_string()).is_cancelled());
        assert!(!ImageError::Timeout("x".to_string()).is_cancelled());
    }

    #[test]
    fn display_keeps_inner_message() {
        let msg = ImageError::Decode("bad header".to_string()).to_string();
        assert!(msg.contains("bad header"));
    }
}
