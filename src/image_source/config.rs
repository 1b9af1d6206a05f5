//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `SourceConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中分类模式（substring / scheme）与缩放质量（quality / balanced / speed）作为高层语义，
//! 通过字符串稳定地解析与输出，便于写入设置文件。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置。
//! - 整体 `#[serde(default)]`：设置文件只需写出想覆盖的字段。
//! - `validate` 在设置文件加载与运行时更新时统一做范围校验。

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::ImageError;

/// 占位底色：RGB(213, 213, 215)。
pub const PLACEHOLDER_GRAY: [u8; 4] = [213, 213, 215, 255];

/// 图片来源配置。
///
/// 字段覆盖了下载、解码、缓存与展示四个阶段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 下载/读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 网络下载超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时时间（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时时间（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 单个 URL 的最大请求次数（含首次）。
    pub max_retries: u8,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 已解码图片的 LRU 缓存条目数，0 表示关闭缓存。
    pub cache_capacity: usize,
    /// 远程图片淡入过渡时长（毫秒）。
    pub transition_ms: u64,
    /// 占位底色（RGBA）。
    pub placeholder_color: [u8; 4],
    /// 设置展示尺寸后，是否把解码结果等比缩小到展示尺寸以内。
    pub fit_to_display_frame: bool,
    /// 缩放质量档位。
    pub fit_quality: FitQuality,
    /// 远程/本地的判定方式。
    pub classification: ClassificationMode,
    /// 覆盖进程级默认占位图定位（为空时使用内置资源路径）。
    pub default_placeholder: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            max_retries: 3,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            cache_capacity: 64,
            transition_ms: 500,
            placeholder_color: PLACEHOLDER_GRAY,
            fit_to_display_frame: false,
            fit_quality: FitQuality::Balanced,
            classification: ClassificationMode::Substring,
            default_placeholder: None,
        }
    }
}

impl SourceConfig {
    /// 校验各项取值范围。
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.max_file_size == 0 {
            return Err(ImageError::InvalidFormat("max_file_size 不能为 0".to_string()));
        }
        if self.max_decoded_bytes < 8 * 1024 * 1024 {
            return Err(ImageError::InvalidFormat("max_decoded_bytes 不能小于 8MB".to_string()));
        }
        if !(1..=300).contains(&self.download_timeout) {
            return Err(ImageError::InvalidFormat("download_timeout 必须在 1~300 秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ImageError::InvalidFormat("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(ImageError::InvalidFormat(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(ImageError::InvalidFormat(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(ImageError::InvalidFormat("max_retries 必须在 1~10 之间".to_string()));
        }
        if self.transition_ms > 10_000 {
            return Err(ImageError::InvalidFormat("transition_ms 不能超过 10000 毫秒".to_string()));
        }

        Ok(())
    }

    pub(crate) fn transition_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.transition_ms)
    }
}

/// 远程/本地判定方式。
///
/// - `Substring`：字符串中包含 `http://` 或 `https://` 即视为远程（兼容旧行为）
/// - `Scheme`：解析 scheme，仅 `http` / `https` 视为远程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    Substring,
    Scheme,
}

impl ClassificationMode {
    /// 从外部字符串解析判定方式。
    ///
    /// # 示例
    /// ```rust
    /// use image_slideshow_source::image_source::ClassificationMode;
    ///
    /// let mode = ClassificationMode::from_str("Scheme")?;
    /// assert_eq!(mode.as_str(), "scheme");
    /// # Ok::<(), image_slideshow_source::image_source::ImageError>(())
    /// ```
    pub fn from_str(mode: &str) -> Result<Self, ImageError> {
        match mode.trim().to_lowercase().as_str() {
            "substring" => Ok(Self::Substring),
            "scheme" => Ok(Self::Scheme),
            other => Err(ImageError::InvalidFormat(format!(
                "未知判定方式：{}（可选：substring / scheme）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::Scheme => "scheme",
        }
    }
}

/// 展示尺寸适配时的缩放质量档位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitQuality {
    Quality,
    Balanced,
    Speed,
}

impl FitQuality {
    pub fn from_str(quality: &str) -> Result<Self, ImageError> {
        match quality.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidFormat(format!(
                "未知缩放档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }

    /// 档位对应的滤镜。
    pub(crate) fn filter(self) -> FilterType {
        match self {
            Self::Quality => FilterType::CatmullRom,
            Self::Balanced => FilterType::Triangle,
            Self::Speed => FilterType::Nearest,
        }
    }
}
