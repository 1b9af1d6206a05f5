//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“幻灯片的图片引用”和“流水线中间结果”解耦：
//! - `ImageSource` 表示一张幻灯片的图片来源（定位符 + 占位图 + 展示尺寸）
//! - `RawImageData` 表示已加载但未解码的字节

use super::locator::Locator;
use super::view::{Frame, SlideImage};
use super::ClassificationMode;

/// 一张可加载的图片引用。
///
/// 定位符构造后不可变；只有占位图与展示尺寸可以修改。
#[derive(Debug, Clone)]
pub struct ImageSource {
    locator: Locator,
    placeholder: Option<SlideImage>,
    display_frame: Option<Frame>,
}

impl ImageSource {
    /// 使用已解析的定位符创建，总是成功。
    pub fn new(locator: Locator, placeholder: Option<SlideImage>) -> Self {
        Self {
            locator,
            placeholder,
            display_frame: None,
        }
    }

    /// 从字符串创建；无法解析为 URI 时返回 `None`。
    ///
    /// # 示例
    /// ```rust
    /// use image_slideshow_source::image_source::ImageSource;
    ///
    /// assert!(ImageSource::from_string("https://example.com/a.png", None).is_some());
    /// assert!(ImageSource::from_string("", None).is_none());
    /// ```
    pub fn from_string(text: &str, placeholder: Option<SlideImage>) -> Option<Self> {
        let locator = Locator::parse(text)?;
        Some(Self::new(locator, placeholder))
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn placeholder(&self) -> Option<&SlideImage> {
        self.placeholder.as_ref()
    }

    pub fn set_placeholder(&mut self, placeholder: Option<SlideImage>) {
        self.placeholder = placeholder;
    }

    pub fn display_frame(&self) -> Option<Frame> {
        self.display_frame
    }

    /// 记录展示尺寸，不会影响视图。
    pub fn set_display_frame(&mut self, frame: Frame) {
        self.display_frame = Some(frame);
    }

    pub fn is_remote(&self) -> bool {
        self.locator.is_remote()
    }

    pub fn resolved_string(&self) -> String {
        self.locator.resolved_string()
    }

    pub(crate) fn is_remote_with(&self, mode: ClassificationMode) -> bool {
        self.locator.is_remote_with(mode)
    }

    pub(crate) fn resolved_string_with(&self, mode: ClassificationMode) -> String {
        self.locator.resolved_string_with(mode)
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_source::view::Frame;
    use image::DynamicImage;
    use std::sync::Arc;

    #[test]
    fn from_string_keeps_placeholder_and_starts_without_frame() {
        let placeholder: SlideImage = Arc::new(DynamicImage::new_rgba8(1, 1));
        let source = ImageSource::from_string("slides/a.png", Some(placeholder.clone()))
            .expect("valid relative path");

        assert!(!source.is_remote());
        assert!(source.display_frame().is_none());
        assert!(Arc::ptr_eq(source.placeholder().unwrap(), &placeholder));
    }

    #[test]
    fn set_display_frame_only_records_value() {
        let mut source = ImageSource::from_string("https://example.com/a.png", None).unwrap();
        source.set_display_frame(Frame::new(0, 0, 320, 240));

        assert_eq!(source.display_frame(), Some(Frame::new(0, 0, 320, 240)));
        assert_eq!(source.resolved_string(), "https://example.com/a.png");
    }
}
