//! 纯色占位图生成。

use image::{DynamicImage, ImageBuffer, Rgba};

use super::view::Size;

/// 生成指定尺寸、每个像素都等于 `color` 的图片。
///
/// # 示例
/// ```rust
/// use image::{GenericImageView, Rgba};
/// use image_slideshow_source::image_source::{make_solid_color_image, Size};
///
/// let image = make_solid_color_image(Rgba([213, 213, 215, 255]), Size::new(4, 2));
/// assert_eq!(image.dimensions(), (4, 2));
/// ```
pub fn make_solid_color_image(color: Rgba<u8>, size: Size) -> DynamicImage {
    let buffer = ImageBuffer::from_pixel(size.width, size.height, color);
    DynamicImage::ImageRgba8(buffer)
}
