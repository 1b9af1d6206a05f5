//! # 解码与变换流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素/内存上限快速拒绝
//! 3. 完整解码并复核尺寸
//! 4. 需要时等比缩小到展示尺寸以内（`fast_image_resize`，失败回退 `image`）

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageReader, Rgba};
use std::io::Cursor;

use super::source::RawImageData;
use super::view::Size;
use super::{ImageError, SourceConfig};

/// 将原始字节解码为图片。
pub(crate) fn decode(raw: RawImageData, config: &SourceConfig) -> Result<DynamicImage, ImageError> {
    image::guess_format(&raw.bytes)
        .map_err(|e| ImageError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

    let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
    validate_pixel_limits(config, header_width, header_height)?;
    validate_decoded_memory_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(&raw.bytes)
        .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

    let (width, height) = decoded.dimensions();
    validate_pixel_limits(config, width, height)?;
    validate_decoded_memory_limits(config, width, height)?;

    log::info!(
        "✅ 图片解码成功 - 来源: {} 尺寸: {}x{}",
        raw.source_hint,
        width,
        height
    );

    Ok(decoded)
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

fn validate_pixel_limits(config: &SourceConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(
    config: &SourceConfig,
    width: u32,
    height: u32,
) -> Result<(), ImageError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 等比缩小到 `target` 以内；已经足够小或目标为空时原样返回。
pub(crate) fn fit_within(image: DynamicImage, target: Size, filter: FilterType) -> DynamicImage {
    if target.is_empty() {
        return image;
    }

    let (width, height) = image.dimensions();
    if width <= target.width && height <= target.height {
        return image;
    }

    let scale = (target.width as f64 / width as f64).min(target.height as f64 / height as f64);
    let target_width = ((width as f64 * scale).floor() as u32).max(1);
    let target_height = ((height as f64 * scale).floor() as u32).max(1);

    log::debug!(
        "🧩 适配展示尺寸：{}x{} -> {}x{}（filter={:?}）",
        width,
        height,
        target_width,
        target_height,
        filter
    );

    match resize_with_fast_image_resize(&image, target_width, target_height, filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}", err);
            image.resize_exact(target_width, target_height, filter)
        }
    }
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<DynamicImage, ImageError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        target_width,
        target_height,
        dst_image.into_vec(),
    )
    .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}
