//! # 本地文件读取模块
//!
//! 同步原语 `read_local_image` 在文件缺失或损坏时返回 `None` 而不是报错；
//! `read_local_image_async` 把同一过程放到 tokio 阻塞线程池，避免卡住调用线程。

use std::path::Path;

use image::DynamicImage;

use super::loader::validate_image_signature;
use super::pipeline;
use super::source::RawImageData;
use super::{ImageError, SourceConfig};

/// 从本地路径加载图片原始字节。
pub(crate) fn load_from_file(path: &Path, config: &SourceConfig) -> Result<RawImageData, ImageError> {
    log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

    if !path.exists() {
        return Err(ImageError::FileSystem(format!("文件不存在：{}", path.display())));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

    if metadata.len() > config.max_file_size {
        return Err(ImageError::ResourceLimit(format!(
            "文件过大：{:.2} MB（限制：{:.2} MB）",
            metadata.len() as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    let bytes = std::fs::read(path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
    validate_image_signature(&bytes)?;

    Ok(RawImageData {
        bytes,
        source_hint: "file",
    })
}

/// 读取并解码本地图片，返回详细错误。
pub(crate) fn decode_file(path: &Path, config: &SourceConfig) -> Result<DynamicImage, ImageError> {
    let raw = load_from_file(path, config)?;
    pipeline::decode(raw, config)
}

/// 同步读取并解码本地图片；缺失或无法解码时返回 `None`。
pub fn read_local_image(path: impl AsRef<Path>, config: &SourceConfig) -> Option<DynamicImage> {
    let path = path.as_ref();
    match decode_file(path, config) {
        Ok(image) => Some(image),
        Err(err) => {
            log::warn!("⚠️ 本地图片不可用 - 路径: {} 原因: {}", path.display(), err);
            None
        }
    }
}

/// 在阻塞线程池中读取本地图片。
pub async fn read_local_image_async(
    path: impl AsRef<Path>,
    config: &SourceConfig,
) -> Result<DynamicImage, ImageError> {
    let path = path.as_ref().to_path_buf();
    let config = config.clone();

    tokio::task::spawn_blocking(move || decode_file(&path, &config))
        .await
        .map_err(|e| ImageError::Runtime(format!("本地读取任务异常结束：{}", e)))?
}
