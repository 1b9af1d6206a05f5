//! 设置文件：以 JSON 保存 `SourceConfig`。
//!
//! 文件不存在时返回默认配置；只写了部分字段的文件由 `#[serde(default)]` 补齐。

use std::fs;
use std::path::Path;

use crate::error::AppError;
use crate::image_source::SourceConfig;

pub const SETTINGS_FILE_NAME: &str = "slideshow-settings.json";

pub fn load_settings(path: &Path) -> Result<SourceConfig, AppError> {
    if !path.exists() {
        log::info!("⚙️ 未找到设置文件，使用默认配置 - {}", path.display());
        return Ok(SourceConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str::<SourceConfig>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?;
    config.validate()?;

    log::info!("⚙️ 已加载设置文件 - {}", path.display());
    Ok(config)
}

pub fn save_settings(path: &Path, config: &SourceConfig) -> Result<(), AppError> {
    config.validate()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;

    fs::write(path, content)?;
    Ok(())
}
