//! 内置默认占位图定位。
//!
//! 远程来源的解析字符串等于该定位时视为“显示空图”。进程内只解析一次：
//! 优先读取环境变量 `IMAGE_SLIDESHOW_PLACEHOLDER`，否则使用可执行文件旁的
//! `placeholderImage.png`。

use std::path::PathBuf;

use once_cell::sync::Lazy;

pub const PLACEHOLDER_ENV: &str = "IMAGE_SLIDESHOW_PLACEHOLDER";
pub const PLACEHOLDER_RESOURCE: &str = "placeholderImage.png";

static DEFAULT_PLACEHOLDER: Lazy<String> = Lazy::new(resolve_default_placeholder);

/// 默认占位图定位。
pub fn default_placeholder() -> &'static str {
    DEFAULT_PLACEHOLDER.as_str()
}

fn resolve_default_placeholder() -> String {
    if let Ok(value) = std::env::var(PLACEHOLDER_ENV) {
        let value = value.trim();
        if !value.is_empty() {
            return value.to_string();
        }
    }

    let resource_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_default();

    let path = resource_dir.join(PLACEHOLDER_RESOURCE);
    log::debug!("🖼️ 默认占位图定位：{}", path.display());
    path.to_string_lossy().into_owned()
}
