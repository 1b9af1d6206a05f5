//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义库级统一的 `AppError` 枚举，替代各处分散的 `.map_err(|e| e.to_string())`。
//! 设置文件读写与命令行入口统一返回 `Result<T, AppError>`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` / `std::io::Error` 提供 `From` 转换，无需手动 map。

use crate::image_source::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片来源链路错误（定位 / 下载 / 解码）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件解析或序列化失败
    #[error("设置错误: {0}")]
    Settings(String),

    /// 命令行参数错误
    #[error("参数错误: {0}")]
    Usage(String),
}
