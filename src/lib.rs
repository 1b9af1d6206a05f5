//! # 幻灯片图片来源 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              幻灯片 UI（任意 GUI 框架）                   │
//! │      实现 ImageView：set_image / set_background / bounds  │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ 回调 / 视图赋值
//! ┌───────┼──────────────────────────────────────────────────┐
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  ├─ settings ─── JSON 设置文件 ↔ SourceConfig              │
//! │  └─ image_source                                         │
//! │      ├─ ImageSource / Locator   远程·本地判定与解析        │
//! │      ├─ SlideImageHandler       绑定·加载·取消             │
//! │      ├─ ImageFetcher            可替换的远程获取能力       │
//! │      └─ HttpImageFetcher        reqwest 下载·校验·缓存     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`image_source`] | 定位符、加载编排、远程获取、本地读取、占位图 |
//! | [`settings`] | 设置文件的读取与保存 |

pub mod error;
pub mod image_source;
pub mod settings;
