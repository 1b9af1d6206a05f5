//! # 幻灯片图片来源模块（image_source）
//!
//! ## 设计思路
//!
//! 该模块将“定位符识别 → 派发加载 → 下载校验 → 解码适配 → 回填视图”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `locator`：定位符解析、远程判定、字符串解析
//! - `source`：`ImageSource`（定位符 + 占位图 + 展示尺寸）与中间数据模型
//! - `handler`：编排绑定/加载/取消流程
//! - `fetcher`：远程获取能力（trait），可替换
//! - `loader`：默认 HTTP 获取器（流式下载 + 校验 + 缓存）
//! - `local`：本地文件读取
//! - `pipeline`：解码、像素限制、展示尺寸适配
//! - `view`：视图能力（trait）与内存视图
//! - `render`：纯色占位图
//! - `config/error/sentinel`：配置、错误、默认占位图定位
//!
//! ## 新同事快速上手
//!
//! ```text
//! ImageSource::from_string
//!    ↓
//! SlideImageHandler::bind_to_image_view / load
//!    ├─ 远程 → ImageFetcher::fetch（默认 HttpImageFetcher）
//!    │          ├─ loader.rs（下载 + 签名校验 + 缓存）
//!    │          └─ pipeline.rs（解码 + 限制）
//!    └─ 本地 → local.rs（阻塞线程池读取 + 解码）
//!    ↓
//! ImageView::set_image（+ 过渡）/ 回调
//! ```

mod config;
mod error;
mod fetcher;
mod handler;
mod loader;
mod local;
mod locator;
mod pipeline;
mod render;
mod sentinel;
mod source;
mod view;

pub use config::{ClassificationMode, FitQuality, SourceConfig, PLACEHOLDER_GRAY};
pub use error::ImageError;
pub use fetcher::{FetchOptions, FetchedImage, ImageFetcher};
pub use handler::SlideImageHandler;
pub use loader::HttpImageFetcher;
pub use local::{read_local_image, read_local_image_async};
pub use locator::Locator;
pub use render::make_solid_color_image;
pub use sentinel::{default_placeholder, PLACEHOLDER_ENV, PLACEHOLDER_RESOURCE};
pub use source::ImageSource;
pub use view::{Frame, ImageView, MemoryImageView, Size, SlideImage, Transition, ViewId};
