//! # 远程获取能力
//!
//! 网络获取、缓存与解码由可替换的协作者负责，`SlideImageHandler` 只依赖这里的 trait。
//! 默认实现见 `HttpImageFetcher`。

use async_trait::async_trait;
use reqwest::Url;

use super::view::{SlideImage, Transition, ViewId};
use super::{ImageError, SourceConfig};

/// 单次获取的参数。
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// 发起请求的视图，用于按视图取消。
    pub view: ViewId,
    /// 获取完成前展示的占位图。
    pub placeholder: Option<SlideImage>,
    pub transition: Transition,
    /// 命中缓存时是否仍执行过渡。
    pub run_transition_if_cached: bool,
}

impl FetchOptions {
    pub fn new(view: ViewId) -> Self {
        Self {
            view,
            placeholder: None,
            transition: Transition::None,
            run_transition_if_cached: false,
        }
    }

    /// 根据是否命中缓存决定实际使用的过渡。
    pub fn effective_transition(&self, from_cache: bool) -> Transition {
        if from_cache && !self.run_transition_if_cached {
            Transition::None
        } else {
            self.transition
        }
    }
}

/// 获取结果。
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub image: SlideImage,
    pub from_cache: bool,
}

/// 远程图片获取能力。
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// 获取并解码 `url` 指向的图片。
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<FetchedImage, ImageError>;

    /// 取消该视图上仍在进行的获取。
    fn cancel(&self, view: ViewId);

    /// 处理器配置变更时调用；不依赖配置的获取器无需实现。
    fn reconfigure(&self, _config: &SourceConfig) -> Result<(), ImageError> {
        Ok(())
    }
}
