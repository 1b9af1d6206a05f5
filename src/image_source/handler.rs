//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `SlideImageHandler` 负责把 `ImageSource` 绑定到 `ImageView`：判定远程/本地、
//! 处理默认占位图短路、派发加载任务、回填视图并按视图管理取消。
//! 它不关心图片如何下载，下载交给注入的 `ImageFetcher`。
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<SourceConfig>>` 支持运行时更新，单次请求使用同一配置快照。
//! - 每个视图最多一个进行中的加载；新请求会中止旧任务并通知获取器取消。
//! - 每个任务带“代次”，完成时只有代次仍是最新的才会回填视图。
//! - 本地文件在阻塞线程池中读取，调用线程不被阻塞。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use image::{GenericImageView, Rgba};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::fetcher::{FetchOptions, ImageFetcher};
use super::view::{Frame, ImageView, SlideImage, Transition, ViewId};
use super::{
    local, make_solid_color_image, pipeline, sentinel, HttpImageFetcher, ImageError, ImageSource,
    SourceConfig,
};

type LoadCallback = Box<dyn FnOnce(Result<SlideImage, ImageError>) + Send + 'static>;

/// 按视图登记的进行中加载。
struct PendingLoad {
    generation: u64,
    task: AbortHandle,
    remote: bool,
}

/// 加载完成后的回填策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    /// 远程失败只记录日志，视图保持占位图；本地失败回填空图。
    KeepPlaceholder,
    /// 失败时回填与视图同尺寸的纯色占位图。
    SolidColor,
}

/// 幻灯片图片处理器。
pub struct SlideImageHandler {
    config: Arc<RwLock<SourceConfig>>,
    fetcher: Arc<dyn ImageFetcher>,
    runtime: Handle,
    pending: Arc<Mutex<HashMap<ViewId, PendingLoad>>>,
    generation: AtomicU64,
}

impl SlideImageHandler {
    /// 使用注入的获取器创建处理器，需在 tokio 运行时内调用。
    pub fn new(fetcher: Arc<dyn ImageFetcher>, config: SourceConfig) -> Result<Self, ImageError> {
        let runtime = Handle::try_current()
            .map_err(|e| ImageError::Runtime(format!("未找到 tokio 运行时：{}", e)))?;
        Self::with_runtime(fetcher, config, runtime)
    }

    /// 使用指定运行时创建处理器。
    pub fn with_runtime(
        fetcher: Arc<dyn ImageFetcher>,
        config: SourceConfig,
        runtime: Handle,
    ) -> Result<Self, ImageError> {
        config.validate()?;
        fetcher.reconfigure(&config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            fetcher,
            runtime,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        })
    }

    /// 使用默认 HTTP 获取器创建处理器。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_slideshow_source::image_source::{SlideImageHandler, SourceConfig};
    ///
    /// # async fn demo() -> Result<(), image_slideshow_source::image_source::ImageError> {
    /// let handler = SlideImageHandler::with_http(SourceConfig::default())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_http(config: SourceConfig) -> Result<Self, ImageError> {
        let fetcher = Arc::new(HttpImageFetcher::new(config.clone())?);
        Self::new(fetcher, config)
    }

    /// 获取配置快照。
    pub fn config_snapshot(&self) -> Result<SourceConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 更新配置，只影响之后发起的加载。
    ///
    /// 新配置同时下发给获取器，下载限制、超时与缓存容量随之生效。
    pub fn set_config(&self, config: SourceConfig) -> Result<(), ImageError> {
        config.validate()?;
        self.fetcher.reconfigure(&config)?;
        let mut guard = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        *guard = config;
        Ok(())
    }

    /// 该视图是否有进行中的加载。
    pub fn has_pending_load(&self, view: ViewId) -> bool {
        self.lock_pending()
            .map(|pending| pending.contains_key(&view))
            .unwrap_or(false)
    }

    /// 将来源绑定到视图。
    ///
    /// 远程来源异步获取并淡入，失败（包括远程地址无法解析）只记录日志；
    /// 本地来源在阻塞线程池读取，文件缺失或损坏时回填空图。
    /// 返回的错误只表示派发失败（例如配置锁中毒）。
    pub fn bind_to_image_view(
        &self,
        source: &ImageSource,
        view: Arc<dyn ImageView>,
    ) -> Result<(), ImageError> {
        let config = self.config_snapshot()?;
        let mode = config.classification;

        if !source.is_remote_with(mode) {
            let path = PathBuf::from(source.resolved_string_with(mode));
            return self.spawn_local(
                path,
                source.display_frame(),
                view,
                config,
                FailurePolicy::KeepPlaceholder,
                None,
            );
        }

        if source.display_frame().is_some()
            && source.resolved_string_with(mode) == default_placeholder(&config)
        {
            log::debug!("🖼️ 命中默认占位图，直接回填空图 - view={}", view.id().get());
            self.cancel_view(view.id());
            view.set_image(None, Transition::None);
            return Ok(());
        }

        let mut options = FetchOptions::new(view.id());
        options.placeholder = source.placeholder().cloned();
        options.transition = Transition::CrossDissolve(config.transition_duration());
        options.run_transition_if_cached = false;

        view.set_image(options.placeholder.clone(), Transition::None);
        self.spawn_remote(source, options, view, config, FailurePolicy::KeepPlaceholder, None)
    }

    /// 取消视图上进行中的加载；没有时什么也不做。
    ///
    /// 返回是否确实取消了一个加载。
    pub fn cancel_pending_load(&self, view: &dyn ImageView) -> bool {
        self.cancel_view(view.id())
    }

    /// 加载并回调。
    ///
    /// 先把视图底色设为占位色；成功时回填图片并调用 `callback`，
    /// 失败时回填与视图同尺寸的纯色图片，不调用 `callback`。
    pub fn load<F>(
        &self,
        source: &ImageSource,
        view: Arc<dyn ImageView>,
        callback: F,
    ) -> Result<(), ImageError>
    where
        F: FnOnce(SlideImage) + Send + 'static,
    {
        let on_done: LoadCallback = Box::new(move |result| {
            if let Ok(image) = result {
                callback(image);
            }
        });
        self.dispatch_load(source, view, on_done)
    }

    /// 与 `load` 相同的视图行为，但成功与失败都通过 `callback` 交付。
    ///
    /// 被取消的加载不会回调。
    pub fn load_with_result<F>(
        &self,
        source: &ImageSource,
        view: Arc<dyn ImageView>,
        callback: F,
    ) -> Result<(), ImageError>
    where
        F: FnOnce(Result<SlideImage, ImageError>) + Send + 'static,
    {
        self.dispatch_load(source, view, Box::new(callback))
    }

    fn dispatch_load(
        &self,
        source: &ImageSource,
        view: Arc<dyn ImageView>,
        on_done: LoadCallback,
    ) -> Result<(), ImageError> {
        let config = self.config_snapshot()?;
        view.set_background(Rgba(config.placeholder_color));

        if source.is_remote_with(config.classification) {
            let options = FetchOptions::new(view.id());
            self.spawn_remote(
                source,
                options,
                view,
                config,
                FailurePolicy::SolidColor,
                Some(on_done),
            )
        } else {
            let path = PathBuf::from(source.resolved_string_with(config.classification));
            self.spawn_local(
                path,
                source.display_frame(),
                view,
                config,
                FailurePolicy::SolidColor,
                Some(on_done),
            )
        }
    }

    fn spawn_remote(
        &self,
        source: &ImageSource,
        options: FetchOptions,
        view: Arc<dyn ImageView>,
        config: SourceConfig,
        policy: FailurePolicy,
        on_done: Option<LoadCallback>,
    ) -> Result<(), ImageError> {
        // 地址解析失败按加载失败处理，与下载失败走同一回填路径
        let url = source.locator().request_url();
        let remote = url.is_ok();
        let frame = source.display_frame();
        let fetcher = Arc::clone(&self.fetcher);
        let pending = Arc::clone(&self.pending);
        let view_id = view.id();

        let mut guard = self.begin(view_id)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let task = self.runtime.spawn(async move {
            let start = Instant::now();
            let result = match url {
                Ok(url) => fetcher.fetch(&url, &options).await,
                Err(err) => Err(err),
            };

            if !finish(&pending, view_id, generation) {
                return;
            }

            match result {
                Ok(fetched) => {
                    let image = fit_for_frame(fetched.image, frame, &config);
                    let transition = options.effective_transition(fetched.from_cache);
                    view.set_image(Some(Arc::clone(&image)), transition);
                    log::info!(
                        "✅ 远程图片已回填 - view={} cached={} total={}ms",
                        view_id.get(),
                        fetched.from_cache,
                        start.elapsed().as_millis()
                    );
                    if let Some(on_done) = on_done {
                        on_done(Ok(image));
                    }
                }
                Err(err) => {
                    if err.is_cancelled() {
                        log::debug!("🛑 远程加载已取消 - view={}", view_id.get());
                        return;
                    }
                    log::error!(
                        "❌ 远程图片加载失败 - view={} code={} stage={}: {}",
                        view_id.get(),
                        err.code(),
                        err.stage(),
                        err
                    );
                    apply_failure(view.as_ref(), policy, &config);
                    if let Some(on_done) = on_done {
                        on_done(Err(err));
                    }
                }
            }
        });

        guard.insert(
            view_id,
            PendingLoad {
                generation,
                task: task.abort_handle(),
                remote,
            },
        );
        Ok(())
    }

    fn spawn_local(
        &self,
        path: PathBuf,
        frame: Option<Frame>,
        view: Arc<dyn ImageView>,
        config: SourceConfig,
        policy: FailurePolicy,
        on_done: Option<LoadCallback>,
    ) -> Result<(), ImageError> {
        let pending = Arc::clone(&self.pending);
        let view_id = view.id();

        let mut guard = self.begin(view_id)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let task = self.runtime.spawn(async move {
            let read_config = config.clone();
            let read_path = path.clone();
            let result = tokio::task::spawn_blocking(move || {
                local::decode_file(&read_path, &read_config)
                    .map(|image| fit_for_frame(Arc::new(image), frame, &read_config))
            })
            .await
            .map_err(|e| ImageError::Runtime(format!("本地读取任务异常结束：{}", e)))
            .and_then(|inner| inner);

            if !finish(&pending, view_id, generation) {
                return;
            }

            match result {
                Ok(image) => {
                    view.set_image(Some(Arc::clone(&image)), Transition::None);
                    if let Some(on_done) = on_done {
                        on_done(Ok(image));
                    }
                }
                Err(err) => {
                    log::warn!(
                        "⚠️ 本地图片不可用 - 路径: {} code={}: {}",
                        path.display(),
                        err.code(),
                        err
                    );
                    match policy {
                        FailurePolicy::KeepPlaceholder => view.set_image(None, Transition::None),
                        FailurePolicy::SolidColor => apply_failure(view.as_ref(), policy, &config),
                    }
                    if let Some(on_done) = on_done {
                        on_done(Err(err));
                    }
                }
            }
        });

        guard.insert(
            view_id,
            PendingLoad {
                generation,
                task: task.abort_handle(),
                remote: false,
            },
        );
        Ok(())
    }

    /// 开始一个新加载：中止该视图上的旧加载，并返回仍持有的登记表锁。
    ///
    /// 锁在任务登记完成前不释放，保证任务完成时一定能找到自己的登记。
    fn begin(&self, view: ViewId) -> Result<MutexGuard<'_, HashMap<ViewId, PendingLoad>>, ImageError> {
        let mut guard = self.lock_pending()?;
        if let Some(previous) = guard.remove(&view) {
            log::debug!("♻️ 视图 {} 发起新加载，取消上一次加载", view.get());
            self.abort(view, previous);
        }
        Ok(guard)
    }

    fn cancel_view(&self, view: ViewId) -> bool {
        let previous = match self.lock_pending() {
            Ok(mut guard) => guard.remove(&view),
            Err(err) => {
                log::error!("❌ 取消加载失败：{}", err);
                None
            }
        };

        match previous {
            Some(previous) => {
                log::debug!("🛑 取消视图 {} 的加载", view.get());
                self.abort(view, previous);
                true
            }
            None => false,
        }
    }

    fn abort(&self, view: ViewId, previous: PendingLoad) {
        previous.task.abort();
        if previous.remote {
            self.fetcher.cancel(view);
        }
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, HashMap<ViewId, PendingLoad>>, ImageError> {
        self.pending
            .lock()
            .map_err(|_| ImageError::ResourceLimit("加载登记表锁已中毒".to_string()))
    }
}

impl Drop for SlideImageHandler {
    fn drop(&mut self) {
        let drained: Vec<_> = match self.pending.lock() {
            Ok(mut guard) => guard.drain().collect(),
            Err(_) => return,
        };

        for (view, pending) in drained {
            self.abort(view, pending);
        }
    }
}

/// 任务完成时登出；代次已过期（被新请求替换或被取消）时返回 `false`。
fn finish(pending: &Mutex<HashMap<ViewId, PendingLoad>>, view: ViewId, generation: u64) -> bool {
    let Ok(mut guard) = pending.lock() else {
        return false;
    };

    match guard.get(&view) {
        Some(current) if current.generation == generation => {
            guard.remove(&view);
            true
        }
        _ => false,
    }
}

fn default_placeholder(config: &SourceConfig) -> &str {
    config
        .default_placeholder
        .as_deref()
        .unwrap_or_else(|| sentinel::default_placeholder())
}

fn apply_failure(view: &dyn ImageView, policy: FailurePolicy, config: &SourceConfig) {
    if policy != FailurePolicy::SolidColor {
        return;
    }

    let bounds = view.bounds();
    let pixels = u64::from(bounds.width) * u64::from(bounds.height);
    if pixels > config.max_decoded_pixels || pixels.saturating_mul(4) > config.max_decoded_bytes {
        // 只保留背景色
        log::warn!(
            "⚠️ 视图尺寸过大，跳过纯色占位图 - view={} {}x{}",
            view.id().get(),
            bounds.width,
            bounds.height
        );
        return;
    }

    let image = make_solid_color_image(Rgba(config.placeholder_color), bounds);
    view.set_image(Some(Arc::new(image)), Transition::None);
}

fn fit_for_frame(image: SlideImage, frame: Option<Frame>, config: &SourceConfig) -> SlideImage {
    let Some(frame) = frame.filter(|_| config.fit_to_display_frame) else {
        return image;
    };

    let (width, height) = image.dimensions();
    if frame.size.is_empty() || (width <= frame.size.width && height <= frame.size.height) {
        return image;
    }

    let owned = Arc::unwrap_or_clone(image);
    Arc::new(pipeline::fit_within(owned, frame.size, config.fit_quality.filter()))
}
