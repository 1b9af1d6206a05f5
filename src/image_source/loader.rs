//! # 远程加载与校验模块
//!
//! ## 设计思路
//!
//! `HttpImageFetcher` 是 `ImageFetcher` 的默认实现：下载、校验、解码并缓存远程图片，
//! 并在“尽可能早”的阶段执行输入校验，尽快失败，减少不必要的内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 协议 + 状态码 + 内容类型 + 体积校验 + 流式下载（首包/分块超时）。
//! - 可重试状态码与网络错误按指数退避加抖动重试。
//! - 文件签名（magic bytes）探测，尽早拒绝非图片内容。
//! - 已解码图片放入 LRU 缓存，命中时 `from_cache = true`。
//! - 每个视图一个取消标志；同一视图的新请求会取消旧请求。

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use lru::LruCache;
use reqwest::Url;
use tokio::sync::Notify;

use super::fetcher::{FetchOptions, FetchedImage, ImageFetcher};
use super::pipeline;
use super::source::RawImageData;
use super::view::{SlideImage, ViewId};
use super::{ImageError, SourceConfig};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const NETWORK_RETRY_BASE_DELAY_MS: u64 = 180;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 单次请求的取消信号。
#[derive(Debug, Default)]
struct CancelFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let notified = self.notify.notified();
        let mut notified = std::pin::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// 基于 reqwest 的远程图片获取器。
pub struct HttpImageFetcher {
    config: RwLock<SourceConfig>,
    client: RwLock<reqwest::Client>,
    cache: Mutex<Option<LruCache<String, SlideImage>>>,
    cancel_flags: Mutex<HashMap<ViewId, Arc<CancelFlag>>>,
}

impl HttpImageFetcher {
    /// 根据配置创建获取器。
    ///
    /// 这里同时构建复用型 HTTP 客户端，减少每次请求的初始化开销。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_slideshow_source::image_source::{HttpImageFetcher, SourceConfig};
    ///
    /// let fetcher = HttpImageFetcher::new(SourceConfig::default())?;
    /// # Ok::<(), image_slideshow_source::image_source::ImageError>(())
    /// ```
    pub fn new(config: SourceConfig) -> Result<Self, ImageError> {
        config.validate()?;
        let client = Self::build_http_client(&config)?;
        let cache = Self::build_cache(config.cache_capacity);

        Ok(Self {
            config: RwLock::new(config),
            client: RwLock::new(client),
            cache: Mutex::new(cache),
            cancel_flags: Mutex::new(HashMap::new()),
        })
    }

    /// 替换配置；客户端与缓存按新配置重建。
    pub fn set_config(&self, config: SourceConfig) -> Result<(), ImageError> {
        config.validate()?;
        let client = Self::build_http_client(&config)?;

        {
            let mut guard = self
                .client
                .write()
                .map_err(|_| ImageError::ResourceLimit("客户端写入锁已中毒".to_string()))?;
            *guard = client;
        }
        {
            let mut guard = self
                .cache
                .lock()
                .map_err(|_| ImageError::ResourceLimit("缓存锁已中毒".to_string()))?;
            *guard = Self::build_cache(config.cache_capacity);
        }

        let mut guard = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        *guard = config;

        Ok(())
    }

    /// 获取配置快照，保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<SourceConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 当前缓存条目数。
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(LruCache::len))
            .unwrap_or(0)
    }

    fn build_cache(capacity: usize) -> Option<LruCache<String, SlideImage>> {
        NonZeroUsize::new(capacity).map(LruCache::new)
    }

    fn build_http_client(config: &SourceConfig) -> Result<reqwest::Client, ImageError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    fn client(&self) -> Result<reqwest::Client, ImageError> {
        self.client
            .read()
            .map(|client| client.clone())
            .map_err(|_| ImageError::ResourceLimit("客户端读取锁已中毒".to_string()))
    }

    fn register_cancel_flag(&self, view: ViewId) -> Result<Arc<CancelFlag>, ImageError> {
        let flag = Arc::new(CancelFlag::default());
        let mut guard = self
            .cancel_flags
            .lock()
            .map_err(|_| ImageError::ResourceLimit("下载取消标志锁已中毒".to_string()))?;

        if let Some(previous) = guard.insert(view, Arc::clone(&flag)) {
            log::debug!("♻️ 视图 {} 发起新请求，取消上一次获取", view.get());
            previous.cancel();
        }

        Ok(flag)
    }

    fn release_cancel_flag(&self, view: ViewId, flag: &Arc<CancelFlag>) {
        if let Ok(mut guard) = self.cancel_flags.lock() {
            if guard.get(&view).is_some_and(|current| Arc::ptr_eq(current, flag)) {
                guard.remove(&view);
            }
        }
    }

    fn get_cached(&self, key: &str) -> Option<SlideImage> {
        let mut guard = self.cache.lock().ok()?;
        guard.as_mut()?.get(key).cloned()
    }

    fn store_cached(&self, key: &str, image: &SlideImage) {
        if let Ok(mut guard) = self.cache.lock() {
            if let Some(cache) = guard.as_mut() {
                cache.put(key.to_string(), Arc::clone(image));
            }
        }
    }

    async fn fetch_uncached(
        &self,
        url: &Url,
        config: &SourceConfig,
        cancel: &CancelFlag,
    ) -> Result<SlideImage, ImageError> {
        let load_start = Instant::now();
        let raw = self.load_from_url(url, config, cancel).await?;
        let load_elapsed = load_start.elapsed();

        let decode_start = Instant::now();
        let decode_config = config.clone();
        let image = tokio::task::spawn_blocking(move || pipeline::decode(raw, &decode_config))
            .await
            .map_err(|e| ImageError::Runtime(format!("解码任务异常结束：{}", e)))??;
        let decode_elapsed = decode_start.elapsed();

        log::info!(
            "✅ 远程图片就绪 - load={}ms decode={}ms",
            load_elapsed.as_millis(),
            decode_elapsed.as_millis()
        );

        Ok(Arc::new(image))
    }

    /// 从 URL 加载图片原始字节。
    async fn load_from_url(
        &self,
        url: &Url,
        config: &SourceConfig,
        cancel: &CancelFlag,
    ) -> Result<RawImageData, ImageError> {
        log::info!("🌐 开始下载图片 - URL: {}", redact_url_for_log(url.as_str()));

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ImageError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        let bytes = tokio::select! {
            result = self.download_with_validation(url, config, cancel) => result?,
            _ = cancel.wait() => {
                return Err(ImageError::Cancelled("图片下载已取消".to_string()));
            }
        };
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "url",
        })
    }

    /// 执行带校验的网络下载。
    ///
    /// 使用流式读取，避免一次性读入导致内存峰值过高。
    async fn download_with_validation(
        &self,
        url: &Url,
        config: &SourceConfig,
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>, ImageError> {
        let client = self.client()?;
        let response = self.send_with_retry(&client, url, config, cancel).await?;

        if !response.status().is_success() {
            return Err(ImageError::Network(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                status_message(response.status().as_u16())
            )));
        }

        if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            if let Ok(ct_str) = ct.to_str() {
                if !is_image_content_type(ct_str) {
                    return Err(ImageError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                }
            }
        }

        let total_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());

        if let Some(size) = total_len {
            if size > config.max_file_size {
                return Err(ImageError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    config.max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let mut total: u64 = 0;
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut response = response;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        ImageError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        ImageError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) =
                next_chunk_result.map_err(|e| ImageError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;

            if cancel.is_cancelled() {
                return Err(ImageError::Cancelled("图片下载已取消".to_string()));
            }

            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(ImageError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }

    async fn send_with_retry(
        &self,
        client: &reqwest::Client,
        url: &Url,
        config: &SourceConfig,
        cancel: &CancelFlag,
    ) -> Result<reqwest::Response, ImageError> {
        let max_attempts = config.max_retries.max(1);
        let mut attempt: u8 = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(ImageError::Cancelled("图片下载已取消".to_string()));
            }

            match send_request(client, url.clone()).await {
                Ok(resp) => {
                    if attempt < max_attempts && is_retryable_http_status(resp.status()) {
                        let delay_ms = compute_retry_delay_with_jitter(
                            attempt,
                            retry_after_hint_ms(resp.headers()),
                        );

                        log::warn!(
                            "⚠️ HTTP {}（第 {}/{} 次，可重试）；{}ms 后重试",
                            resp.status().as_u16(),
                            attempt,
                            max_attempts,
                            delay_ms
                        );

                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Ok(resp);
                }
                Err(err) => {
                    if attempt >= max_attempts || !is_retryable_network_error(&err) {
                        return Err(map_reqwest_error(err, url.as_str(), config));
                    }

                    let delay_ms = compute_retry_delay_with_jitter(attempt, None);
                    log::warn!(
                        "⚠️ 网络请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        max_attempts,
                        sanitize_error_message_with_redacted_url(&err.to_string(), url.as_str()),
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<FetchedImage, ImageError> {
        let config = self.config_snapshot()?;
        let key = url.as_str();

        if let Some(image) = self.get_cached(key) {
            log::debug!("♻️ 命中图片缓存 - URL: {}", redact_url_for_log(key));
            return Ok(FetchedImage {
                image,
                from_cache: true,
            });
        }

        let cancel = self.register_cancel_flag(options.view)?;
        let result = self.fetch_uncached(url, &config, &cancel).await;
        self.release_cancel_flag(options.view, &cancel);

        let image = result?;
        self.store_cached(key, &image);

        Ok(FetchedImage {
            image,
            from_cache: false,
        })
    }

    fn cancel(&self, view: ViewId) {
        let flag = match self.cancel_flags.lock() {
            Ok(mut guard) => guard.remove(&view),
            Err(_) => None,
        };

        if let Some(flag) = flag {
            log::debug!("🛑 取消视图 {} 的图片获取", view.get());
            flag.cancel();
        }
    }

    fn reconfigure(&self, config: &SourceConfig) -> Result<(), ImageError> {
        self.set_config(config.clone())
    }
}

async fn send_request(client: &reqwest::Client, url: Url) -> Result<reqwest::Response, reqwest::Error> {
    client
        .get(url)
        .header(
            reqwest::header::ACCEPT,
            "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
        )
        .send()
        .await
}

fn retry_after_hint_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?;
    let secs = value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(secs.saturating_mul(1000))
}

fn compute_retry_delay_with_jitter(attempt: u8, server_hint_ms: Option<u64>) -> u64 {
    let exp = NETWORK_RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << (attempt.saturating_sub(1) as u32));
    let base = server_hint_ms.unwrap_or(exp);
    let jitter_bound = (base / 2).max(1);
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    base.saturating_add(seed % (jitter_bound + 1))
}

fn is_retryable_http_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn is_retryable_network_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    let msg = error.to_string().to_lowercase();
    msg.contains("connection reset")
        || msg.contains("connection closed before message completed")
        || msg.contains("peer closed connection")
        || msg.contains("tls handshake")
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// 去掉 query 与 fragment，避免日志泄露令牌。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}

fn sanitize_error_message_with_redacted_url(error_msg: &str, url: &str) -> String {
    error_msg.replace(url, &redact_url_for_log(url))
}

/// 统一映射 reqwest 错误到业务错误。
fn map_reqwest_error(e: reqwest::Error, url: &str, config: &SourceConfig) -> ImageError {
    let err_msg = sanitize_error_message_with_redacted_url(&e.to_string(), url);

    if e.is_timeout() {
        ImageError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
    } else if e.is_connect() {
        ImageError::Network(format!("无法连接：{}", err_msg))
    } else if e.is_redirect() {
        ImageError::Network(format!("重定向次数超过限制（{}）", config.max_redirects))
    } else {
        ImageError::Network(format!("请求失败：{}", err_msg))
    }
}

fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

/// 通过文件签名（magic bytes）校验输入是否为图片。
pub(crate) fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ImageError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 流式下载阶段的签名探测：尽早识别并拒绝非图片内容。
///
/// 返回值：
/// - `Ok(true)`：已识别为图片
/// - `Ok(false)`：当前字节不足以判断，继续下载
/// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, ImageError> {
    if bytes.is_empty() {
        return Ok(false);
    }

    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::InvalidFormat(format!(
                "下载内容不是图片类型：{}",
                kind.mime_type()
            )));
        }
        return Ok(true);
    }

    if bytes.len() >= probe_limit {
        return Err(ImageError::InvalidFormat(format!(
            "下载前 {} 字节内无法识别图片类型",
            probe_limit
        )));
    }

    Ok(false)
}
