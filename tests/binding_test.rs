// Binding / load / cancel behaviour of SlideImageHandler against mock fetchers.
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba};
use image_slideshow_source::image_source::{
    FetchOptions, FetchedImage, Frame, ImageError, ImageFetcher, ImageSource, ImageView,
    MemoryImageView, Size, SlideImage, SlideImageHandler, SourceConfig, Transition, ViewId,
    PLACEHOLDER_GRAY,
};
use reqwest::Url;
use tokio::sync::{oneshot, Notify};

const SENTINEL: &str = "https://assets.example.com/placeholderImage.png";

#[derive(Clone, Copy)]
enum Behavior {
    Succeed { from_cache: bool },
    Fail,
    Hang,
}

struct MockFetcher {
    behavior: Behavior,
    image: SlideImage,
    fetches: AtomicUsize,
    cancels: AtomicUsize,
    never: Notify,
}

impl MockFetcher {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            image: Arc::new(DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
                8,
                6,
                Rgba([10, 20, 30, 255]),
            ))),
            fetches: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            never: Notify::new(),
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for MockFetcher {
    async fn fetch(&self, _url: &Url, _options: &FetchOptions) -> Result<FetchedImage, ImageError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed { from_cache } => Ok(FetchedImage {
                image: Arc::clone(&self.image),
                from_cache,
            }),
            Behavior::Fail => Err(ImageError::Network("forced failure".to_string())),
            Behavior::Hang => {
                self.never.notified().await;
                Err(ImageError::Cancelled("unreachable".to_string()))
            }
        }
    }

    fn cancel(&self, _view: ViewId) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

fn handler_with(fetcher: Arc<MockFetcher>) -> SlideImageHandler {
    let mut config = SourceConfig::default();
    config.default_placeholder = Some(SENTINEL.to_string());
    SlideImageHandler::new(fetcher, config).expect("handler init failed")
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn write_png(name: &str, width: u32, height: u32) -> std::path::PathBuf {
    let img = ImageBuffer::from_pixel(width, height, Rgba([200, 100, 50, 255]));
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode png failed");

    let path = std::env::temp_dir().join(format!("slideshow-bind-{}-{}", std::process::id(), name));
    std::fs::write(&path, cursor.into_inner()).expect("write png failed");
    path
}

#[tokio::test]
async fn sentinel_with_display_frame_assigns_empty_image_without_fetch() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: false });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(100, 100)));

    let mut source = ImageSource::from_string(SENTINEL, None).unwrap();
    source.set_display_frame(Frame::new(0, 0, 100, 100));

    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");

    assert_eq!(view.assignments(), 1);
    assert!(view.image().is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fetcher.fetches(), 0);
    assert!(!handler.has_pending_load(view.id()));
}

#[tokio::test]
async fn sentinel_without_display_frame_is_fetched() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: false });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(100, 100)));

    let source = ImageSource::from_string(SENTINEL, None).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");

    wait_until(|| view.image().is_some()).await;
    assert_eq!(fetcher.fetches(), 1);
}

#[tokio::test]
async fn remote_bind_cross_dissolves_fresh_results() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: false });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(100, 100)));
    let placeholder: SlideImage = Arc::new(DynamicImage::new_rgba8(2, 2));

    let source =
        ImageSource::from_string("https://example.com/slide.jpg", Some(placeholder.clone())).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");

    // 先同步回填占位图
    assert!(Arc::ptr_eq(&view.image().unwrap(), &placeholder));

    wait_until(|| view.assignments() == 2).await;
    assert_eq!(view.image().unwrap().dimensions(), (8, 6));
    assert_eq!(
        view.last_transition(),
        Transition::CrossDissolve(Duration::from_millis(500))
    );
}

#[tokio::test]
async fn remote_bind_skips_transition_for_cached_results() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: true });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(100, 100)));

    let source = ImageSource::from_string("https://example.com/slide.jpg", None).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");

    wait_until(|| view.assignments() == 2).await;
    assert_eq!(view.last_transition(), Transition::None);
}

#[tokio::test]
async fn remote_bind_failure_keeps_placeholder() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(100, 100)));
    let placeholder: SlideImage = Arc::new(DynamicImage::new_rgba8(3, 3));

    let source =
        ImageSource::from_string("https://example.com/broken.jpg", Some(placeholder.clone())).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");

    wait_until(|| !handler.has_pending_load(view.id())).await;
    assert_eq!(fetcher.fetches(), 1);
    assert_eq!(view.assignments(), 1);
    assert!(Arc::ptr_eq(&view.image().unwrap(), &placeholder));
}

#[tokio::test]
async fn failing_load_assigns_solid_placeholder_and_skips_callback() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(40, 30)));
    let called = Arc::new(AtomicUsize::new(0));

    let source = ImageSource::from_string("https://example.com/broken.jpg", None).unwrap();
    let counter = Arc::clone(&called);
    handler
        .load(&source, view.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("dispatch failed");

    assert_eq!(view.background(), Some(Rgba(PLACEHOLDER_GRAY)));

    wait_until(|| view.image().is_some()).await;
    let image = view.image().unwrap();
    assert_eq!(image.dimensions(), (40, 30));
    assert!(image.pixels().all(|(_, _, p)| p == Rgba(PLACEHOLDER_GRAY)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_load_assigns_image_and_invokes_callback() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: false });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(40, 30)));

    let source = ImageSource::from_string("https://example.com/ok.jpg", None).unwrap();
    let (tx, rx) = oneshot::channel();
    handler
        .load(&source, view.clone(), move |image| {
            let _ = tx.send(image);
        })
        .expect("dispatch failed");

    let delivered = rx.await.expect("callback not invoked");
    assert!(Arc::ptr_eq(&delivered, &view.image().unwrap()));
    assert_eq!(view.last_transition(), Transition::None);
}

#[tokio::test]
async fn load_with_result_reports_failure_after_placeholder() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(5, 5)));

    let source = ImageSource::from_string("https://example.com/broken.jpg", None).unwrap();
    let (tx, rx) = oneshot::channel();
    handler
        .load_with_result(&source, view.clone(), move |result| {
            let _ = tx.send(result.map(|_| ()));
        })
        .expect("dispatch failed");

    let result = rx.await.expect("callback not invoked");
    assert!(matches!(result, Err(ImageError::Network(_))));
    assert_eq!(view.image().unwrap().dimensions(), (5, 5));
}

#[tokio::test]
async fn cancel_pending_load_cancels_fetch_exactly_once() {
    let fetcher = MockFetcher::new(Behavior::Hang);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(10, 10)));

    let source = ImageSource::from_string("https://example.com/slow.jpg", None).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");
    wait_until(|| fetcher.fetches() == 1).await;

    assert!(handler.has_pending_load(view.id()));
    assert!(handler.cancel_pending_load(view.as_ref()));
    assert_eq!(fetcher.cancels(), 1);

    assert!(!handler.cancel_pending_load(view.as_ref()));
    assert_eq!(fetcher.cancels(), 1);
    assert!(!handler.has_pending_load(view.id()));
}

#[tokio::test]
async fn cancel_without_pending_load_is_noop() {
    let fetcher = MockFetcher::new(Behavior::Hang);
    let handler = handler_with(fetcher.clone());
    let view = MemoryImageView::new(Size::new(10, 10));

    assert!(!handler.cancel_pending_load(&view));
    assert_eq!(fetcher.cancels(), 0);
}

#[tokio::test]
async fn new_bind_on_same_view_cancels_previous_fetch() {
    let fetcher = MockFetcher::new(Behavior::Hang);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(10, 10)));

    let first = ImageSource::from_string("https://example.com/1.jpg", None).unwrap();
    let second = ImageSource::from_string("https://example.com/2.jpg", None).unwrap();

    handler.bind_to_image_view(&first, view.clone()).expect("bind failed");
    handler.bind_to_image_view(&second, view.clone()).expect("bind failed");

    assert_eq!(fetcher.cancels(), 1);
    assert!(handler.has_pending_load(view.id()));
}

#[tokio::test]
async fn local_bind_assigns_decoded_file() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(10, 10)));
    let path = write_png("local.png", 9, 4);

    let source = ImageSource::from_string(path.to_str().unwrap(), None).unwrap();
    assert!(!source.is_remote());
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");

    wait_until(|| view.image().is_some()).await;
    assert_eq!(view.image().unwrap().dimensions(), (9, 4));
    assert_eq!(view.last_transition(), Transition::None);
    assert_eq!(fetcher.fetches(), 0);

    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn local_bind_of_missing_file_assigns_empty_image() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(10, 10)));
    view.set_image(Some(Arc::new(DynamicImage::new_rgba8(1, 1))), Transition::None);

    let source = ImageSource::from_string("/definitely/not/here.png", None).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");

    wait_until(|| view.assignments() == 2).await;
    assert!(view.image().is_none());
    assert_eq!(fetcher.cancels(), 0);
}

#[tokio::test]
async fn local_load_delivers_through_callback() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(10, 10)));
    let path = write_png("load.png", 3, 7);

    let source = ImageSource::from_string(path.to_str().unwrap(), None).unwrap();
    let (tx, rx) = oneshot::channel();
    handler
        .load(&source, view.clone(), move |image| {
            let _ = tx.send(image.dimensions());
        })
        .expect("dispatch failed");

    assert_eq!(rx.await.expect("callback not invoked"), (3, 7));
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn unparsable_remote_url_in_load_assigns_solid_placeholder() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: false });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(12, 8)));
    let called = Arc::new(AtomicUsize::new(0));

    // 子串判定为远程，但其中的 URL 没有主机
    let source = ImageSource::from_string("/data/http://", None).unwrap();
    assert!(source.is_remote());

    let counter = Arc::clone(&called);
    handler
        .load(&source, view.clone(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("dispatch failed");

    wait_until(|| view.image().is_some()).await;
    let image = view.image().unwrap();
    assert_eq!(image.dimensions(), (12, 8));
    assert!(image.pixels().all(|(_, _, p)| p == Rgba(PLACEHOLDER_GRAY)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert_eq!(fetcher.fetches(), 0);
}

#[tokio::test]
async fn unparsable_remote_url_is_reported_to_result_callback() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: false });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(4, 4)));

    let source = ImageSource::from_string("/data/http://", None).unwrap();
    let (tx, rx) = oneshot::channel();
    handler
        .load_with_result(&source, view.clone(), move |result| {
            let _ = tx.send(result.map(|_| ()));
        })
        .expect("dispatch failed");

    let result = rx.await.expect("callback not invoked");
    assert!(matches!(result, Err(ImageError::InvalidLocator(_))));
    assert_eq!(view.image().unwrap().dimensions(), (4, 4));
}

#[tokio::test]
async fn unparsable_remote_url_in_bind_is_logged_and_swallowed() {
    let fetcher = MockFetcher::new(Behavior::Succeed { from_cache: false });
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(10, 10)));
    let placeholder: SlideImage = Arc::new(DynamicImage::new_rgba8(2, 2));

    let source = ImageSource::from_string("/data/http://", Some(placeholder.clone())).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind should not fail");

    wait_until(|| !handler.has_pending_load(view.id())).await;
    assert_eq!(fetcher.fetches(), 0);
    assert_eq!(fetcher.cancels(), 0);
    assert_eq!(view.assignments(), 1);
    assert!(Arc::ptr_eq(&view.image().unwrap(), &placeholder));
}

#[tokio::test]
async fn local_load_of_missing_file_assigns_solid_placeholder() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(6, 3)));

    let source = ImageSource::from_string("/definitely/not/here.png", None).unwrap();
    let (tx, rx) = oneshot::channel();
    handler
        .load_with_result(&source, view.clone(), move |result| {
            let _ = tx.send(result.map(|_| ()));
        })
        .expect("dispatch failed");

    assert!(rx.await.expect("callback not invoked").is_err());
    let image = view.image().unwrap();
    assert_eq!(image.dimensions(), (6, 3));
    assert!(image.pixels().all(|(_, _, p)| p == Rgba(PLACEHOLDER_GRAY)));
    assert_eq!(fetcher.fetches(), 0);
}

#[tokio::test]
async fn oversized_view_failure_keeps_background_only() {
    let fetcher = MockFetcher::new(Behavior::Fail);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(100_000, 100_000)));

    let source = ImageSource::from_string("https://example.com/broken.jpg", None).unwrap();
    let (tx, rx) = oneshot::channel();
    handler
        .load_with_result(&source, view.clone(), move |result| {
            let _ = tx.send(result.map(|_| ()));
        })
        .expect("dispatch failed");

    assert!(rx.await.expect("callback not invoked").is_err());
    assert!(view.image().is_none());
    assert_eq!(view.background(), Some(Rgba(PLACEHOLDER_GRAY)));
}

#[tokio::test]
async fn dropping_handler_cancels_pending_fetches() {
    let fetcher = MockFetcher::new(Behavior::Hang);
    let handler = handler_with(fetcher.clone());
    let view = Arc::new(MemoryImageView::new(Size::new(10, 10)));

    let source = ImageSource::from_string("https://example.com/slow.jpg", None).unwrap();
    handler.bind_to_image_view(&source, view.clone()).expect("bind failed");
    wait_until(|| fetcher.fetches() == 1).await;

    drop(handler);
    assert_eq!(fetcher.cancels(), 1);
}
