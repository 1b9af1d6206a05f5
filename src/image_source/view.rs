//! # 视图能力模块
//!
//! ## 设计思路
//!
//! 图片来源不直接依赖任何 GUI 框架，只依赖 `ImageView` 这一最小能力集合：
//! 可赋值的图片、可设置的底色、只读的当前尺寸，以及用于取消/去重的稳定标识。
//!
//! 回调会从异步任务中调用，视图实现需自行把更新投递到 UI 线程。
//! `MemoryImageView` 是无界面实现，用于命令行与测试。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::{DynamicImage, Rgba};

/// 解码后的图片，在视图、缓存与回调之间共享。
pub type SlideImage = Arc<DynamicImage>;

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// 视图标识，用作取消与去重的键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(u64);

impl ViewId {
    /// 分配一个进程内唯一的标识。
    pub fn next() -> Self {
        Self(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// 像素尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 展示区域。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    pub x: i32,
    pub y: i32,
    pub size: Size,
}

impl Frame {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            size: Size::new(width, height),
        }
    }
}

/// 赋值图片时使用的过渡效果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    None,
    CrossDissolve(Duration),
}

/// UI 图片视图能力。
pub trait ImageView: Send + Sync {
    fn id(&self) -> ViewId;

    /// 赋值图片；`None` 表示空图。
    fn set_image(&self, image: Option<SlideImage>, transition: Transition);

    fn set_background(&self, color: Rgba<u8>);

    /// 当前尺寸。
    fn bounds(&self) -> Size;
}

#[derive(Debug, Default)]
struct MemoryViewState {
    image: Option<SlideImage>,
    background: Option<Rgba<u8>>,
    last_transition: Transition,
    assignments: usize,
}

/// 内存视图：记录最近一次赋值，便于无界面场景读取结果。
#[derive(Debug)]
pub struct MemoryImageView {
    id: ViewId,
    bounds: Size,
    state: Mutex<MemoryViewState>,
}

impl MemoryImageView {
    pub fn new(bounds: Size) -> Self {
        Self {
            id: ViewId::next(),
            bounds,
            state: Mutex::new(MemoryViewState::default()),
        }
    }

    pub fn image(&self) -> Option<SlideImage> {
        self.lock().image.clone()
    }

    pub fn background(&self) -> Option<Rgba<u8>> {
        self.lock().background
    }

    pub fn last_transition(&self) -> Transition {
        self.lock().last_transition
    }

    /// `set_image` 被调用的次数。
    pub fn assignments(&self) -> usize {
        self.lock().assignments
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ImageView for MemoryImageView {
    fn id(&self) -> ViewId {
        self.id
    }

    fn set_image(&self, image: Option<SlideImage>, transition: Transition) {
        let mut state = self.lock();
        state.image = image;
        state.last_transition = transition;
        state.assignments += 1;
    }

    fn set_background(&self, color: Rgba<u8>) {
        self.lock().background = Some(color);
    }

    fn bounds(&self) -> Size {
        self.bounds
    }
}
