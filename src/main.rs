//! # slideshow-load — 命令行入口
//!
//! 把一个定位符（URL 或本地路径）加载到内存视图，并把结果写成 PNG。
//!
//! ```text
//! slideshow-load <locator> [output.png] [--settings <path>]
//!                [--classification substring|scheme] [--fit quality|balanced|speed]
//! ```
//!
//! 命令行参数覆盖设置文件中的同名配置；`--fit` 会把结果缩放到视图尺寸以内。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image_slideshow_source::error::AppError;
use image_slideshow_source::image_source::{
    ClassificationMode, FitQuality, Frame, ImageSource, MemoryImageView, Size, SlideImageHandler,
};
use image_slideshow_source::settings;

const DEFAULT_VIEW_SIZE: Size = Size::new(800, 600);
const USAGE: &str = "用法: slideshow-load <locator> [output.png] [--settings <path>] \
[--classification substring|scheme] [--fit quality|balanced|speed]";

#[derive(Debug)]
struct Args {
    locator: String,
    output: PathBuf,
    settings: PathBuf,
    classification: Option<ClassificationMode>,
    fit: Option<FitQuality>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, AppError> {
    let mut positional = Vec::new();
    let mut settings = PathBuf::from(settings::SETTINGS_FILE_NAME);
    let mut classification = None;
    let mut fit = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => settings = PathBuf::from(flag_value(&mut args, "--settings")?),
            "--classification" => {
                let value = flag_value(&mut args, "--classification")?;
                classification = Some(ClassificationMode::from_str(&value)?);
            }
            "--fit" => {
                let value = flag_value(&mut args, "--fit")?;
                fit = Some(FitQuality::from_str(&value)?);
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let locator = positional
        .next()
        .ok_or_else(|| AppError::Usage(USAGE.to_string()))?;
    let output = positional
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("slide.png"));

    Ok(Args {
        locator,
        output,
        settings,
        classification,
        fit,
    })
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, AppError> {
    args.next()
        .ok_or_else(|| AppError::Usage(format!("{} 需要一个值", flag)))
}

async fn run(args: Args) -> Result<(), AppError> {
    let mut config = settings::load_settings(Path::new(&args.settings))?;
    if let Some(mode) = args.classification {
        config.classification = mode;
    }
    if let Some(quality) = args.fit {
        config.fit_to_display_frame = true;
        config.fit_quality = quality;
    }
    log::info!(
        "⚙️ 判定方式: {} 缩放适配: {} ({})",
        config.classification.as_str(),
        config.fit_to_display_frame,
        config.fit_quality.as_str()
    );

    let handler = SlideImageHandler::with_http(config)?;

    let mut source = ImageSource::from_string(&args.locator, None)
        .ok_or_else(|| AppError::Usage(format!("无法解析定位符：{}", args.locator)))?;
    if args.fit.is_some() {
        source.set_display_frame(Frame::new(
            0,
            0,
            DEFAULT_VIEW_SIZE.width,
            DEFAULT_VIEW_SIZE.height,
        ));
    }
    log::info!(
        "🔎 定位符: {} remote={} resolved={}",
        source.locator(),
        source.is_remote(),
        source.resolved_string()
    );

    let view = Arc::new(MemoryImageView::new(DEFAULT_VIEW_SIZE));
    let (tx, rx) = tokio::sync::oneshot::channel();
    handler.load_with_result(&source, view.clone(), move |result| {
        let _ = tx.send(result);
    })?;

    let outcome = rx
        .await
        .map_err(|_| AppError::Usage("加载任务未返回结果".to_string()))?;

    if let Err(err) = &outcome {
        log::warn!("⚠️ 加载失败，输出占位图：{}", err);
    }

    let image = view
        .image()
        .ok_or_else(|| AppError::Usage("视图中没有图片".to_string()))?;
    image
        .save(&args.output)
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?;

    log::info!(
        "💾 已写出 {}x{} -> {}",
        image.width(),
        image.height(),
        args.output.display()
    );

    outcome.map(|_| ()).map_err(AppError::from)
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = match parse_args(std::env::args().skip(1)) {
        Ok(args) => run(args).await,
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        log::error!("❌ {}", err);
        std::process::exit(1);
    }
}
