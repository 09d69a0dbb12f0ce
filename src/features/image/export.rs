//! 卡片导出：字体就绪 → 测量 → 快照 → 组合矢量文档 → 栅格化。

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::ExportConfig;
use crate::error::ExportError;

use super::fetch::{ImageFetcher, to_data_url};
use super::fonts::fonts_ready;
use super::layout::PrimitiveComposer;
use super::markup::{ForeignObjectComposer, SvgComposer};
use super::raster::{RasterRequest, effective_scale, pixel_size, rasterize_svg};
use super::renderer::RenderedCard;
use super::snapshot::capture;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// 调用方的设备像素比
    pub device_scale: f32,
    pub max_scale: f32,
    pub optimize_speed: bool,
    pub fonts_dir: PathBuf,
    /// 栅格化时解析相对图片路径的目录
    pub resources_dir: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            device_scale: 1.0,
            max_scale: 2.0,
            optimize_speed: false,
            fonts_dir: PathBuf::from("resources/fonts"),
            resources_dir: None,
        }
    }
}

impl ExportOptions {
    pub fn from_config(cfg: &ExportConfig) -> Self {
        Self {
            max_scale: cfg.max_scale,
            optimize_speed: cfg.optimize_speed,
            fonts_dir: PathBuf::from(&cfg.fonts_dir),
            ..Self::default()
        }
    }

    pub fn with_device_scale(mut self, device_scale: f32) -> Self {
        self.device_scale = device_scale;
        self
    }

    pub fn scale(&self) -> f32 {
        effective_scale(self.device_scale, self.max_scale)
    }
}

/// 导出结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedImage {
    /// 像素宽高
    pub width: u32,
    pub height: u32,
    /// 实际使用的设备像素比（已按上限截断）
    pub scale: f32,
    pub bytes: Vec<u8>,
    /// PNG 内容的 SHA-256（十六进制）
    pub digest: String,
}

impl ExportedImage {
    pub fn to_data_url(&self) -> String {
        to_data_url("image/png", &self.bytes)
    }
}

/// 卡片导出器；克隆后共享图片拉取器与并发许可
pub struct CardExporter<F: ImageFetcher> {
    fetcher: Arc<F>,
    semaphore: Arc<Semaphore>,
    options: ExportOptions,
    composer: Arc<dyn SvgComposer>,
}

impl<F: ImageFetcher> Clone for CardExporter<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            semaphore: Arc::clone(&self.semaphore),
            options: self.options.clone(),
            composer: Arc::clone(&self.composer),
        }
    }
}

impl<F: ImageFetcher> CardExporter<F> {
    pub fn new(fetcher: F, options: ExportOptions, max_parallel: usize) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            options,
            composer: Arc::new(PrimitiveComposer),
        }
    }

    /// 替换栅格化使用的矢量组合后端
    pub fn with_composer(mut self, composer: Arc<dyn SvgComposer>) -> Self {
        self.composer = composer;
        self
    }

    /// 导出为 PNG；卡片只读借用，不会被修改
    pub async fn export_to_raster(&self, card: &RenderedCard) -> Result<ExportedImage, ExportError> {
        let font_db = fonts_ready(self.options.fonts_dir.clone()).await?;
        let scale = self.options.scale();
        let snapshot = capture(card, self.fetcher.as_ref(), scale).await;
        let svg = self.composer.compose(&snapshot)?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ExportError::Task(e.to_string()))?;

        let (width, height) = (snapshot.width, snapshot.height);
        let optimize_speed = self.options.optimize_speed;
        let resources_dir = self.options.resources_dir.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            rasterize_svg(
                &RasterRequest {
                    svg: &svg,
                    width,
                    height,
                    scale,
                    optimize_speed,
                    resources_dir,
                },
                font_db,
            )
        })
        .await
        .map_err(|e| ExportError::Task(e.to_string()))??;

        let (px_w, px_h) = pixel_size(width, height, scale);
        tracing::info!(
            "卡片导出完成: {}x{} @{}x → {}x{}, {} 字节",
            width,
            height,
            scale,
            px_w,
            px_h,
            bytes.len()
        );
        Ok(ExportedImage {
            width: px_w,
            height: px_h,
            scale,
            digest: hex::encode(Sha256::digest(&bytes)),
            bytes,
        })
    }

    /// 导出为 base64 PNG data URL
    pub async fn export_to_data_url(&self, card: &RenderedCard) -> Result<String, ExportError> {
        Ok(self.export_to_raster(card).await?.to_data_url())
    }

    /// 导出自包含的 foreignObject SVG 文档（不栅格化）
    pub async fn export_to_svg(&self, card: &RenderedCard) -> Result<String, ExportError> {
        let snapshot = capture(card, self.fetcher.as_ref(), self.options.scale()).await;
        ForeignObjectComposer.compose(&snapshot)
    }
}
