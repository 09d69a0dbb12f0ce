use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::render;
use std::path::PathBuf;
use std::sync::Arc;
use tiny_skia::{Pixmap, Transform};

use crate::error::ExportError;

const DEFAULT_FONT_FAMILY: &str = "Noto Sans";

/// 实际使用的缩放倍率：非有限值或 ≤0 视为 1，且不超过上限
pub fn effective_scale(device_scale: f32, max_scale: f32) -> f32 {
    let device = if device_scale.is_finite() && device_scale > 0.0 {
        device_scale
    } else {
        1.0
    };
    let max = if max_scale.is_finite() && max_scale > 0.0 {
        max_scale
    } else {
        1.0
    };
    device.min(max)
}

/// 输出像素尺寸：round(W×scale) × round(H×scale)，至少 1×1
pub fn pixel_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let px = |v: u32| ((v as f64 * scale as f64).round() as u32).max(1);
    (px(width), px(height))
}

pub struct RasterRequest<'a> {
    pub svg: &'a str,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub optimize_speed: bool,
    pub resources_dir: Option<PathBuf>,
}

/// 解码 SVG 并按倍率栅格化为 PNG
pub fn rasterize_svg(
    req: &RasterRequest<'_>,
    font_db: Arc<fontdb::Database>,
) -> Result<Vec<u8>, ExportError> {
    let t0 = std::time::Instant::now();
    let speed = req.optimize_speed;
    let opts = UsvgOptions {
        resources_dir: req.resources_dir.clone(),
        fontdb: font_db,
        font_family: DEFAULT_FONT_FAMILY.to_string(),
        font_size: 16.0,
        languages: vec!["cs".to_string(), "en".to_string()],
        shape_rendering: if speed {
            usvg::ShapeRendering::OptimizeSpeed
        } else {
            usvg::ShapeRendering::GeometricPrecision
        },
        text_rendering: if speed {
            usvg::TextRendering::OptimizeSpeed
        } else {
            usvg::TextRendering::OptimizeLegibility
        },
        image_rendering: if speed {
            usvg::ImageRendering::OptimizeSpeed
        } else {
            usvg::ImageRendering::OptimizeQuality
        },
        ..Default::default()
    };

    let tree = usvg::Tree::from_data(req.svg.as_bytes(), &opts)
        .map_err(|e| ExportError::Decode(e.to_string()))?;
    let t_parse = t0.elapsed();

    let (dst_w, dst_h) = pixel_size(req.width, req.height, req.scale);
    let mut pixmap = Pixmap::new(dst_w, dst_h)
        .ok_or_else(|| ExportError::Surface(format!("{dst_w}x{dst_h}")))?;

    // 文档按测量尺寸绘制，再整体缩放到目标像素
    let sx = dst_w as f32 / tree.size().width().max(1.0);
    let sy = dst_h as f32 / tree.size().height().max(1.0);
    render(&tree, Transform::from_scale(sx, sy), &mut pixmap.as_mut());
    let t_raster = t0.elapsed();

    let png = encode_png(&pixmap, speed)?;
    tracing::debug!(
        "PNG 导出分段: 解析={:?}, 栅格化={:?}, 编码={:?}, 尺寸={}x{}",
        t_parse,
        t_raster - t_parse,
        t0.elapsed() - t_raster,
        dst_w,
        dst_h
    );
    Ok(png)
}

fn encode_png(pixmap: &Pixmap, optimize_speed: bool) -> Result<Vec<u8>, ExportError> {
    let (w, h) = (pixmap.width(), pixmap.height());
    let mut out = Vec::with_capacity((w * h) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if optimize_speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| ExportError::Encode(format!("write_header: {e}")))?;
        writer
            .write_image_data(pixmap.data())
            .map_err(|e| ExportError::Encode(format!("write_image_data: {e}")))?;
        writer
            .finish()
            .map_err(|e| ExportError::Encode(format!("finish: {e}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_fonts() -> Arc<fontdb::Database> {
        Arc::new(fontdb::Database::new())
    }

    fn png_dimensions(bytes: &[u8]) -> (u32, u32) {
        let decoder = png::Decoder::new(bytes);
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        (info.width, info.height)
    }

    #[test]
    fn scale_is_capped_and_sanitized() {
        assert_eq!(effective_scale(3.0, 2.0), 2.0);
        assert_eq!(effective_scale(1.5, 2.0), 1.5);
        assert_eq!(effective_scale(0.0, 2.0), 1.0);
        assert_eq!(effective_scale(f32::NAN, 2.0), 1.0);
        assert_eq!(effective_scale(-2.0, 2.0), 1.0);
    }

    #[test]
    fn pixel_size_rounds_and_clamps() {
        assert_eq!(pixel_size(448, 597, 2.0), (896, 1194));
        assert_eq!(pixel_size(101, 33, 1.5), (152, 50));
        assert_eq!(pixel_size(1, 1, 0.1), (1, 1));
    }

    #[test]
    fn rasterizes_to_scaled_png() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="20" viewBox="0 0 10 20"><rect width="10" height="20" fill="#e11d48"/></svg>"##;
        let req = RasterRequest {
            svg,
            width: 10,
            height: 20,
            scale: 1.5,
            optimize_speed: true,
            resources_dir: None,
        };
        let png = rasterize_svg(&req, empty_fonts()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(png_dimensions(&png), (15, 30));
    }

    #[test]
    fn malformed_svg_is_a_decode_error() {
        let req = RasterRequest {
            svg: "<svg",
            width: 10,
            height: 10,
            scale: 1.0,
            optimize_speed: false,
            resources_dir: None,
        };
        assert!(matches!(
            rasterize_svg(&req, empty_fonts()),
            Err(ExportError::Decode(_))
        ));
    }
}
