//! 快照：复制卡片节点树，并把计算样式与图片数据全部内联到副本上。
//!
//! 原始节点树只读借用，所有修改都发生在副本上。

use futures_util::future::join_all;

use super::fetch::{FetchError, FetchedImage, ImageFetcher};
use super::renderer::{CardSize, RenderedCard};
use super::style::{StyleMap, Stylesheet, parse_aspect_ratio, parse_px};
use super::view::{ElementNode, collect_images, collect_images_mut};

/// 完全内联后的卡片快照
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub root: ElementNode,
    pub width: u32,
    pub height: u32,
}

/// 图片内联结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineReport {
    pub inlined: usize,
    pub degraded: usize,
}

/// 测量根元素尺寸（取整，至少 1×1）
pub fn measure(card: &RenderedCard) -> (u32, u32) {
    let computed = card.stylesheet.compute(&card.root, None);
    let width = computed
        .get("width")
        .and_then(parse_px)
        .unwrap_or(CardSize::Default.width_px() as f32);
    let height = computed
        .get("height")
        .and_then(parse_px)
        .or_else(|| {
            computed
                .get("aspect-ratio")
                .and_then(parse_aspect_ratio)
                .map(|r| width / r)
        })
        .unwrap_or(width);
    (clamp_dimension(width), clamp_dimension(height))
}

fn clamp_dimension(v: f32) -> u32 {
    if !v.is_finite() {
        return 1;
    }
    (v.round() as i64).clamp(1, u32::MAX as i64) as u32
}

/// 复制节点树，逐节点写入计算样式（保留 `!important`）
pub fn inline_computed_styles(card: &RenderedCard, width: u32, height: u32) -> ElementNode {
    let mut copy = card.root.clone();
    apply_computed(&card.stylesheet, &card.root, &mut copy, None);
    copy.style.set("margin", "0", false);
    copy.style.set("width", format!("{width}px"), false);
    copy.style.set("height", format!("{height}px"), false);
    copy
}

fn apply_computed(
    sheet: &Stylesheet,
    original: &ElementNode,
    copy: &mut ElementNode,
    parent: Option<&StyleMap>,
) {
    let computed = sheet.compute(original, parent);
    for (prop, v) in computed.iter() {
        copy.style.set(prop, v.value.clone(), v.important);
    }
    // 副本由克隆得到，两边的元素子节点一一对应
    for (o, c) in original
        .element_children()
        .zip(copy.element_children_mut())
    {
        apply_computed(sheet, o, c, Some(&computed));
    }
}

/// 把副本中的图片替换为 data URL；单张失败时退回原始地址
pub async fn inline_images<F: ImageFetcher>(
    original: &ElementNode,
    copy: &mut ElementNode,
    fetcher: &F,
    scale: f32,
) -> InlineReport {
    let sources: Vec<Option<String>> = collect_images(original)
        .into_iter()
        .map(|img| current_source(img, scale))
        .collect();

    let results: Vec<Option<Result<FetchedImage, FetchError>>> =
        join_all(sources.iter().map(|src| async move {
            match src.as_deref() {
                Some(s) if !s.starts_with("data:") => Some(fetcher.fetch(s).await),
                _ => None,
            }
        }))
        .await;

    let mut report = InlineReport::default();
    for ((img, src), result) in collect_images_mut(copy)
        .into_iter()
        .zip(sources)
        .zip(results)
    {
        match (src, result) {
            (Some(_), Some(Ok(fetched))) => {
                img.attrs.insert("src".into(), fetched.to_data_url());
                report.inlined += 1;
            }
            (Some(src), Some(Err(e))) => {
                tracing::warn!("图片内联失败，保留原始地址 {}: {}", src, e);
                img.attrs.insert("src".into(), src);
                report.degraded += 1;
            }
            (Some(src), None) => {
                img.attrs.insert("src".into(), src);
            }
            (None, _) => {}
        }
        img.attrs.remove("srcset");
        img.attrs.remove("sizes");
        img.attrs.insert("loading".into(), "eager".into());
        img.attrs.insert("decoding".into(), "sync".into());
    }
    report
}

/// 生成完整快照
pub async fn capture<F: ImageFetcher>(card: &RenderedCard, fetcher: &F, scale: f32) -> Snapshot {
    let (width, height) = measure(card);
    let mut root = inline_computed_styles(card, width, height);
    let report = inline_images(&card.root, &mut root, fetcher, scale).await;
    tracing::debug!(
        "快照完成: {}x{}, 内联图片 {} 张, 降级 {} 张",
        width,
        height,
        report.inlined,
        report.degraded
    );
    Snapshot {
        root,
        width,
        height,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Descriptor {
    Density(f32),
    Width(f32),
}

fn parse_srcset(srcset: &str) -> Vec<(String, Descriptor)> {
    srcset
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?.to_string();
            let descriptor = match parts.next() {
                None => Descriptor::Density(1.0),
                Some(d) => {
                    if let Some(x) = d.strip_suffix('x') {
                        Descriptor::Density(x.parse().ok()?)
                    } else if let Some(w) = d.strip_suffix('w') {
                        Descriptor::Width(w.parse().ok()?)
                    } else {
                        return None;
                    }
                }
            };
            Some((url, descriptor))
        })
        .collect()
}

/// 当前应当使用的图片地址：有 srcset 时按导出倍率挑选候选，否则取 src
fn current_source(img: &ElementNode, scale: f32) -> Option<String> {
    let src = img
        .attrs
        .get("src")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let Some(srcset) = img.attrs.get("srcset") else {
        return src;
    };
    let candidates = parse_srcset(srcset);
    if candidates.is_empty() {
        return src;
    }

    let slot = img
        .attrs
        .get("sizes")
        .and_then(|s| parse_px(s))
        .or_else(|| img.attrs.get("width").and_then(|w| w.trim().parse().ok()));
    let density = |d: Descriptor| match (d, slot) {
        (Descriptor::Density(x), _) => x,
        (Descriptor::Width(w), Some(slot)) if slot > 0.0 => w / slot,
        (Descriptor::Width(w), _) => w,
    };

    let mut ranked: Vec<(f32, &str)> = candidates
        .iter()
        .map(|(url, d)| (density(*d), url.as_str()))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked
        .iter()
        .find(|(d, _)| *d >= scale)
        .or_else(|| ranked.last())
        .map(|(_, url)| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::content::models::{StyleTokens, Template};
    use crate::features::image::renderer::{CardInput, render_card};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        calls: AtomicUsize,
    }

    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(FetchError::NotFound(url.to_string()));
            }
            Ok(FetchedImage {
                mime: "image/png".into(),
                bytes: vec![1, 2, 3],
            })
        }
    }

    fn card() -> RenderedCard {
        let template = Arc::new(Template {
            id: "t".into(),
            name: "T".into(),
            illustration_path: "/illustrations/a.png".into(),
            style_tokens: StyleTokens {
                primary_color: "#e11d48".into(),
                accent_color: "#fb7185".into(),
                font_style: None,
            },
        });
        render_card(&CardInput::new(template).resolve(), CardSize::Default)
    }

    #[test]
    fn measure_uses_width_and_aspect_ratio() {
        assert_eq!(measure(&card()), (448, 597));
    }

    #[test]
    fn measure_clamps_to_one_pixel() {
        let mut c = card();
        c.root.style.set("width", "0px", true);
        c.root.style.set("height", "0.2px", true);
        assert_eq!(measure(&c), (1, 1));
    }

    #[test]
    fn computed_styles_land_on_copy_and_original_is_untouched() {
        let c = card();
        let before = c.root.clone();
        let copy = inline_computed_styles(&c, 448, 597);
        assert_eq!(c.root, before);

        let msg = copy.find_by_class("card-message").unwrap();
        assert_eq!(msg.style.get("text-align"), Some("center"));
        assert_eq!(msg.style.get("color"), Some("#1f2937"));
        assert_eq!(copy.style.get("margin"), Some("0"));
        assert_eq!(copy.style.get("height"), Some("597px"));
    }

    #[test]
    fn important_priority_survives_inlining() {
        let mut c = card();
        c.stylesheet = Arc::new(Stylesheet::parse(".card-bar { height: 12px !important; }"));
        let copy = inline_computed_styles(&c, 10, 10);
        let bar = copy.find_by_class("card-bar").unwrap();
        assert_eq!(bar.style.get("height"), Some("12px"));
        assert!(bar.style.priority("height"));
    }

    #[tokio::test]
    async fn failed_image_degrades_without_aborting() {
        let root = ElementNode::new("div")
            .child(ElementNode::new("img").attr("src", "/ok.png"))
            .child(ElementNode::new("img").attr("src", "/broken.png"))
            .child(ElementNode::new("img").attr("src", "data:image/png;base64,AA=="));
        let mut copy = root.clone();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
        };

        let report = inline_images(&root, &mut copy, &fetcher, 1.0).await;
        assert_eq!(report, InlineReport { inlined: 1, degraded: 1 });
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

        let imgs = collect_images(&copy);
        assert_eq!(imgs[0].attrs["src"], "data:image/png;base64,AQID");
        assert_eq!(imgs[1].attrs["src"], "/broken.png");
        assert_eq!(imgs[2].attrs["src"], "data:image/png;base64,AA==");
        assert!(imgs.iter().all(|i| i.attrs["loading"] == "eager"));
    }

    #[test]
    fn srcset_is_resolved_for_export_scale() {
        let img = ElementNode::new("img")
            .attr("src", "/a.png")
            .attr("srcset", "/a-1x.png 1x, /a-2x.png 2x, /a-3x.png 3x");
        assert_eq!(current_source(&img, 1.0).as_deref(), Some("/a-1x.png"));
        assert_eq!(current_source(&img, 1.5).as_deref(), Some("/a-2x.png"));
        assert_eq!(current_source(&img, 4.0).as_deref(), Some("/a-3x.png"));

        let widths = ElementNode::new("img")
            .attr("sizes", "200px")
            .attr("srcset", "/s.png 200w, /l.png 400w");
        assert_eq!(current_source(&widths, 2.0).as_deref(), Some("/l.png"));
    }

    #[tokio::test]
    async fn srcset_and_sizes_are_dropped_from_copy() {
        let root = ElementNode::new("div").child(
            ElementNode::new("img")
                .attr("src", "/a.png")
                .attr("srcset", "/a-2x.png 2x")
                .attr("sizes", "100px"),
        );
        let mut copy = root.clone();
        let fetcher = StubFetcher {
            calls: AtomicUsize::new(0),
        };
        inline_images(&root, &mut copy, &fetcher, 2.0).await;
        let img = &collect_images(&copy)[0];
        assert!(!img.attrs.contains_key("srcset"));
        assert!(!img.attrs.contains_key("sizes"));
        assert_eq!(img.attrs["decoding"], "sync");
    }
}
