//! 原生 SVG 排版后端。
//!
//! resvg 不支持 foreignObject 中的 HTML，这里只读取快照上已内联的样式，
//! 把节点树排版为 `rect` / `linearGradient` / `image` / `text` / `clipPath`。
//! 支持的子集：块级与 flex（行/列）、`flex: 1`、居中对齐、外边距与内边距、
//! px 与百分比尺寸、绝对定位、圆角、透明度、`overflow: hidden`、
//! `object-fit`，以及按宽度估算的逐词换行。

use std::fmt::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::error::ExportError;

use super::markup::{SvgComposer, escape_xml};
use super::snapshot::Snapshot;
use super::style::{StyleMap, default_display, parse_percent, parse_px};
use super::view::{CardNode, ElementNode};

const DEFAULT_FONT_SIZE: f32 = 16.0;
const LINE_HEIGHT_NORMAL: f32 = 1.2;
// 半角字符宽度约为字号的 0.55 倍，全角字符约等于字号
const HALF_WIDTH_RATIO: f32 = 0.55;
const BOLD_WIDTH_RATIO: f32 = 1.05;
const ASCENT_RATIO: f32 = 0.8;
const WRAP_EPSILON: f32 = 0.01;

/// 把快照排版为原生 SVG 图元，供 resvg 栅格化
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveComposer;

impl SvgComposer for PrimitiveComposer {
    fn compose(&self, snapshot: &Snapshot) -> Result<String, ExportError> {
        let (w, h) = (snapshot.width as f32, snapshot.height as f32);
        let root = layout_box(
            &snapshot.root,
            Slot {
                x: 0.0,
                y: 0.0,
                avail_w: w,
                container_h: Some(h),
                width: Some(w),
                height: Some(h),
            },
        );

        let mut painter = Painter::default();
        painter.paint(&root)?;

        let mut out = String::with_capacity(painter.body.len() + painter.defs.len() + 256);
        write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{0}" height="{1}" viewBox="0 0 {0} {1}">"#,
            snapshot.width, snapshot.height
        )?;
        if !painter.defs.is_empty() {
            write!(out, "<defs>{}</defs>", painter.defs)?;
        }
        out.push_str(&painter.body);
        out.push_str("</svg>");
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Edges {
    top: f32,
    right: f32,
    bottom: f32,
    left: f32,
}

impl Edges {
    /// 读取 `margin` / `padding` 简写及其单边属性
    fn of(style: &StyleMap, base: &str) -> Self {
        let mut e = style.get(base).map(Self::parse_shorthand).unwrap_or_default();
        for (side, slot) in [
            ("top", &mut e.top),
            ("right", &mut e.right),
            ("bottom", &mut e.bottom),
            ("left", &mut e.left),
        ] {
            if let Some(v) = style.get(&format!("{base}-{side}")).and_then(parse_px) {
                *slot = v;
            }
        }
        e
    }

    fn parse_shorthand(v: &str) -> Self {
        let vals: Vec<f32> = v
            .split_whitespace()
            .map(|p| parse_px(p).unwrap_or(0.0))
            .collect();
        let (top, right, bottom, left) = match vals.as_slice() {
            [a] => (*a, *a, *a, *a),
            [a, b] => (*a, *b, *a, *b),
            [a, b, c] => (*a, *b, *c, *b),
            [a, b, c, d, ..] => (*a, *b, *c, *d),
            [] => (0.0, 0.0, 0.0, 0.0),
        };
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// 父元素分配给子元素的位置与约束
#[derive(Debug, Clone, Copy)]
struct Slot {
    x: f32,
    y: f32,
    avail_w: f32,
    container_h: Option<f32>,
    width: Option<f32>,
    height: Option<f32>,
}

impl Slot {
    fn measure(avail_w: f32, container_h: Option<f32>) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            avail_w,
            container_h,
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Piece<'a> {
    text: String,
    style: &'a StyleMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Line<'a> {
    pieces: Vec<Piece<'a>>,
    width: f32,
}

impl<'a> Line<'a> {
    fn push(&mut self, text: &str, style: &'a StyleMap) {
        match self.pieces.last_mut() {
            Some(last) if std::ptr::eq(last.style, style) => last.text.push_str(text),
            _ => self.pieces.push(Piece {
                text: text.to_string(),
                style,
            }),
        }
    }
}

#[derive(Debug)]
enum Content<'a> {
    Image,
    Text {
        lines: Vec<Line<'a>>,
        line_height: f32,
        font_size: f32,
    },
    Boxes(Vec<LaidOut<'a>>),
}

#[derive(Debug)]
struct LaidOut<'a> {
    el: &'a ElementNode,
    rect: Rect,
    content: Content<'a>,
}

fn resolve_len(value: Option<&str>, basis: Option<f32>) -> Option<f32> {
    let v = value?;
    parse_px(v).or_else(|| Some(parse_percent(v)? * basis?))
}

fn is_absolute(el: &ElementNode) -> bool {
    matches!(el.style.get("position"), Some("absolute") | Some("fixed"))
}

fn is_hidden(el: &ElementNode) -> bool {
    el.style.get("display") == Some("none")
}

fn is_flex(el: &ElementNode) -> bool {
    matches!(el.style.get("display"), Some("flex") | Some("inline-flex"))
}

fn is_row(el: &ElementNode) -> bool {
    is_flex(el) && matches!(el.style.get("flex-direction"), None | Some("row"))
}

fn flex_grow(el: &ElementNode) -> f32 {
    if let Some(g) = el.style.get("flex-grow").and_then(|g| g.trim().parse().ok()) {
        return g;
    }
    match el.style.get("flex").map(str::trim) {
        Some("auto") => 1.0,
        Some(v) => v
            .split_whitespace()
            .next()
            .and_then(|g| g.parse().ok())
            .unwrap_or(0.0),
        None => 0.0,
    }
}

/// 全部子节点都是文本或行内元素时按文本块排版
fn is_inline_content(el: &ElementNode) -> bool {
    !el.children.is_empty()
        && el.children.iter().all(|c| match c {
            CardNode::Text(_) => true,
            CardNode::Element(e) => {
                e.tag != "img"
                    && !is_absolute(e)
                    && e.style.get("display").unwrap_or(default_display(&e.tag)) == "inline"
            }
        })
}

fn font_size_of(style: &StyleMap) -> f32 {
    style
        .get("font-size")
        .and_then(parse_px)
        .filter(|s| *s > 0.0)
        .unwrap_or(DEFAULT_FONT_SIZE)
}

fn line_height_of(style: &StyleMap, font_size: f32) -> f32 {
    let Some(v) = style.get("line-height").map(str::trim) else {
        return font_size * LINE_HEIGHT_NORMAL;
    };
    if v == "normal" {
        return font_size * LINE_HEIGHT_NORMAL;
    }
    parse_px(v)
        .or_else(|| parse_percent(v).map(|p| p * font_size))
        .or_else(|| v.parse::<f32>().ok().map(|n| n * font_size))
        .unwrap_or(font_size * LINE_HEIGHT_NORMAL)
}

fn is_bold(style: &StyleMap) -> bool {
    match style.get("font-weight") {
        Some("bold") | Some("bolder") => true,
        Some(w) => w.parse::<u32>().is_ok_and(|w| w >= 600),
        None => false,
    }
}

fn is_full_width(ch: char) -> bool {
    ch.width() == Some(2)
}

fn char_width(ch: char, style: &StyleMap) -> f32 {
    let size = font_size_of(style);
    let base = if is_full_width(ch) {
        size
    } else {
        size * HALF_WIDTH_RATIO
    };
    if is_bold(style) {
        base * BOLD_WIDTH_RATIO
    } else {
        base
    }
}

fn box_width(el: &ElementNode, avail_w: f32) -> f32 {
    resolve_len(el.style.get("width"), Some(avail_w))
        .unwrap_or(avail_w)
        .max(0.0)
}

fn layout_box<'a>(el: &'a ElementNode, slot: Slot) -> LaidOut<'a> {
    let style = &el.style;
    let w = slot.width.unwrap_or_else(|| box_width(el, slot.avail_w));
    let pad = Edges::of(style, "padding");
    let explicit_h = slot
        .height
        .or_else(|| resolve_len(style.get("height"), slot.container_h));
    let inner = Rect {
        x: slot.x + pad.left,
        y: slot.y + pad.top,
        w: (w - pad.horizontal()).max(0.0),
        h: explicit_h.map_or(0.0, |h| (h - pad.vertical()).max(0.0)),
    };
    let inner_h = explicit_h.map(|_| inner.h);

    let (content, content_h) = if el.tag == "img" {
        // 没有固有尺寸信息，按正方形兜底
        (Content::Image, inner.w)
    } else if is_inline_content(el) {
        let (lines, line_height, font_size) = layout_text(el, inner.w);
        let h = line_height * lines.len() as f32;
        (
            Content::Text {
                lines,
                line_height,
                font_size,
            },
            h,
        )
    } else {
        let (children, h) = layout_children(el, inner, inner_h);
        (Content::Boxes(children), h)
    };

    let h = explicit_h.unwrap_or(content_h + pad.vertical()).max(0.0);
    let mut laid = LaidOut {
        el,
        rect: Rect {
            x: slot.x,
            y: slot.y,
            w,
            h,
        },
        content,
    };
    place_absolute(&mut laid);
    laid
}

fn layout_children<'a>(
    el: &'a ElementNode,
    inner: Rect,
    inner_h: Option<f32>,
) -> (Vec<LaidOut<'a>>, f32) {
    let flow: Vec<&ElementNode> = el
        .element_children()
        .filter(|c| !is_absolute(c) && !is_hidden(c))
        .collect();
    if is_row(el) {
        layout_row(el, &flow, inner, inner_h)
    } else {
        layout_column(el, &flow, inner, inner_h)
    }
}

fn layout_column<'a>(
    el: &'a ElementNode,
    flow: &[&'a ElementNode],
    inner: Rect,
    inner_h: Option<f32>,
) -> (Vec<LaidOut<'a>>, f32) {
    let flex = is_flex(el);
    let margins: Vec<Edges> = flow.iter().map(|c| Edges::of(&c.style, "margin")).collect();
    let grows: Vec<f32> = flow
        .iter()
        .map(|c| if flex && inner_h.is_some() { flex_grow(c) } else { 0.0 })
        .collect();

    // 第一遍：测量不伸缩的子元素
    let mut heights = vec![0.0_f32; flow.len()];
    let mut used = 0.0;
    for (i, c) in flow.iter().enumerate() {
        let m = margins[i];
        used += m.vertical();
        if grows[i] > 0.0 {
            continue;
        }
        heights[i] = layout_box(c, Slot::measure((inner.w - m.horizontal()).max(0.0), inner_h))
            .rect
            .h;
        used += heights[i];
    }
    let total_grow: f32 = grows.iter().sum();
    if let (Some(avail), true) = (inner_h, total_grow > 0.0) {
        let free = (avail - used).max(0.0);
        for (h, g) in heights.iter_mut().zip(&grows) {
            if *g > 0.0 {
                *h = free * g / total_grow;
            }
        }
    }
    let total: f32 = heights
        .iter()
        .zip(&margins)
        .map(|(h, m)| h + m.vertical())
        .sum();

    let offset = match (inner_h, el.style.get("justify-content")) {
        (Some(avail), Some("center")) if flex => ((avail - total) / 2.0).max(0.0),
        (Some(avail), Some("flex-end") | Some("end")) if flex => (avail - total).max(0.0),
        _ => 0.0,
    };
    let align_center = flex && el.style.get("align-items") == Some("center");

    // 第二遍：确定位置
    let mut cursor = inner.y + offset;
    let mut out = Vec::with_capacity(flow.len());
    for (i, c) in flow.iter().enumerate() {
        let m = margins[i];
        let avail_w = (inner.w - m.horizontal()).max(0.0);
        let w = box_width(c, avail_w);
        let x = if align_center {
            inner.x + m.left + (avail_w - w) / 2.0
        } else {
            inner.x + m.left
        };
        cursor += m.top;
        let laid = layout_box(
            c,
            Slot {
                x,
                y: cursor,
                avail_w,
                container_h: inner_h,
                width: Some(w),
                height: (grows[i] > 0.0).then_some(heights[i]),
            },
        );
        cursor += laid.rect.h + m.bottom;
        out.push(laid);
    }
    (out, total)
}

fn layout_row<'a>(
    el: &'a ElementNode,
    flow: &[&'a ElementNode],
    inner: Rect,
    inner_h: Option<f32>,
) -> (Vec<LaidOut<'a>>, f32) {
    let margins: Vec<Edges> = flow.iter().map(|c| Edges::of(&c.style, "margin")).collect();
    let fixed: Vec<Option<f32>> = flow
        .iter()
        .map(|c| resolve_len(c.style.get("width"), Some(inner.w)))
        .collect();
    let used: f32 = fixed
        .iter()
        .zip(&margins)
        .map(|(w, m)| w.unwrap_or(0.0) + m.horizontal())
        .sum();
    let auto_count = fixed.iter().filter(|w| w.is_none()).count();
    let share = if auto_count > 0 {
        (inner.w - used).max(0.0) / auto_count as f32
    } else {
        0.0
    };
    let widths: Vec<f32> = fixed.iter().map(|w| w.unwrap_or(share).max(0.0)).collect();
    let total_w: f32 = widths
        .iter()
        .zip(&margins)
        .map(|(w, m)| w + m.horizontal())
        .sum();

    let offset_x = match el.style.get("justify-content") {
        Some("center") => ((inner.w - total_w) / 2.0).max(0.0),
        Some("flex-end") | Some("end") => (inner.w - total_w).max(0.0),
        _ => 0.0,
    };
    let align_center = el.style.get("align-items") == Some("center");

    let mut cursor = inner.x + offset_x;
    let mut out = Vec::with_capacity(flow.len());
    let mut content_h = 0.0_f32;
    for (i, c) in flow.iter().enumerate() {
        let m = margins[i];
        let w = widths[i];
        let has_height = c.style.get("height").is_some();
        let stretch = match inner_h {
            Some(avail) if !align_center && !has_height => Some((avail - m.vertical()).max(0.0)),
            _ => None,
        };
        let h = match stretch {
            Some(h) => h,
            None => layout_box(c, Slot { width: Some(w), ..Slot::measure(w, inner_h) }).rect.h,
        };
        let y = match inner_h {
            Some(avail) if align_center => inner.y + m.top + ((avail - h - m.vertical()) / 2.0).max(0.0),
            _ => inner.y + m.top,
        };
        cursor += m.left;
        let laid = layout_box(
            c,
            Slot {
                x: cursor,
                y,
                avail_w: w,
                container_h: inner_h,
                width: Some(w),
                height: stretch,
            },
        );
        cursor += w + m.right;
        content_h = content_h.max(laid.rect.h + m.vertical());
        out.push(laid);
    }
    (out, content_h)
}

/// 绝对定位子元素相对当前盒子放置；未指定宽度时收缩到内容宽度
fn place_absolute(laid: &mut LaidOut<'_>) {
    let el = laid.el;
    let r = laid.rect;
    let Content::Boxes(children) = &mut laid.content else {
        return;
    };
    for c in el.element_children().filter(|c| is_absolute(c) && !is_hidden(c)) {
        let measured = layout_box(c, Slot::measure(r.w, Some(r.h)));
        let w = if c.style.get("width").is_some() {
            measured.rect.w
        } else {
            intrinsic_width(&measured)
        };
        let h = measured.rect.h;
        let side = |name: &str, basis: f32| resolve_len(c.style.get(name), Some(basis));
        let x = match (side("left", r.w), side("right", r.w)) {
            (Some(l), _) => r.x + l,
            (None, Some(right)) => r.x + r.w - right - w,
            _ => r.x,
        };
        let y = match (side("top", r.h), side("bottom", r.h)) {
            (Some(t), _) => r.y + t,
            (None, Some(bottom)) => r.y + r.h - bottom - h,
            _ => r.y,
        };
        children.push(layout_box(
            c,
            Slot {
                x,
                y,
                avail_w: w,
                container_h: Some(r.h),
                width: Some(w),
                height: Some(h),
            },
        ));
    }
}

fn intrinsic_width(laid: &LaidOut<'_>) -> f32 {
    match &laid.content {
        Content::Text { lines, .. } => {
            let pad = Edges::of(&laid.el.style, "padding");
            lines.iter().map(|l| l.width).fold(0.0, f32::max) + pad.horizontal()
        }
        _ => laid.rect.w,
    }
}

enum Run<'a> {
    Text(&'a str, &'a StyleMap),
    Break,
}

fn collect_runs<'a>(el: &'a ElementNode, out: &mut Vec<Run<'a>>) {
    for c in &el.children {
        match c {
            CardNode::Text(t) => out.push(Run::Text(t, &el.style)),
            CardNode::Element(e) if e.tag == "br" => out.push(Run::Break),
            CardNode::Element(e) => collect_runs(e, out),
        }
    }
}

enum Token<'a> {
    Word(Vec<Piece<'a>>, f32),
    Space(&'a StyleMap, f32),
    Break,
}

fn tokenize<'a>(runs: &[Run<'a>]) -> Vec<Token<'a>> {
    let mut tokens = Vec::new();
    let mut word: Line<'a> = Line::default();

    fn flush<'a>(word: &mut Line<'a>, tokens: &mut Vec<Token<'a>>) {
        if !word.pieces.is_empty() {
            let w = std::mem::take(word);
            tokens.push(Token::Word(w.pieces, w.width));
        }
    }

    for run in runs {
        let (text, style) = match run {
            Run::Text(t, s) => (*t, *s),
            Run::Break => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Break);
                continue;
            }
        };
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            if ch.is_whitespace() {
                flush(&mut word, &mut tokens);
                if !matches!(tokens.last(), Some(Token::Space(..))) {
                    tokens.push(Token::Space(style, char_width(' ', style)));
                }
            } else if is_full_width(ch) {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Word(
                    vec![Piece {
                        text: ch.to_string(),
                        style,
                    }],
                    char_width(ch, style),
                ));
            } else {
                word.push(ch.encode_utf8(&mut buf), style);
                word.width += char_width(ch, style);
            }
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

/// 贪心换行：单词放不下时另起一行，行首行尾的空白丢弃
fn wrap(tokens: Vec<Token<'_>>, max_w: f32) -> Vec<Line<'_>> {
    let mut lines = vec![Line::default()];
    let mut pending: Option<(&StyleMap, f32)> = None;
    for token in tokens {
        match token {
            Token::Break => {
                lines.push(Line::default());
                pending = None;
            }
            Token::Space(style, w) => {
                if lines.last().is_some_and(|l| !l.pieces.is_empty()) {
                    pending = Some((style, w));
                }
            }
            Token::Word(pieces, w) => {
                let overflow = lines.last().is_some_and(|l| {
                    !l.pieces.is_empty()
                        && l.width + pending.map_or(0.0, |p| p.1) + w > max_w + WRAP_EPSILON
                });
                if overflow {
                    lines.push(Line::default());
                } else if let (Some((style, sw)), Some(line)) = (pending, lines.last_mut()) {
                    line.push(" ", style);
                    line.width += sw;
                }
                pending = None;
                if let Some(line) = lines.last_mut() {
                    for p in pieces {
                        line.push(&p.text, p.style);
                    }
                    line.width += w;
                }
            }
        }
    }
    if lines.iter().all(|l| l.pieces.is_empty()) {
        lines.clear();
    }
    lines
}

fn layout_text(el: &ElementNode, max_w: f32) -> (Vec<Line<'_>>, f32, f32) {
    let font_size = font_size_of(&el.style);
    let line_height = line_height_of(&el.style, font_size);
    let mut runs = Vec::new();
    collect_runs(el, &mut runs);
    (wrap(tokenize(&runs), max_w), line_height, font_size)
}

/// 颜色：`#rrggbbaa` / `#rgba` 拆成不透明颜色 + opacity
#[derive(Debug, Clone, PartialEq)]
struct Fill {
    color: String,
    opacity: Option<f32>,
}

fn parse_color(v: &str) -> Option<Fill> {
    let v = v.trim();
    if v.is_empty() || v == "transparent" || v == "none" {
        return None;
    }
    let Some(hex) = v.strip_prefix('#') else {
        return Some(Fill {
            color: v.to_string(),
            opacity: None,
        });
    };
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let alpha = |a: &str| u8::from_str_radix(a, 16).ok().map(|a| a as f32 / 255.0);
    match hex.len() {
        3 | 6 => Some(Fill {
            color: v.to_string(),
            opacity: None,
        }),
        4 => Some(Fill {
            color: format!("#{}", &hex[..3]),
            opacity: alpha(&hex[3..].repeat(2)),
        }),
        8 => Some(Fill {
            color: format!("#{}", &hex[..6]),
            opacity: alpha(&hex[6..]),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LinearGradient {
    angle_deg: f32,
    stops: Vec<(Fill, Option<f32>)>,
}

/// 按顶层逗号切分（忽略括号内的逗号）
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

fn parse_linear_gradient(v: &str) -> Option<LinearGradient> {
    let inner = v
        .trim()
        .strip_prefix("linear-gradient(")?
        .strip_suffix(')')?;
    let parts = split_top_level(inner);
    let (angle_deg, stop_parts) = match parts.first().copied() {
        Some(first) if first.ends_with("deg") => (
            first.trim_end_matches("deg").trim().parse().ok()?,
            &parts[1..],
        ),
        Some("to top") => (0.0, &parts[1..]),
        Some("to right") => (90.0, &parts[1..]),
        Some("to bottom") => (180.0, &parts[1..]),
        Some("to left") => (270.0, &parts[1..]),
        _ => (180.0, &parts[..]),
    };
    let stops: Vec<(Fill, Option<f32>)> = stop_parts
        .iter()
        .filter_map(|p| {
            let (color, pos) = match p.rsplit_once(char::is_whitespace) {
                Some((c, pos)) if pos.ends_with('%') => (c.trim(), parse_percent(pos)),
                _ => (*p, None),
            };
            Some((parse_color(color)?, pos))
        })
        .collect();
    (stops.len() >= 2).then_some(LinearGradient { angle_deg, stops })
}

/// CSS 角度转换为 objectBoundingBox 下的渐变端点
fn gradient_vector(angle_deg: f32) -> (f32, f32, f32, f32) {
    let rad = angle_deg.to_radians();
    let (dx, dy) = (rad.sin(), -rad.cos());
    let m = dx.abs().max(dy.abs()).max(f32::EPSILON);
    let (dx, dy) = (dx / m, dy / m);
    (0.5 - dx / 2.0, 0.5 - dy / 2.0, 0.5 + dx / 2.0, 0.5 + dy / 2.0)
}

/// 数值格式化：保留两位小数并去掉多余的 0，保证输出稳定
fn num(v: f32) -> String {
    let r = (v * 100.0).round() / 100.0;
    if r == r.trunc() {
        format!("{}", r as i64)
    } else {
        format!("{r}")
    }
}

fn fill_attrs(fill: &Fill, color_attr: &str, opacity_attr: &str) -> String {
    let mut s = format!(r#" {color_attr}="{}""#, escape_xml(&fill.color));
    if let Some(o) = fill.opacity {
        s.push_str(&format!(r#" {opacity_attr}="{}""#, num(o)));
    }
    s
}

fn rect_markup(r: Rect, radius: f32, extra: &str) -> String {
    let mut s = format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}""#,
        num(r.x),
        num(r.y),
        num(r.w),
        num(r.h)
    );
    let radius = radius.min(r.w / 2.0).min(r.h / 2.0);
    if radius > 0.0 {
        s.push_str(&format!(r#" rx="{0}" ry="{0}""#, num(radius)));
    }
    s.push_str(extra);
    s.push_str("/>");
    s
}

#[derive(Default)]
struct Painter {
    defs: String,
    body: String,
    gradients: usize,
    clips: usize,
}

impl Painter {
    fn paint(&mut self, b: &LaidOut<'_>) -> fmt::Result {
        let style = &b.el.style;
        if is_hidden(b.el) || style.get("visibility") == Some("hidden") {
            return Ok(());
        }
        let mut opened = 0;
        if let Some(o) = style
            .get("opacity")
            .and_then(|o| o.trim().parse::<f32>().ok())
            .filter(|o| *o < 1.0)
        {
            write!(self.body, r#"<g opacity="{}">"#, num(o.max(0.0)))?;
            opened += 1;
        }

        let radius = style.get("border-radius").and_then(parse_px).unwrap_or(0.0);
        self.paint_background(b.rect, radius, style)?;

        if style.get("overflow") == Some("hidden") {
            let id = format!("c{}", self.clips);
            self.clips += 1;
            write!(
                self.defs,
                r#"<clipPath id="{id}">{}</clipPath>"#,
                rect_markup(b.rect, radius, "")
            )?;
            write!(self.body, r#"<g clip-path="url(#{id})">"#)?;
            opened += 1;
        }

        match &b.content {
            Content::Image => self.paint_image(b)?,
            Content::Text {
                lines,
                line_height,
                font_size,
            } => self.paint_text(b, lines, *line_height, *font_size)?,
            Content::Boxes(children) => {
                for c in children {
                    self.paint(c)?;
                }
            }
        }

        for _ in 0..opened {
            self.body.push_str("</g>");
        }
        Ok(())
    }

    fn paint_background(&mut self, r: Rect, radius: f32, style: &StyleMap) -> fmt::Result {
        if r.w <= 0.0 || r.h <= 0.0 {
            return Ok(());
        }
        let color = style
            .get("background-color")
            .or_else(|| style.get("background").filter(|v| !v.contains("gradient(")))
            .and_then(parse_color);
        if let Some(fill) = color {
            self.body.push_str(&rect_markup(r, radius, &fill_attrs(&fill, "fill", "fill-opacity")));
        }

        let gradient = style
            .get("background-image")
            .or_else(|| style.get("background"))
            .and_then(parse_linear_gradient);
        if let Some(g) = gradient {
            let id = format!("g{}", self.gradients);
            self.gradients += 1;
            let (x1, y1, x2, y2) = gradient_vector(g.angle_deg);
            write!(
                self.defs,
                r#"<linearGradient id="{id}" x1="{}" y1="{}" x2="{}" y2="{}">"#,
                num(x1),
                num(y1),
                num(x2),
                num(y2)
            )?;
            let last = (g.stops.len() - 1).max(1) as f32;
            for (i, (fill, pos)) in g.stops.iter().enumerate() {
                let offset = pos.unwrap_or(i as f32 / last);
                write!(
                    self.defs,
                    r#"<stop offset="{}"{}/>"#,
                    num(offset),
                    fill_attrs(fill, "stop-color", "stop-opacity")
                )?;
            }
            self.defs.push_str("</linearGradient>");
            self.body
                .push_str(&rect_markup(r, radius, &format!(r#" fill="url(#{id})""#)));
        }
        Ok(())
    }

    fn paint_image(&mut self, b: &LaidOut<'_>) -> fmt::Result {
        let Some(href) = b.el.attrs.get("src") else {
            return Ok(());
        };
        if b.rect.w <= 0.0 || b.rect.h <= 0.0 {
            return Ok(());
        }
        let aspect = match b.el.style.get("object-fit") {
            Some("cover") => "xMidYMid slice",
            Some("fill") => "none",
            _ => "xMidYMid meet",
        };
        write!(
            self.body,
            r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="{aspect}" xlink:href="{}"/>"#,
            num(b.rect.x),
            num(b.rect.y),
            num(b.rect.w),
            num(b.rect.h),
            escape_xml(href)
        )
    }

    fn paint_text(
        &mut self,
        b: &LaidOut<'_>,
        lines: &[Line<'_>],
        line_height: f32,
        font_size: f32,
    ) -> fmt::Result {
        let style = &b.el.style;
        let pad = Edges::of(style, "padding");
        let inner_x = b.rect.x + pad.left;
        let inner_w = (b.rect.w - pad.horizontal()).max(0.0);
        let inner_y = b.rect.y + pad.top;
        let (anchor, x) = match style.get("text-align") {
            Some("center") => ("middle", inner_x + inner_w / 2.0),
            Some("right") | Some("end") => ("end", inner_x + inner_w),
            _ => ("start", inner_x),
        };

        for (i, line) in lines.iter().enumerate() {
            let baseline = inner_y
                + i as f32 * line_height
                + (line_height - font_size) / 2.0
                + font_size * ASCENT_RATIO;
            write!(
                self.body,
                r#"<text x="{}" y="{}" text-anchor="{anchor}"{} xml:space="preserve">"#,
                num(x),
                num(baseline),
                text_attrs(style, None)
            )?;
            let trimmed = trim_line(line);
            for piece in &trimmed {
                write!(
                    self.body,
                    "<tspan{}>{}</tspan>",
                    text_attrs(piece.style, Some(style)),
                    escape_xml(&piece.text)
                )?;
            }
            self.body.push_str("</text>");
        }
        Ok(())
    }
}

/// 去掉行首行尾空白
fn trim_line<'a>(line: &Line<'a>) -> Vec<Piece<'a>> {
    let mut pieces = line.pieces.clone();
    if let Some(first) = pieces.first_mut() {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = pieces.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    pieces.retain(|p| !p.text.is_empty());
    pieces
}

/// 文本属性；给出 `base` 时只输出与之不同的属性
fn text_attrs(style: &StyleMap, base: Option<&StyleMap>) -> String {
    let mut out = String::new();
    let differs = |prop: &str| base.is_none_or(|b| b.get(prop) != style.get(prop));
    for (prop, attr) in [
        ("font-family", "font-family"),
        ("font-size", "font-size"),
        ("font-weight", "font-weight"),
        ("font-style", "font-style"),
    ] {
        if let Some(v) = style.get(prop).filter(|_| differs(prop)) {
            let v = if prop == "font-size" {
                parse_px(v).map(num).unwrap_or_else(|| v.to_string())
            } else {
                v.to_string()
            };
            out.push_str(&format!(r#" {attr}="{}""#, escape_xml(&v)));
        }
    }
    if differs("color") {
        if let Some(fill) = style.get("color").and_then(parse_color) {
            out.push_str(&fill_attrs(&fill, "fill", "fill-opacity"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(tag: &str, css: &str) -> ElementNode {
        let mut e = ElementNode::new(tag);
        e.style = StyleMap::parse(css);
        e
    }

    fn snapshot(root: ElementNode, w: u32, h: u32) -> Snapshot {
        Snapshot {
            root,
            width: w,
            height: h,
        }
    }

    #[test]
    fn hex_alpha_is_split_into_opacity() {
        assert_eq!(
            parse_color("#fb718522"),
            Some(Fill {
                color: "#fb7185".into(),
                opacity: Some(0x22 as f32 / 255.0)
            })
        );
        assert_eq!(parse_color("transparent"), None);
        assert_eq!(parse_color("#zzz"), None);
    }

    #[test]
    fn gradient_angle_maps_to_bounding_box_vector() {
        let g = parse_linear_gradient("linear-gradient(135deg, #fb718522, #ffffff)").unwrap();
        assert_eq!(g.stops.len(), 2);
        let (x1, y1, x2, y2) = gradient_vector(g.angle_deg);
        assert_eq!(
            (num(x1), num(y1), num(x2), num(y2)),
            ("0".into(), "0".into(), "1".into(), "1".into())
        );
        let down = parse_linear_gradient("linear-gradient(to bottom, red 0%, rgb(0, 0, 255) 100%)")
            .unwrap();
        assert_eq!(down.angle_deg, 180.0);
        assert_eq!(down.stops[1].0.color, "rgb(0, 0, 255)");
        assert_eq!(down.stops[1].1, Some(1.0));
    }

    #[test]
    fn number_formatting_is_stable() {
        assert_eq!(num(448.0), "448");
        assert_eq!(num(0.30000001), "0.3");
        assert_eq!(num(-0.001), "0");
    }

    #[test]
    fn long_text_wraps_within_width() {
        let p = el("p", "font-size: 20px; line-height: 1.5")
            .text("alpha beta gamma delta epsilon zeta eta theta");
        let laid = layout_box(&p, Slot::measure(120.0, None));
        let Content::Text { lines, line_height, .. } = &laid.content else {
            panic!("expected text content");
        };
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.width <= 120.0 + WRAP_EPSILON));
        assert_eq!(*line_height, 30.0);
        assert_eq!(laid.rect.h, 30.0 * lines.len() as f32);
    }

    #[test]
    fn inline_children_keep_their_own_style() {
        let p = el("p", "font-size: 14px; color: #e11d48")
            .text("Pro: ")
            .child(el("b", "font-size: 14px; font-weight: 700; color: #e11d48").text("Ana"));
        let laid = layout_box(&p, Slot::measure(400.0, None));
        let Content::Text { lines, .. } = &laid.content else {
            panic!("expected text content");
        };
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].pieces.len(), 2);
        assert_eq!(lines[0].pieces[0].text, "Pro: ");
        assert_eq!(lines[0].pieces[1].text, "Ana");
    }

    #[test]
    fn flex_column_gives_leftover_height_to_growing_child() {
        let root = el("div", "display: flex; flex-direction: column; height: 100px")
            .child(el("div", "height: 20px"))
            .child(el("div", "flex: 1"));
        let laid = layout_box(&root, Slot::measure(50.0, None));
        let Content::Boxes(children) = &laid.content else {
            panic!("expected boxes");
        };
        assert_eq!(children[0].rect, Rect { x: 0.0, y: 0.0, w: 50.0, h: 20.0 });
        assert_eq!(children[1].rect, Rect { x: 0.0, y: 20.0, w: 50.0, h: 80.0 });
    }

    #[test]
    fn justify_center_offsets_column_children() {
        let root = el(
            "div",
            "display: flex; flex-direction: column; justify-content: center; height: 100px; padding: 10px",
        )
        .child(el("div", "height: 20px"));
        let laid = layout_box(&root, Slot::measure(100.0, None));
        let Content::Boxes(children) = &laid.content else {
            panic!("expected boxes");
        };
        assert_eq!(children[0].rect.y, 10.0 + 30.0);
        assert_eq!(children[0].rect.x, 10.0);
        assert_eq!(children[0].rect.w, 80.0);
    }

    #[test]
    fn undeclared_display_follows_tag_default() {
        let blocks = el("div", "width: 80px").child(el("p", "height: 10px"));
        let laid = layout_box(&blocks, Slot::measure(80.0, None));
        assert!(matches!(laid.content, Content::Boxes(_)));

        let inline = el("p", "font-size: 10px")
            .child(el("span", "font-size: 10px").text("ahoj"));
        let laid = layout_box(&inline, Slot::measure(80.0, None));
        assert!(matches!(laid.content, Content::Text { .. }));
    }

    #[test]
    fn absolute_child_is_placed_from_bottom_right() {
        let root = el("div", "position: relative; height: 200px")
            .child(el("span", "position: absolute; right: 16px; bottom: 16px; font-size: 20px; line-height: 1").text("x"));
        let laid = layout_box(&root, Slot::measure(300.0, None));
        let Content::Boxes(children) = &laid.content else {
            panic!("expected boxes");
        };
        let r = children[0].rect;
        assert_eq!(r.h, 20.0);
        assert!((r.x + r.w - (300.0 - 16.0)).abs() < 0.001);
        assert!((r.y - (200.0 - 16.0 - 20.0)).abs() < 0.001);
    }

    #[test]
    fn compose_emits_gradient_clip_image_and_text() {
        let root = el(
            "div",
            "background: linear-gradient(135deg, #fb718522, #ffffff); border-radius: 24px; overflow: hidden; opacity: 0.5",
        )
        .child(el("img", "width: 100%; height: 50px; object-fit: cover").attr("src", "data:image/png;base64,AA=="))
        .child(el("p", "text-align: center; color: #1f2937; font-size: 18px").text("Hi & bye"));
        let svg = PrimitiveComposer.compose(&snapshot(root, 100, 200)).unwrap();

        assert!(svg.starts_with("<svg "));
        assert!(svg.contains(r#"width="100" height="200" viewBox="0 0 100 200""#));
        assert!(svg.contains(r#"<linearGradient id="g0" x1="0" y1="0" x2="1" y2="1">"#));
        assert!(svg.contains(r#"stop-opacity="0.13""#));
        assert!(svg.contains(r#"<clipPath id="c0">"#));
        assert!(svg.contains(r#"<g opacity="0.5">"#));
        assert!(svg.contains(r#"preserveAspectRatio="xMidYMid slice""#));
        assert!(svg.contains(r#"text-anchor="middle""#));
        assert!(svg.contains("Hi &amp; bye"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn compose_is_deterministic() {
        let build = || {
            el("div", "background-color: #ffffff")
                .child(el("p", "font-size: 12px").text("same input"))
        };
        let a = PrimitiveComposer.compose(&snapshot(build(), 40, 40)).unwrap();
        let b = PrimitiveComposer.compose(&snapshot(build(), 40, 40)).unwrap();
        assert_eq!(a, b);
    }
}
