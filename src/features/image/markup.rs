use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use std::fmt::Write;

use crate::error::ExportError;

use super::snapshot::Snapshot;
use super::view::{CardNode, ElementNode};

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// 转义 XML 特殊字符
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// 把节点树序列化为 XHTML 片段
pub fn serialize_markup(root: &ElementNode) -> Result<String, ExportError> {
    let mut out = String::new();
    write_element(root, &mut out)?;
    Ok(out)
}

fn write_element(el: &ElementNode, out: &mut String) -> Result<(), ExportError> {
    write!(out, "<{}", el.tag)?;
    if !el.classes.is_empty() {
        write!(out, " class=\"{}\"", escape_xml(&el.classes.join(" ")))?;
    }
    for (name, value) in &el.attrs {
        write!(out, " {}=\"{}\"", name, escape_xml(value))?;
    }
    if !el.style.is_empty() {
        write!(out, " style=\"{}\"", escape_xml(&el.style.to_css_text()))?;
    }
    if el.is_void() {
        out.push_str(" />");
        return Ok(());
    }
    out.push('>');
    for child in &el.children {
        match child {
            CardNode::Text(t) => out.push_str(&escape_xml(t)),
            CardNode::Element(e) => write_element(e, out)?,
        }
    }
    write!(out, "</{}>", el.tag)?;
    Ok(())
}

/// 把 XHTML 片段包进 foreignObject 矢量容器
pub fn wrap_in_foreign_object(markup: &str, width: u32, height: u32) -> String {
    format!(
        r#"<svg xmlns="{SVG_NS}" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><foreignObject width="100%" height="100%"><div xmlns="{XHTML_NS}">{markup}</div></foreignObject></svg>"#
    )
}

pub fn svg_data_url(svg: &str) -> String {
    format!(
        "data:image/svg+xml;base64,{}",
        base64_engine.encode(svg.as_bytes())
    )
}

/// 把快照组合为 SVG 文档的后端
pub trait SvgComposer: Send + Sync {
    fn compose(&self, snapshot: &Snapshot) -> Result<String, ExportError>;
}

/// 自包含的 foreignObject 文档（浏览器可直接显示）
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignObjectComposer;

impl SvgComposer for ForeignObjectComposer {
    fn compose(&self, snapshot: &Snapshot) -> Result<String, ExportError> {
        let markup = serialize_markup(&snapshot.root)?;
        Ok(wrap_in_foreign_object(
            &markup,
            snapshot.width,
            snapshot.height,
        ))
    }
}
