//! 样式层：内联样式表、简化版样式表与层叠计算。
//!
//! 层叠顺序（低 → 高）：继承值 → 标签默认值 → 样式表普通声明 → 内联普通声明
//! → 样式表 `!important` → 内联 `!important`。同一来源内后出现者优先。

use std::collections::BTreeMap;

use super::view::ElementNode;

/// 可继承属性
pub const INHERITED_PROPERTIES: &[&str] = &[
    "color",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "letter-spacing",
    "line-height",
    "text-align",
    "white-space",
];

/// 单个属性值及其优先级
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleValue {
    pub value: String,
    pub important: bool,
}

/// 属性表；按属性名排序，保证序列化结果稳定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleMap {
    entries: BTreeMap<String, StyleValue>,
}

impl StyleMap {
    pub fn set(&mut self, prop: &str, value: impl Into<String>, important: bool) {
        self.entries.insert(
            prop.trim().to_ascii_lowercase(),
            StyleValue {
                value: value.into(),
                important,
            },
        );
    }

    pub fn get(&self, prop: &str) -> Option<&str> {
        self.entries.get(prop).map(|v| v.value.as_str())
    }

    pub fn priority(&self, prop: &str) -> bool {
        self.entries.get(prop).is_some_and(|v| v.important)
    }

    pub fn remove(&mut self, prop: &str) -> Option<StyleValue> {
        self.entries.remove(prop)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StyleValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 解析 `a: b; c: d !important` 形式的声明块
    pub fn parse(css: &str) -> Self {
        let mut map = StyleMap::default();
        for (prop, value) in parse_declarations(css) {
            map.set(&prop, value.value, value.important);
        }
        map
    }

    /// 序列化为 style 属性文本
    pub fn to_css_text(&self) -> String {
        let mut out = String::new();
        for (i, (prop, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(prop);
            out.push_str(": ");
            out.push_str(&v.value);
            if v.important {
                out.push_str(" !important");
            }
            out.push(';');
        }
        out
    }
}

fn parse_declarations(css: &str) -> Vec<(String, StyleValue)> {
    css.split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            let mut value = value.trim();
            if prop.is_empty() || value.is_empty() {
                return None;
            }
            let important = match value.strip_suffix("!important") {
                Some(v) => {
                    value = v.trim_end();
                    true
                }
                None => false,
            };
            Some((
                prop.to_ascii_lowercase(),
                StyleValue {
                    value: value.to_string(),
                    important,
                },
            ))
        })
        .collect()
}

/// 简单选择器：`.class`、`tag` 或 `*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Universal,
    Tag(String),
    Class(String),
}

impl Selector {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw == "*" {
            return Some(Selector::Universal);
        }
        if let Some(class) = raw.strip_prefix('.') {
            return Some(Selector::Class(class.to_string()));
        }
        Some(Selector::Tag(raw.to_ascii_lowercase()))
    }

    fn matches(&self, el: &ElementNode) -> bool {
        match self {
            Selector::Universal => true,
            Selector::Tag(t) => el.tag == *t,
            Selector::Class(c) => el.has_class(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<(String, StyleValue)>,
}

/// 卡片使用的样式表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    rules: Vec<StyleRule>,
}

impl Stylesheet {
    /// 解析 `.a, p { x: y; }` 形式的样式表；不认识的选择器会被忽略
    pub fn parse(css: &str) -> Self {
        let mut rules = Vec::new();
        for block in css.split('}') {
            let Some((selectors, body)) = block.split_once('{') else {
                continue;
            };
            let selectors: Vec<Selector> = selectors.split(',').filter_map(Selector::parse).collect();
            if selectors.is_empty() {
                continue;
            }
            rules.push(StyleRule {
                selectors,
                declarations: parse_declarations(body),
            });
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    /// 计算元素的最终样式；`parent` 为父元素的计算样式（根元素为 None）
    pub fn compute(&self, el: &ElementNode, parent: Option<&StyleMap>) -> StyleMap {
        let mut computed = match parent {
            Some(p) => inherit_from(p),
            None => root_defaults(),
        };
        for (prop, value) in tag_defaults(&el.tag) {
            computed.set(prop, *value, false);
        }

        let sheet_decls: Vec<&(String, StyleValue)> = self
            .rules
            .iter()
            .filter(|r| r.selectors.iter().any(|s| s.matches(el)))
            .flat_map(|r| r.declarations.iter())
            .collect();
        let inline_decls: Vec<(&str, &StyleValue)> = el.style.iter().collect();

        // 普通声明：样式表 → 内联
        for (prop, v) in sheet_decls.iter().filter(|(_, v)| !v.important) {
            computed.set(prop, v.value.clone(), false);
        }
        for (prop, v) in inline_decls.iter().filter(|(_, v)| !v.important) {
            computed.set(prop, v.value.clone(), false);
        }
        // important 声明：样式表 → 内联
        for (prop, v) in sheet_decls.iter().filter(|(_, v)| v.important) {
            computed.set(prop, v.value.clone(), true);
        }
        for (prop, v) in inline_decls.iter().filter(|(_, v)| v.important) {
            computed.set(prop, v.value.clone(), true);
        }

        computed
    }
}

fn inherit_from(parent: &StyleMap) -> StyleMap {
    let mut out = StyleMap::default();
    for prop in INHERITED_PROPERTIES {
        if let Some(v) = parent.get(prop) {
            out.set(prop, v, false);
        }
    }
    out
}

fn root_defaults() -> StyleMap {
    let mut m = StyleMap::default();
    m.set("color", "#000000", false);
    m.set("font-family", "sans-serif", false);
    m.set("font-size", "16px", false);
    m.set("font-style", "normal", false);
    m.set("font-weight", "400", false);
    m.set("letter-spacing", "normal", false);
    m.set("line-height", "normal", false);
    m.set("text-align", "start", false);
    m.set("white-space", "normal", false);
    m
}

fn tag_defaults(tag: &str) -> &'static [(&'static str, &'static str)] {
    match tag {
        "div" | "p" | "section" | "header" | "footer" => &[("display", "block")],
        "b" | "strong" => &[("display", "inline"), ("font-weight", "700")],
        "img" => &[("display", "inline-block")],
        _ => &[("display", "inline")],
    }
}

/// 标签的默认 display（未写 display 时按此处理）
pub fn default_display(tag: &str) -> &'static str {
    tag_defaults(tag)
        .iter()
        .find(|(prop, _)| *prop == "display")
        .map_or("inline", |(_, value)| *value)
}

/// 解析 px 长度；`0` 视为 0px
pub fn parse_px(value: &str) -> Option<f32> {
    let v = value.trim();
    if v == "0" {
        return Some(0.0);
    }
    v.strip_suffix("px")?.trim().parse().ok()
}

/// 解析百分比，返回 0..=1 之间的比例
pub fn parse_percent(value: &str) -> Option<f32> {
    value
        .trim()
        .strip_suffix('%')?
        .trim()
        .parse::<f32>()
        .ok()
        .map(|p| p / 100.0)
}

/// 解析 `3 / 4` 或 `0.75` 形式的宽高比，返回 宽/高
pub fn parse_aspect_ratio(value: &str) -> Option<f32> {
    let v = value.trim();
    let ratio = match v.split_once('/') {
        Some((w, h)) => w.trim().parse::<f32>().ok()? / h.trim().parse::<f32>().ok()?,
        None => v.parse().ok()?,
    };
    (ratio.is_finite() && ratio > 0.0).then_some(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(tag: &str, class: &str) -> ElementNode {
        ElementNode::new(tag).class(class)
    }

    #[test]
    fn declaration_block_round_trips_priority() {
        let m = StyleMap::parse("color: red; margin: 0 !important; ;bad");
        assert_eq!(m.get("color"), Some("red"));
        assert!(m.priority("margin"));
        assert!(!m.priority("color"));
        assert_eq!(m.to_css_text(), "color: red; margin: 0 !important;");
    }

    #[test]
    fn inline_beats_sheet_unless_sheet_is_important() {
        let sheet = Stylesheet::parse(".a { color: blue; font-size: 20px !important; }");
        let node = el("p", "a").style("color", "green").style("font-size", "10px");
        let c = sheet.compute(&node, None);
        assert_eq!(c.get("color"), Some("green"));
        assert_eq!(c.get("font-size"), Some("20px"));
        assert!(c.priority("font-size"));
    }

    #[test]
    fn inline_important_wins_over_everything() {
        let sheet = Stylesheet::parse("p { color: blue !important; }");
        let mut node = el("p", "x");
        node.style.set("color", "red", true);
        assert_eq!(sheet.compute(&node, None).get("color"), Some("red"));
    }

    #[test]
    fn inherited_properties_flow_from_parent_but_box_properties_do_not() {
        let sheet = Stylesheet::parse(".outer { color: #123456; padding: 24px; }");
        let outer = el("div", "outer");
        let parent = sheet.compute(&outer, None);
        let child = sheet.compute(&el("span", "inner"), Some(&parent));
        assert_eq!(child.get("color"), Some("#123456"));
        assert_eq!(child.get("padding"), None);
        assert_eq!(child.get("display"), Some("inline"));
    }

    #[test]
    fn later_rules_override_earlier_ones() {
        let sheet = Stylesheet::parse(".a { color: red; } .a, .b { color: blue; }");
        assert_eq!(sheet.rules().len(), 2);
        assert_eq!(sheet.compute(&el("p", "a"), None).get("color"), Some("blue"));
    }

    #[test]
    fn length_helpers() {
        assert_eq!(parse_px("448px"), Some(448.0));
        assert_eq!(parse_px("0"), Some(0.0));
        assert_eq!(parse_px("auto"), None);
        assert_eq!(parse_percent("50%"), Some(0.5));
        assert_eq!(parse_aspect_ratio("3 / 4"), Some(0.75));
        assert_eq!(parse_aspect_ratio("0 / 4"), None);
    }

    #[test]
    fn tag_defaults_apply_before_sheet_rules() {
        let sheet = Stylesheet::parse(".bold { color: red; }");
        let b = sheet.compute(&el("b", "bold"), None);
        assert_eq!(b.get("display"), Some("inline"));
        assert_eq!(b.get("font-weight"), Some("700"));
        assert_eq!(sheet.compute(&el("div", "x"), None).get("display"), Some("block"));
        assert_eq!(default_display("p"), "block");
        assert_eq!(default_display("img"), "inline-block");
        assert_eq!(default_display("span"), "inline");
    }
}
