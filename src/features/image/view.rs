use std::collections::BTreeMap;

use super::style::StyleMap;

/// 卡片节点树中的节点
#[derive(Debug, Clone, PartialEq)]
pub enum CardNode {
    Element(ElementNode),
    Text(String),
}

/// 元素节点：标签、class、属性、内联样式与子节点
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
    pub style: StyleMap,
    pub children: Vec<CardNode>,
}

/// 没有子节点、序列化为自闭合标签的元素
const VOID_TAGS: &[&str] = &["img", "br"];

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            classes: Vec::new(),
            attrs: BTreeMap::new(),
            style: StyleMap::default(),
            children: Vec::new(),
        }
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn style(mut self, prop: &str, value: impl Into<String>) -> Self {
        self.style.set(prop, value, false);
        self
    }

    pub fn child(mut self, node: ElementNode) -> Self {
        self.children.push(CardNode::Element(node));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(CardNode::Text(text.into()));
        self
    }

    pub fn is_void(&self) -> bool {
        VOID_TAGS.contains(&self.tag.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// 元素子节点（跳过文本节点），顺序与文档一致
    pub fn element_children(&self) -> impl Iterator<Item = &ElementNode> {
        self.children.iter().filter_map(|c| match c {
            CardNode::Element(e) => Some(e),
            CardNode::Text(_) => None,
        })
    }

    pub fn element_children_mut(&mut self) -> impl Iterator<Item = &mut ElementNode> {
        self.children.iter_mut().filter_map(|c| match c {
            CardNode::Element(e) => Some(e),
            CardNode::Text(_) => None,
        })
    }

    /// 拼接所有后代文本
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// 按文档顺序查找第一个带指定 class 的后代（含自身）
    pub fn find_by_class(&self, class: &str) -> Option<&ElementNode> {
        if self.has_class(class) {
            return Some(self);
        }
        self.element_children().find_map(|c| c.find_by_class(class))
    }
}

fn collect_text(el: &ElementNode, out: &mut String) {
    for c in &el.children {
        match c {
            CardNode::Text(t) => out.push_str(t),
            CardNode::Element(e) => collect_text(e, out),
        }
    }
}

/// 按文档顺序收集图片元素（只读）
pub fn collect_images(el: &ElementNode) -> Vec<&ElementNode> {
    let mut out = Vec::new();
    collect_images_into(el, &mut out);
    out
}

fn collect_images_into<'a>(el: &'a ElementNode, out: &mut Vec<&'a ElementNode>) {
    if el.tag == "img" {
        out.push(el);
        return;
    }
    for c in el.element_children() {
        collect_images_into(c, out);
    }
}

/// 按文档顺序收集图片元素（可变）；图片是叶子节点，不会出现重叠借用
pub fn collect_images_mut(el: &mut ElementNode) -> Vec<&mut ElementNode> {
    let mut out = Vec::new();
    collect_images_mut_into(el, &mut out);
    out
}

fn collect_images_mut_into<'a>(el: &'a mut ElementNode, out: &mut Vec<&'a mut ElementNode>) {
    if el.tag == "img" {
        out.push(el);
        return;
    }
    for c in el.element_children_mut() {
        collect_images_mut_into(c, out);
    }
}
