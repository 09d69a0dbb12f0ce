//! 卡片渲染：把模板、姓名、文案与插画映射为卡片节点树。
//!
//! 纯函数，不做任何 I/O。文案与插画按以下顺序回退：
//! - 文案：自定义消息（去空白后非空）→ 选中的库文案 → 占位文案；
//! - 插画：显式选择的插画 → 选中文案自带的插画 → 模板默认插画。

use std::sync::Arc;

use crate::features::content::models::{Template, TextEntry};

use super::fetch::to_data_url;
use super::markup::escape_xml;
use super::style::Stylesheet;
use super::view::ElementNode;

/// 没有任何文案时显示的占位文字
pub const PLACEHOLDER_TEXT: &str = "Vyber text z galerie nebo napiš vlastní ✨";
pub const TO_LABEL: &str = "Pro:";
pub const FROM_LABEL: &str = "Od:";

/// 角落爱心的矢量路径（24×24）；用图形而不是表情字符，导出时不依赖字体
const HEART_PATH: &str = "M12 21.35l-1.45-1.32C5.4 15.36 2 12.28 2 8.5 2 5.42 4.42 3 7.5 3c1.74 0 3.41.81 4.5 2.09C13.09 3.81 14.76 3 16.5 3 19.58 3 22 5.42 22 8.5c0 3.78-3.4 6.86-8.55 11.54L12 21.35z";

const DEFAULT_FONT_FAMILY: &str = "'Inter', 'Noto Sans', 'DejaVu Sans', sans-serif";
const HANDWRITING_FONT_FAMILY: &str = "'Caveat', 'Comic Sans MS', cursive";

/// 卡片尺寸（宽高比固定 3:4）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardSize {
    #[default]
    Default,
    Large,
}

impl CardSize {
    pub fn width_px(self) -> u32 {
        match self {
            CardSize::Default => 448,
            CardSize::Large => 576,
        }
    }

    fn padding_px(self) -> u32 {
        match self {
            CardSize::Default => 24,
            CardSize::Large => 32,
        }
    }

    fn message_font_px(self) -> u32 {
        match self {
            CardSize::Default => 18,
            CardSize::Large => 20,
        }
    }
}

impl std::str::FromStr for CardSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "md" => Ok(CardSize::Default),
            "large" | "xl" => Ok(CardSize::Large),
            other => Err(format!("未知卡片尺寸: {other}")),
        }
    }
}

/// 用户在编辑器里的原始选择
#[derive(Debug, Clone)]
pub struct CardInput {
    pub template: Arc<Template>,
    pub to_name: Option<String>,
    pub from_name: Option<String>,
    pub custom_message: Option<String>,
    pub selected_text: Option<Arc<TextEntry>>,
    pub selected_image: Option<String>,
}

impl CardInput {
    pub fn new(template: Arc<Template>) -> Self {
        Self {
            template,
            to_name: None,
            from_name: None,
            custom_message: None,
            selected_text: None,
            selected_image: None,
        }
    }

    /// 按回退顺序解析出最终展示内容
    pub fn resolve(&self) -> RenderableCard {
        let text = non_blank(self.custom_message.as_deref())
            .or_else(|| {
                self.selected_text
                    .as_deref()
                    .and_then(|t| non_blank(Some(&t.text)))
            })
            .unwrap_or(PLACEHOLDER_TEXT)
            .to_string();

        let image_path = non_blank(self.selected_image.as_deref())
            .or_else(|| {
                self.selected_text
                    .as_deref()
                    .and_then(|t| non_blank(t.image.as_deref()))
            })
            .unwrap_or(&self.template.illustration_path)
            .to_string();

        RenderableCard {
            template: Arc::clone(&self.template),
            to_name: non_blank(self.to_name.as_deref()).map(str::to_string),
            from_name: non_blank(self.from_name.as_deref()).map(str::to_string),
            text,
            image_path,
        }
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// 已解析完回退关系、可直接渲染的卡片
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableCard {
    pub template: Arc<Template>,
    pub to_name: Option<String>,
    pub from_name: Option<String>,
    pub text: String,
    pub image_path: String,
}

/// 渲染结果：节点树 + 样式表（导出时从这里读取计算样式）
#[derive(Debug, Clone)]
pub struct RenderedCard {
    pub root: ElementNode,
    pub stylesheet: Arc<Stylesheet>,
}

/// 卡片基础样式表
fn base_stylesheet(size: CardSize) -> Stylesheet {
    let pad = size.padding_px();
    let msg = size.message_font_px();
    Stylesheet::parse(&format!(
        r#"
        .card {{ position: relative; overflow: hidden; border-radius: 24px; aspect-ratio: 3 / 4; display: flex; flex-direction: column; margin: 0 auto; font-family: {DEFAULT_FONT_FAMILY}; }}
        .card-bar {{ height: 8px; }}
        .card-body {{ flex: 1; display: flex; flex-direction: column; padding: {pad}px; }}
        .card-illustration {{ height: 50%; display: flex; align-items: center; justify-content: center; margin-bottom: 16px; }}
        .card-image {{ width: 100%; height: 100%; object-fit: contain; }}
        .card-text {{ flex: 1; display: flex; flex-direction: column; justify-content: center; }}
        .card-to {{ font-size: 14px; margin-bottom: 8px; }}
        .card-message {{ font-size: {msg}px; line-height: 1.625; color: #1f2937; text-align: center; margin-bottom: 8px; }}
        .card-from {{ font-size: 14px; text-align: right; }}
        .card-corner {{ position: absolute; right: 16px; bottom: 16px; width: 24px; height: 24px; opacity: 0.3; }}
        .font-handwriting {{ font-family: {HANDWRITING_FONT_FAMILY}; }}
        "#
    ))
}

/// 主色爱心，内嵌为 SVG data URL
fn corner_heart(color: &str) -> String {
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24"><path d="{HEART_PATH}" fill="{}"/></svg>"#,
        escape_xml(color)
    );
    to_data_url("image/svg+xml", svg.as_bytes())
}

/// 渲染卡片节点树
pub fn render_card(card: &RenderableCard, size: CardSize) -> RenderedCard {
    let tokens = &card.template.style_tokens;
    let font_class = tokens.is_handwriting().then_some("font-handwriting");

    let with_font = |el: ElementNode| match font_class {
        Some(c) => el.class(c),
        None => el,
    };

    let mut text_area = ElementNode::new("div").class("card-text");
    if let Some(to) = &card.to_name {
        text_area = text_area.child(
            with_font(ElementNode::new("p").class("card-to"))
                .style("color", &tokens.primary_color)
                .text(format!("{TO_LABEL} "))
                .child(ElementNode::new("b").text(to)),
        );
    }
    text_area = text_area.child(
        with_font(ElementNode::new("p").class("card-message")).text(&card.text),
    );
    if let Some(from) = &card.from_name {
        text_area = text_area.child(
            with_font(ElementNode::new("p").class("card-from"))
                .style("color", &tokens.primary_color)
                .text(format!("{FROM_LABEL} "))
                .child(ElementNode::new("b").text(from)),
        );
    }

    let root = ElementNode::new("div")
        .class("card")
        .attr("data-template", &card.template.id)
        .style("width", format!("{}px", size.width_px()))
        .style(
            "background",
            format!(
                "linear-gradient(135deg, {}22, #ffffff)",
                tokens.accent_color
            ),
        )
        .child(
            ElementNode::new("div")
                .class("card-bar")
                .style("background-color", &tokens.primary_color),
        )
        .child(
            ElementNode::new("div")
                .class("card-body")
                .child(
                    ElementNode::new("div").class("card-illustration").child(
                        ElementNode::new("img")
                            .class("card-image")
                            .attr("src", &card.image_path)
                            .attr("alt", ""),
                    ),
                )
                .child(text_area),
        )
        .child(
            ElementNode::new("img")
                .class("card-corner")
                .attr("src", corner_heart(&tokens.primary_color))
                .attr("alt", ""),
        );

    RenderedCard {
        root,
        stylesheet: Arc::new(base_stylesheet(size)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::content::models::{StyleTokens, Tone};

    fn template(font_style: Option<&str>) -> Arc<Template> {
        Arc::new(Template {
            id: "t1".into(),
            name: "Rose".into(),
            illustration_path: "/illustrations/rose.svg".into(),
            style_tokens: StyleTokens {
                primary_color: "#e11d48".into(),
                accent_color: "#fb7185".into(),
                font_style: font_style.map(str::to_string),
            },
        })
    }

    fn library_text(image: Option<&str>) -> Arc<TextEntry> {
        Arc::new(TextEntry {
            id: "c1".into(),
            tone: Tone::Cute,
            tags: vec![],
            text: "Library text".into(),
            image: image.map(str::to_string),
        })
    }

    #[test]
    fn corner_heart_is_an_inline_vector_image() {
        let r = render_card(&CardInput::new(template(None)).resolve(), CardSize::Default);
        let corner = r.root.find_by_class("card-corner").unwrap();
        assert_eq!(corner.tag, "img");
        assert!(corner.text_content().is_empty());
        let src = &corner.attrs["src"];
        assert!(src.starts_with("data:image/svg+xml;base64,"));
        assert_ne!(
            src,
            &corner_heart("#000000"),
            "heart should use the template's primary color"
        );
    }

    #[test]
    fn custom_message_beats_library_text() {
        let mut input = CardInput::new(template(None));
        input.custom_message = Some("  Custom!  ".into());
        input.selected_text = Some(library_text(None));
        assert_eq!(input.resolve().text, "Custom!");
    }

    #[test]
    fn whitespace_custom_message_falls_back_to_library_text() {
        let mut input = CardInput::new(template(None));
        input.custom_message = Some("   ".into());
        input.selected_text = Some(library_text(None));
        assert_eq!(input.resolve().text, "Library text");
    }

    #[test]
    fn nothing_selected_uses_placeholder_and_template_image() {
        let r = CardInput::new(template(None)).resolve();
        assert_eq!(r.text, PLACEHOLDER_TEXT);
        assert_eq!(r.image_path, "/illustrations/rose.svg");
    }

    #[test]
    fn image_precedence_explicit_then_text_then_template() {
        let mut input = CardInput::new(template(None));
        input.selected_text = Some(library_text(Some("/illustrations/cat.png")));
        assert_eq!(input.resolve().image_path, "/illustrations/cat.png");
        input.selected_image = Some("/illustrations/dog.png".into());
        assert_eq!(input.resolve().image_path, "/illustrations/dog.png");
    }

    #[test]
    fn names_are_optional_lines() {
        let mut input = CardInput::new(template(None));
        let rendered = render_card(&input.resolve(), CardSize::Default);
        assert!(rendered.root.find_by_class("card-to").is_none());
        assert!(rendered.root.find_by_class("card-from").is_none());

        input.to_name = Some("Ana".into());
        input.from_name = Some("Ben".into());
        let rendered = render_card(&input.resolve(), CardSize::Default);
        let to = rendered.root.find_by_class("card-to").unwrap();
        assert_eq!(to.text_content(), "Pro: Ana");
        assert_eq!(to.style.get("color"), Some("#e11d48"));
        assert_eq!(
            rendered.root.find_by_class("card-from").unwrap().text_content(),
            "Od: Ben"
        );
    }

    #[test]
    fn handwriting_font_token_switches_font_class() {
        let r = render_card(
            &CardInput::new(template(Some("handwriting"))).resolve(),
            CardSize::Default,
        );
        let msg = r.root.find_by_class("card-message").unwrap();
        assert!(msg.has_class("font-handwriting"));

        let plain = render_card(&CardInput::new(template(None)).resolve(), CardSize::Default);
        assert!(!plain.root.find_by_class("card-message").unwrap().has_class("font-handwriting"));
    }

    #[test]
    fn root_carries_width_and_gradient_from_tokens() {
        let r = render_card(&CardInput::new(template(None)).resolve(), CardSize::Large);
        assert_eq!(r.root.style.get("width"), Some("576px"));
        assert_eq!(
            r.root.style.get("background"),
            Some("linear-gradient(135deg, #fb718522, #ffffff)")
        );
        let computed = r.stylesheet.compute(&r.root, None);
        assert_eq!(computed.get("aspect-ratio"), Some("3 / 4"));
    }
}
