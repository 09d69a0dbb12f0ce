use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

/// 文案语气
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Cute,
    Funny,
    Spicy,
    Office,
    Taylor,
}

impl Tone {
    pub const ALL: [Tone; 5] = [
        Tone::Cute,
        Tone::Funny,
        Tone::Spicy,
        Tone::Office,
        Tone::Taylor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Cute => "cute",
            Tone::Funny => "funny",
            Tone::Spicy => "spicy",
            Tone::Office => "office",
            Tone::Taylor => "taylor",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tone::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("未知语气: {s}"))
    }
}

/// 文案库条目（加载后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextEntry {
    #[schema(example = "cute-001")]
    pub id: String,
    pub tone: Tone,
    /// 仅参与打分，不参与过滤
    #[serde(default)]
    pub tags: Vec<String>,
    pub text: String,
    /// 文案自带的插画（可选，优先于模板默认插画）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// 模板样式令牌
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StyleTokens {
    #[schema(example = "#e11d48")]
    pub primary_color: String,
    #[schema(example = "#fb7185")]
    pub accent_color: String,
    /// 目前只识别 "handwriting"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
}

impl StyleTokens {
    pub fn is_handwriting(&self) -> bool {
        self.font_style.as_deref() == Some("handwriting")
    }
}

/// 卡片模板
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[schema(example = "classic-rose")]
    pub id: String,
    pub name: String,
    /// 默认插画路径
    #[schema(example = "/illustrations/rose.svg")]
    pub illustration_path: String,
    pub style_tokens: StyleTokens,
}

/// 进程级内容库：文案与模板，启动时加载一次，此后只读
#[derive(Debug, Default)]
pub struct ContentLibrary {
    texts: Vec<Arc<TextEntry>>,
    templates: Vec<Arc<Template>>,
    template_index: HashMap<String, usize>,
    text_index: HashMap<String, usize>,
}

impl ContentLibrary {
    /// 构建内容库；重复 id 以先出现者为准
    pub fn new(texts: Vec<TextEntry>, templates: Vec<Template>) -> Self {
        let texts: Vec<Arc<TextEntry>> = texts.into_iter().map(Arc::new).collect();
        let templates: Vec<Arc<Template>> = templates.into_iter().map(Arc::new).collect();

        let mut text_index = HashMap::with_capacity(texts.len());
        for (i, t) in texts.iter().enumerate() {
            if text_index.contains_key(&t.id) {
                tracing::warn!("文案 id 重复，忽略后者: {}", t.id);
                continue;
            }
            text_index.insert(t.id.clone(), i);
        }
        let mut template_index = HashMap::with_capacity(templates.len());
        for (i, t) in templates.iter().enumerate() {
            if template_index.contains_key(&t.id) {
                tracing::warn!("模板 id 重复，忽略后者: {}", t.id);
                continue;
            }
            template_index.insert(t.id.clone(), i);
        }

        Self {
            texts,
            templates,
            template_index,
            text_index,
        }
    }

    pub fn texts(&self) -> &[Arc<TextEntry>] {
        &self.texts
    }

    pub fn templates(&self) -> &[Arc<Template>] {
        &self.templates
    }

    /// 按库内顺序返回某语气的全部文案
    pub fn texts_by_tone(&self, tone: Tone) -> impl Iterator<Item = &Arc<TextEntry>> {
        self.texts.iter().filter(move |t| t.tone == tone)
    }

    pub fn text_by_id(&self, id: &str) -> Option<&Arc<TextEntry>> {
        self.text_index.get(id).and_then(|&i| self.texts.get(i))
    }

    pub fn template_by_id(&self, id: &str) -> Option<&Arc<Template>> {
        self.template_index
            .get(id)
            .and_then(|&i| self.templates.get(i))
    }

    /// 未指定模板时使用的默认模板（库内第一个）
    pub fn default_template(&self) -> Option<&Arc<Template>> {
        self.templates.first()
    }
}
