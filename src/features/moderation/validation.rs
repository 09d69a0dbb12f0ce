use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::blocklist::{self, Blocklist};
use crate::error::ProblemFieldError;

/// 各字段最大长度（按字符计）
#[derive(Debug, Clone, Copy)]
pub struct MaxLengths {
    pub to_name: usize,
    pub from_name: usize,
    pub keywords: usize,
    pub message: usize,
}

pub const MAX_LENGTHS: MaxLengths = MaxLengths {
    to_name: 32,
    from_name: 32,
    keywords: 140,
    message: 280,
};

pub const BLOCKED_CONTENT_MESSAGE: &str = "包含不允许的内容";

pub fn too_long_message(max_len: usize) -> String {
    format!("最多 {max_len} 个字符")
}

/// 单字段清洗结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub value: String,
    pub error: Option<String>,
}

impl Sanitized {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// HTML 转义：`& < > " '`
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// 使用全局屏蔽词表清洗输入
pub fn sanitize_input(text: &str, max_len: usize) -> Sanitized {
    sanitize_input_with(blocklist::global(), text, max_len)
}

/// 清洗输入：去首尾空白 → 长度检查 → 屏蔽词检查 → HTML 转义。
///
/// 超长时截断到 `max_len` 个字符并带错误；命中屏蔽词时带错误。
/// 两种情况下返回值同样经过转义，调用方可以直接回显。
pub fn sanitize_input_with(blocklist: &Blocklist, text: &str, max_len: usize) -> Sanitized {
    let trimmed = text.trim();

    if trimmed.chars().count() > max_len {
        let truncated: String = trimmed.chars().take(max_len).collect();
        return Sanitized {
            value: escape_html(&truncated),
            error: Some(too_long_message(max_len)),
        };
    }

    let error = blocklist
        .contains_blocked_content(trimmed)
        .then(|| BLOCKED_CONTENT_MESSAGE.to_string());

    Sanitized {
        value: escape_html(trimmed),
        error,
    }
}

/// 创建卡片表单中需要预校验的字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

/// 表单校验结果：字段级错误（camelCase 字段名）与清洗后的值
#[derive(Debug, Clone, Default)]
pub struct FormValidation {
    pub errors: BTreeMap<String, String>,
    pub sanitized: FormData,
}

impl FormValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// 转为 Problem Details 的字段错误列表
    pub fn field_errors(&self) -> Vec<ProblemFieldError> {
        self.errors
            .iter()
            .map(|(field, message)| ProblemFieldError {
                field: field.clone(),
                message: message.clone(),
            })
            .collect()
    }
}

/// 使用全局屏蔽词表校验表单
pub fn validate_form_data(data: &FormData) -> FormValidation {
    validate_form_data_with(blocklist::global(), data)
}

/// 只校验出现的字段
pub fn validate_form_data_with(blocklist: &Blocklist, data: &FormData) -> FormValidation {
    let mut result = FormValidation::default();

    let fields: [(&str, &Option<String>, usize, &mut Option<String>); 3] = [
        (
            "toName",
            &data.to_name,
            MAX_LENGTHS.to_name,
            &mut result.sanitized.to_name,
        ),
        (
            "fromName",
            &data.from_name,
            MAX_LENGTHS.from_name,
            &mut result.sanitized.from_name,
        ),
        (
            "keywords",
            &data.keywords,
            MAX_LENGTHS.keywords,
            &mut result.sanitized.keywords,
        ),
    ];

    let mut errors = BTreeMap::new();
    for (field, input, max_len, slot) in fields {
        let Some(raw) = input else { continue };
        let s = sanitize_input_with(blocklist, raw, max_len);
        if let Some(err) = s.error {
            errors.insert(field.to_string(), err);
        }
        *slot = Some(s.value);
    }
    result.errors = errors;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::moderation::blocklist::BlocklistFile;

    fn blocklist() -> Blocklist {
        Blocklist::compile(BlocklistFile {
            words: vec!["badword".into()],
            patterns: vec![],
        })
    }

    #[test]
    fn escape_html_covers_all_five_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#039;s&lt;/a&gt;"
        );
    }

    #[test]
    fn sanitize_trims_and_passes_clean_input() {
        let s = sanitize_input_with(&blocklist(), "  Hello  ", 100);
        assert_eq!(
            s,
            Sanitized {
                value: "Hello".into(),
                error: None
            }
        );
    }

    #[test]
    fn sanitize_truncates_overlong_input_and_reports_error() {
        let long = "a".repeat(50);
        let s = sanitize_input_with(&blocklist(), &long, 32);
        assert_eq!(s.value.chars().count(), 32);
        assert_eq!(s.error.as_deref(), Some("最多 32 个字符"));
    }

    #[test]
    fn sanitize_counts_characters_not_bytes() {
        let s = sanitize_input_with(&blocklist(), "žluťoučký kůň", 13);
        assert!(s.is_ok());
        let s = sanitize_input_with(&blocklist(), "žluťoučký kůň", 4);
        assert_eq!(s.value, "žluť");
    }

    #[test]
    fn sanitize_flags_blocked_content() {
        let s = sanitize_input_with(&blocklist(), "you BadWord", 100);
        assert_eq!(s.error.as_deref(), Some(BLOCKED_CONTENT_MESSAGE));
    }

    #[test]
    fn validate_form_only_checks_present_fields() {
        let data = FormData {
            to_name: Some(" <Ana> ".into()),
            from_name: None,
            keywords: Some("x".repeat(141)),
        };
        let v = validate_form_data_with(&blocklist(), &data);
        assert!(!v.is_valid());
        assert_eq!(v.sanitized.to_name.as_deref(), Some("&lt;Ana&gt;"));
        assert!(v.sanitized.from_name.is_none());
        assert!(v.errors.contains_key("keywords"));
        assert!(!v.errors.contains_key("toName"));
        assert_eq!(v.field_errors().len(), 1);
    }
}
