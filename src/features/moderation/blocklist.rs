use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

/// 进程级屏蔽词表（启动时初始化一次，之后只读）
static BLOCKLIST: OnceCell<Blocklist> = OnceCell::new();

/// 屏蔽词文件结构：`{ "words": [...], "patterns": [...] }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlocklistFile {
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// 编译后的屏蔽词表
#[derive(Debug, Default)]
pub struct Blocklist {
    words: Vec<String>,
    patterns: Vec<Regex>,
}

impl Blocklist {
    /// 编译屏蔽词表；非法正则会被跳过并告警
    pub fn compile(file: BlocklistFile) -> Self {
        let words = file
            .words
            .into_iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        let patterns = file
            .patterns
            .iter()
            .filter_map(
                |p| match RegexBuilder::new(p).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!("忽略非法屏蔽正则 '{}': {}", p, e);
                        None
                    }
                },
            )
            .collect();

        Self { words, patterns }
    }

    /// 文本是否命中屏蔽词（子串，忽略大小写）或屏蔽正则
    pub fn contains_blocked_content(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        self.words.iter().any(|w| lower.contains(w.as_str()))
            || self.patterns.iter().any(|re| re.is_match(text))
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

/// 初始化全局屏蔽词表；重复初始化返回错误
pub fn init_global(blocklist: Blocklist) -> Result<(), String> {
    BLOCKLIST
        .set(blocklist)
        .map_err(|_| "屏蔽词表已经被初始化".to_string())
}

/// 全局屏蔽词表；未初始化时视为空表
pub fn global() -> &'static Blocklist {
    BLOCKLIST.get_or_init(|| {
        tracing::warn!("屏蔽词表未初始化，使用空表");
        Blocklist::default()
    })
}

/// 使用全局屏蔽词表检查文本
pub fn contains_blocked_content(text: &str) -> bool {
    global().contains_blocked_content(text)
}
