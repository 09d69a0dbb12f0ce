//! 文案挑选：按语气过滤、按关键词打分，支持“换一条”。
//!
//! 打分规则：
//! - 关键词先转小写，再按空白/逗号切分，丢弃空 token；
//! - 每个 token 命中任一标签（子串，忽略大小写）+2；
//! - 每个 token 命中正文（子串，忽略大小写）+1；
//! - 最高分为 0 时在候选中均匀随机；
//! - 最高分并列时取库内顺序靠前者。

use std::{collections::HashSet, sync::Arc};

use rand::{Rng, seq::SliceRandom};

use super::models::{ContentLibrary, TextEntry, Tone};

/// 一次挑选的查询条件
#[derive(Debug, Clone)]
pub struct SelectionQuery {
    pub tone: Tone,
    pub keywords: Option<String>,
    pub exclude_ids: HashSet<String>,
}

impl SelectionQuery {
    pub fn new(tone: Tone) -> Self {
        Self {
            tone,
            keywords: None,
            exclude_ids: HashSet::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    pub fn excluding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_ids.extend(ids.into_iter().map(Into::into));
        self
    }
}

/// 带分数的候选（仅在一次挑选中存在）
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub entry: Arc<TextEntry>,
    pub score: u32,
}

/// 关键词切分：小写后按空白与逗号切分
pub fn tokenize_keywords(keywords: &str) -> Vec<String> {
    keywords
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 计算单条文案的分数；`tokens` 必须已经是小写
pub fn score_entry(entry: &TextEntry, tokens: &[String]) -> u32 {
    let tags: Vec<String> = entry.tags.iter().map(|t| t.to_lowercase()).collect();
    let text = entry.text.to_lowercase();

    tokens
        .iter()
        .map(|token| {
            let mut s = 0;
            if tags.iter().any(|tag| tag.contains(token.as_str())) {
                s += 2;
            }
            if text.contains(token.as_str()) {
                s += 1;
            }
            s
        })
        .sum()
}

/// 按库内顺序为候选打分
pub fn score_candidates(candidates: &[Arc<TextEntry>], keywords: &str) -> Vec<ScoredCandidate> {
    let tokens = tokenize_keywords(keywords);
    candidates
        .iter()
        .map(|entry| ScoredCandidate {
            score: score_entry(entry, &tokens),
            entry: Arc::clone(entry),
        })
        .collect()
}

/// 挑选一条文案；库中没有该语气的文案时返回 `None`
pub fn select_text(library: &ContentLibrary, query: &SelectionQuery) -> Option<Arc<TextEntry>> {
    select_text_with_rng(library, query, &mut rand::thread_rng())
}

/// 同 [`select_text`]，随机源由调用方注入
pub fn select_text_with_rng<R: Rng + ?Sized>(
    library: &ContentLibrary,
    query: &SelectionQuery,
    rng: &mut R,
) -> Option<Arc<TextEntry>> {
    let candidates: Vec<Arc<TextEntry>> = library
        .texts_by_tone(query.tone)
        .filter(|t| !query.exclude_ids.contains(&t.id))
        .cloned()
        .collect();

    if candidates.is_empty() {
        // 排除后为空：忽略排除条件，在该语气全部文案中随机
        let all: Vec<&Arc<TextEntry>> = library.texts_by_tone(query.tone).collect();
        let picked = all.choose(rng).map(|&t| Arc::clone(t));
        if picked.is_none() {
            tracing::debug!("语气 {} 下没有任何文案", query.tone);
        }
        return picked;
    }

    let keywords = query.keywords.as_deref().map(str::trim).unwrap_or("");
    if keywords.is_empty() {
        return candidates.choose(rng).cloned();
    }

    let scored = score_candidates(&candidates, keywords);
    let mut best: Option<&ScoredCandidate> = None;
    for c in &scored {
        if best.is_none_or(|b| c.score > b.score) {
            best = Some(c);
        }
    }

    match best {
        Some(b) if b.score > 0 => Some(Arc::clone(&b.entry)),
        _ => candidates.choose(rng).cloned(),
    }
}

/// 换一条：把当前文案加入排除集合后重新挑选
pub fn reshuffle_text(
    library: &ContentLibrary,
    query: &SelectionQuery,
    current_id: &str,
) -> Option<Arc<TextEntry>> {
    reshuffle_text_with_rng(library, query, current_id, &mut rand::thread_rng())
}

/// 同 [`reshuffle_text`]，随机源由调用方注入
pub fn reshuffle_text_with_rng<R: Rng + ?Sized>(
    library: &ContentLibrary,
    query: &SelectionQuery,
    current_id: &str,
    rng: &mut R,
) -> Option<Arc<TextEntry>> {
    let mut q = query.clone();
    q.exclude_ids.insert(current_id.to_string());
    select_text_with_rng(library, &q, rng)
}
