use std::{fs, path::Path};

use serde::de::DeserializeOwned;

use crate::{
    config::ContentConfig,
    error::AppError,
    features::content::models::{ContentLibrary, Template, TextEntry},
    features::moderation::blocklist::{Blocklist, BlocklistFile},
};

fn read_json<T: DeserializeOwned>(path: &Path, label: &str) -> Result<T, AppError> {
    if !path.exists() {
        return Err(AppError::Internal(format!(
            "未找到{label}文件: {:?}",
            path
        )));
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Internal(format!("读取{label}文件失败 {:?}: {}", path, e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::Internal(format!("解析{label}文件失败 {:?}: {}", path, e)))
}

/// 从内容目录加载文案与模板，构建只读内容库
pub fn load_content_library(content_dir: &Path, cfg: &ContentConfig) -> Result<ContentLibrary, AppError> {
    if !content_dir.exists() {
        return Err(AppError::Internal(format!(
            "内容目录不存在: {:?}",
            content_dir
        )));
    }

    let texts: Vec<TextEntry> = read_json(&content_dir.join(&cfg.texts_file), "文案")?;
    let templates: Vec<Template> = read_json(&content_dir.join(&cfg.templates_file), "模板")?;

    if templates.is_empty() {
        return Err(AppError::Internal("模板列表为空，至少需要一个模板".into()));
    }
    for t in &texts {
        if t.text.trim().is_empty() {
            tracing::warn!("文案正文为空: {}", t.id);
        }
    }

    let library = ContentLibrary::new(texts, templates);
    tracing::info!(
        "内容库加载完成: 文案 {} 条, 模板 {} 个",
        library.texts().len(),
        library.templates().len()
    );
    Ok(library)
}

/// 加载屏蔽词表；文件缺失时返回空表并告警
pub fn load_blocklist(path: &Path) -> Result<Blocklist, AppError> {
    if !path.exists() {
        tracing::warn!("未找到屏蔽词文件 {:?}，内容审核将不生效", path);
        return Ok(Blocklist::default());
    }
    let file: BlocklistFile = read_json(path, "屏蔽词")?;
    let blocklist = Blocklist::compile(file);
    tracing::info!(
        "屏蔽词表加载完成: 词 {} 个, 正则 {} 条",
        blocklist.word_count(),
        blocklist.pattern_count()
    );
    Ok(blocklist)
}
