use resvg::usvg::fontdb;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::error::ExportError;

// 全局字体数据库单例
static GLOBAL_FONT_DB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

/// 初始化字体数据库：系统字体 + 指定目录下的 ttf/otf
fn init_font_db(fonts_dir: &Path) -> Arc<fontdb::Database> {
    let mut font_db = fontdb::Database::new();
    font_db.load_system_fonts();

    if fonts_dir.exists() {
        if let Ok(entries) = fs::read_dir(fonts_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file()
                    && (path.extension() == Some("ttf".as_ref())
                        || path.extension() == Some("otf".as_ref()))
                {
                    if let Err(e) = font_db.load_font_file(&path) {
                        tracing::error!("加载字体文件失败 '{}': {}", path.display(), e);
                    }
                }
            }
        }
    }

    tracing::debug!("字体数据库就绪: {} 个字形集", font_db.len());
    Arc::new(font_db)
}

/// 获取全局字体数据库；目录只在首次调用时生效
pub fn get_global_font_db(fonts_dir: &Path) -> Arc<fontdb::Database> {
    GLOBAL_FONT_DB
        .get_or_init(|| init_font_db(fonts_dir))
        .clone()
}

/// 等待字体就绪（首次加载在阻塞线程中完成）
pub async fn fonts_ready(fonts_dir: PathBuf) -> Result<Arc<fontdb::Database>, ExportError> {
    if let Some(db) = GLOBAL_FONT_DB.get() {
        return Ok(db.clone());
    }
    tokio::task::spawn_blocking(move || get_global_font_db(&fonts_dir))
        .await
        .map_err(|e| ExportError::Task(e.to_string()))
}
