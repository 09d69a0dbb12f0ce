use crate::config::AppConfig;
use crate::error::AppError;
use std::path::Path;

/// 执行启动检查
///
/// 1. 内容目录必须存在
/// 2. 公开静态目录、字体目录缺失仅告警
/// 3. 预热字体库，降低首次导出的长尾延迟
pub async fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    ensure_content_folder(&config.content_path())?;
    warn_if_missing("公开静态目录", &config.public_path());
    warn_if_missing("字体目录", Path::new(&config.export.fonts_dir));

    let fonts_dir = config.export.fonts_dir.clone();
    let t_prewarm = std::time::Instant::now();
    match tokio::task::spawn_blocking(move || {
        crate::features::image::fonts::get_global_font_db(Path::new(&fonts_dir)).len()
    })
    .await
    {
        Ok(n) => tracing::info!(
            "字体库预热完成: {} 个字体, {}ms",
            n,
            t_prewarm.elapsed().as_millis()
        ),
        Err(e) => tracing::warn!("字体库预热任务失败: {}", e),
    }

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

fn ensure_content_folder(path: &Path) -> Result<(), AppError> {
    if !path.is_dir() {
        return Err(AppError::Internal(format!("内容目录不存在: {:?}", path)));
    }
    tracing::info!("✅ 内容目录已存在: {:?}", path);
    Ok(())
}

fn warn_if_missing(label: &str, path: &Path) {
    if path.exists() {
        tracing::info!("✅ {}已存在: {:?}", label, path);
    } else {
        tracing::warn!("⚠️ 未找到{}: {:?}", label, path);
    }
}
