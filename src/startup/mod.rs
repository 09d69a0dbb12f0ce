/// 启动检查工具模块
pub mod checks;
/// 内容库与屏蔽词加载器（texts.json / templates.json / blocklist.json）
pub mod content_loader;

pub use checks::run_startup_checks;
