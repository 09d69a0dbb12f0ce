/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 启动检查与内容加载
pub mod startup;

/// 功能聚合模块
pub mod features;

/// 应用状态聚合模块
pub mod state;

/// 路由与全局中间件组装
pub mod app;

/// OpenAPI 文档
pub mod openapi;

/// 优雅退出管理模块
pub mod shutdown;

/// 插画抓取用的 HTTP Client
pub mod http;

/// CORS 中间件
pub mod cors;

/// request_id 中间件
pub mod request_id;

// 导出常用类型供外部使用
pub use config::AppConfig;
pub use error::{AppError, ExportError};
pub use shutdown::{ShutdownHandle, ShutdownManager, ShutdownReason};
