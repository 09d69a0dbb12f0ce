/// 卡片生命周期：创建、公开读取、屏蔽与过期清理
pub mod card;
/// 文案库、模板与文案挑选
pub mod content;
/// 健康检查
pub mod health;
/// 卡片渲染与图片导出
pub mod image;
/// 输入清洗与内容审核
pub mod moderation;
