use std::sync::Arc;

use crate::config::CardsConfig;
use crate::features::card::storage::CardStorage;
use crate::features::content::models::ContentLibrary;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 启动时加载的文案与模板
    pub library: Arc<ContentLibrary>,
    /// 卡片 / 订单 / 事件存储
    pub storage: Arc<CardStorage>,
    /// 卡片生命周期配置（有效期、密钥）
    pub cards: Arc<CardsConfig>,
}
