use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::shutdown::ShutdownHandle;

use super::storage::CardStorage;

/// 启动后台过期清理任务，收到退出信号后结束
pub fn spawn_expiry_sweeper(
    storage: Arc<CardStorage>,
    period: Duration,
    mut shutdown: ShutdownHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("过期清理任务已启动，间隔 {}s", period.as_secs());
        loop {
            tokio::select! {
                _ = ticker.tick() => sweep_once(&storage).await,
                reason = shutdown.wait() => {
                    tracing::info!("过期清理任务退出: {:?}", reason);
                    break;
                }
            }
        }
    })
}

async fn sweep_once(storage: &CardStorage) {
    match storage.cleanup_expired(Utc::now()).await {
        Ok(0) => tracing::debug!("过期清理：无过期卡片"),
        Ok(n) => tracing::info!("过期清理：删除 {} 张卡片", n),
        Err(e) => tracing::warn!("过期清理失败: {}", e),
    }
}
