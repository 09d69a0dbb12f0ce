//! 优雅退出协调
//!
//! 监听 SIGINT / SIGTERM（Windows 下为 Ctrl+C），把退出原因广播给 HTTP 服务
//! 与后台任务。

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断信号 (Ctrl+C)
    Interrupt,
    /// 终止信号 (SIGTERM)
    Terminate,
    /// 应用主动请求退出
    Application,
}

/// 优雅退出错误类型
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("信号设置失败: {0}")]
    SignalSetup(String),

    #[error("优雅退出超时")]
    Timeout,
}

/// 优雅退出管理器；克隆后共享同一个退出状态
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// 触发退出；只有第一次触发生效
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            info!("触发优雅退出: {:?}", reason);
        } else {
            debug!("重复的退出信号被忽略: {:?}", reason);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// 等待退出信号；已触发时立即返回
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        self.handle().wait().await
    }

    /// 为后台任务创建退出句柄
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// 启动信号监听任务
    pub async fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let manager = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigint.recv() => manager.trigger_shutdown(ShutdownReason::Interrupt),
                    _ = sigterm.recv() => manager.trigger_shutdown(ShutdownReason::Terminate),
                }
            });
            info!("信号处理器已启动 (SIGINT/SIGTERM)");
        }

        #[cfg(windows)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("监听Ctrl+C信号失败: {}", e);
                    return;
                }
                manager.trigger_shutdown(ShutdownReason::Interrupt);
            });
            info!("信号处理器已启动 (Ctrl+C)");
        }

        Ok(())
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 退出句柄，供需要在退出时收尾的后台任务持有
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownHandle {
    /// 等待退出信号
    pub async fn wait(&mut self) -> ShutdownReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(ShutdownReason::Application),
            // 管理器已被丢弃，视为应用退出
            Err(_) => ShutdownReason::Application,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// 带超时执行收尾操作
    pub async fn cleanup_with_timeout<F, T>(
        &self,
        cleanup: F,
        limit: Duration,
    ) -> Result<T, ShutdownError>
    where
        F: Future<Output = T>,
    {
        timeout(limit, cleanup).await.map_err(|_| {
            error!("收尾操作超时 ({}s)", limit.as_secs());
            ShutdownError::Timeout
        })
    }
}
