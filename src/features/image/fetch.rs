//! 图片拉取：把卡片里引用的插画读成字节，供内联为 data URL。

use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use moka::future::Cache;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FetchedImage {
    pub fn to_data_url(&self) -> String {
        to_data_url(&self.mime, &self.bytes)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("非法图片路径: {0}")]
    InvalidPath(String),
    #[error("图片不存在: {0}")]
    NotFound(String),
    #[error("读取图片失败: {0}")]
    Io(String),
    #[error("远程图片请求失败: {0}")]
    Http(String),
    #[error("远程图片返回状态码 {status}: {url}")]
    Status { status: u16, url: String },
}

/// 图片来源抽象；导出流程只依赖这个接口
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedImage, FetchError>> + Send;
}

/// 默认实现：站内路径读 public 目录，http(s) 走共享 HTTP Client
#[derive(Clone)]
pub struct AssetFetcher {
    public_dir: PathBuf,
    client: reqwest::Client,
    cache: Cache<String, FetchedImage>,
}

impl AssetFetcher {
    pub fn new(public_dir: impl Into<PathBuf>, client: reqwest::Client, cache_max_bytes: u64) -> Self {
        let cache = Cache::builder()
            .weigher(|_k, v: &FetchedImage| v.bytes.len().try_into().unwrap_or(u32::MAX))
            .max_capacity(cache_max_bytes)
            .time_to_live(Duration::from_secs(10 * 60))
            .build();
        Self {
            public_dir: public_dir.into(),
            client,
            cache,
        }
    }

    async fn fetch_uncached(&self, url: &str) -> Result<FetchedImage, FetchError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_remote(url).await;
        }
        let path = resolve_public_path(&self.public_dir, url)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(url.to_string())
            } else {
                FetchError::Io(format!("{}: {e}", path.display()))
            }
        })?;
        Ok(FetchedImage {
            mime: guess_mime(url).to_string(),
            bytes,
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let header_mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"));
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(FetchedImage {
            mime: header_mime.unwrap_or_else(|| guess_mime(url).to_string()),
            bytes: bytes.to_vec(),
        })
    }
}

impl ImageFetcher for AssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        if let Some(hit) = self.cache.get(url).await {
            return Ok(hit);
        }
        let fetched = self.fetch_uncached(url).await?;
        self.cache.insert(url.to_string(), fetched.clone()).await;
        Ok(fetched)
    }
}

/// 把站内绝对路径映射到 public 目录；拒绝 `..` 等越界路径
pub fn resolve_public_path(public_dir: &Path, url: &str) -> Result<PathBuf, FetchError> {
    let path_part = url.split(['?', '#']).next().unwrap_or("");
    let relative = path_part
        .strip_prefix('/')
        .ok_or_else(|| FetchError::InvalidPath(url.to_string()))?;
    let relative = Path::new(relative);
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(FetchError::InvalidPath(url.to_string()));
    }
    Ok(public_dir.join(relative))
}

/// 按扩展名猜测 MIME
pub fn guess_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let ext = path
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", base64_engine.encode(bytes))
}
