use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3940,
        }
    }
}

/// 内容库配置（文案、模板、屏蔽词与插画目录）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// 内容根目录
    #[serde(default = "ContentConfig::default_dir")]
    pub dir: String,
    /// 文案文件（相对内容根目录）
    #[serde(default = "ContentConfig::default_texts_file")]
    pub texts_file: String,
    /// 模板文件（相对内容根目录）
    #[serde(default = "ContentConfig::default_templates_file")]
    pub templates_file: String,
    /// 屏蔽词文件（相对内容根目录）
    #[serde(default = "ContentConfig::default_blocklist_file")]
    pub blocklist_file: String,
    /// 对外公开的静态目录，`/illustrations/*` 从这里解析
    #[serde(default = "ContentConfig::default_public_dir")]
    pub public_dir: String,
}

impl ContentConfig {
    fn default_dir() -> String {
        "./content".to_string()
    }
    fn default_texts_file() -> String {
        "texts/texts.json".to_string()
    }
    fn default_templates_file() -> String {
        "templates.json".to_string()
    }
    fn default_blocklist_file() -> String {
        "blocklist.json".to_string()
    }
    fn default_public_dir() -> String {
        "./public".to_string()
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            texts_file: Self::default_texts_file(),
            templates_file: Self::default_templates_file(),
            blocklist_file: Self::default_blocklist_file(),
            public_dir: Self::default_public_dir(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API 路由前缀
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    /// 是否允许携带凭证（Cookie/Authorization）
    #[serde(default)]
    pub allow_credentials: bool,
    /// 预检缓存时间（秒）
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        false
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

/// SQLite 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 数据库文件路径
    #[serde(default = "StorageConfig::default_sqlite_path")]
    pub sqlite_path: String,
    /// 是否启用 WAL
    #[serde(default = "StorageConfig::default_sqlite_wal")]
    pub sqlite_wal: bool,
}

impl StorageConfig {
    fn default_sqlite_path() -> String {
        "./resources/cards.db".to_string()
    }
    fn default_sqlite_wal() -> bool {
        true
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Self::default_sqlite_path(),
            sqlite_wal: Self::default_sqlite_wal(),
        }
    }
}

/// 卡片生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardsConfig {
    /// 卡片有效期（天），0 表示永不过期
    #[serde(default = "CardsConfig::default_ttl_days")]
    pub ttl_days: u32,
    /// 公开访问路径前缀，token 直接拼接在后面
    #[serde(default = "CardsConfig::default_public_path_prefix")]
    pub public_path_prefix: String,
    /// 管理员密钥（封禁/解封）；留空时回退到环境变量 ADMIN_SECRET
    #[serde(default)]
    pub admin_secret: Option<String>,
    /// 过期清理密钥；留空时回退到环境变量 CLEANUP_SECRET
    #[serde(default)]
    pub cleanup_secret: Option<String>,
    /// 后台过期清理间隔（秒），0 表示只依赖清理接口
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl CardsConfig {
    fn default_ttl_days() -> u32 {
        30
    }
    fn default_public_path_prefix() -> String {
        "/c/".to_string()
    }

    /// 卡片有效期；`None` 表示不过期
    pub fn ttl(&self) -> Option<chrono::Duration> {
        (self.ttl_days > 0).then(|| chrono::Duration::days(i64::from(self.ttl_days)))
    }

    /// 后台清理周期；`None` 表示未启用
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// 解析管理员密钥（配置优先，其次环境变量）
    pub fn resolve_admin_secret(&self) -> Option<String> {
        resolve_secret(self.admin_secret.as_deref(), "ADMIN_SECRET")
    }

    /// 解析清理任务密钥（配置优先，其次环境变量）
    pub fn resolve_cleanup_secret(&self) -> Option<String> {
        resolve_secret(self.cleanup_secret.as_deref(), "CLEANUP_SECRET")
    }
}

fn resolve_secret(configured: Option<&str>, env_key: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_key)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

impl Default for CardsConfig {
    fn default() -> Self {
        Self {
            ttl_days: Self::default_ttl_days(),
            public_path_prefix: Self::default_public_path_prefix(),
            admin_secret: None,
            cleanup_secret: None,
            sweep_interval_secs: 0,
        }
    }
}

/// 卡片导出（快照 + 栅格化）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// 设备像素比上限
    #[serde(default = "ExportConfig::default_max_scale")]
    pub max_scale: f32,
    /// 是否优先速度渲染（OptimizeSpeed），提升栅格化性能，可能略降画质
    #[serde(default)]
    pub optimize_speed: bool,
    /// 额外字体目录（ttf/otf），系统字体总会加载
    #[serde(default = "ExportConfig::default_fonts_dir")]
    pub fonts_dir: String,
    /// 远程图片拉取超时（秒）
    #[serde(default = "ExportConfig::default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// 并发栅格化许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 内联图片缓存最大容量（字节），按 data URL 长度加权
    #[serde(default = "ExportConfig::default_inline_cache_max_bytes")]
    pub inline_cache_max_bytes: u64,
}

impl ExportConfig {
    fn default_max_scale() -> f32 {
        2.0
    }
    fn default_fonts_dir() -> String {
        "resources/fonts".to_string()
    }
    fn default_fetch_timeout_secs() -> u64 {
        15
    }
    fn default_inline_cache_max_bytes() -> u64 {
        32 * 1024 * 1024
    }

    /// 远程图片拉取超时
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// 实际并发许可数
    pub fn parallelism(&self) -> usize {
        match self.max_parallel as usize {
            0 => num_cpus::get(),
            n => n,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_scale: Self::default_max_scale(),
            optimize_speed: false,
            fonts_dir: Self::default_fonts_dir(),
            fetch_timeout_secs: Self::default_fetch_timeout_secs(),
            max_parallel: 0,
            inline_cache_max_bytes: Self::default_inline_cache_max_bytes(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 是否启用强制退出
    #[serde(default = "ShutdownConfig::default_force")]
    pub force_quit: bool,
    /// 强制退出前的等待时间（秒）
    #[serde(default = "ShutdownConfig::default_force_delay")]
    pub force_delay_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }
    fn default_force() -> bool {
        true
    }
    fn default_force_delay() -> u64 {
        10
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 获取强制退出等待时间
    pub fn force_delay_duration(&self) -> Duration {
        Duration::from_secs(self.force_delay_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
            force_quit: Self::default_force(),
            force_delay_secs: Self::default_force_delay(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// SQLite 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 卡片生命周期配置
    #[serde(default)]
    pub cards: CardsConfig,
    /// 导出配置
    #[serde(default)]
    pub export: ExportConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::get_config_path())
    }

    /// 从指定路径加载配置；文件缺失时使用默认值
    pub fn load_from(config_path: PathBuf) -> Result<Self, ConfigError> {
        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP__CARDS__TTL_DAYS
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 内容根目录
    pub fn content_path(&self) -> PathBuf {
        PathBuf::from(&self.content.dir)
    }

    /// 公开静态目录
    pub fn public_path(&self) -> PathBuf {
        PathBuf::from(&self.content.public_dir)
    }
}
