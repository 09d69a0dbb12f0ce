//! 跨域：编辑器页面与接口分开部署时，浏览器需要读取文案、创建卡片。
//!
//! 未配置方法 / 请求头时使用贺卡接口实际用到的集合：
//! `GET`（文案、卡片读取）、`POST`（创建卡片、管理端），
//! `content-type`、`authorization`（管理端 Bearer）与 `x-request-id`。

use axum::http::{HeaderName, HeaderValue, Method, header};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;
use crate::request_id::REQUEST_ID_HEADER;

const DEFAULT_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// 一项允许列表：`*` 或具体取值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowed<T> {
    Any,
    List(Vec<T>),
}

impl<T> Allowed<T> {
    fn is_any(&self) -> bool {
        matches!(self, Allowed::Any)
    }
}

/// 从配置解析出的跨域策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    pub origins: Allowed<HeaderValue>,
    pub methods: Allowed<Method>,
    pub headers: Allowed<HeaderName>,
    pub allow_credentials: bool,
    pub max_age: Option<Duration>,
}

impl CorsPolicy {
    /// 未启用或配置无效时返回 None（无效配置会记录日志）
    pub fn from_config(cors: &CorsConfig) -> Option<Self> {
        if !cors.enabled {
            return None;
        }

        let origins = parse_allowed("allowed_origins", &cors.allowed_origins, |v| {
            HeaderValue::from_str(v.trim_end_matches('/')).ok()
        });
        if matches!(&origins, Allowed::List(list) if list.is_empty()) {
            tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
            return None;
        }

        let methods = match parse_allowed("allowed_methods", &cors.allowed_methods, |v| {
            Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
        }) {
            Allowed::List(list) if list.is_empty() => Allowed::List(DEFAULT_METHODS.to_vec()),
            other => other,
        };

        let headers = match parse_allowed("allowed_headers", &cors.allowed_headers, |v| {
            HeaderName::from_bytes(v.to_ascii_lowercase().as_bytes()).ok()
        }) {
            Allowed::List(list) if list.is_empty() => Allowed::List(default_headers()),
            other => other,
        };

        if cors.allow_credentials && (origins.is_any() || methods.is_any() || headers.is_any()) {
            tracing::error!("CORS 配置无效：allow_credentials=true 不能与 \"*\" 同时使用，已跳过启用");
            return None;
        }

        Some(Self {
            origins,
            methods,
            headers,
            allow_credentials: cors.allow_credentials,
            max_age: cors
                .max_age_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    pub fn into_layer(self) -> CorsLayer {
        let origin = match self.origins {
            Allowed::Any => AllowOrigin::from(Any),
            Allowed::List(list) => AllowOrigin::list(list),
        };
        let methods = match self.methods {
            Allowed::Any => AllowMethods::from(Any),
            Allowed::List(list) => AllowMethods::list(list),
        };
        let headers = match self.headers {
            Allowed::Any => AllowHeaders::from(Any),
            Allowed::List(list) => AllowHeaders::list(list),
        };

        let mut layer = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(headers)
            .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
            .allow_credentials(self.allow_credentials);
        if let Some(max_age) = self.max_age {
            layer = layer.max_age(max_age);
        }
        layer
    }
}

/// 根据配置构建 CORS 中间件
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    CorsPolicy::from_config(cors).map(CorsPolicy::into_layer)
}

fn default_headers() -> Vec<HeaderName> {
    vec![
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(REQUEST_ID_HEADER),
    ]
}

fn parse_allowed<T>(
    label: &str,
    values: &[String],
    parse: impl Fn(&str) -> Option<T>,
) -> Allowed<T> {
    let mut list = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            return Allowed::Any;
        }
        match parse(value) {
            Some(parsed) => list.push(parsed),
            None => tracing::warn!("CORS {} 含无效值: {}", label, value),
        }
    }
    Allowed::List(list)
}
