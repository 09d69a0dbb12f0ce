use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Router, routing::get};
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::cors::build_cors_layer;
use crate::features::{card, content, health};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// 站内插画的公开挂载点
pub const ILLUSTRATIONS_ROUTE: &str = "/illustrations";

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 图片本身已是压缩格式；SVG 插画与 JSON 压缩收益明显
    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
}

/// 插画静态资源加长缓存；编辑器与卡片页都会反复引用
async fn illustration_cache_control(req: Request, next: Next) -> Response {
    let is_illustration = req.uri().path().starts_with(ILLUSTRATIONS_ROUTE);
    let mut res = next.run(req).await;
    if is_illustration
        && res.status().is_success()
        && res.headers().get(header::CACHE_CONTROL).is_none()
    {
        res.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=86400"),
        );
    }
    res
}

/// 业务路由（不含前缀），便于测试直接挂载
pub fn api_router() -> Router<AppState> {
    Router::<AppState>::new()
        .merge(content::create_content_router())
        .merge(card::create_card_router())
}

/// 组装完整应用：业务接口、健康检查、插画静态目录、文档与全局中间件
pub fn build_app(state: AppState, config: &AppConfig) -> Router {
    let illustrations = config.public_path().join("illustrations");
    let mut app = Router::<AppState>::new()
        .route("/health", get(health::health_check))
        .nest_service(ILLUSTRATIONS_ROUTE, ServeDir::new(illustrations))
        .nest(&config.api.prefix, api_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(axum::middleware::from_fn(illustration_cache_control));

    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }

    app.layer(CompressionLayer::new().compress_when(compression_predicate()))
        .layer(axum::middleware::from_fn(request_id_middleware))
}
