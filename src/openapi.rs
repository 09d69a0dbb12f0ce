use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::{ServerBuilder, ServerVariableBuilder};
use utoipa::{Modify, OpenApi};

/// 管理端（封禁、过期清理）使用的 `Authorization: Bearer <secret>` 安全定义。
struct BearerSecretSecurity;

impl Modify for BearerSecretSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "BearerSecret",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// 业务接口挂载在 `config.api.prefix` 下，`/health` 在根路径。
struct ApiServers;

impl Modify for ApiServers {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let api = ServerBuilder::new()
            .url("{api_prefix}")
            .description(Some("业务接口（默认 /api）"))
            .parameter(
                "api_prefix",
                ServerVariableBuilder::new()
                    .default_value("/api")
                    .description(Some("业务接口前缀：对应 config.api.prefix（APP__API__PREFIX）")),
            )
            .build();
        let root = ServerBuilder::new()
            .url("/")
            .description(Some("根路径（/health）"))
            .build();
        openapi.servers = Some(vec![api, root]);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::content::handler::list_templates,
        crate::features::content::handler::list_texts,
        crate::features::content::handler::select,
        crate::features::content::handler::reshuffle,
        crate::features::card::handler::create_card,
        crate::features::card::handler::get_card,
        crate::features::card::handler::block_card,
        crate::features::card::handler::cleanup_expired,
    ),
    components(
        schemas(
            crate::error::ProblemDetails,
            crate::error::ProblemFieldError,
            crate::features::health::HealthResponse,
            crate::features::content::models::Tone,
            crate::features::content::models::TextEntry,
            crate::features::content::models::StyleTokens,
            crate::features::content::models::Template,
            crate::features::content::handler::SelectionResponse,
            crate::features::card::models::PublicCard,
            crate::features::card::models::CreateCardRequest,
            crate::features::card::models::CreateCardResponse,
            crate::features::card::models::BlockCardRequest,
            crate::features::card::models::BlockCardResponse,
            crate::features::card::models::CleanupResponse,
        )
    ),
    modifiers(&BearerSecretSecurity, &ApiServers),
    tags(
        (name = "Content", description = "文案库与模板：按语气浏览、按关键词挑选、换一条。"),
        (name = "Card", description = "卡片生命周期：创建与公开读取。"),
        (name = "Admin", description = "管理端：封禁/解封与过期清理，需要 Bearer 密钥。"),
        (name = "Health", description = "健康检查：服务探活与数据库连通性。"),
    ),
    info(
        title = "Valentine Backend API",
        version = env!("CARGO_PKG_VERSION"),
        description = "贺卡服务 API（Axum + utoipa）。除 /health 外，业务接口挂载在 `config.api.prefix`（默认 /api）下，paths 不包含该前缀。"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn document_lists_card_and_content_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/cards", "/cards/{token}", "/texts/select", "/cleanup"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = doc.components.expect("components").security_schemes;
        assert!(schemes.contains_key("BearerSecret"));
    }
}
