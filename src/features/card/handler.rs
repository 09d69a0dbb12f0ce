use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use chrono::Utc;

use crate::error::AppError;
use crate::features::content::models::Tone;
use crate::features::moderation::{MAX_LENGTHS, blocklist, escape_html};
use crate::state::AppState;

use super::models::{
    BlockCardRequest, BlockCardResponse, CleanupResponse, CreateCardRequest, CreateCardResponse,
    EventType, NewCard, PublicCard,
};
use super::token::{generate_token, is_valid_token};

/// 自定义插画只允许引用站内插画目录
const ILLUSTRATION_PREFIX: &str = "/illustrations/";

/// 校验 `Authorization: Bearer <secret>`；未配置密钥时视为服务端错误
pub(crate) fn require_bearer(
    headers: &HeaderMap,
    secret: Option<String>,
    label: &str,
) -> Result<(), AppError> {
    let Some(secret) = secret else {
        tracing::error!("{}未配置", label);
        return Err(AppError::Internal(format!("{label}未配置")));
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");
    if provided.is_empty() || provided != secret {
        return Err(AppError::Auth("未授权".into()));
    }
    Ok(())
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

#[utoipa::path(
    post,
    path = "/cards",
    summary = "创建卡片",
    description = "校验并保存卡片，同时创建草稿订单与 created 事件，返回分享 token。",
    request_body = CreateCardRequest,
    responses(
        (status = 201, description = "创建成功", body = CreateCardResponse),
        (status = 400, description = "缺少字段/语气或模板无效/长度超限", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 403, description = "包含不允许的内容", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 500, description = "存储失败", body = crate::error::ProblemDetails, content_type = "application/problem+json")
    ),
    tag = "Card"
)]
pub async fn create_card(
    State(state): State<AppState>,
    payload: Result<Json<CreateCardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateCardResponse>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::Json(e.body_text()))?;

    let (Some(template_id), Some(tone_raw), Some(message)) = (
        non_blank(req.template_id.as_deref()),
        non_blank(req.tone.as_deref()),
        non_blank(req.message_text.as_deref()),
    ) else {
        return Err(AppError::BadRequest(
            "缺少必填字段: templateId, tone, messageText".into(),
        ));
    };

    let tone: Tone = tone_raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("无效的语气: {tone_raw}")))?;

    let template = state
        .library
        .template_by_id(template_id)
        .ok_or_else(|| AppError::BadRequest(format!("模板不存在: {template_id}")))?;

    if message.chars().count() > MAX_LENGTHS.message {
        return Err(AppError::BadRequest(format!(
            "消息过长（最多 {} 个字符）",
            MAX_LENGTHS.message
        )));
    }

    let to_name = non_blank(req.to_name.as_deref());
    let from_name = non_blank(req.from_name.as_deref());

    let blocked = blocklist::contains_blocked_content(message)
        || to_name.is_some_and(blocklist::contains_blocked_content)
        || from_name.is_some_and(blocklist::contains_blocked_content);
    if blocked {
        tracing::info!("创建卡片被拒绝：命中屏蔽词");
        return Err(AppError::Forbidden("内容包含不允许的词语".into()));
    }

    if to_name.is_some_and(|n| n.chars().count() > MAX_LENGTHS.to_name)
        || from_name.is_some_and(|n| n.chars().count() > MAX_LENGTHS.from_name)
    {
        return Err(AppError::BadRequest(format!(
            "姓名过长（最多 {} 个字符）",
            MAX_LENGTHS.to_name
        )));
    }

    let image_path = non_blank(req.image_path.as_deref())
        .filter(|p| p.starts_with(ILLUSTRATION_PREFIX))
        .map(str::to_string);

    // 快照记录实际展示的插画：自选插画覆盖模板默认插画
    let mut template_snapshot = template.as_ref().clone();
    if let Some(path) = &image_path {
        template_snapshot.illustration_path = path.clone();
    }

    let now = Utc::now();
    let card = NewCard {
        token: generate_token(),
        template_snapshot,
        to_name: to_name.map(escape_html),
        from_name: if req.is_anonymous {
            None
        } else {
            from_name.map(escape_html)
        },
        is_anonymous: req.is_anonymous,
        tone,
        message_text: escape_html(message),
        image_path,
        created_at: now,
        expires_at: state.cards.ttl().map(|d| now + d),
    };

    let created = state.storage.create_card(&card).await?;
    tracing::info!(
        "卡片已创建: card_id={}, template={}, tone={}",
        created.card_id,
        card.template_snapshot.id,
        tone
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateCardResponse {
            public_url: format!("{}{}", state.cards.public_path_prefix, card.token),
            token: card.token,
            order_id: created.order_id,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/cards/{token}",
    summary = "通过分享 token 读取卡片",
    description = "只返回未封禁且未过期的卡片；读取成功会异步记录 opened 事件。",
    params(("token" = String, Path, description = "22 位分享 token")),
    responses(
        (status = 200, description = "卡片内容", body = PublicCard),
        (status = 400, description = "token 格式无效", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 404, description = "不存在/已封禁/已过期", body = crate::error::ProblemDetails, content_type = "application/problem+json")
    ),
    tag = "Card"
)]
pub async fn get_card(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PublicCard>, AppError> {
    if !is_valid_token(&token) {
        return Err(AppError::BadRequest("token 格式无效".into()));
    }

    let now = Utc::now();
    let card = state
        .storage
        .find_public_card(&token, now)
        .await?
        .ok_or_else(|| AppError::NotFound("卡片不存在或已过期".into()))?;

    // opened 事件尽力而为，不阻塞响应
    let storage = state.storage.clone();
    let card_id = card.id.clone();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    tokio::spawn(async move {
        let meta = serde_json::json!({ "userAgent": user_agent });
        if let Err(e) = storage
            .insert_event(Some(&card_id), None, EventType::Opened, &meta, now)
            .await
        {
            tracing::warn!("记录 opened 事件失败: {}", e);
        }
    });

    Ok(Json(card.into()))
}

#[utoipa::path(
    post,
    path = "/admin/block-card",
    summary = "封禁/解封卡片",
    description = "需要 `Authorization: Bearer <admin secret>`。",
    request_body = BlockCardRequest,
    security(("BearerSecret" = [])),
    responses(
        (status = 200, description = "状态已更新", body = BlockCardResponse),
        (status = 400, description = "token 缺失或格式无效", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 401, description = "密钥缺失/无效", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 404, description = "卡片不存在", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 500, description = "密钥未配置", body = crate::error::ProblemDetails, content_type = "application/problem+json")
    ),
    tag = "Admin"
)]
pub async fn block_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<BlockCardRequest>, JsonRejection>,
) -> Result<Json<BlockCardResponse>, AppError> {
    require_bearer(&headers, state.cards.resolve_admin_secret(), "管理员密钥")?;
    let Json(req) = payload.map_err(|e| AppError::Json(e.body_text()))?;

    let token = non_blank(req.token.as_deref())
        .ok_or_else(|| AppError::BadRequest("缺少 token".into()))?;
    if !is_valid_token(token) {
        return Err(AppError::BadRequest("token 格式无效".into()));
    }

    let card = state
        .storage
        .find_card_by_token(token)
        .await?
        .ok_or_else(|| AppError::NotFound("卡片不存在".into()))?;

    state.storage.set_blocked(&card.id, req.block).await?;

    let kind = if req.block {
        EventType::Blocked
    } else {
        EventType::Unblocked
    };
    let meta = serde_json::json!({
        "previousState": card.is_blocked,
        "newState": req.block,
    });
    state
        .storage
        .insert_event(Some(&card.id), None, kind, &meta, Utc::now())
        .await?;
    tracing::info!("卡片 {} 状态更新: {}", card.id, kind.as_str());

    Ok(Json(BlockCardResponse {
        message: if req.block {
            "卡片已封禁".into()
        } else {
            "卡片已解封".into()
        },
        token: card.token,
        is_blocked: req.block,
    }))
}

#[utoipa::path(
    post,
    path = "/cleanup",
    summary = "清理过期卡片",
    description = "需要 `Authorization: Bearer <cleanup secret>`；同样支持 GET，便于定时任务调用。",
    security(("BearerSecret" = [])),
    responses(
        (status = 200, description = "清理完成", body = CleanupResponse),
        (status = 401, description = "密钥缺失/无效", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 500, description = "密钥未配置/清理失败", body = crate::error::ProblemDetails, content_type = "application/problem+json")
    ),
    tag = "Admin"
)]
pub async fn cleanup_expired(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, AppError> {
    require_bearer(&headers, state.cards.resolve_cleanup_secret(), "清理密钥")?;

    let now = Utc::now();
    let deleted = state.storage.cleanup_expired(now).await?;
    if deleted > 0 {
        tracing::info!("已清理过期卡片 {} 张", deleted);
    }

    Ok(Json(CleanupResponse {
        message: if deleted == 0 {
            "没有需要清理的卡片".into()
        } else {
            format!("已清理 {deleted} 张过期卡片")
        },
        deleted,
        timestamp: now,
    }))
}

/// 卡片生命周期路由
pub fn create_card_router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/cards", post(create_card))
        .route("/cards/:token", get(get_card))
        .route("/admin/block-card", post(block_card))
        .route("/cleanup", get(cleanup_expired).post(cleanup_expired))
}

#[cfg(test)]
mod tests {
    use super::require_bearer;
    use crate::error::AppError;
    use axum::http::{HeaderMap, HeaderValue, header};

    fn headers(v: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        h
    }

    #[test]
    fn bearer_requires_configured_secret() {
        let err = require_bearer(&headers("Bearer x"), None, "管理员密钥").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn bearer_rejects_missing_or_wrong_secret() {
        let secret = Some("s3cret".to_string());
        assert!(matches!(
            require_bearer(&HeaderMap::new(), secret.clone(), "k"),
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            require_bearer(&headers("Bearer nope"), secret.clone(), "k"),
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            require_bearer(&headers("s3cret"), secret.clone(), "k"),
            Err(AppError::Auth(_))
        ));
        assert!(require_bearer(&headers("Bearer s3cret"), secret, "k").is_ok());
    }
}
