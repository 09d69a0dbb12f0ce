use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};

use crate::error::AppError;
use crate::features::moderation::MAX_LENGTHS;
use crate::state::AppState;

use super::models::{Template, TextEntry, Tone};
use super::selector::{SelectionQuery, reshuffle_text, select_text};

/// 挑选结果；该语气没有任何文案时 `entry` 为 null，前端显示占位文案
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct SelectionResponse {
    pub entry: Option<TextEntry>,
}

#[derive(serde::Deserialize)]
pub struct TextsQuery {
    tone: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct SelectQuery {
    tone: Option<String>,
    keywords: Option<String>,
    /// 逗号分隔的排除 id
    exclude: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct ReshuffleQuery {
    tone: Option<String>,
    keywords: Option<String>,
    current: Option<String>,
}

fn parse_tone(raw: Option<&str>) -> Result<Tone, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("缺少查询参数 tone".into()))?;
    raw.parse().map_err(AppError::BadRequest)
}

fn build_query(tone: Tone, keywords: Option<String>) -> Result<SelectionQuery, AppError> {
    let mut q = SelectionQuery::new(tone);
    if let Some(k) = keywords {
        if k.chars().count() > MAX_LENGTHS.keywords {
            return Err(AppError::Validation(format!(
                "keywords 最多 {} 个字符",
                MAX_LENGTHS.keywords
            )));
        }
        q = q.with_keywords(k);
    }
    Ok(q)
}

fn to_response(entry: Option<Arc<TextEntry>>) -> Json<SelectionResponse> {
    Json(SelectionResponse {
        entry: entry.map(|e| e.as_ref().clone()),
    })
}

#[utoipa::path(
    get,
    path = "/templates",
    summary = "模板列表",
    responses((status = 200, description = "全部模板", body = [Template])),
    tag = "Content"
)]
pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<Template>> {
    Json(
        state
            .library
            .templates()
            .iter()
            .map(|t| t.as_ref().clone())
            .collect(),
    )
}

#[utoipa::path(
    get,
    path = "/texts",
    summary = "按语气列出文案（画廊）",
    params(("tone" = String, Query, description = "cute | funny | spicy | office | taylor")),
    responses(
        (status = 200, description = "该语气的全部文案（库内顺序）", body = [TextEntry]),
        (status = 400, description = "缺少或未知的语气", body = crate::error::ProblemDetails, content_type = "application/problem+json")
    ),
    tag = "Content"
)]
pub async fn list_texts(
    State(state): State<AppState>,
    Query(q): Query<TextsQuery>,
) -> Result<Json<Vec<TextEntry>>, AppError> {
    let tone = parse_tone(q.tone.as_deref())?;
    Ok(Json(
        state
            .library
            .texts_by_tone(tone)
            .map(|t| t.as_ref().clone())
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/texts/select",
    summary = "按语气与关键词挑选文案",
    description = "关键词命中标签 +2、命中正文 +1；无关键词或全部 0 分时随机。",
    params(
        ("tone" = String, Query, description = "语气"),
        ("keywords" = Option<String>, Query, description = "关键词（空白或逗号分隔，最多 140 字符）"),
        ("exclude" = Option<String>, Query, description = "逗号分隔的排除 id")
    ),
    responses(
        (status = 200, description = "挑选结果", body = SelectionResponse),
        (status = 400, description = "缺少或未知的语气", body = crate::error::ProblemDetails, content_type = "application/problem+json"),
        (status = 422, description = "关键词过长", body = crate::error::ProblemDetails, content_type = "application/problem+json")
    ),
    tag = "Content"
)]
pub async fn select(
    State(state): State<AppState>,
    Query(q): Query<SelectQuery>,
) -> Result<Json<SelectionResponse>, AppError> {
    let tone = parse_tone(q.tone.as_deref())?;
    let excludes = q
        .exclude
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    let query = build_query(tone, q.keywords)?.excluding(excludes);
    Ok(to_response(select_text(&state.library, &query)))
}

#[utoipa::path(
    get,
    path = "/texts/reshuffle",
    summary = "换一条文案",
    params(
        ("tone" = String, Query, description = "语气"),
        ("keywords" = Option<String>, Query, description = "关键词"),
        ("current" = String, Query, description = "当前展示的文案 id")
    ),
    responses(
        (status = 200, description = "挑选结果（该语气仅一条时可能与当前相同）", body = SelectionResponse),
        (status = 400, description = "缺少参数", body = crate::error::ProblemDetails, content_type = "application/problem+json")
    ),
    tag = "Content"
)]
pub async fn reshuffle(
    State(state): State<AppState>,
    Query(q): Query<ReshuffleQuery>,
) -> Result<Json<SelectionResponse>, AppError> {
    let tone = parse_tone(q.tone.as_deref())?;
    let current = q
        .current
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("缺少查询参数 current".into()))?
        .to_string();
    let query = build_query(tone, q.keywords)?;
    Ok(to_response(reshuffle_text(&state.library, &query, &current)))
}

/// 内容库路由
pub fn create_content_router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/templates", get(list_templates))
        .route("/texts", get(list_texts))
        .route("/texts/select", get(select))
        .route("/texts/reshuffle", get(reshuffle))
}
