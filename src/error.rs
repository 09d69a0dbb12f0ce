use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 请求格式错误（缺少字段、非法取值）
    #[error("请求无效: {0}")]
    BadRequest(String),

    /// JSON 解析错误
    #[error("JSON 解析错误: {0}")]
    Json(String),

    /// 认证失败
    #[error("认证失败: {0}")]
    Auth(String),

    /// 禁止访问（含命中屏蔽词）
    #[error("禁止访问: {0}")]
    Forbidden(String),

    /// 资源不存在
    #[error("未找到: {0}")]
    NotFound(String),

    /// 参数校验错误
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 字段级参数校验错误
    #[error("参数校验错误: {} 个字段未通过", .0.len())]
    InvalidFields(Vec<ProblemFieldError>),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 卡片导出错误
///
/// 只有“整体失败”才会走到这里；单张图片拉取失败会降级为原始 URL，不会中断导出。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// 矢量文档无法解码
    #[error("矢量文档解码失败: {0}")]
    Decode(String),
    /// 无法分配栅格画布
    #[error("无法创建画布: {0}")]
    Surface(String),
    /// PNG 编码失败
    #[error("PNG 编码失败: {0}")]
    Encode(String),
    /// 序列化失败
    #[error("快照序列化失败: {0}")]
    Serialize(String),
    /// 阻塞任务执行失败
    #[error("导出任务执行失败: {0}")]
    Task(String),
}

impl From<std::fmt::Error> for ExportError {
    fn from(err: std::fmt::Error) -> Self {
        ExportError::Serialize(err.to_string())
    }
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// 设计目标：
/// - 让所有 API 错误返回结构化 JSON，便于调用方稳定处理
/// - 与 OpenAPI 一致（content-type = application/problem+json）
/// - 允许在不破坏主结构的前提下扩展字段（如 requestId、字段级校验错误）
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Validation Failed")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 422)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "VALIDATION_FAILED")]
    pub code: String,

    /// 可选：请求追踪 ID。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// 可选：字段级校验错误（如表单/参数校验）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ProblemFieldError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemFieldError {
    /// 字段名（camelCase）。
    pub field: String,
    /// 字段错误信息。
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidFields(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) | AppError::Json(_) => "BAD_REQUEST",
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) | AppError::InvalidFields(_) => "VALIDATION_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let title = self.title().to_string();
        let code = self.stable_code().to_string();
        let detail = Some(self.to_string());

        let errors = match self {
            AppError::InvalidFields(fields) => Some(fields),
            _ => None,
        };

        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title,
            status: status.as_u16(),
            detail,
            code,
            request_id: crate::request_id::current_request_id(),
            errors,
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(format!("数据库错误: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, ExportError, ProblemFieldError};
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};

    #[tokio::test]
    async fn invalid_fields_are_listed_in_problem_details() {
        let err = AppError::InvalidFields(vec![ProblemFieldError {
            field: "toName".into(),
            message: "最多 32 个字符".into(),
        }]);
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            resp.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/problem+json")
        );
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["code"], "VALIDATION_FAILED");
        assert_eq!(v["errors"][0]["field"], "toName");
    }

    #[test]
    fn fmt_error_becomes_serialize_failure() {
        let err: ExportError = std::fmt::Error.into();
        assert!(matches!(err, ExportError::Serialize(_)));
    }

    #[test]
    fn not_found_has_404_status() {
        let resp = AppError::NotFound("card".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
