use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::content::models::{Template, Tone};

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Paid,
    Scheduled,
    Sent,
    Failed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Paid => "paid",
            OrderStatus::Scheduled => "scheduled",
            OrderStatus::Sent => "sent",
            OrderStatus::Failed => "failed",
        }
    }
}

/// 审计事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Opened,
    Blocked,
    Unblocked,
    Expired,
    Sent,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Opened => "opened",
            EventType::Blocked => "blocked",
            EventType::Unblocked => "unblocked",
            EventType::Expired => "expired",
            EventType::Sent => "sent",
        }
    }
}

/// 待入库的卡片（字段已清洗转义）
#[derive(Debug, Clone)]
pub struct NewCard {
    pub token: String,
    /// 创建时刻的模板快照，模板后续变更不影响已分享的卡片
    pub template_snapshot: Template,
    pub to_name: Option<String>,
    pub from_name: Option<String>,
    pub is_anonymous: bool,
    pub tone: Tone,
    pub message_text: String,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// 入库结果
#[derive(Debug, Clone)]
pub struct CreatedCard {
    pub card_id: String,
    pub order_id: String,
}

/// 卡片完整记录
#[derive(Debug, Clone)]
pub struct CardRecord {
    pub id: String,
    pub token: String,
    pub template_snapshot: Template,
    pub to_name: Option<String>,
    pub from_name: Option<String>,
    pub is_anonymous: bool,
    pub tone: Tone,
    pub message_text: String,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_blocked: bool,
}

/// 通过分享链接公开返回的卡片
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicCard {
    pub token: String,
    pub template_snapshot: Template,
    pub to_name: Option<String>,
    pub from_name: Option<String>,
    pub is_anonymous: bool,
    pub tone: Tone,
    pub message_text: String,
    pub image_path: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CardRecord> for PublicCard {
    fn from(c: CardRecord) -> Self {
        Self {
            token: c.token,
            template_snapshot: c.template_snapshot,
            to_name: c.to_name,
            from_name: c.from_name,
            is_anonymous: c.is_anonymous,
            tone: c.tone,
            message_text: c.message_text,
            image_path: c.image_path,
            created_at: c.created_at,
            expires_at: c.expires_at,
        }
    }
}

/// 创建卡片请求；必填字段用 Option 承接，以便返回 400 而不是反序列化错误
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    #[schema(example = "classic-rose")]
    pub template_id: Option<String>,
    pub to_name: Option<String>,
    pub from_name: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[schema(example = "cute")]
    pub tone: Option<String>,
    pub message_text: Option<String>,
    /// 仅接受 `/illustrations/` 开头的路径
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardResponse {
    pub token: String,
    #[schema(example = "/c/AbCdEfGhIjKlMnOpQrStUv")]
    pub public_url: String,
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockCardRequest {
    pub token: Option<String>,
    #[serde(default = "default_block")]
    pub block: bool,
}

fn default_block() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockCardResponse {
    pub message: String,
    pub token: String,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub message: String,
    pub deleted: u64,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: DateTime<Utc>,
}
