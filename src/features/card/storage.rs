use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    ConnectOptions, Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteRow},
};
use uuid::Uuid;

use crate::error::AppError;

use super::models::{CardRecord, CreatedCard, EventType, NewCard, OrderStatus};

/// 统一时间格式（固定毫秒 + Z），保证文本比较与时间先后一致
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("时间字段解析失败 '{raw}': {e}")))
}

/// 卡片 / 订单 / 事件的 SQLite 存储
#[derive(Clone)]
pub struct CardStorage {
    pub pool: SqlitePool,
}

impl CardStorage {
    pub async fn connect_sqlite(path: &str, wal: bool) -> Result<Self, AppError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Internal(format!("创建数据库目录失败: {e}")))?;
        }
        let opt = SqliteConnectOptions::new()
            .filename(Path::new(path))
            .create_if_missing(true)
            .foreign_keys(true)
            .log_statements(tracing::log::LevelFilter::Off);
        let pool = SqlitePool::connect_with(opt)
            .await
            .map_err(|e| AppError::Internal(format!("sqlite connect: {e}")))?;
        if wal {
            sqlx::query("PRAGMA journal_mode=WAL;")
                .execute(&pool)
                .await
                .ok();
        }
        sqlx::query("PRAGMA synchronous=NORMAL;")
            .execute(&pool)
            .await
            .ok();
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<(), AppError> {
        let ddl = r#"
        CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            template_snapshot TEXT NOT NULL,
            to_name TEXT,
            from_name TEXT,
            is_anonymous INTEGER NOT NULL DEFAULT 0,
            tone TEXT NOT NULL,
            message_text TEXT NOT NULL,
            image_path TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT,
            is_blocked INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_cards_expires_at ON cards(expires_at);

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            card_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            recipient_email TEXT,
            send_at TEXT,
            sent_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_card ON orders(card_id);

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id TEXT REFERENCES cards(id) ON DELETE SET NULL,
            order_id TEXT REFERENCES orders(id) ON DELETE SET NULL,
            type TEXT NOT NULL,
            meta TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_card_type ON events(card_id, type);
        "#;
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("init schema: {e}")))?;
        Ok(())
    }

    /// 在一个事务内写入卡片、草稿订单与 created 事件
    pub async fn create_card(&self, card: &NewCard) -> Result<CreatedCard, AppError> {
        let card_id = Uuid::new_v4().to_string();
        let order_id = Uuid::new_v4().to_string();
        let now = ts(card.created_at);
        let snapshot = serde_json::to_string(&card.template_snapshot)
            .map_err(|e| AppError::Internal(format!("模板快照序列化失败: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("begin tx: {e}")))?;

        sqlx::query(
            "INSERT INTO cards(id, token, template_snapshot, to_name, from_name, is_anonymous, tone, message_text, image_path, created_at, expires_at, is_blocked) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&card_id)
        .bind(&card.token)
        .bind(&snapshot)
        .bind(&card.to_name)
        .bind(&card.from_name)
        .bind(card.is_anonymous)
        .bind(card.tone.as_str())
        .bind(&card.message_text)
        .bind(&card.image_path)
        .bind(&now)
        .bind(card.expires_at.map(ts))
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("insert card: {e}")))?;

        sqlx::query(
            "INSERT INTO orders(id, card_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order_id)
        .bind(&card_id)
        .bind(OrderStatus::Draft.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("insert order: {e}")))?;

        let meta = serde_json::json!({
            "tone": card.tone.as_str(),
            "templateId": card.template_snapshot.id,
        });
        sqlx::query(
            "INSERT INTO events(card_id, order_id, type, meta, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&card_id)
        .bind(&order_id)
        .bind(EventType::Created.as_str())
        .bind(meta.to_string())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("insert event: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("commit tx: {e}")))?;

        Ok(CreatedCard { card_id, order_id })
    }

    /// 按 token 查找卡片（不过滤封禁/过期，供管理端使用）
    pub async fn find_card_by_token(&self, token: &str) -> Result<Option<CardRecord>, AppError> {
        let row = sqlx::query("SELECT * FROM cards WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("query card: {e}")))?;
        row.as_ref().map(row_to_card).transpose()
    }

    /// 公开可见的卡片：未封禁且未过期
    pub async fn find_public_card(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CardRecord>, AppError> {
        let row = sqlx::query(
            "SELECT * FROM cards WHERE token = ? AND is_blocked = 0 AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(token)
        .bind(ts(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("query public card: {e}")))?;
        row.as_ref().map(row_to_card).transpose()
    }

    pub async fn set_blocked(&self, card_id: &str, blocked: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE cards SET is_blocked = ? WHERE id = ?")
            .bind(blocked)
            .bind(card_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("update card: {e}")))?;
        Ok(())
    }

    pub async fn insert_event(
        &self,
        card_id: Option<&str>,
        order_id: Option<&str>,
        kind: EventType,
        meta: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO events(card_id, order_id, type, meta, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(card_id)
        .bind(order_id)
        .bind(kind.as_str())
        .bind(meta.to_string())
        .bind(ts(at))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("insert event: {e}")))?;
        Ok(())
    }

    /// 清理已过期卡片：逐条记录 expired 事件后删除；返回删除数量
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let now_s = ts(now);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("begin tx: {e}")))?;

        let rows = sqlx::query(
            "SELECT id, token, expires_at FROM cards WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(&now_s)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::Internal(format!("query expired: {e}")))?;

        if rows.is_empty() {
            return Ok(0);
        }

        for row in &rows {
            let id: String = row.get("id");
            let token: String = row.get("token");
            let expires_at: String = row.get("expires_at");
            let meta = serde_json::json!({ "token": token, "expiresAt": expires_at });
            sqlx::query(
                "INSERT INTO events(card_id, type, meta, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(EventType::Expired.as_str())
            .bind(meta.to_string())
            .bind(&now_s)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("insert event: {e}")))?;
        }

        let deleted = sqlx::query("DELETE FROM cards WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(&now_s)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("delete expired: {e}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("commit tx: {e}")))?;

        Ok(deleted)
    }

    /// 数据库连通性检查
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// 关闭连接池，等待进行中的查询结束
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_card(row: &SqliteRow) -> Result<CardRecord, AppError> {
    let snapshot: String = row.get("template_snapshot");
    let tone: String = row.get("tone");
    let created_at: String = row.get("created_at");
    let expires_at: Option<String> = row.get("expires_at");

    Ok(CardRecord {
        id: row.get("id"),
        token: row.get("token"),
        template_snapshot: serde_json::from_str(&snapshot)
            .map_err(|e| AppError::Internal(format!("模板快照解析失败: {e}")))?,
        to_name: row.get("to_name"),
        from_name: row.get("from_name"),
        is_anonymous: row.get::<i64, _>("is_anonymous") != 0,
        tone: tone.parse().map_err(AppError::Internal)?,
        message_text: row.get("message_text"),
        image_path: row.get("image_path"),
        created_at: parse_ts(&created_at)?,
        expires_at: expires_at.as_deref().map(parse_ts).transpose()?,
        is_blocked: row.get::<i64, _>("is_blocked") != 0,
    })
}
