use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;
use uuid::Uuid;

use valentine_backend::{
    app::build_app,
    config::AppConfig,
    features::{
        card::CardStorage,
        content::ContentLibrary,
    },
    state::AppState,
};

const HEART_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10" fill="#e11d48"/></svg>"##;

async fn app_with_public_dir() -> Router {
    let public = std::env::temp_dir().join(format!("valentine_public_{}", Uuid::new_v4()));
    std::fs::create_dir_all(public.join("illustrations")).unwrap();
    std::fs::write(public.join("illustrations/heart.svg"), HEART_SVG).unwrap();

    let db_path = std::env::temp_dir().join(format!("valentine_app_{}.db", Uuid::new_v4()));
    let storage = CardStorage::connect_sqlite(db_path.to_str().unwrap(), false)
        .await
        .expect("connect sqlite");
    storage.init_schema().await.expect("init_schema");

    let mut config = AppConfig::default();
    config.content.public_dir = public.to_string_lossy().into_owned();

    let state = AppState {
        library: Arc::new(ContentLibrary::default()),
        storage: Arc::new(storage),
        cards: Arc::new(config.cards.clone()),
    };
    build_app(state, &config)
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = app_with_public_dir().await;
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .expect("GET /health");

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["service"], "valentine-backend");
    assert_eq!(v["database"], "ok");
}

#[tokio::test]
async fn illustrations_are_served_with_cache_header() {
    let app = app_with_public_dir().await;
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/illustrations/heart.svg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("GET illustration");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("public, max-age=86400")
    );

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/illustrations/missing.svg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("GET missing illustration");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.headers().get(header::CACHE_CONTROL).is_none());
}

#[tokio::test]
async fn openapi_document_is_published() {
    let app = app_with_public_dir().await;
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("GET openapi");

    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(v["paths"]["/texts/reshuffle"].is_object());
}
