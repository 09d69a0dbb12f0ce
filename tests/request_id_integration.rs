use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use tower::ServiceExt;
use uuid::Uuid;

use valentine_backend::{
    app::build_app,
    config::AppConfig,
    features::{card::CardStorage, card::token::generate_token, content::ContentLibrary},
    state::AppState,
};

async fn app() -> Router {
    let db_path = std::env::temp_dir().join(format!("valentine_reqid_{}.db", Uuid::new_v4()));
    let storage = CardStorage::connect_sqlite(db_path.to_str().unwrap(), false)
        .await
        .expect("connect sqlite");
    storage.init_schema().await.expect("init_schema");

    let config = AppConfig::default();
    let state = AppState {
        library: Arc::new(ContentLibrary::default()),
        storage: Arc::new(storage),
        cards: Arc::new(config.cards.clone()),
    };
    build_app(state, &config)
}

fn request_id(resp: &Response) -> String {
    resp.headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn problem(resp: Response) -> serde_json::Value {
    assert_eq!(
        resp.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/problem+json")
    );
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("parse json")
}

#[tokio::test]
async fn malformed_card_token_problem_echoes_client_request_id() {
    let resp = app()
        .await
        .oneshot(
            Request::builder()
                .uri("/api/cards/not-a-token")
                .header("x-request-id", "editor.open-001")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("GET card");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(request_id(&resp), "editor.open-001");
    let body = problem(resp).await;
    assert_eq!(body["requestId"], "editor.open-001");
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn missing_card_gets_generated_request_id_in_problem() {
    let resp = app()
        .await
        .oneshot(
            Request::builder()
                .uri(format!("/api/cards/{}", generate_token()))
                .header("x-request-id", "has space")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("GET card");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let id = request_id(&resp);
    assert!(id.starts_with("req_"), "invalid client id is replaced: {id}");
    assert_eq!(problem(resp).await["requestId"], id.as_str());
}

#[tokio::test]
async fn card_creation_validation_problem_carries_request_id() {
    let req = Request::builder()
        .method("POST")
        .uri("/api/cards")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-request-id", "create-42")
        .body(Body::from(r#"{"templateId":"missing","tone":"cute","messageText":"ahoj"}"#))
        .unwrap();
    let resp = app().await.oneshot(req).await.expect("POST card");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(request_id(&resp), "create-42");
    assert_eq!(problem(resp).await["requestId"], "create-42");
}

#[tokio::test]
async fn health_responses_get_a_request_id() {
    let resp = app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .expect("GET health");

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(request_id(&resp).starts_with("req_"));
}
