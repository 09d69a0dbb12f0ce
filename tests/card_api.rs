use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use tower::ServiceExt;
use uuid::Uuid;

use valentine_backend::{
    config::CardsConfig,
    features::{
        card::{
            CardStorage,
            models::{NewCard, PublicCard},
            token::generate_token,
        },
        content::{ContentLibrary, StyleTokens, Template, TextEntry, Tone},
    },
    state::AppState,
};

const ADMIN_SECRET: &str = "admin-s3cret";
const CLEANUP_SECRET: &str = "cleanup-s3cret";

fn template() -> Template {
    Template {
        id: "classic-rose".into(),
        name: "Klasická růže".into(),
        illustration_path: "/illustrations/rose.svg".into(),
        style_tokens: StyleTokens {
            primary_color: "#e11d48".into(),
            accent_color: "#fb7185".into(),
            font_style: None,
        },
    }
}

fn library() -> ContentLibrary {
    ContentLibrary::new(
        vec![TextEntry {
            id: "cute-001".into(),
            tone: Tone::Cute,
            tags: vec!["love".into()],
            text: "Jsi moje nejoblíbenější osoba.".into(),
            image: None,
        }],
        vec![template()],
    )
}

async fn new_test_state() -> AppState {
    let db_path = std::env::temp_dir().join(format!("valentine_cards_{}.db", Uuid::new_v4()));
    let storage = CardStorage::connect_sqlite(db_path.to_str().unwrap(), false)
        .await
        .expect("connect sqlite");
    storage.init_schema().await.expect("init_schema");

    AppState {
        library: Arc::new(library()),
        storage: Arc::new(storage),
        cards: Arc::new(CardsConfig {
            admin_secret: Some(ADMIN_SECRET.into()),
            cleanup_secret: Some(CLEANUP_SECRET.into()),
            ..CardsConfig::default()
        }),
    }
}

fn build_app(state: AppState) -> Router {
    // 贴近生产部署：业务接口挂在 /api 下
    Router::new()
        .nest("/api", valentine_backend::app::api_router())
        .with_state(state)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn create(app: &Router, body: serde_json::Value) -> serde_json::Value {
    let resp = app
        .clone()
        .oneshot(post_json("/api/cards", body))
        .await
        .expect("POST /api/cards");
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await
}

#[tokio::test]
async fn created_card_is_readable_by_token() {
    let app = build_app(new_test_state().await);

    let created = create(
        &app,
        serde_json::json!({
            "templateId": "classic-rose",
            "toName": "Aničko",
            "fromName": "Tomáš",
            "tone": "cute",
            "messageText": "Mám tě rád <3",
            "imagePath": "/illustrations/teddy.svg"
        }),
    )
    .await;

    let token = created["token"].as_str().expect("token");
    assert_eq!(token.len(), 22);
    assert_eq!(created["publicUrl"], format!("/c/{token}"));
    assert!(created["orderId"].as_str().is_some_and(|s| !s.is_empty()));

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/cards/{token}")))
        .await
        .expect("GET card");
    assert_eq!(resp.status(), StatusCode::OK);
    let card: PublicCard = serde_json::from_value(json_body(resp).await).expect("PublicCard");
    assert_eq!(card.message_text, "Mám tě rád &lt;3");
    // 自选插画写进模板快照
    let expected = Template {
        illustration_path: "/illustrations/teddy.svg".into(),
        ..template()
    };
    assert_eq!(card.template_snapshot, expected);
    assert_eq!(card.image_path.as_deref(), Some("/illustrations/teddy.svg"));
    assert!(card.expires_at.is_some());
}

#[tokio::test]
async fn anonymous_card_drops_sender_and_foreign_image_path() {
    let app = build_app(new_test_state().await);

    let created = create(
        &app,
        serde_json::json!({
            "templateId": "classic-rose",
            "fromName": "Tajný ctitel",
            "isAnonymous": true,
            "tone": "cute",
            "messageText": "Hádej kdo.",
            "imagePath": "https://evil.example/x.png"
        }),
    )
    .await;

    let token = created["token"].as_str().unwrap();
    let resp = app
        .oneshot(get(&format!("/api/cards/{token}")))
        .await
        .unwrap();
    let card = json_body(resp).await;
    assert!(card["fromName"].is_null());
    assert_eq!(card["isAnonymous"], true);
    assert!(card["imagePath"].is_null());
    assert_eq!(
        card["templateSnapshot"]["illustrationPath"],
        "/illustrations/rose.svg"
    );
}

#[tokio::test]
async fn create_rejects_invalid_input() {
    let app = build_app(new_test_state().await);

    let cases = [
        (serde_json::json!({ "tone": "cute", "messageText": "hi" }), StatusCode::BAD_REQUEST),
        (
            serde_json::json!({ "templateId": "classic-rose", "tone": "grumpy", "messageText": "hi" }),
            StatusCode::BAD_REQUEST,
        ),
        (
            serde_json::json!({ "templateId": "nope", "tone": "cute", "messageText": "hi" }),
            StatusCode::BAD_REQUEST,
        ),
        (
            serde_json::json!({ "templateId": "classic-rose", "tone": "cute", "messageText": "x".repeat(281) }),
            StatusCode::BAD_REQUEST,
        ),
        (
            serde_json::json!({ "templateId": "classic-rose", "tone": "cute", "messageText": "hi", "toName": "y".repeat(33) }),
            StatusCode::BAD_REQUEST,
        ),
    ];

    for (body, expected) in cases {
        let resp = app
            .clone()
            .oneshot(post_json("/api/cards", body.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), expected, "body: {body}");
        assert_eq!(
            resp.headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/problem+json")
        );
    }
}

#[tokio::test]
async fn malformed_and_unknown_tokens() {
    let app = build_app(new_test_state().await);

    let resp = app.clone().oneshot(get("/api/cards/short")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(get(&format!("/api/cards/{}", generate_token())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blocked_card_is_hidden_until_unblocked() {
    let app = build_app(new_test_state().await);
    let created = create(
        &app,
        serde_json::json!({ "templateId": "classic-rose", "tone": "cute", "messageText": "Ahoj" }),
    )
    .await;
    let token = created["token"].as_str().unwrap().to_string();

    let block = |secret: &str, block: bool| {
        Request::builder()
            .method("POST")
            .uri("/api/admin/block-card")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {secret}"))
            .body(Body::from(
                serde_json::json!({ "token": token, "block": block }).to_string(),
            ))
            .unwrap()
    };

    let resp = app.clone().oneshot(block("wrong", true)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.clone().oneshot(block(ADMIN_SECRET, true)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["isBlocked"], true);

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/cards/{token}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.clone().oneshot(block(ADMIN_SECRET, false)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get(&format!("/api/cards/{token}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn cleanup_deletes_only_expired_cards() {
    let state = new_test_state().await;
    let now = Utc::now();
    let expired = NewCard {
        token: generate_token(),
        template_snapshot: template(),
        to_name: None,
        from_name: None,
        is_anonymous: false,
        tone: Tone::Cute,
        message_text: "staré".into(),
        image_path: None,
        created_at: now - Duration::days(40),
        expires_at: Some(now - Duration::days(10)),
    };
    state.storage.create_card(&expired).await.expect("seed expired");
    let storage = Arc::clone(&state.storage);
    let app = build_app(state);

    let fresh = create(
        &app,
        serde_json::json!({ "templateId": "classic-rose", "tone": "cute", "messageText": "nové" }),
    )
    .await;

    let unauthorized = app.clone().oneshot(get("/api/cleanup")).await.unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/api/cleanup")
        .header(header::AUTHORIZATION, format!("Bearer {CLEANUP_SECRET}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["deleted"], 1);

    assert!(storage.find_card_by_token(&expired.token).await.unwrap().is_none());
    let fresh_token = fresh["token"].as_str().unwrap();
    let resp = app
        .oneshot(get(&format!("/api/cards/{fresh_token}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
