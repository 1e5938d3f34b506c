mod common;

use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use service_core::error::AppError;
use shelter_service::{
    models::TokenType,
    services::{InMemoryDatabase, TokenService, TokenStore},
};
use std::sync::Arc;

use common::{test_config, TestApp, DOMAIN};

#[tokio::test]
async fn test_token_types_are_isolated() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("keeper@north.org", &["animal:read"]).await;
    let service = &app.state.tokens;

    service
        .validate(&tokens.access_token, TokenType::Access)
        .await
        .unwrap();

    for wrong in [TokenType::Refresh, TokenType::Invitation, TokenType::Reset] {
        let err = service
            .validate(&tokens.access_token, wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)), "{:?}", wrong);
    }

    // Same string stored under another type still fails on the scope claim.
    app.db
        .write(
            &tokens.access_token,
            TokenType::Refresh,
            Utc::now() + Duration::minutes(5),
            None,
        )
        .await
        .unwrap();
    let err = service
        .validate(&tokens.access_token, TokenType::Refresh)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken(_)));
}

#[tokio::test]
async fn test_expired_token_is_invalid_and_stays_invalid() {
    let app = TestApp::spawn().await;
    let service = &app.state.tokens;

    let mut data = Map::new();
    data.insert("sub".to_string(), Value::from("late@north.org"));
    let record = service
        .issue_email_token(TokenType::Invitation, data, Duration::seconds(-5), None)
        .await
        .unwrap();

    for _ in 0..2 {
        let err = service
            .validate(&record.token, TokenType::Invitation)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }
}

#[tokio::test]
async fn test_clock_skew_grace_accepts_recently_expired_token() {
    let mut config = test_config();
    config.token.clock_skew_seconds = 60;
    let service = TokenService::new(&config.token, Arc::new(InMemoryDatabase::new())).unwrap();

    let record = service
        .issue_email_token(TokenType::Reset, Map::new(), Duration::seconds(-5), None)
        .await
        .unwrap();

    service
        .validate(&record.token, TokenType::Reset)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_most_recent_row_wins() {
    let db = Arc::new(InMemoryDatabase::new());
    let now = Utc::now();

    let old = db
        .write("same-token", TokenType::Access, now + Duration::minutes(1), None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let new = db
        .write("same-token", TokenType::Access, now + Duration::minutes(2), None)
        .await
        .unwrap();

    let found = db.read("same-token", TokenType::Access).await.unwrap().unwrap();
    assert_eq!(found.id, new.id);
    assert_ne!(found.id, old.id);

    db.delete(Some(found)).await.unwrap();
    let found = db.read("same-token", TokenType::Access).await.unwrap().unwrap();
    assert_eq!(found.id, old.id);
}

#[tokio::test]
async fn test_foreign_signature_is_unauthorized() {
    let app = TestApp::spawn().await;

    let mut other = test_config();
    other.token.secret_key = "some-other-secret-entirely-000000".to_string();
    let foreign = TokenService::new(&other.token, Arc::new(InMemoryDatabase::new())).unwrap();
    let record = foreign
        .issue_email_token(TokenType::Reset, Map::new(), Duration::hours(1), None)
        .await
        .unwrap();

    // The row exists locally but the signature does not verify.
    app.db
        .write(&record.token, TokenType::Reset, record.expire_on, None)
        .await
        .unwrap();
    let err = app
        .state
        .tokens
        .validate(&record.token, TokenType::Reset)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn test_revoke_pair_removes_access_and_refresh() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("pair@north.org", &["animal:read"]).await;
    let service = &app.state.tokens;

    assert!(service.revoke_pair(&tokens.access_token).await.unwrap());

    assert!(app
        .db
        .read(&tokens.access_token, TokenType::Access)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .db
        .read(&tokens.refresh_token, TokenType::Refresh)
        .await
        .unwrap()
        .is_none());

    assert!(!service.revoke_pair(&tokens.access_token).await.unwrap());
}

#[tokio::test]
async fn test_tokens_minted_together_are_distinct() {
    let app = TestApp::spawn().await;
    let role = app.seed_role(DOMAIN, "keeper", &["animal:read"]).await;
    app.seed_user(DOMAIN, "twice@north.org", Some(&role)).await;

    let first = app.login(DOMAIN, "twice@north.org").await;
    let second = app.login(DOMAIN, "twice@north.org").await;

    assert_ne!(first.access_token, second.access_token);
    assert_ne!(first.refresh_token, second.refresh_token);
}
