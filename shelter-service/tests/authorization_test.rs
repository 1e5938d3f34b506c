mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use service_core::error::AppError;
use shelter_service::services::{AuthenticatedToken, UserDirectory};

use common::{empty_request, json_request, TestApp, DOMAIN};

async fn authenticated(app: &TestApp, access_token: &str) -> AuthenticatedToken {
    let (record, claims) = app.state.tokens.validate_access(access_token).await.unwrap();
    let user = app
        .state
        .directory
        .find_user_by_id(record.user_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    AuthenticatedToken { record, claims, user }
}

#[tokio::test]
async fn test_required_scopes_must_be_a_subset() {
    let app = TestApp::spawn().await;
    let (user, tokens) = app
        .user_with_scopes("vet@north.org", &["animal:read", "animal:write"])
        .await;
    let token = authenticated(&app, &tokens.access_token).await;
    let gate = &app.state.gate;

    let empty: [&str; 0] = [];
    assert_eq!(gate.authorize(&empty, &token).unwrap().id, user.id);
    assert!(gate.authorize(&["animal:read"], &token).is_ok());
    assert!(gate.authorize(&["animal:read", "animal:write"], &token).is_ok());

    let err = gate
        .authorize(&["animal:read", "user:write", "media:read"], &token)
        .unwrap_err();
    match err {
        AppError::Forbidden(e) => assert_eq!(
            e.to_string(),
            "Access denied. Required permissions: media:read, user:write"
        ),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_super_admin_bypasses_scope_checks() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.super_admin().await;
    let token = authenticated(&app, &tokens.access_token).await;

    assert!(app.state.gate.is_super_admin(&token.claims));
    assert!(app
        .state
        .gate
        .authorize(&["anything:at-all", "user:write"], &token)
        .is_ok());
}

#[tokio::test]
async fn test_admin_role_name_in_other_domain_is_not_super() {
    let app = TestApp::spawn().await;
    let role = app.seed_role(DOMAIN, "admin", &[]).await;
    app.seed_user(DOMAIN, "pretender@north.org", Some(&role)).await;
    let tokens = app.login(DOMAIN, "pretender@north.org").await;
    let token = authenticated(&app, &tokens.access_token).await;

    assert!(!app.state.gate.is_super_admin(&token.claims));
    assert!(app.state.gate.authorize(&["user:write"], &token).is_err());
}

#[tokio::test]
async fn test_super_check_uses_role_domain_not_user_domain() {
    let app = TestApp::spawn().await;
    let borrowed = app.seed_role(DOMAIN, "admin", &["animal:read"]).await;
    app.seed_user("system", "squatter@system.org", Some(&borrowed))
        .await;
    let tokens = app.login("system", "squatter@system.org").await;
    let token = authenticated(&app, &tokens.access_token).await;

    assert_eq!(token.claims.domain, "system");
    assert_eq!(token.claims.role_domain, DOMAIN);
    assert!(!app.state.gate.is_super_admin(&token.claims));
    assert!(app.state.gate.authorize(&["user:write"], &token).is_err());
}

#[tokio::test]
async fn test_self_access_bypass() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("self@north.org", &[]).await;
    let token = authenticated(&app, &tokens.access_token).await;
    let gate = &app.state.gate;

    assert!(gate
        .authorize_or_self(DOMAIN, "SELF@north.org", &["user:write"], &token)
        .is_ok());
    assert!(gate
        .authorize_or_self(DOMAIN, "other@north.org", &["user:write"], &token)
        .is_err());
    assert!(gate
        .authorize_or_self("south", "self@north.org", &["user:write"], &token)
        .is_err());
}

#[tokio::test]
async fn test_domain_and_role_grant_checks() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("hr@north.org", &["user:write"]).await;
    let token = authenticated(&app, &tokens.access_token).await;
    let gate = &app.state.gate;

    assert!(gate.authorize_in_domain(DOMAIN, &["user:write"], &token).is_ok());
    assert!(gate.authorize_in_domain("south", &["user:write"], &token).is_err());
    assert!(gate
        .authorize_role_grant(DOMAIN, "keeper", &["user:write"], &token)
        .is_ok());
    assert!(gate
        .authorize_role_grant("system", "ADMIN", &["user:write"], &token)
        .is_err());

    let (_, root) = app.super_admin().await;
    let root = authenticated(&app, &root.access_token).await;
    assert!(gate
        .authorize_role_grant("system", "admin", &["user:write"], &root)
        .is_ok());
    assert!(gate.authorize_in_domain("south", &["user:write"], &root).is_ok());
}

#[tokio::test]
async fn test_section_check_adds_section_write() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app
        .user_with_scopes("clerk@north.org", &["crm:read", "location:write"])
        .await;
    let token = authenticated(&app, &tokens.access_token).await;
    let gate = &app.state.gate;

    assert!(gate
        .authorize_for_section("location", &["crm:read"], &token)
        .is_ok());
    let err = gate
        .authorize_for_section("medical", &["crm:read"], &token)
        .unwrap_err();
    assert!(err.to_string().contains("medical:write"));
}

#[tokio::test]
async fn test_http_forbidden_names_missing_scope() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("reader@north.org", &["animal:read"]).await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/permissions",
            Some(&tokens.access_token),
            json!({ "entity": "animal", "operation": "delete" }),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "Access denied. Required permissions: permission:write"
    );
}

#[tokio::test]
async fn test_missing_or_garbage_bearer_is_unauthorized() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .send(empty_request(Method::GET, "/permissions", None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(empty_request(Method::GET, "/permissions", Some("not-a-token")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
