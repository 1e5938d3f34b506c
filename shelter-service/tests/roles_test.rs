mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use shelter_service::{models::Permission, services::UserDirectory};

use common::{empty_request, json_request, TestApp, DOMAIN};

const ROLE_ADMIN: [&str; 3] = ["role:read", "role:write", "role:delete"];

fn names(body: &Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

fn scopes(role: &Value) -> Vec<String> {
    role["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| format!("{}:{}", p["entity"].as_str().unwrap(), p["operation"].as_str().unwrap()))
        .collect()
}

#[tokio::test]
async fn test_create_update_and_list_role() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.user_with_scopes("hr@north.org", &ROLE_ADMIN).await;
    app.seed_role(DOMAIN, "seed", &["animal:read", "animal:write", "medical:write"])
        .await;

    let (status, role) = app
        .send(json_request(
            Method::POST,
            "/roles",
            Some(&admin.access_token),
            json!({ "name": "Vet", "domain": "north", "permissions": ["animal:read", "animal:write"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role["name"], "vet");
    assert_eq!(scopes(&role), vec!["animal:read", "animal:write"]);

    let (status, listed) = app
        .send(empty_request(Method::GET, "/roles/north?name=vet", Some(&admin.access_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&listed), vec!["vet"]);
    assert_eq!(app.state.roles_cache.registered_keys().len(), 1);

    let (status, updated) = app
        .send(json_request(
            Method::PATCH,
            "/roles/north/vet",
            Some(&admin.access_token),
            json!({ "title": "Veterinarian", "assign": ["medical:write"], "unassign": ["animal:write"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Veterinarian");
    assert_eq!(scopes(&updated), vec!["animal:read", "medical:write"]);
    assert!(app.state.roles_cache.registered_keys().is_empty());

    let (_, listed) = app
        .send(empty_request(Method::GET, "/roles/north?name=vet", Some(&admin.access_token)))
        .await;
    assert_eq!(scopes(&listed[0]), vec!["animal:read", "medical:write"]);
}

#[tokio::test]
async fn test_unknown_permissions_reject_the_whole_request() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.user_with_scopes("hr@north.org", &ROLE_ADMIN).await;
    app.seed_role(DOMAIN, "vet", &["animal:read"]).await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/roles",
            Some(&admin.access_token),
            json!({ "name": "groomer", "domain": "north", "permissions": ["animal:read", "fur:trim", "bogus"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown permissions: fur:trim, bogus");
    assert!(app.db.find_role(DOMAIN, "groomer").await.unwrap().is_none());

    let (status, _) = app
        .send(json_request(
            Method::PATCH,
            "/roles/north/vet",
            Some(&admin.access_token),
            json!({ "assign": ["role:read"], "unassign": ["nope:nope"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let vet = app.db.find_role(DOMAIN, "vet").await.unwrap().unwrap();
    assert_eq!(vet.scopes(), vec!["animal:read"]);
}

#[tokio::test]
async fn test_role_writer_is_confined_to_own_domain() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.user_with_scopes("hr@north.org", &ROLE_ADMIN).await;
    app.seed_role("system", "admin", &[]).await;
    app.seed_role("south", "keeper", &[]).await;

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/roles",
            Some(&admin.access_token),
            json!({ "name": "keeper", "domain": "south" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(json_request(
            Method::PATCH,
            "/roles/system/admin",
            Some(&admin.access_token),
            json!({ "title": "mine now" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(empty_request(Method::GET, "/roles/south", Some(&admin.access_token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(empty_request(Method::DELETE, "/roles/south/keeper", Some(&admin.access_token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_listing_without_domain_is_scoped_to_caller() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.user_with_scopes("hr@north.org", &["role:read"]).await;
    app.seed_role("south", "keeper", &[]).await;

    let (status, body) = app
        .send(empty_request(Method::GET, "/roles", Some(&admin.access_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["domain"] == DOMAIN));

    let (_, root) = app.super_admin().await;
    let (status, body) = app
        .send(empty_request(Method::GET, "/roles", Some(&root.access_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let domains: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["domain"].as_str().unwrap())
        .collect();
    assert!(domains.contains(&"south"));
    assert!(domains.contains(&"system"));

    let (status, _) = app
        .send(empty_request(Method::GET, "/roles/north?name=nobody", Some(&root.access_token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_role_strips_holders() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.user_with_scopes("hr@north.org", &ROLE_ADMIN).await;
    let temp = app.seed_role(DOMAIN, "temp", &[]).await;
    let holder = app.seed_user(DOMAIN, "temp@north.org", Some(&temp)).await;

    let (status, _) = app
        .send(empty_request(Method::DELETE, "/roles/north/temp", Some(&admin.access_token)))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let holder = app.db.find_user_by_id(holder.id).await.unwrap().unwrap();
    assert!(holder.role.is_none());

    let (status, _) = app
        .send(empty_request(Method::DELETE, "/roles/north/temp", Some(&admin.access_token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_super_admin_role_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let (_, root) = app.super_admin().await;

    let (status, _) = app
        .send(empty_request(Method::DELETE, "/roles/system/admin", Some(&root.access_token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.db.find_role("system", "admin").await.unwrap().is_some());
}

#[tokio::test]
async fn test_deleted_permission_leaves_every_role() {
    let app = TestApp::spawn().await;
    let (_, admin) = app
        .user_with_scopes("it@north.org", &["permission:write", "permission:delete", "role:read"])
        .await;
    app.seed_role(DOMAIN, "vet", &["animal:read", "animal:write"]).await;

    let (status, body) = app
        .send(json_request(
            Method::PATCH,
            "/permissions/Animal/READ",
            Some(&admin.access_token),
            json!({ "title": "See animal records" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "See animal records");

    // Warm the roles cache so the delete has something to drop.
    let (status, _) = app
        .send(empty_request(Method::GET, "/roles/north?name=vet", Some(&admin.access_token)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(empty_request(
            Method::DELETE,
            "/permissions/animal/write",
            Some(&admin.access_token),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.state.roles_cache.registered_keys().is_empty());

    let (_, listed) = app
        .send(empty_request(Method::GET, "/roles/north?name=vet", Some(&admin.access_token)))
        .await;
    assert_eq!(scopes(&listed[0]), vec!["animal:read"]);
    assert_eq!(listed[0]["permissions"][0]["title"], "See animal records");

    let (status, _) = app
        .send(empty_request(
            Method::DELETE,
            "/permissions/animal/write",
            Some(&admin.access_token),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app
        .db
        .list_permissions()
        .await
        .unwrap()
        .iter()
        .all(|p: &Permission| p.scope() != "animal:write"));
}
