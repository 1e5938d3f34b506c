mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use shelter_service::services::MediaCache;
use tower::util::ServiceExt;
use uuid::Uuid;

use common::{empty_request, TestApp};

const MEDIA_SCOPES: [&str; 2] = ["media:read", "media:write"];

fn upload(token: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/media")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
}

#[test]
fn test_resident_size_never_exceeds_limit() {
    let cache = MediaCache::new(100, 40);

    for i in 0..50u8 {
        cache.add(Uuid::new_v4(), vec![i; 10 + (i as usize % 30)]);
        assert!(cache.current_size() <= 100, "size {}", cache.current_size());
    }
    assert!(!cache.is_empty());
}

#[test]
fn test_oversize_records_are_rejected() {
    let cache = MediaCache::new(100, 40);
    let small = Uuid::new_v4();
    cache.add(small, vec![1u8; 30]);

    let too_big = Uuid::new_v4();
    cache.add(too_big, vec![0u8; 41]);

    assert!(cache.get(&too_big).is_none());
    assert!(cache.get(&small).is_some());
    assert_eq!(cache.current_size(), 30);
}

#[tokio::test]
async fn test_upload_read_delete_round() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("photo@north.org", &MEDIA_SCOPES).await;
    // Spans several 64-byte chunks.
    let bytes: Vec<u8> = (0..200u8).collect();

    let (status, body) = app.send(upload(&tokens.access_token, bytes.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["size"], 200);
    let blob_id: Uuid = body["blob_id"].as_str().unwrap().parse().unwrap();

    let cache = app.state.media.cache();
    assert!(cache.get(&blob_id).is_none());

    let response = app
        .router
        .clone()
        .oneshot(empty_request(
            Method::GET,
            &format!("/media/{}", blob_id),
            Some(&tokens.access_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "private, max-age=3600"
    );
    let served = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(served.as_ref(), bytes.as_slice());
    assert_eq!(cache.get(&blob_id).unwrap().len(), 200);

    let (status, _) = app
        .send(empty_request(
            Method::DELETE,
            &format!("/media/{}", blob_id),
            Some(&tokens.access_token),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(cache.get(&blob_id).is_none());

    let (status, _) = app
        .send(empty_request(
            Method::GET,
            &format!("/media/{}", blob_id),
            Some(&tokens.access_token),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blob_larger_than_record_limit_is_served_uncached() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("photo@north.org", &MEDIA_SCOPES).await;
    let bytes = vec![7u8; 300];

    let (_, body) = app.send(upload(&tokens.access_token, bytes)).await;
    let blob_id: Uuid = body["blob_id"].as_str().unwrap().parse().unwrap();

    let blob = app.state.media.read_blob(blob_id).await.unwrap().unwrap();
    assert_eq!(blob.len(), 300);
    assert!(app.state.media.cache().get(&blob_id).is_none());
}

#[tokio::test]
async fn test_media_routes_check_scopes() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("viewer@north.org", &["media:read"]).await;

    let (status, body) = app.send(upload(&tokens.access_token, vec![1, 2, 3])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("media:write"));

    let (status, _) = app
        .send(empty_request(
            Method::GET,
            &format!("/media/{}", Uuid::new_v4()),
            Some(&tokens.access_token),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let app = TestApp::spawn().await;
    let (_, tokens) = app.user_with_scopes("photo@north.org", &MEDIA_SCOPES).await;

    let (status, _) = app.send(upload(&tokens.access_token, Vec::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
