mod common;

use chrono::{Duration, Utc};
use shelter_service::{
    models::TokenType,
    services::{
        EditingLockManager, InMemoryDatabase, LockSweepJob, Reaper, TokenStore, TokenSweepJob,
    },
};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_run_once_sweeps_expired_rows() {
    let db = Arc::new(InMemoryDatabase::new());
    let now = Utc::now();
    db.write("stale", TokenType::Access, now - Duration::minutes(1), None)
        .await
        .unwrap();
    db.write("live", TokenType::Access, now + Duration::minutes(10), None)
        .await
        .unwrap();

    // Expiry of zero makes every lock sweepable.
    let stale_locks = EditingLockManager::new(db.clone(), 0);
    stale_locks.acquire(1, "medical", Uuid::new_v4()).await.unwrap();
    stale_locks.acquire(2, "location", Uuid::new_v4()).await.unwrap();

    let reaper = Reaper::new(std::time::Duration::from_secs(14_400))
        .with_job(Arc::new(TokenSweepJob::new(db.clone())))
        .with_job(Arc::new(LockSweepJob::new(stale_locks)));

    let outcomes = reaper.run_once().await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].name, "token_sweep");
    assert_eq!(outcomes[0].result, Ok(1));
    assert_eq!(outcomes[1].name, "editing_lock_sweep");
    assert_eq!(outcomes[1].result, Ok(2));

    assert_eq!(db.token_count(), 1);
    assert!(db.read("live", TokenType::Access).await.unwrap().is_some());
    assert_eq!(db.lock_count(), 0);
}

#[tokio::test]
async fn test_run_once_with_nothing_to_sweep() {
    let db = Arc::new(InMemoryDatabase::new());
    let locks = EditingLockManager::new(db.clone(), 15);
    locks.acquire(1, "medical", Uuid::new_v4()).await.unwrap();

    let reaper = Reaper::new(std::time::Duration::from_secs(14_400))
        .with_job(Arc::new(TokenSweepJob::new(db.clone())))
        .with_job(Arc::new(LockSweepJob::new(locks)));

    let outcomes = reaper.run_once().await;

    assert!(outcomes.iter().all(|o| o.result == Ok(0)));
    assert_eq!(db.lock_count(), 1);
}

#[tokio::test]
async fn test_cancelled_reaper_exits_before_first_run() {
    let db = Arc::new(InMemoryDatabase::new());
    db.write("stale", TokenType::Reset, Utc::now() - Duration::minutes(1), None)
        .await
        .unwrap();

    let reaper = Reaper::new(std::time::Duration::from_secs(14_400))
        .with_job(Arc::new(TokenSweepJob::new(db.clone())));
    let shutdown = reaper.shutdown_token();
    let handle = reaper.start();

    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(db.token_count(), 1);
}
