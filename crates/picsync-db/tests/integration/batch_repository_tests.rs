//! Integration tests for BatchStateRepository.

use chrono::NaiveDate;
use picsync_core::batch::{BatchConfig, BatchStatus, BatchSyncState, ErrorLogEntry};
use picsync_core::error::AppError;
use picsync_db::BatchStateRepository;

use crate::integration::common::setup_test_db;

fn sample_state() -> BatchSyncState {
    BatchSyncState::new(
        BatchConfig::default()
            .with_batch_size(50)
            .with_delay(5)
            .with_date_range(NaiveDate::from_ymd_opt(2024, 1, 1), None)
            .with_dry_run(),
    )
}

#[tokio::test]
async fn test_save_and_get_round_trip() {
    let (pool, _container) = setup_test_db().await;
    let repo = BatchStateRepository::new(pool);
    let state = sample_state();

    repo.save(&state).await.expect("save should succeed");
    let stored = repo.get(state.id).await.unwrap().expect("state should exist");

    assert_eq!(stored.status, BatchStatus::Pending);
    assert_eq!(stored.config, state.config);
    assert_eq!(stored.current_offset, 0);
    assert_eq!(stored.total_records_estimated, None);
    assert!(stored.error_log.is_empty());
}

#[tokio::test]
async fn test_save_overwrites_checkpoint() {
    // Arrange
    let (pool, _container) = setup_test_db().await;
    let repo = BatchStateRepository::new(pool);
    let mut state = sample_state();
    repo.save(&state).await.unwrap();

    // Act: run two batches, then fail
    state.transition(BatchStatus::Running).unwrap();
    state.total_records_estimated = Some(240);
    state.current_offset = 100;
    state.batches_completed = 2;
    state.stats.records_processed = 100;
    state.stats.images_synced = 97;
    state.stats.errors = 3;
    state
        .error_log
        .push(ErrorLogEntry::record("r12", "Photo", "upload failed"));
    repo.save(&state).await.unwrap();
    state.fail(&AppError::Transport("report unreachable".to_string()), 500);
    repo.save(&state).await.unwrap();

    // Assert
    let stored = repo.get(state.id).await.unwrap().unwrap();
    assert_eq!(stored.status, BatchStatus::Failed);
    assert_eq!(stored.current_offset, 100);
    assert_eq!(stored.batches_completed, 2);
    assert_eq!(stored.total_records_estimated, Some(240));
    assert_eq!(stored.stats, state.stats);
    assert_eq!(stored.error_log.len(), 2);
    assert_eq!(stored.error_log[0].record_id.as_deref(), Some("r12"));
    assert!(stored.error_log[1].fatal);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());
    assert!(
        stored
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("report unreachable"))
    );
}

#[tokio::test]
async fn test_get_unknown_returns_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = BatchStateRepository::new(pool);

    assert!(repo.get(uuid::Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_recent_and_active() {
    let (pool, _container) = setup_test_db().await;
    let repo = BatchStateRepository::new(pool);

    let mut done = sample_state();
    done.created_at -= chrono::Duration::minutes(10);
    done.transition(BatchStatus::Running).unwrap();
    done.transition(BatchStatus::Completed).unwrap();
    repo.save(&done).await.unwrap();

    let mut paused = sample_state();
    paused.transition(BatchStatus::Running).unwrap();
    paused.transition(BatchStatus::Paused).unwrap();
    repo.save(&paused).await.unwrap();

    let recent = repo.list_recent(10).await.unwrap();
    assert_eq!(
        recent.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![paused.id, done.id]
    );
    assert_eq!(repo.list_recent(1).await.unwrap().len(), 1);

    let active = repo.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, paused.id);
    assert_eq!(active[0].status, BatchStatus::Paused);
}

#[tokio::test]
async fn test_second_active_job_is_rejected() {
    // Arrange: one paused job already holds the active slot
    let (pool, _container) = setup_test_db().await;
    let repo = BatchStateRepository::new(pool);
    let mut paused = sample_state();
    paused.transition(BatchStatus::Running).unwrap();
    paused.transition(BatchStatus::Paused).unwrap();
    repo.save(&paused).await.unwrap();

    // Act
    let second = sample_state();
    let result = repo.save(&second).await;

    // Assert
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(repo.get(second.id).await.unwrap().is_none());
    assert_eq!(repo.list_active().await.unwrap().len(), 1);

    // Once the first job is terminal the slot is free again
    paused.transition(BatchStatus::Cancelled).unwrap();
    repo.save(&paused).await.unwrap();
    repo.save(&second).await.expect("slot should be free");
    assert_eq!(repo.list_active().await.unwrap()[0].id, second.id);
}
