//! Integration tests for BatchSyncEngine using in-memory mocks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use picsync_core::{
    AppError, BatchConfig, BatchEvent, BatchReporter, BatchStatus, BatchSyncState,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::integration::common::{
    MockMetadataStore, MockObjectStore, MockSource, engine, records, wait_for_status,
    wait_for_terminal, wait_until,
};

fn config(batch_size: u32) -> BatchConfig {
    BatchConfig::default()
        .with_batch_size(batch_size)
        .with_delay(0)
}

// =============================================================================
// Start and conflict
// =============================================================================

#[tokio::test]
async fn test_second_start_conflicts_until_terminal() {
    // Arrange
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let first = engine.start(config(10)).await.unwrap();
    let second = engine.start(config(10)).await;

    // Assert
    assert!(matches!(second, Err(AppError::Conflict(_))));
    assert_eq!(store.state_count(), 1, "rejected start must not create a row");

    wait_for_terminal(&engine, first).await;
    let third = engine.start(config(10)).await;
    assert!(third.is_ok(), "a terminal job frees the active slot");
}

#[tokio::test]
async fn test_reversed_date_range_rejected_without_row() {
    // Arrange
    let source = MockSource::new(records(5));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);
    let from = NaiveDate::from_ymd_opt(2024, 6, 2);
    let to = NaiveDate::from_ymd_opt(2024, 6, 1);

    // Act
    let result = engine
        .start(config(10).with_date_range(from, to))
        .await;

    // Assert
    assert!(matches!(result, Err(AppError::ValidationError(_))));
    assert_eq!(store.state_count(), 0);
    assert!(engine.active_job_id().is_none());
}

#[tokio::test]
async fn test_out_of_bounds_config_rejected() {
    let source = MockSource::new(records(5));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    assert!(matches!(
        engine.start(config(9)).await,
        Err(AppError::ValidationError(_))
    ));
    assert!(matches!(
        engine.start(config(501)).await,
        Err(AppError::ValidationError(_))
    ));
    assert!(matches!(
        engine.start(config(10).with_delay(61)).await,
        Err(AppError::ValidationError(_))
    ));
    assert_eq!(store.state_count(), 0);
}

// =============================================================================
// Processing loop
// =============================================================================

#[tokio::test]
async fn test_pages_split_into_batches() {
    // Arrange: 25 records in batches of 10 → pages of 10, 10, 5
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let id = engine.start(config(10)).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    // Assert
    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.batches_completed, 3);
    assert_eq!(state.current_offset, 25);
    assert_eq!(state.stats.records_processed, 25);
    assert_eq!(state.stats.images_synced, 25);
    assert_eq!(state.total_records_estimated, Some(25));
    assert_eq!(state.progress_percent(), Some(100.0));
    assert!(state.started_at.is_some());
    assert!(state.completed_at.is_some());
    assert_eq!(source.fetch_offsets(), vec![0, 10, 20, 25]);
    assert_eq!(objects.upload_count(), 25);
    assert_eq!(store.image_count(), 25);
}

#[tokio::test]
async fn test_empty_source_completes_immediately() {
    let source = MockSource::new(Vec::new());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.batches_completed, 0);
    assert_eq!(state.current_offset, 0);
    assert_eq!(state.total_records_estimated, Some(0));
    assert_eq!(state.progress_percent(), None);
}

#[tokio::test]
async fn test_offset_monotonic_across_checkpoints() {
    // Arrange
    let source = MockSource::new(records(35));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let id = engine.start(config(10)).await.unwrap();
    wait_for_terminal(&engine, id).await;

    // Assert
    let checkpoints = store.checkpoints_of(id);
    assert!(checkpoints.len() >= 5);
    for pair in checkpoints.windows(2) {
        assert!(pair[0].current_offset <= pair[1].current_offset);
    }
    for checkpoint in &checkpoints {
        let expected = (checkpoint.batches_completed * 10).min(35);
        assert_eq!(checkpoint.current_offset, expected);
    }
}

#[tokio::test]
async fn test_failing_upload_is_isolated() {
    // Arrange: the upload of r3 fails
    let source = MockSource::new(records(12));
    let objects = MockObjectStore::new();
    objects.fail_paths_containing("/r3_");
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let id = engine.start(config(10)).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    // Assert
    assert_eq!(state.status, BatchStatus::CompletedWithErrors);
    assert_eq!(state.stats.records_processed, 12);
    assert_eq!(state.stats.errors, 1);
    assert_eq!(state.stats.images_synced, 11);
    assert_eq!(state.current_offset, 12);
    assert_eq!(state.error_log.len(), 1);

    let entry = &state.error_log[0];
    assert_eq!(entry.record_id.as_deref(), Some("r3"));
    assert_eq!(entry.field.as_deref(), Some("Photo"));
    assert!(entry.error.contains("upload refused"));
    assert!(!entry.fatal);
    assert!(state.error_message.is_none());
}

#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    // Arrange
    let source = MockSource::new(records(15));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let id = engine.start(config(10).with_dry_run()).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    // Assert
    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.stats.records_processed, 15);
    assert_eq!(state.stats.images_synced, 15);
    assert_eq!(objects.upload_count(), 0);
    assert_eq!(store.upsert_count(), 0);
    assert!(source.downloads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_existing_images_are_skipped() {
    let all = records(10);
    let source = MockSource::new(all.clone());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    store.seed_image(&all[0], "Photo");
    store.seed_image(&all[1], "Photo");
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.stats.images_skipped, 2);
    assert_eq!(state.stats.images_synced, 8);
    assert_eq!(objects.upload_count(), 8);
}

#[tokio::test]
async fn test_date_range_passed_to_source() {
    // Records r0..r29 are one hour apart starting 2024-05-01 08:00, so
    // 2024-05-01 holds r0..r15 and 2024-05-02 holds r16..r29.
    let source = MockSource::new(records(30));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);
    let day = NaiveDate::from_ymd_opt(2024, 5, 1);

    let id = engine
        .start(config(10).with_date_range(day, day))
        .await
        .unwrap();
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.stats.records_processed, 16);
    assert_eq!(state.current_offset, 16);
}

// =============================================================================
// Page-fetch failures
// =============================================================================

#[tokio::test]
async fn test_unreachable_source_fails_job() {
    // Arrange: one attempt plus two retries, all failing
    let source = MockSource::new(records(5));
    source.fail_next_fetches(vec![
        AppError::Transport("connection refused".to_string()),
        AppError::Transport("connection refused".to_string()),
        AppError::Transport("connection refused".to_string()),
    ]);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let id = engine.start(config(10)).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    // Assert
    assert_eq!(state.status, BatchStatus::Failed);
    assert_eq!(source.fetch_offsets(), vec![0, 0, 0]);
    assert!(
        state
            .error_message
            .as_deref()
            .unwrap()
            .contains("connection refused")
    );
    assert!(state.error_log.last().unwrap().fatal);
    assert!(engine.active_job_id().is_none());
}

#[tokio::test]
async fn test_transient_fetch_error_is_retried() {
    let source = MockSource::new(records(5));
    source.fail_next_fetches(vec![AppError::NetworkError("reset".to_string())]);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.stats.records_processed, 5);
    assert_eq!(source.fetch_offsets(), vec![0, 0, 5]);
}

#[tokio::test]
async fn test_non_retryable_fetch_error_fails_immediately() {
    let source = MockSource::new(records(5));
    source.fail_next_fetches(vec![AppError::AuthError("invalid_code".to_string())]);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Failed);
    assert_eq!(source.fetch_offsets(), vec![0]);
}

#[tokio::test]
async fn test_failure_after_progress_keeps_counters() {
    let source = MockSource::new(records(25));
    let gate = source.hold_fetch_at(10);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    wait_until(|| source.fetch_offsets().contains(&10), "second page fetch").await;
    source.fail_next_fetches(vec![AppError::AuthError("revoked".to_string())]);
    gate.add_permits(1);
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Failed);
    assert_eq!(state.current_offset, 10);
    assert_eq!(state.batches_completed, 1);
    assert_eq!(state.stats.records_processed, 10);
}

// =============================================================================
// Pause, resume, cancel
// =============================================================================

/// Starts a 25-record job and pauses it while the second page is in flight.
///
/// Returns once the job is `paused` at offset 20.
async fn start_and_pause(
    engine: &crate::integration::common::TestEngine,
    source: &MockSource,
) -> (Uuid, BatchSyncState) {
    let gate = source.hold_fetch_at(10);
    let id = engine.start(config(10)).await.unwrap();
    wait_until(|| source.fetch_offsets().contains(&10), "second page fetch").await;

    engine.pause(id).await.unwrap();
    gate.add_permits(1);

    let state = wait_for_status(engine, id, BatchStatus::Paused).await;
    (id, state)
}

#[tokio::test]
async fn test_pause_takes_effect_at_batch_boundary() {
    // Arrange
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let (id, state) = start_and_pause(&engine, &source).await;

    // Assert: the in-flight batch completed before pausing
    assert_eq!(state.current_offset, 20);
    assert_eq!(state.batches_completed, 2);
    assert_eq!(state.stats.records_processed, 20);
    assert_eq!(source.fetch_offsets(), vec![0, 10]);
    assert_eq!(engine.active_job_id(), Some(id));

    // A paused job cannot be paused again
    assert!(matches!(
        engine.pause(id).await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_pause_resume_matches_uninterrupted_run() {
    // Arrange: a reference run without pausing
    let baseline_source = MockSource::new(records(25));
    let baseline_store = MockMetadataStore::new();
    let baseline = engine(&baseline_source, &MockObjectStore::new(), &baseline_store);
    let baseline_id = baseline.start(config(10)).await.unwrap();
    let expected = wait_for_terminal(&baseline, baseline_id).await;

    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let (id, _) = start_and_pause(&engine, &source).await;
    engine.resume(id).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    // Assert
    assert_eq!(state.status, expected.status);
    assert_eq!(state.current_offset, expected.current_offset);
    assert_eq!(state.batches_completed, expected.batches_completed);
    assert_eq!(state.stats, expected.stats);
    assert_eq!(source.fetch_offsets(), vec![0, 10, 20, 25]);
}

#[tokio::test]
async fn test_resume_requires_paused() {
    let source = MockSource::new(records(25));
    let gate = source.hold_fetch_at(0);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    wait_until(|| !source.fetch_offsets().is_empty(), "first page fetch").await;

    assert!(matches!(
        engine.resume(id).await,
        Err(AppError::InvalidState(_))
    ));

    gate.add_permits(1);
    wait_for_terminal(&engine, id).await;

    assert!(matches!(
        engine.resume(id).await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        engine.pause(id).await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(
        engine.cancel(id).await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let source = MockSource::new(records(5));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);
    let unknown = Uuid::new_v4();

    assert!(matches!(engine.pause(unknown).await, Err(AppError::NotFound(_))));
    assert!(matches!(engine.resume(unknown).await, Err(AppError::NotFound(_))));
    assert!(matches!(engine.cancel(unknown).await, Err(AppError::NotFound(_))));
    assert!(matches!(engine.status(unknown).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_cancel_paused_job_does_not_resume_loop() {
    // Arrange
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);
    let (id, paused) = start_and_pause(&engine, &source).await;
    let fetches_before = source.fetch_offsets().len();

    // Act
    engine.cancel(id).await.unwrap();

    // Assert: cancelled synchronously, nothing fetched afterwards
    let state = engine.status(id).await.unwrap();
    assert_eq!(state.status, BatchStatus::Cancelled);
    assert!(state.completed_at.is_some());
    assert_eq!(state.current_offset, paused.current_offset);
    assert!(engine.active_job_id().is_none());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(source.fetch_offsets().len(), fetches_before);
}

#[tokio::test]
async fn test_cancel_running_job_between_records() {
    // Arrange: the upload of r3 blocks until released
    let source = MockSource::new(records(10));
    let objects = MockObjectStore::new();
    let gate = objects.hold_upload("/r3_");
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    // Act
    let id = engine.start(config(10)).await.unwrap();
    wait_until(|| *objects.waiting.lock().unwrap() == 1, "r3 upload").await;
    engine.cancel(id).await.unwrap();
    gate.add_permits(1);
    let state = wait_for_terminal(&engine, id).await;

    // Assert: r3 finished, r4.. never started, the batch was not checkpointed
    assert_eq!(state.status, BatchStatus::Cancelled);
    assert_eq!(state.stats.records_processed, 4);
    assert_eq!(state.stats.images_synced, 4);
    assert_eq!(state.current_offset, 0);
    assert_eq!(state.batches_completed, 0);
    assert_eq!(objects.upload_count(), 4);
}

#[tokio::test]
async fn test_cancel_wins_over_pause() {
    let source = MockSource::new(records(25));
    let gate = source.hold_fetch_at(10);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    wait_until(|| source.fetch_offsets().contains(&10), "second page fetch").await;
    engine.pause(id).await.unwrap();
    engine.cancel(id).await.unwrap();
    gate.add_permits(1);
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_while_pause_is_being_saved() {
    // Arrange: the paused row becomes visible 300ms before the save returns
    let source = MockSource::new(records(25));
    let gate = source.hold_fetch_at(10);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    store.delay_paused_saves(Duration::from_millis(300));
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    wait_until(|| source.fetch_offsets().contains(&10), "second page fetch").await;
    engine.pause(id).await.unwrap();
    gate.add_permits(1);
    wait_until(
        || store.state(id).is_some_and(|s| s.status == BatchStatus::Paused),
        "paused row",
    )
    .await;

    // Act
    engine.cancel(id).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    // Assert
    assert_eq!(state.status, BatchStatus::Cancelled);
    assert!(state.completed_at.is_some());
    assert!(engine.active_job_id().is_none());
}

#[tokio::test]
async fn test_cancel_pending_job() {
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10)).await.unwrap();
    engine.cancel(id).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Cancelled);
    assert!(source.fetch_offsets().is_empty());
}

// =============================================================================
// Status projection, recovery, shutdown
// =============================================================================

#[tokio::test]
async fn test_overview_lists_active_and_recent() {
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let (id, _) = start_and_pause(&engine, &source).await;
    let overview = engine.overview().await.unwrap();
    assert_eq!(overview.active.as_ref().map(|s| s.id), Some(id));
    assert_eq!(overview.recent.len(), 1);

    engine.cancel(id).await.unwrap();
    let overview = engine.overview().await.unwrap();
    assert!(overview.active.is_none());
    assert_eq!(overview.recent[0].status, BatchStatus::Cancelled);
}

#[tokio::test]
async fn test_recover_parks_interrupted_job() {
    // Arrange: a job left running at offset 10 and an older pending one
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();

    let mut older = BatchSyncState::new(config(10));
    older.created_at -= chrono::Duration::minutes(5);
    store.insert_state(older.clone());

    let mut interrupted = BatchSyncState::new(config(10));
    interrupted.transition(BatchStatus::Running).unwrap();
    interrupted.current_offset = 10;
    interrupted.batches_completed = 1;
    interrupted.stats.records_processed = 10;
    interrupted.stats.images_synced = 10;
    store.insert_state(interrupted.clone());

    let engine = engine(&source, &objects, &store);

    // Act
    let recovered = engine.recover().await.unwrap();

    // Assert
    assert_eq!(recovered, Some(interrupted.id));
    assert_eq!(engine.active_job_id(), Some(interrupted.id));
    assert_eq!(store.state(interrupted.id).unwrap().status, BatchStatus::Paused);

    let stale = store.state(older.id).unwrap();
    assert_eq!(stale.status, BatchStatus::Failed);
    assert!(stale.error_message.unwrap().contains("interrupted"));

    assert!(matches!(
        engine.start(config(10)).await,
        Err(AppError::Conflict(_))
    ));

    engine.resume(interrupted.id).await.unwrap();
    let state = wait_for_terminal(&engine, interrupted.id).await;
    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.current_offset, 25);
    assert_eq!(state.batches_completed, 3);
    assert_eq!(state.stats.records_processed, 25);
    assert_eq!(source.fetch_offsets(), vec![10, 20, 25]);
}

#[tokio::test]
async fn test_recover_without_leftovers() {
    let source = MockSource::new(records(5));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    assert_eq!(engine.recover().await.unwrap(), None);
    assert!(engine.active_job_id().is_none());
}

#[tokio::test]
async fn test_adopt_leaves_running_job_alone() {
    // Arrange: another process is driving this job
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let mut running = BatchSyncState::new(config(10));
    running.transition(BatchStatus::Running).unwrap();
    running.current_offset = 10;
    store.insert_state(running.clone());
    let engine = engine(&source, &objects, &store);

    // Act
    let result = engine.adopt(running.id).await;

    // Assert: refused, and the row was not rewritten
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(engine.active_job_id().is_none());
    assert_eq!(store.state(running.id).unwrap(), running);
    assert_eq!(store.checkpoints_of(running.id).len(), 0);
}

#[tokio::test]
async fn test_adopt_paused_job_then_resume() {
    // Arrange
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let mut paused = BatchSyncState::new(config(10));
    paused.transition(BatchStatus::Running).unwrap();
    paused.current_offset = 10;
    paused.batches_completed = 1;
    paused.stats.records_processed = 10;
    paused.transition(BatchStatus::Paused).unwrap();
    store.insert_state(paused.clone());
    let engine = engine(&source, &objects, &store);

    // Act
    engine.adopt(paused.id).await.unwrap();
    engine.resume(paused.id).await.unwrap();
    let state = wait_for_terminal(&engine, paused.id).await;

    // Assert
    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.stats.records_processed, 25);
    assert_eq!(source.fetch_offsets(), vec![10, 20, 25]);
}

#[tokio::test]
async fn test_adopt_terminal_job_reports_invalid_state() {
    let source = MockSource::new(records(5));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let mut done = BatchSyncState::new(config(10));
    done.transition(BatchStatus::Running).unwrap();
    done.transition(BatchStatus::Completed).unwrap();
    store.insert_state(done.clone());
    let engine = engine(&source, &objects, &store);

    engine.adopt(done.id).await.unwrap();

    assert!(engine.active_job_id().is_none());
    assert!(matches!(
        engine.cancel(done.id).await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_shutdown_pauses_at_batch_boundary() {
    let source = MockSource::new(records(25));
    let gate = source.hold_fetch_at(10);
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let shutdown = CancellationToken::new();
    let engine = engine(&source, &objects, &store).with_shutdown(shutdown.clone());

    let id = engine.start(config(10)).await.unwrap();
    wait_until(|| source.fetch_offsets().contains(&10), "second page fetch").await;
    shutdown.cancel();
    gate.add_permits(1);
    let state = wait_for_status(&engine, id, BatchStatus::Paused).await;

    assert_eq!(state.current_offset, 20);
    assert_eq!(engine.active_job_id(), Some(id));
}

#[tokio::test]
async fn test_inter_batch_delay_interrupted_by_cancel() {
    let source = MockSource::new(records(25));
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let engine = engine(&source, &objects, &store);

    let id = engine.start(config(10).with_delay(60)).await.unwrap();
    wait_until(|| store.checkpoints_of(id).iter().any(|s| s.batches_completed == 1), "first checkpoint")
        .await;
    engine.cancel(id).await.unwrap();
    let state = wait_for_terminal(&engine, id).await;

    assert_eq!(state.status, BatchStatus::Cancelled);
    assert_eq!(state.current_offset, 10);
}

// =============================================================================
// Reporting
// =============================================================================

#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<&'static str>>,
}

impl BatchReporter for RecordingReporter {
    fn report(&self, event: BatchEvent<'_>) {
        let name = match event {
            BatchEvent::JobStarted { .. } => "started",
            BatchEvent::JobResumed { .. } => "resumed",
            BatchEvent::BatchStarted { .. } => "batch_started",
            BatchEvent::FetchRetry { .. } => "retry",
            BatchEvent::BatchCompleted { .. } => "batch_completed",
            BatchEvent::RecordFailed { .. } => "record_failed",
            BatchEvent::Paused { .. } => "paused",
            BatchEvent::Cancelled { .. } => "cancelled",
            BatchEvent::Finished { .. } => "finished",
            BatchEvent::Failed { .. } => "failed",
        };
        self.events.lock().unwrap().push(name);
    }
}

#[tokio::test]
async fn test_reporter_receives_lifecycle_events() {
    let source = MockSource::new(records(12));
    let objects = MockObjectStore::new();
    objects.fail_paths_containing("/r11_");
    let store = MockMetadataStore::new();
    let reporter = Arc::new(RecordingReporter::default());
    let engine = engine(&source, &objects, &store).with_reporter(reporter.clone());

    let id = engine.start(config(10)).await.unwrap();
    wait_for_terminal(&engine, id).await;
    wait_until(
        || reporter.events.lock().unwrap().last() == Some(&"finished"),
        "finished event",
    )
    .await;

    let events = reporter.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "started",
            "batch_started",
            "batch_completed",
            "batch_started",
            "record_failed",
            "batch_completed",
            "batch_started",
            "finished",
        ]
    );
}
