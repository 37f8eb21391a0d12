//! Test utilities and mock implementations for integration tests.
//!
//! Provides in-memory implementations of the collaborator traits for testing
//! `BatchSyncEngine` and `SyncRunService` in isolation. Every mock records its
//! calls and can be told to fail or to block at a chosen point.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use picsync_core::batch::DateRange;
use picsync_core::traits::{ImageTransform, MetadataStore, ObjectStore, RecordSource};
use picsync_core::{
    AppError, BatchStatus, BatchSyncEngine, BatchSyncState, FieldMapping, ImageField, NewImage,
    RecordPipeline, RetryConfig, SourceRecord, SyncRun, SyncRunService, TransformOptions,
    TransformedImage,
};
use serde_json::json;
use tokio::sync::Semaphore;
use uuid::Uuid;

pub type TestEngine = BatchSyncEngine<MockSource, MockTransform, MockObjectStore, MockMetadataStore>;
pub type TestRunService =
    SyncRunService<MockSource, MockTransform, MockObjectStore, MockMetadataStore>;

// =============================================================================
// Records
// =============================================================================

/// Creation time of record `i`: one hour apart, starting 2024-05-01.
pub fn created_at(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + ChronoDuration::hours(i as i64)
}

/// A record `r{i}` with one image field `Photo`.
pub fn record(i: usize) -> SourceRecord {
    let id = format!("r{}", i);
    SourceRecord {
        id: id.clone(),
        created_at: Some(created_at(i)),
        modified_at: Some(created_at(i)),
        images: vec![ImageField {
            field_name: "Photo".to_string(),
            download_url: format!("https://files.example.com/{}.jpg", id),
            filename: format!("{}.jpg", id),
        }],
        fields: json!({
            "ID": id,
            "Category": "Roofing",
            "Tags": ["exterior"],
            "Project_Name": "Maple St",
            "Department": "Field",
        })
        .as_object()
        .cloned()
        .unwrap(),
    }
}

pub fn records(n: usize) -> Vec<SourceRecord> {
    (0..n).map(record).collect()
}

// =============================================================================
// MockSource
// =============================================================================

/// Record source serving a fixed list of records.
#[derive(Clone)]
pub struct MockSource {
    records: Arc<Vec<SourceRecord>>,
    count: Option<u64>,
    /// `(offset, limit)` of every `fetch_page` call.
    pub fetches: Arc<Mutex<Vec<(u64, u32)>>>,
    pub downloads: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<VecDeque<AppError>>>,
    hold: Arc<Mutex<Option<(u64, Arc<Semaphore>)>>>,
}

impl MockSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        let count = Some(records.len() as u64);
        Self {
            records: Arc::new(records),
            count,
            fetches: Arc::new(Mutex::new(Vec::new())),
            downloads: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            hold: Arc::new(Mutex::new(None)),
        }
    }

    /// The next page fetches fail with these errors, in order.
    pub fn fail_next_fetches(&self, errors: Vec<AppError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    /// Makes the first fetch at `offset` wait until the returned semaphore gets a permit.
    pub fn hold_fetch_at(&self, offset: u64) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold.lock().unwrap() = Some((offset, Arc::clone(&gate)));
        gate
    }

    pub fn fetch_offsets(&self) -> Vec<u64> {
        self.fetches.lock().unwrap().iter().map(|(o, _)| *o).collect()
    }

    fn in_range(&self, range: &DateRange) -> Vec<SourceRecord> {
        self.records
            .iter()
            .filter(|r| {
                r.modified_at
                    .is_none_or(|at| range.contains(at.date_naive()))
            })
            .cloned()
            .collect()
    }
}

impl RecordSource for MockSource {
    async fn fetch_page(
        &self,
        offset: u64,
        limit: u32,
        range: &DateRange,
    ) -> Result<Vec<SourceRecord>, AppError> {
        self.fetches.lock().unwrap().push((offset, limit));

        let gate = {
            let mut hold = self.hold.lock().unwrap();
            match hold.as_ref() {
                Some((at, _)) if *at == offset => hold.take().map(|(_, gate)| gate),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(self
            .in_range(range)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, _range: &DateRange) -> Result<Option<u64>, AppError> {
        Ok(self.count)
    }

    async fn fetch_before(
        &self,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<SourceRecord>, AppError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut older: Vec<_> = self
            .records
            .iter()
            .filter(|r| match (before, r.created_at) {
                (Some(cursor), Some(at)) => at < cursor,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();
        older.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        older.truncate(limit as usize);
        Ok(older)
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.downloads.lock().unwrap().push(url.to_string());
        if url.contains("broken") {
            return Err(AppError::NetworkError(format!("download failed: {}", url)));
        }
        Ok(url.as_bytes().to_vec())
    }
}

// =============================================================================
// MockTransform
// =============================================================================

/// Transform that passes bytes through unchanged.
#[derive(Clone, Default)]
pub struct MockTransform;

impl ImageTransform for MockTransform {
    fn transform(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        _options: &TransformOptions,
    ) -> Result<TransformedImage, AppError> {
        Ok(TransformedImage {
            bytes,
            filename: filename.to_string(),
            was_processed: false,
        })
    }
}

// =============================================================================
// MockObjectStore
// =============================================================================

/// One recorded upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub path: String,
    pub size: usize,
    pub content_type: String,
}

/// Object store keeping uploads in memory.
#[derive(Clone, Default)]
pub struct MockObjectStore {
    pub uploads: Arc<Mutex<Vec<Upload>>>,
    fail_paths: Arc<Mutex<Vec<String>>>,
    hold: Arc<Mutex<Option<(String, Arc<Semaphore>)>>>,
    /// Number of uploads currently blocked on a hold.
    pub waiting: Arc<Mutex<usize>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads whose path contains `fragment` fail.
    pub fn fail_paths_containing(&self, fragment: &str) {
        self.fail_paths.lock().unwrap().push(fragment.to_string());
    }

    /// Makes the first upload whose path contains `fragment` wait for a permit.
    pub fn hold_upload(&self, fragment: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold.lock().unwrap() = Some((fragment.to_string(), Arc::clone(&gate)));
        gate
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

impl ObjectStore for MockObjectStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let gate = {
            let mut hold = self.hold.lock().unwrap();
            match hold.as_ref() {
                Some((fragment, _)) if path.contains(fragment.as_str()) => {
                    hold.take().map(|(_, gate)| gate)
                }
                _ => None,
            }
        };
        if let Some(gate) = gate {
            *self.waiting.lock().unwrap() += 1;
            let _permit = gate.acquire().await.unwrap();
            *self.waiting.lock().unwrap() -= 1;
        }

        let failing = self
            .fail_paths
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| path.contains(fragment.as_str()));
        if failing {
            return Err(AppError::StorageError(format!("upload refused: {}", path)));
        }

        self.uploads.lock().unwrap().push(Upload {
            path: path.to_string(),
            size: bytes.len(),
            content_type: content_type.to_string(),
        });
        Ok(path.to_string())
    }

    async fn signed_url(&self, path: &str, expires_in: Duration) -> Result<String, AppError> {
        Ok(format!(
            "https://storage.example.com/{}?expires={}",
            path,
            expires_in.as_secs()
        ))
    }
}

// =============================================================================
// MockMetadataStore
// =============================================================================

/// Metadata store backed by in-memory maps.
///
/// Every `save_batch_state` call is also appended to `checkpoints`, so tests can
/// inspect the full sequence of persisted job states.
#[derive(Clone, Default)]
pub struct MockMetadataStore {
    pub images: Arc<Mutex<HashMap<(String, String), NewImage>>>,
    pub upserts: Arc<Mutex<usize>>,
    states: Arc<Mutex<HashMap<Uuid, BatchSyncState>>>,
    pub checkpoints: Arc<Mutex<Vec<BatchSyncState>>>,
    pub runs: Arc<Mutex<HashMap<Uuid, SyncRun>>>,
    pub run_saves: Arc<Mutex<usize>>,
    paused_save_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretends an image row already exists.
    pub fn seed_image(&self, record: &SourceRecord, field: &str) {
        let image = NewImage {
            zoho_record_id: record.id.clone(),
            field_name: field.to_string(),
            storage_path: format!("seed/{}", record.id),
            original_filename: "seed.jpg".to_string(),
            file_size_bytes: 1,
            content_type: "image/jpeg".to_string(),
            was_processed: false,
            tags: Vec::new(),
            category: None,
            description: None,
            job_captain_timesheet: None,
            project_name: None,
            department: None,
            zoho_metadata: serde_json::Value::Null,
            zoho_created_at: record.created_at,
            zoho_modified_at: record.modified_at,
        };
        self.images
            .lock()
            .unwrap()
            .insert((record.id.clone(), field.to_string()), image);
    }

    /// Saves of a `paused` row return only after `delay`, once the row is visible.
    pub fn delay_paused_saves(&self, delay: Duration) {
        *self.paused_save_delay.lock().unwrap() = Some(delay);
    }

    /// Writes a state row directly, bypassing the engine.
    pub fn insert_state(&self, state: BatchSyncState) {
        self.states.lock().unwrap().insert(state.id, state);
    }

    pub fn state(&self, id: Uuid) -> Option<BatchSyncState> {
        self.states.lock().unwrap().get(&id).cloned()
    }

    pub fn state_count(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    pub fn image_count(&self) -> usize {
        self.images.lock().unwrap().len()
    }

    pub fn upsert_count(&self) -> usize {
        *self.upserts.lock().unwrap()
    }

    /// Persisted checkpoints of one job, in write order.
    pub fn checkpoints_of(&self, id: Uuid) -> Vec<BatchSyncState> {
        self.checkpoints
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.id == id)
            .cloned()
            .collect()
    }
}

impl MetadataStore for MockMetadataStore {
    async fn image_exists(&self, record_id: &str, field_name: &str) -> Result<bool, AppError> {
        Ok(self
            .images
            .lock()
            .unwrap()
            .contains_key(&(record_id.to_string(), field_name.to_string())))
    }

    async fn upsert_image(&self, image: &NewImage) -> Result<(), AppError> {
        *self.upserts.lock().unwrap() += 1;
        self.images.lock().unwrap().insert(
            (image.zoho_record_id.clone(), image.field_name.clone()),
            image.clone(),
        );
        Ok(())
    }

    async fn oldest_synced_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self
            .images
            .lock()
            .unwrap()
            .values()
            .filter_map(|i| i.zoho_created_at)
            .min())
    }

    async fn save_batch_state(&self, state: &BatchSyncState) -> Result<(), AppError> {
        self.checkpoints.lock().unwrap().push(state.clone());
        self.states.lock().unwrap().insert(state.id, state.clone());

        let delay = *self.paused_save_delay.lock().unwrap();
        if let (BatchStatus::Paused, Some(delay)) = (state.status, delay) {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn get_batch_state(&self, id: Uuid) -> Result<Option<BatchSyncState>, AppError> {
        Ok(self.state(id))
    }

    async fn list_batch_states(&self, limit: usize) -> Result<Vec<BatchSyncState>, AppError> {
        let mut states: Vec<_> = self.states.lock().unwrap().values().cloned().collect();
        states.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        states.truncate(limit);
        Ok(states)
    }

    async fn list_active_batch_states(&self) -> Result<Vec<BatchSyncState>, AppError> {
        let mut states: Vec<_> = self
            .states
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status.is_active())
            .cloned()
            .collect();
        states.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(states)
    }

    async fn save_sync_run(&self, run: &SyncRun) -> Result<(), AppError> {
        *self.run_saves.lock().unwrap() += 1;
        self.runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }
}

// =============================================================================
// Builders and helpers
// =============================================================================

pub fn pipeline(
    source: &MockSource,
    objects: &MockObjectStore,
    store: &MockMetadataStore,
) -> RecordPipeline<MockSource, MockTransform, MockObjectStore, MockMetadataStore> {
    RecordPipeline::new(
        source.clone(),
        MockTransform,
        objects.clone(),
        store.clone(),
        FieldMapping::default(),
        TransformOptions {
            max_size_bytes: 5 * 1024 * 1024,
            max_dimension: 4000,
            quality: 85,
        },
    )
}

/// Fast retry policy so failure scenarios finish in milliseconds.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

pub fn engine(
    source: &MockSource,
    objects: &MockObjectStore,
    store: &MockMetadataStore,
) -> TestEngine {
    BatchSyncEngine::new(pipeline(source, objects, store)).with_retry(fast_retry())
}

pub fn run_service(
    source: &MockSource,
    objects: &MockObjectStore,
    store: &MockMetadataStore,
) -> TestRunService {
    SyncRunService::new(pipeline(source, objects, store))
}

/// Polls until `condition` holds, panicking after five seconds.
pub async fn wait_until<F>(mut condition: F, what: &str)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Polls the engine until the job reaches `status`.
pub async fn wait_for_status(engine: &TestEngine, id: Uuid, status: BatchStatus) -> BatchSyncState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = engine.status(id).await.unwrap();
        if state.status == status {
            return state;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("job {} stuck in {} waiting for {}", id, state.status, status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Polls until the job reaches any terminal state.
pub async fn wait_for_terminal(engine: &TestEngine, id: Uuid) -> BatchSyncState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = engine.status(id).await.unwrap();
        if state.status.is_terminal() {
            return state;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("job {} stuck in {}", id, state.status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
