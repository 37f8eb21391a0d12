//! Integration tests for the per-record pipeline.

use picsync_core::{ImageField, ImageOutcome, UNKNOWN_RECORD_ID};

use crate::integration::common::{
    MockMetadataStore, MockObjectStore, MockSource, pipeline, record,
};

#[tokio::test]
async fn test_synced_image_row_contents() {
    // Arrange
    let source = MockSource::new(Vec::new());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let pipeline = pipeline(&source, &objects, &store);
    let rec = record(2);

    // Act
    let result = pipeline.process_record(&rec, false).await;

    // Assert
    assert_eq!(result.outcomes, vec![ImageOutcome::Synced]);
    assert!(result.failures.is_empty());

    let uploads = objects.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, "Roofing/2024-05/r2_r2.jpg");
    assert_eq!(uploads[0].content_type, "image/jpeg");

    let images = store.images.lock().unwrap();
    let row = images
        .get(&("r2".to_string(), "Photo".to_string()))
        .expect("image row upserted");
    assert_eq!(row.storage_path, "Roofing/2024-05/r2_r2.jpg");
    assert_eq!(row.original_filename, "r2.jpg");
    assert_eq!(row.file_size_bytes, uploads[0].size as i64);
    assert_eq!(row.category.as_deref(), Some("Roofing"));
    assert_eq!(row.project_name.as_deref(), Some("Maple St"));
    assert_eq!(row.department.as_deref(), Some("Field"));
    assert_eq!(row.description, None);
    assert_eq!(row.tags, vec!["exterior", "Roofing"]);
    assert_eq!(row.zoho_metadata["ID"], "r2");
    assert_eq!(row.zoho_created_at, rec.created_at);
    assert!(!row.was_processed);
}

#[tokio::test]
async fn test_invalid_url_is_isolated() {
    // Arrange: a record with a bad URL next to a good one
    let source = MockSource::new(Vec::new());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let pipeline = pipeline(&source, &objects, &store);
    let mut rec = record(0);
    rec.images.insert(
        0,
        ImageField {
            field_name: "Sketch".to_string(),
            download_url: "file:///etc/passwd".to_string(),
            filename: "sketch.png".to_string(),
        },
    );

    // Act
    let result = pipeline.process_record(&rec, false).await;

    // Assert
    assert_eq!(
        result.outcomes,
        vec![ImageOutcome::Failed, ImageOutcome::Synced]
    );
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].field, "Sketch");
    assert!(result.failures[0].error.to_string().contains("Invalid URL"));
    assert!(source.downloads.lock().unwrap().iter().all(|u| u.starts_with("https://")));
}

#[tokio::test]
async fn test_download_failure_is_isolated() {
    let source = MockSource::new(Vec::new());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let pipeline = pipeline(&source, &objects, &store);
    let mut rec = record(0);
    rec.images[0].download_url = "https://files.example.com/broken.jpg".to_string();

    let result = pipeline.process_record(&rec, false).await;

    assert_eq!(result.outcomes, vec![ImageOutcome::Failed]);
    assert_eq!(objects.upload_count(), 0);
    assert_eq!(store.upsert_count(), 0);
}

#[tokio::test]
async fn test_record_without_images_counts_as_processed() {
    let source = MockSource::new(Vec::new());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let pipeline = pipeline(&source, &objects, &store);
    let mut rec = record(0);
    rec.images.clear();

    let result = pipeline.process_record(&rec, false).await;
    let mut stats = picsync_core::SyncStats::default();
    let mut log = Vec::new();
    result.tally(&mut stats, &mut log, 10);

    assert_eq!(stats.records_processed, 1);
    assert_eq!(stats.images_total(), 0);
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_uncategorized_record_path() {
    let source = MockSource::new(Vec::new());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let pipeline = pipeline(&source, &objects, &store);
    let mut rec = record(0);
    rec.fields.remove("Category");
    rec.created_at = None;

    pipeline.process_record(&rec, false).await;

    let uploads = objects.uploads.lock().unwrap();
    assert_eq!(uploads[0].path, "uncategorized/unknown/r0_r0.jpg");
}

#[tokio::test]
async fn test_records_without_id_are_logged_as_errors() {
    // Arrange: two id-less records, the first one already has a catalog row
    let source = MockSource::new(Vec::new());
    let objects = MockObjectStore::new();
    let store = MockMetadataStore::new();
    let pipeline = pipeline(&source, &objects, &store);
    let mut first = record(0);
    first.id = UNKNOWN_RECORD_ID.to_string();
    store.seed_image(&first, "Photo");
    let mut second = record(1);
    second.id = UNKNOWN_RECORD_ID.to_string();

    // Act
    let mut stats = picsync_core::SyncStats::default();
    let mut log = Vec::new();
    for rec in [&first, &second] {
        pipeline
            .process_record(rec, false)
            .await
            .tally(&mut stats, &mut log, 10);
    }

    // Assert: both images fail visibly instead of being skipped
    assert_eq!(stats.records_processed, 2);
    assert_eq!(stats.images_skipped, 0);
    assert_eq!(stats.errors, 2);
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.record_id.as_deref() == Some(UNKNOWN_RECORD_ID)));
    assert!(log[0].error.contains("no ID"));
    assert_eq!(objects.upload_count(), 0);
}
