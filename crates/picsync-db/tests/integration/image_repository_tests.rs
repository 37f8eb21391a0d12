//! Integration tests for ImageRepository.

use picsync_core::models::{ImageFilter, NewImage};
use picsync_db::ImageRepository;

use crate::integration::common::{created_at, sample_image, setup_test_db};

#[tokio::test]
async fn test_upsert_inserts_new_image() {
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);

    let image = sample_image("r1", 0);
    let id = repo.upsert(&image).await.expect("upsert should succeed");

    let stored = repo
        .get(id)
        .await
        .expect("get should succeed")
        .expect("image should exist");
    assert_eq!(stored.zoho_record_id, "r1");
    assert_eq!(stored.storage_path, image.storage_path);
    assert_eq!(stored.original_filename.as_deref(), Some("front-r1.jpg"));
    assert_eq!(stored.file_size_bytes, Some(1024));
    assert_eq!(stored.tags, vec!["exterior", "Roofing"]);
    assert_eq!(stored.zoho_metadata["ID"], "r1");
    assert_eq!(stored.zoho_created_at, Some(created_at(0)));
}

#[tokio::test]
async fn test_upsert_overwrites_same_record_field() {
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);

    let id1 = repo.upsert(&sample_image("r1", 0)).await.unwrap();
    let updated = NewImage {
        storage_path: "Siding/2024-03/r1_front.jpg".to_string(),
        category: Some("Siding".to_string()),
        was_processed: true,
        ..sample_image("r1", 0)
    };
    let id2 = repo.upsert(&updated).await.unwrap();

    assert_eq!(id1, id2, "upsert should keep the row id");
    let stored = repo.get(id1).await.unwrap().unwrap();
    assert_eq!(stored.storage_path, "Siding/2024-03/r1_front.jpg");
    assert_eq!(stored.category.as_deref(), Some("Siding"));
    assert!(stored.was_processed);
    assert_eq!(repo.stats().await.unwrap().total_images, 1);
}

#[tokio::test]
async fn test_exists_is_keyed_by_record_and_field() {
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);

    repo.upsert(&sample_image("r1", 0)).await.unwrap();

    assert!(repo.exists("r1", "Photo").await.unwrap());
    assert!(!repo.exists("r1", "Sketch").await.unwrap());
    assert!(!repo.exists("r2", "Photo").await.unwrap());
}

#[tokio::test]
async fn test_oldest_created_at() {
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);

    assert_eq!(repo.oldest_created_at().await.unwrap(), None);

    repo.upsert(&sample_image("r5", 5)).await.unwrap();
    repo.upsert(&sample_image("r2", 2)).await.unwrap();
    repo.upsert(&sample_image("r7", 7)).await.unwrap();

    assert_eq!(repo.oldest_created_at().await.unwrap(), Some(created_at(2)));
}

#[tokio::test]
async fn test_list_filters_and_counts() {
    // Arrange
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);
    for i in 0..5 {
        repo.upsert(&sample_image(&format!("r{}", i), i)).await.unwrap();
    }
    repo.upsert(&NewImage {
        project_name: Some("Oak Ave".to_string()),
        tags: vec!["interior".to_string()],
        ..sample_image("r9", 9)
    })
    .await
    .unwrap();

    // Act
    let by_project = repo
        .list(&ImageFilter {
            project_name: Some("Maple St".to_string()),
            limit: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    let by_tag = repo
        .list(&ImageFilter {
            tags: vec!["interior".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    let by_search = repo
        .list(&ImageFilter {
            search: Some("FRONT-R3".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    // Assert
    assert_eq!(by_project.total, 5);
    assert_eq!(by_project.items.len(), 2);
    assert_eq!(by_tag.total, 1);
    assert_eq!(by_tag.items[0].zoho_record_id, "r9");
    assert_eq!(by_search.total, 1);
    assert_eq!(by_search.items[0].zoho_record_id, "r3");
}

#[tokio::test]
async fn test_list_rejects_oversized_page() {
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);

    let result = repo
        .list(&ImageFilter {
            limit: 10_000,
            ..Default::default()
        })
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_filter_values_are_distinct_and_sorted() {
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);
    repo.upsert(&sample_image("r1", 1)).await.unwrap();
    repo.upsert(&NewImage {
        project_name: Some("Birch Rd".to_string()),
        department: Some(String::new()),
        tags: vec!["interior".to_string(), "exterior".to_string()],
        ..sample_image("r2", 2)
    })
    .await
    .unwrap();

    let values = repo.filter_values().await.unwrap();

    assert_eq!(values.projects, vec!["Birch Rd", "Maple St"]);
    assert_eq!(values.departments, vec!["Field"]);
    assert_eq!(values.job_captains, vec!["Alex"]);
    assert_eq!(values.categories, vec!["Roofing"]);
    let mut tags = values.tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["Roofing", "exterior", "interior"]);
}

#[tokio::test]
async fn test_stats_counts_processed() {
    let (pool, _container) = setup_test_db().await;
    let repo = ImageRepository::new(pool);
    repo.upsert(&sample_image("r1", 1)).await.unwrap();
    repo.upsert(&NewImage {
        was_processed: true,
        ..sample_image("r2", 2)
    })
    .await
    .unwrap();

    let stats = repo.stats().await.unwrap();

    assert_eq!(stats.total_images, 2);
    assert_eq!(stats.processed_images, 1);
    assert!(stats.last_synced_at.is_some());
}
