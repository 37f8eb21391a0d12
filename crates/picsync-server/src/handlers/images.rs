//! Image catalog endpoints.

use std::time::Duration;

use axum::{Json, extract::State};
use futures::future::join_all;

use picsync_core::{ImageFilter, ObjectStore};

use crate::dto::{FilterValuesResponse, ImageDto, ImagePageResponse, ImagesQuery};
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::state::AppState;

/// Lifetime of the download URLs in catalog listings.
const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// List synced images, newest first.
///
/// Each item carries a signed download URL valid for one hour.
#[utoipa::path(
    get,
    path = "/api/v1/images",
    params(ImagesQuery),
    responses(
        (status = 200, description = "One page of images", body = ImagePageResponse),
        (status = 400, description = "Invalid paging"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "images"
)]
pub async fn list_images(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ImagesQuery>,
) -> Result<Json<ImagePageResponse>, ApiError> {
    let filter = ImageFilter::from(query);
    filter.validate()?;

    let page = state.store.images().list(&filter).await?;

    let objects = &state.objects;
    let items = join_all(page.items.into_iter().map(|image| async move {
        let url = match objects.signed_url(&image.storage_path, SIGNED_URL_TTL).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(path = %image.storage_path, error = %e, "Could not sign image URL");
                None
            }
        };
        ImageDto::new(image, url)
    }))
    .await;

    Ok(Json(ImagePageResponse {
        items,
        total: page.total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// Distinct values for the catalog filters.
#[utoipa::path(
    get,
    path = "/api/v1/images/filters",
    responses(
        (status = 200, description = "Filter values", body = FilterValuesResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "images"
)]
pub async fn get_filters(
    State(state): State<AppState>,
) -> Result<Json<FilterValuesResponse>, ApiError> {
    let values = state.store.images().filter_values().await?;
    Ok(Json(values.into()))
}
