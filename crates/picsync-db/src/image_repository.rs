//! Image repository: the upsert used by the sync pipeline and the catalog reads.

use chrono::{DateTime, Days, NaiveDate, Utc};
use picsync_core::error::AppError;
use picsync_core::models::{FilterValues, Image, ImageFilter, ImagePage, ImageStats, NewImage};
use sqlx::{PgPool, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Column list for SELECT queries. Must remain a const literal to ensure SQL safety
/// since it is spliced into dynamically built queries.
const IMAGE_COLUMNS: &str = "id, zoho_record_id, field_name, storage_path, original_filename, file_size_bytes, content_type, was_processed, tags, category, description, job_captain_timesheet, project_name, department, zoho_metadata, zoho_created_at, zoho_modified_at, synced_at";

/// Repository for image rows.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use picsync_db::ImageRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/picsync")
///     .await?;
///
/// let repo = ImageRepository::new(pool);
/// let stats = repo.stats().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ImageRepository {
    pool: Pool<Postgres>,
}

/// Helper struct for deserializing image rows from the database.
#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    zoho_record_id: String,
    field_name: String,
    storage_path: String,
    original_filename: Option<String>,
    file_size_bytes: Option<i64>,
    content_type: Option<String>,
    was_processed: bool,
    tags: Vec<String>,
    category: Option<String>,
    description: Option<String>,
    job_captain_timesheet: Option<String>,
    project_name: Option<String>,
    department: Option<String>,
    zoho_metadata: serde_json::Value,
    zoho_created_at: Option<DateTime<Utc>>,
    zoho_modified_at: Option<DateTime<Utc>>,
    synced_at: DateTime<Utc>,
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            zoho_record_id: row.zoho_record_id,
            field_name: row.field_name,
            storage_path: row.storage_path,
            original_filename: row.original_filename,
            file_size_bytes: row.file_size_bytes,
            content_type: row.content_type,
            was_processed: row.was_processed,
            tags: row.tags,
            category: row.category,
            description: row.description,
            job_captain_timesheet: row.job_captain_timesheet,
            project_name: row.project_name,
            department: row.department,
            zoho_metadata: row.zoho_metadata,
            zoho_created_at: row.zoho_created_at,
            zoho_modified_at: row.zoho_modified_at,
            synced_at: row.synced_at,
        }
    }
}

impl ImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or overwrites the row for `(zoho_record_id, field_name)`.
    ///
    /// Returns the UUID of the affected row; a re-sync keeps the original id.
    pub async fn upsert(&self, image: &NewImage) -> Result<Uuid, AppError> {
        let rec: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO images (
                zoho_record_id,
                field_name,
                storage_path,
                original_filename,
                file_size_bytes,
                content_type,
                was_processed,
                tags,
                category,
                description,
                job_captain_timesheet,
                project_name,
                department,
                zoho_metadata,
                zoho_created_at,
                zoho_modified_at,
                synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW())
            ON CONFLICT (zoho_record_id, field_name)
            DO UPDATE SET
                storage_path = EXCLUDED.storage_path,
                original_filename = EXCLUDED.original_filename,
                file_size_bytes = EXCLUDED.file_size_bytes,
                content_type = EXCLUDED.content_type,
                was_processed = EXCLUDED.was_processed,
                tags = EXCLUDED.tags,
                category = EXCLUDED.category,
                description = EXCLUDED.description,
                job_captain_timesheet = EXCLUDED.job_captain_timesheet,
                project_name = EXCLUDED.project_name,
                department = EXCLUDED.department,
                zoho_metadata = EXCLUDED.zoho_metadata,
                zoho_created_at = EXCLUDED.zoho_created_at,
                zoho_modified_at = EXCLUDED.zoho_modified_at,
                synced_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&image.zoho_record_id)
        .bind(&image.field_name)
        .bind(&image.storage_path)
        .bind(&image.original_filename)
        .bind(image.file_size_bytes)
        .bind(&image.content_type)
        .bind(image.was_processed)
        .bind(&image.tags)
        .bind(&image.category)
        .bind(&image.description)
        .bind(&image.job_captain_timesheet)
        .bind(&image.project_name)
        .bind(&image.department)
        .bind(&image.zoho_metadata)
        .bind(image.zoho_created_at)
        .bind(image.zoho_modified_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rec.0)
    }

    pub async fn exists(&self, record_id: &str, field_name: &str) -> Result<bool, AppError> {
        let rec: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM images WHERE zoho_record_id = $1 AND field_name = $2)",
        )
        .bind(record_id)
        .bind(field_name)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rec.0)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Image>, AppError> {
        let query = format!("SELECT {} FROM images WHERE id = $1", IMAGE_COLUMNS);
        let row: Option<ImageRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(row.map(Into::into))
    }

    /// Oldest source creation time among synced images.
    pub async fn oldest_created_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let rec: (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT MIN(zoho_created_at) FROM images")
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;

        Ok(rec.0)
    }

    /// One page of the catalog, newest sync first, with the total match count.
    pub async fn list(&self, filter: &ImageFilter) -> Result<ImagePage, AppError> {
        filter.validate()?;

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM images");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        let mut items_query = QueryBuilder::<Postgres>::new("SELECT ");
        items_query.push(IMAGE_COLUMNS).push(" FROM images");
        push_filters(&mut items_query, filter);
        items_query
            .push(" ORDER BY synced_at DESC, id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let rows: Vec<ImageRow> = items_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(ImagePage {
            items: rows.into_iter().map(Into::into).collect(),
            total,
        })
    }

    /// Distinct non-empty values for the catalog's filter dropdowns, sorted.
    pub async fn filter_values(&self) -> Result<FilterValues, AppError> {
        Ok(FilterValues {
            job_captains: self.distinct("job_captain_timesheet").await?,
            projects: self.distinct("project_name").await?,
            departments: self.distinct("department").await?,
            categories: self.distinct("category").await?,
            tags: sqlx::query_scalar(
                "SELECT DISTINCT tag FROM images, UNNEST(tags) AS tag WHERE tag <> '' ORDER BY tag",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?,
        })
    }

    /// `column` is always one of the literal names above, never user input.
    async fn distinct(&self, column: &'static str) -> Result<Vec<String>, AppError> {
        let query = format!(
            "SELECT DISTINCT {col} FROM images WHERE {col} IS NOT NULL AND {col} <> '' ORDER BY {col}",
            col = column
        );
        sqlx::query_scalar(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)
    }

    pub async fn stats(&self) -> Result<ImageStats, AppError> {
        let row: (i64, i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE was_processed),
                MAX(synced_at)
            FROM images
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(ImageStats {
            total_images: row.0,
            processed_images: row.1,
            last_synced_at: row.2,
        })
    }
}

/// Appends the WHERE clause for `filter`.
fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ImageFilter) {
    let mut sep = " WHERE ";
    let mut next = |query: &mut QueryBuilder<'_, Postgres>| {
        query.push(sep);
        sep = " AND ";
    };

    let equals = [
        ("job_captain_timesheet", &filter.job_captain_timesheet),
        ("project_name", &filter.project_name),
        ("department", &filter.department),
        ("category", &filter.category),
    ];
    for (column, value) in equals {
        if let Some(value) = value {
            next(query);
            query.push(column).push(" = ").push_bind(value.clone());
        }
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        next(query);
        query
            .push("original_filename ILIKE ")
            .push_bind(format!("%{}%", escape_like(search.trim())));
    }
    if !filter.tags.is_empty() {
        next(query);
        query.push("tags @> ").push_bind(filter.tags.clone());
    }
    if let Some(from) = filter.date_from {
        next(query);
        query.push("synced_at >= ").push_bind(start_of_day(from));
    }
    if let Some(to) = filter.date_to.and_then(|d| d.checked_add_days(Days::new(1))) {
        next(query);
        query.push("synced_at < ").push_bind(start_of_day(to));
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Escapes LIKE wildcards so the search matches literally.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
