use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents all errors that can occur while syncing images from the
/// record source into the object store and the metadata store. It uses `thiserror`
/// for ergonomic conversions from the underlying library errors.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
/// - `serde_json::Error` → `AppError::SerializationError`
///
/// # Error classes
///
/// The batch engine treats errors in two classes:
///
/// - **record level**: anything raised while transforming, uploading or upserting a
///   single image. These are caught, counted and logged; they never end a job.
/// - **job level**: failures to fetch a page from the record source or to persist a
///   checkpoint. These move the job to `failed`.
///
/// # Examples
///
/// ```no_run
/// use picsync_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// A new job was requested while another one is still active.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A control operation was requested against a job in an incompatible state.
    ///
    /// For example pausing a job that is already paused, or resuming a completed one.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The requested job or run does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A request or configuration value failed validation.
    ///
    /// Raised before any state is created, so a rejected request leaves no trace.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Processing a single image of a record failed.
    ///
    /// Always isolated by the pipeline: counted, appended to the error log, and
    /// never propagated to the batch.
    #[error("Failed to process {field} of record {record_id}: {message}")]
    RecordProcessing {
        record_id: String,
        field: String,
        message: String,
    },

    /// The record source could not be reached after retries.
    ///
    /// Fatal for a batch job when raised while fetching a page.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx, including connection failures,
    /// query errors, and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP client request failed.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// OAuth token refresh was rejected by the identity provider.
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// Image bytes could not be decoded or encoded.
    #[error("Image error: {0}")]
    ImageError(String),

    /// The object store rejected an upload or a signed URL request.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed or the scheme is not http(s).
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration file error.
    ///
    /// Reading or parsing the sync configuration failed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL."
                        .to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::AuthError(msg) => {
                format!(
                    "Zoho authentication failed: {}\n   Check ZOHO_CLIENT_ID, ZOHO_CLIENT_SECRET and ZOHO_REFRESH_TOKEN.",
                    msg
                )
            }
            AppError::Transport(msg) => {
                format!(
                    "Record source unreachable: {}\n   The job was stopped; resume it once the source is back.",
                    msg
                )
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The service may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::StorageError(msg) => {
                format!(
                    "Object storage error: {}\n   Check SUPABASE_URL, SUPABASE_SERVICE_KEY and the bucket name.",
                    msg
                )
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your configuration file.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use picsync_core::error::AppError;
    ///
    /// // Network errors are retryable
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// // Rejected credentials are NOT retryable
    /// let err = AppError::AuthError("invalid_code".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::Transport(_) => true,
            AppError::ClientError(msg) => {
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connect")
                    || msg.contains("Server error")
            }
            _ => false,
        }
    }
}
