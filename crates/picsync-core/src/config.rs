//! Configuration types for picsync components.
//!
//! Domain settings (field mapping, image limits, retry policy) are read from a TOML file,
//! by default `~/.config/picsync/sync.toml`. Connection settings and credentials come from
//! command line flags and environment variables in the binaries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::{DEFAULT_ERROR_LOG_CAPACITY, RetryConfig};
use crate::error::AppError;
use crate::models::TransformOptions;

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// HTTP client configuration for external API calls.
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Sync Configuration (sync.toml)
// =============================================================================

/// Root of the sync configuration file.
///
/// # Example
///
/// ```toml
/// [fields]
/// tag_fields = ["Tags", "Project"]
/// category_field = "Category"
///
/// [image]
/// max_size_mb = 5.0
/// max_dimension = 4000
/// quality = 85
///
/// [retry]
/// max_retries = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub fields: FieldMapping,
    pub image: ImageConfig,
    pub retry: RetrySettings,
    pub engine: EngineSettings,
}

/// Which source fields feed the image row's classification columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Fields whose values (scalar or list) become tags.
    pub tag_fields: Vec<String>,
    pub category_field: Option<String>,
    pub description_field: Option<String>,
    pub job_captain_field: Option<String>,
    pub project_field: Option<String>,
    pub department_field: Option<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            tag_fields: vec![
                "Tags".to_string(),
                "Category".to_string(),
                "Project".to_string(),
            ],
            category_field: Some("Category".to_string()),
            description_field: Some("Description".to_string()),
            job_captain_field: Some("Job_Captain_Timesheet".to_string()),
            project_field: Some("Project_Name".to_string()),
            department_field: Some("Department".to_string()),
        }
    }
}

/// Limits handed to the image transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Images above this size are resized and recompressed.
    pub max_size_mb: f64,
    pub max_dimension: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 5.0,
            max_dimension: 4000,
            quality: 85,
        }
    }
}

impl ImageConfig {
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            max_size_bytes: (self.max_size_mb * 1024.0 * 1024.0) as u64,
            max_dimension: self.max_dimension,
            quality: self.quality.clamp(1, 100),
        }
    }
}

/// Page-fetch retry policy of the batch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

/// Engine-level knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum persisted error log entries per job or run.
    pub error_log_capacity: usize,
    /// Number of recent jobs listed by the status overview.
    pub recent_jobs: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
            recent_jobs: 10,
        }
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "sync.toml";

/// Returns the default configuration directory path: `~/.config/picsync/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("picsync"))
}

/// Returns the default configuration file path: `~/.config/picsync/sync.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# picsync configuration
#
# Source field mapping. Field names are the link names of the Zoho Creator report.
[fields]
tag_fields = ["Tags", "Category", "Project"]
category_field = "Category"
description_field = "Description"
job_captain_field = "Job_Captain_Timesheet"
project_field = "Project_Name"
department_field = "Department"

# Images larger than max_size_mb are resized to fit max_dimension and recompressed.
[image]
max_size_mb = 5.0
max_dimension = 4000
quality = 85

# Retry policy for fetching a page of records.
[retry]
max_retries = 3
base_delay_ms = 2000
max_delay_ms = 30000

[engine]
error_log_capacity = 500
recent_jobs = 10
"#;

/// Load the sync configuration from a TOML file.
///
/// # Arguments
/// * `path` - Optional custom path. If `None`, uses the default XDG path.
///
/// # Behavior
/// A missing default file is created from a commented template and defaults are
/// returned. A missing custom path is an error. Missing keys fall back to defaults.
pub fn load_sync_config(path: Option<PathBuf>) -> Result<SyncConfig, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(SyncConfig::default()),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            if let Err(e) = create_default_config(&config_path) {
                tracing::warn!("Could not create default config template: {}", e);
            }
            return Ok(SyncConfig::default());
        }
        return Err(AppError::ConfigError(format!(
            "Config file not found: {}",
            config_path.display()
        )));
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    parse_sync_config(&content).map_err(|e| match e {
        AppError::ConfigError(msg) => {
            AppError::ConfigError(format!("{} ({})", msg, config_path.display()))
        }
        other => other,
    })
}

/// Parse and validate configuration text.
pub fn parse_sync_config(content: &str) -> Result<SyncConfig, AppError> {
    let config: SyncConfig = toml::from_str(content)
        .map_err(|e| AppError::ConfigError(format!("Invalid TOML: {}", e)))?;

    if config.image.max_size_mb <= 0.0 {
        return Err(AppError::ConfigError(
            "image.max_size_mb must be positive".to_string(),
        ));
    }
    if config.image.max_dimension == 0 {
        return Err(AppError::ConfigError(
            "image.max_dimension must be positive".to_string(),
        ));
    }
    if config.engine.error_log_capacity == 0 {
        return Err(AppError::ConfigError(
            "engine.error_log_capacity must be positive".to_string(),
        ));
    }

    Ok(config)
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
