//! Supabase Storage client.
//!
//! Objects are addressed by their path inside one bucket; uploads overwrite.

use std::time::Duration;

use picsync_core::HttpConfig;
use picsync_core::error::AppError;
use picsync_core::traits::ObjectStore;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};

/// Default bucket name.
pub const DEFAULT_BUCKET: &str = "zoho-pictures";

/// HTTP client for a Supabase Storage bucket, authenticated with the service key.
#[derive(Clone)]
pub struct SupabaseStorage {
    client: Client,
    base_url: Url,
    service_key: String,
    bucket: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

#[derive(Deserialize)]
struct StorageErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SupabaseStorage {
    /// Creates a client for `bucket` of the project at `project_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if `project_url` is not a valid URL and
    /// `AppError::ConfigError` if the service key is empty.
    pub fn new(project_url: &str, service_key: &str, bucket: &str) -> Result<Self, AppError> {
        let mut base_url = Url::parse(project_url)
            .map_err(|e| AppError::InvalidUrl(format!("{}: {}", project_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        if service_key.trim().is_empty() {
            return Err(AppError::ConfigError(
                "Supabase service key is not set".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("picsync/", env!("CARGO_PKG_VERSION")))
            .timeout(HttpConfig::default().timeout * 4)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `storage/v1/object/{prefix}{bucket}/{path}`, with each path segment encoded.
    fn object_url(&self, prefix: &str, path: &str) -> Result<Url, AppError> {
        let mut url = self
            .base_url
            .join("storage/v1/object/")
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            if !prefix.is_empty() {
                segments.push(prefix);
            }
            segments.push(&self.bucket);
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    async fn check(resp: Response, action: &str, path: &str) -> Result<Response, AppError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = resp
            .json::<StorageErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_default();
        Err(AppError::StorageError(format!(
            "{} {} failed with HTTP {}: {}",
            action,
            path,
            status.as_u16(),
            detail
        )))
    }
}

impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = self.object_url("", path)?;
        let size = bytes.len();
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("upload {}: {}", path, e)))?;
        Self::check(resp, "upload", path).await?;

        tracing::debug!(path, size, "Uploaded object");
        Ok(path.to_string())
    }

    async fn signed_url(&self, path: &str, expires_in: Duration) -> Result<String, AppError> {
        let url = self.object_url("sign", path)?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&SignRequest {
                expires_in: expires_in.as_secs().max(1),
            })
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("sign {}: {}", path, e)))?;
        let resp = Self::check(resp, "sign", path).await?;
        let body: SignResponse = resp
            .json()
            .await
            .map_err(|e| AppError::StorageError(format!("sign {}: {}", path, e)))?;

        Ok(join_signed_url(&self.base_url, &body.signed_url))
    }
}

/// Supabase answers with a path relative to `/storage/v1`.
fn join_signed_url(base: &Url, signed: &str) -> String {
    format!(
        "{}storage/v1/{}",
        base.as_str(),
        signed.trim_start_matches('/')
    )
}
