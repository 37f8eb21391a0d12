use tokio_util::sync::CancellationToken;

use picsync_client::{JpegTransform, SupabaseStorage, ZohoClient};
use picsync_core::{BatchSyncEngine, SyncRunService};
use picsync_db::PgMetadataStore;

/// Batch engine wired to the production adapters.
pub type Engine = BatchSyncEngine<ZohoClient, JpegTransform, SupabaseStorage, PgMetadataStore>;

/// Quick/full run service wired to the production adapters.
pub type RunService = SyncRunService<ZohoClient, JpegTransform, SupabaseStorage, PgMetadataStore>;

/// Shared application state for all handlers.
///
/// Every field is a cheap handle; Axum clones the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Batch job engine (start/pause/resume/cancel/status)
    pub engine: Engine,

    /// Backfill and full runs
    pub runs: RunService,

    /// Catalog, run history and batch checkpoints
    pub store: PgMetadataStore,

    /// Bucket client, used to mint signed URLs for catalog listings
    pub objects: SupabaseStorage,

    /// Cancellation token for graceful shutdown
    pub shutdown_token: CancellationToken,
}
