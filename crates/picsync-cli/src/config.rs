use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::LazyLock;
use uuid::Uuid;

use picsync_core::SyncMode;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown");
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "picsync")]
#[command(
    author,
    version = version_info(),
    about = "Sync Zoho Creator photos into Supabase Storage"
)]
#[command(after_help = "Examples:
  picsync batch start --batch-size 50 --from 2024-01-01
  picsync batch list
  picsync sync --mode backfill --max-records 100
  picsync status

Settings are read from ~/.config/picsync/sync.toml (see --config).")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Path to the sync.toml configuration file
    #[arg(long, env = "PICSYNC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "ZOHO_CLIENT_ID", hide_env_values = true)]
    pub zoho_client_id: String,

    #[arg(long, env = "ZOHO_CLIENT_SECRET", hide_env_values = true)]
    pub zoho_client_secret: String,

    #[arg(long, env = "ZOHO_REFRESH_TOKEN", hide_env_values = true)]
    pub zoho_refresh_token: String,

    #[arg(long, env = "ZOHO_ACCOUNT_OWNER_NAME")]
    pub zoho_account_owner: String,

    #[arg(long, env = "ZOHO_APP_LINK_NAME")]
    pub zoho_app_link_name: String,

    #[arg(long, env = "ZOHO_REPORT_LINK_NAME")]
    pub zoho_report_link_name: String,

    #[arg(long, env = "ZOHO_API_DOMAIN", default_value = "creator.zoho.com")]
    pub zoho_api_domain: String,

    #[arg(long, env = "ZOHO_ACCOUNTS_DOMAIN", default_value = "accounts.zoho.com")]
    pub zoho_accounts_domain: String,

    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: String,

    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    pub supabase_service_key: String,

    #[arg(long, env = "SUPABASE_STORAGE_BUCKET", default_value = picsync_client::storage::DEFAULT_BUCKET)]
    pub supabase_bucket: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn zoho_config(&self) -> picsync_client::ZohoConfig {
        picsync_client::ZohoConfig {
            client_id: self.zoho_client_id.clone(),
            client_secret: self.zoho_client_secret.clone(),
            refresh_token: self.zoho_refresh_token.clone(),
            account_owner: self.zoho_account_owner.clone(),
            app_link_name: self.zoho_app_link_name.clone(),
            report_link_name: self.zoho_report_link_name.clone(),
            api_domain: self.zoho_api_domain.clone(),
            accounts_domain: self.zoho_accounts_domain.clone(),
            ..Default::default()
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage resumable batch jobs
    Batch {
        #[command(subcommand)]
        action: BatchCommand,
    },
    /// Run a backfill or full sync in the foreground
    #[command(after_help = "Examples:
  picsync sync                              # Backfill the next 50 records
  picsync sync --mode full --max-records 500")]
    Sync {
        #[arg(short, long, default_value = "backfill")]
        mode: ModeArg,

        /// Stop after this many records
        #[arg(long, value_name = "N")]
        max_records: Option<u32>,
    },
    /// Show catalog statistics and recent runs
    Status,
}

/// Batch job subcommands
#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /// Start a batch job and follow it until it finishes; Ctrl+C pauses it
    #[command(after_help = "Example: picsync batch start --batch-size 50 --delay 5 --from 2024-01-01 --to 2024-03-31")]
    Start {
        /// Records per batch (10-500)
        #[arg(long, default_value = "100")]
        batch_size: u32,

        /// Seconds to wait between batches (0-60)
        #[arg(long, default_value = "2")]
        delay: u64,

        /// Only records modified on or after this date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<NaiveDate>,

        /// Only records modified on or before this date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: Option<NaiveDate>,

        /// Walk the report without downloading, uploading or writing rows
        #[arg(long)]
        dry_run: bool,
    },
    /// Resume a paused job from its checkpoint and follow it
    Resume { id: Uuid },
    /// Cancel a pending or paused job
    Cancel { id: Uuid },
    /// List recent jobs
    List {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

/// Sync run modes
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Records older than the oldest synced image
    Backfill,
    /// Every record of the report
    Full,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Backfill => SyncMode::Backfill,
            ModeArg::Full => SyncMode::Full,
        }
    }
}
