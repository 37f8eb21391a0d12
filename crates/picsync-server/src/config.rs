use clap::Parser;
use std::path::PathBuf;

/// Server configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "picsync-server")]
#[command(author, version, about = "REST API server for picsync image synchronization")]
pub struct ServerConfig {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Allowed CORS origins, comma separated, or "*"
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Requests per second allowed per client IP
    #[arg(long, env = "RATE_LIMIT_RPS", default_value = "10")]
    pub rate_limit_rps: u32,

    /// Burst size of the per-IP rate limiter
    #[arg(long, env = "RATE_LIMIT_BURST", default_value = "30")]
    pub rate_limit_burst: u32,

    /// Path to the sync.toml configuration file
    #[arg(long, env = "PICSYNC_CONFIG")]
    pub sync_config: Option<PathBuf>,

    #[command(flatten)]
    pub zoho: ZohoArgs,

    #[command(flatten)]
    pub supabase: SupabaseArgs,
}

/// Zoho Creator credentials and report coordinates.
#[derive(clap::Args, Debug, Clone)]
pub struct ZohoArgs {
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
}

impl ZohoArgs {
    pub fn to_config(&self) -> picsync_client::ZohoConfig {
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

/// Supabase project and bucket.
#[derive(clap::Args, Debug, Clone)]
pub struct SupabaseArgs {
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: String,

    #[arg(long, env = "SUPABASE_SERVICE_KEY", hide_env_values = true)]
    pub supabase_service_key: String,

    #[arg(long, env = "SUPABASE_STORAGE_BUCKET", default_value = picsync_client::storage::DEFAULT_BUCKET)]
    pub supabase_bucket: String,
}
