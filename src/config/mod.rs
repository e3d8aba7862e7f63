use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the reconciler.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job and result queues
    pub redis_url: String,

    /// List the classification worker consumes jobs from
    #[serde(default = "default_jobs_queue")]
    pub analysis_jobs_queue: String,

    /// List the classification worker publishes results to
    #[serde(default = "default_responses_queue")]
    pub analysis_responses_queue: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL of the bucket, used in the image URLs sent to the worker
    pub r2_public_url: String,

    /// Role that grants access to every pet
    #[serde(default = "default_admin_role")]
    pub admin_role: String,

    /// Result messages reconciled in parallel
    #[serde(default = "default_reconciler_concurrency")]
    pub reconciler_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Prometheus scrape address of the reconciler process
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_jobs_queue() -> String {
    "pets:analysis:jobs".to_string()
}

fn default_responses_queue() -> String {
    "pets:analysis:responses".to_string()
}

fn default_admin_role() -> String {
    "admin".to_string()
}

fn default_reconciler_concurrency() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn metrics_socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.metrics_addr.parse()
    }
}
