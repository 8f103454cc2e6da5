use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/vcm/config.toml`.
///
/// Worker-pool sizes and engine tuning knobs are persisted here and read
/// once at startup; changing them takes effect on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcmConfig {
    /// Upper bound on workers across all pools.
    pub max_workers: usize,
    /// Workers consuming the `voter-import` queue.
    pub import_workers: usize,
    /// Workers consuming the `geocode` queue. Provider latency dominates,
    /// so this pool must stay parallel.
    pub geocode_workers: usize,
    /// Workers consuming the `scheduled` queue.
    pub scheduled_workers: usize,
    /// Maximum entries kept in a job's error log; overflow drops oldest.
    pub error_log_cap: usize,
    /// Households geocoded per batch between checkpoints.
    pub geocode_batch_size: usize,
    /// Per-provider-call timeout in seconds.
    pub geocode_call_timeout_secs: u64,
    /// Inter-batch delay in milliseconds (provider rate limiting).
    pub geocode_batch_delay_ms: u64,
    /// Import progress is reported every this many records.
    pub import_progress_interval: u64,
    /// Seconds before an unacked broker claim is redelivered.
    pub claim_visibility_timeout_secs: u64,
    /// Directory for uploaded import files.
    pub upload_dir: PathBuf,
    /// Optional API key required by the control plane (`X-Api-Key`).
    pub api_key: Option<String>,
}

impl Default for VcmConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            import_workers: 2,
            geocode_workers: 4,
            scheduled_workers: 1,
            error_log_cap: 1000,
            geocode_batch_size: 100,
            geocode_call_timeout_secs: 5,
            geocode_batch_delay_ms: 100,
            import_progress_interval: 100,
            claim_visibility_timeout_secs: 300,
            upload_dir: PathBuf::from("./tmp/uploads"),
            api_key: None,
        }
    }
}

/// Read the persisted configuration. A first run (no file yet) seeds the
/// config dir with the defaults so operators have something to edit.
pub fn load_or_init() -> Result<VcmConfig> {
    let file = xdg::BaseDirectories::with_prefix("vcm")?.place_config_file("config.toml")?;
    match fs::read_to_string(&file) {
        Ok(raw) => {
            toml::from_str(&raw).with_context(|| format!("parsing {}", file.display()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let cfg = VcmConfig::default();
            fs::write(&file, toml::to_string_pretty(&cfg)?)
                .with_context(|| format!("seeding {}", file.display()))?;
            tracing::info!("seeded default configuration at {}", file.display());
            Ok(cfg)
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", file.display())),
    }
}
