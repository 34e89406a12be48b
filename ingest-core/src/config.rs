//! Worker configuration, loaded from a TOML file with every field defaulted.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use time::Duration;

use crate::checksum::ChecksumAlgo;
use crate::error::{IngestError, Result};
use crate::policy::ValidationPolicy;
use crate::store::StoreLayout;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Holds `Upload/` (staging) and `Error/` (error holding area).
    #[serde(default = "default_ingest_root")]
    pub ingest_root: PathBuf,
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,
}

fn default_ingest_root() -> PathBuf {
    PathBuf::from("data/ingest")
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("data/archive")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ingest_root: default_ingest_root(),
            archive_root: default_archive_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfig {
    #[serde(default = "default_journal")]
    pub journal: PathBuf,
}

fn default_journal() -> PathBuf {
    PathBuf::from("data/tracking.journal")
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            journal: default_journal(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    #[serde(default = "default_cutoff_minutes")]
    pub cutoff_minutes: i64,
    #[serde(default = "default_claim_ttl_minutes")]
    pub claim_ttl_minutes: i64,
    #[serde(default)]
    pub checksum: ChecksumAlgo,
}

fn default_cutoff_minutes() -> i64 {
    1
}

fn default_claim_ttl_minutes() -> i64 {
    60
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            cutoff_minutes: default_cutoff_minutes(),
            claim_ttl_minutes: default_claim_ttl_minutes(),
            checksum: ChecksumAlgo::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Config =
            toml::from_str(text).map_err(|e| IngestError::Config(format!("parse: {e}")))?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(IngestError::Config(format!("read {}: {e}", path.display()))),
        }
    }

    fn check(&self) -> Result<()> {
        if self.validation.cutoff_minutes < 0 {
            return Err(IngestError::Config(
                "validation.cutoff_minutes must not be negative".into(),
            ));
        }
        if self.validation.claim_ttl_minutes <= 0 {
            return Err(IngestError::Config(
                "validation.claim_ttl_minutes must be positive".into(),
            ));
        }
        if self.worker.interval_secs == 0 {
            return Err(IngestError::Config(
                "worker.interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            cutoff: Duration::minutes(self.validation.cutoff_minutes),
            claim_ttl: Duration::minutes(self.validation.claim_ttl_minutes),
            checksum: self.validation.checksum,
            ..Default::default()
        }
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.storage.ingest_root, &self.storage.archive_root)
    }
}
