//! Configuration for the faceproof CLI.
//!
//! Configuration is stored in ~/.faceproof/config.yaml. Every field has a
//! default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, bail};
use faceproof_core::{MatchConfig, ReconcileConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".faceproof";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerSection,
    pub content: ContentSection,
    pub extractor: ExtractorSection,

    /// Directory of the local queues. Empty means `data/` next to the
    /// config file.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data_dir: String,

    /// Worker polling period in seconds.
    pub poll_interval_secs: u64,

    pub matching: MatchingSection,
    pub retry: RetrySection,
    pub reconcile: ReconcileSection,

    /// Path to the config file (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Base URL of the contract gateway.
    pub gateway_url: String,
    pub channel: String,
    pub contract: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSection {
    /// IPFS RPC API address.
    pub ipfs_api: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSection {
    /// Face embedding service endpoint.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSection {
    pub threshold: f32,
    pub dimension: usize,
    /// L2-normalize vectors before hashing and matching.
    pub normalize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    pub max_parse_failures: u32,
    /// Failed cycles before a record is dead-lettered; null retries forever.
    pub dead_letter_after: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: LedgerSection::default(),
            content: ContentSection::default(),
            extractor: ExtractorSection::default(),
            data_dir: String::new(),
            poll_interval_secs: 5,
            matching: MatchingSection::default(),
            retry: RetrySection::default(),
            reconcile: ReconcileSection::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8080".into(),
            channel: "mychannel".into(),
            contract: "cidrecord".into(),
        }
    }
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            ipfs_api: "http://127.0.0.1:5001".into(),
        }
    }
}

impl Default for ExtractorSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8500/v1/extract".into(),
        }
    }
}

impl Default for MatchingSection {
    fn default() -> Self {
        let m = MatchConfig::default();
        Self {
            threshold: m.threshold,
            dimension: m.dimension,
            normalize: false,
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        let r = RetryPolicy::default();
        Self {
            max_attempts: r.max_attempts,
            base_delay_ms: r.base_delay.as_millis() as u64,
            max_delay_ms: r.max_delay.as_millis() as u64,
            call_timeout_secs: r.call_timeout.as_secs(),
        }
    }
}

impl Default for ReconcileSection {
    fn default() -> Self {
        let r = ReconcileConfig::default();
        Self {
            max_parse_failures: r.max_parse_failures,
            dead_letter_after: r.dead_letter_after,
        }
    }
}

impl Config {
    /// Gets the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(DEFAULT_CONFIG_FILE))
    }

    /// Load the config from `custom_path` or the default location. A
    /// missing file is created with defaults.
    pub fn load(custom_path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = match custom_path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()
                .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
        };

        let mut cfg: Config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("read {}", config_path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("parse {}", config_path.display()))?
        } else {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let cfg = Config::default();
            std::fs::write(&config_path, serde_yaml::to_string(&cfg)?)
                .with_context(|| format!("write {}", config_path.display()))?;
            cfg
        };
        cfg.config_path = config_path;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(-1.0..=1.0).contains(&self.matching.threshold) {
            bail!(
                "matching.threshold must be within [-1, 1], got {}",
                self.matching.threshold
            );
        }
        if self.matching.dimension == 0 {
            bail!("matching.dimension must be positive");
        }
        if self.ledger.channel.is_empty() || self.ledger.contract.is_empty() {
            bail!("ledger.channel and ledger.contract must be set");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be positive");
        }
        Ok(())
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn data_dir(&self) -> PathBuf {
        if !self.data_dir.is_empty() {
            return PathBuf::from(&self.data_dir);
        }
        self.config_path
            .parent()
            .map(|p| p.join("data"))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn pending_path(&self) -> PathBuf {
        self.data_dir().join("pending.redb")
    }

    pub fn auth_path(&self) -> PathBuf {
        self.data_dir().join("auth.redb")
    }

    pub fn intents_path(&self) -> PathBuf {
        self.data_dir().join("intents.redb")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            call_timeout: Duration::from_secs(self.retry.call_timeout_secs),
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            threshold: self.matching.threshold,
            dimension: self.matching.dimension,
        }
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            max_parse_failures: self.reconcile.max_parse_failures,
            dead_letter_after: self.reconcile.dead_letter_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");
        let cfg = Config::load(path.to_str()).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.ledger.channel, "mychannel");
        assert_eq!(cfg.ledger.contract, "cidrecord");
        assert_eq!(cfg.matching.threshold, 0.95);
        assert_eq!(cfg.matching.dimension, 128);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
        assert_eq!(cfg.data_dir(), dir.path().join("nested/data"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "matching:\n  threshold: 0.9\nreconcile:\n  dead_letter_after: null\ndata_dir: /var/lib/faceproof\n",
        )
        .unwrap();
        let cfg = Config::load(path.to_str()).unwrap();
        assert_eq!(cfg.matching.threshold, 0.9);
        assert_eq!(cfg.matching.dimension, 128);
        assert_eq!(cfg.reconcile.dead_letter_after, None);
        assert_eq!(cfg.reconcile.max_parse_failures, 3);
        assert_eq!(cfg.pending_path(), PathBuf::from("/var/lib/faceproof/pending.redb"));
        assert_eq!(cfg.retry_policy().base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());
        cfg.matching.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.matching.dimension = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.ledger.channel.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.poll_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
