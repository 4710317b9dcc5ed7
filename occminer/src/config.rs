use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ExtractError, ExtractResult};
use crate::stream::BatchUnit;

/// Batch size used when a non-positive size is requested
pub const DEFAULT_BATCH_SIZE: usize = 1 << 16;

/// Configuration for an extractor.
///
/// # Configuration Locations
///
/// The configuration is merged from these locations, later ones overriding
/// earlier ones:
/// 1. Global `$HOME/.config/occminer/config.yaml`
/// 2. Local `.occminer.yaml` in the current directory
/// 3. A file passed explicitly to [`ExtractorConfig::load_from`]
///
/// # Configuration Format
///
/// ```yaml
/// # Units per batch (non-positive: 65536)
/// batch_size: 4096
///
/// # Worker threads for miners (non-positive: one per CPU)
/// thread_count: 4
///
/// # E_NO_ENCLOSED_OCCURRENCES = 1, E_SORT_RESULTS = 2
/// flags: 2
///
/// # Count the batch size in bytes or codepoints
/// batch_unit: codepoints
///
/// # Directory holding the miner modules
/// miners_dir: "/opt/occminer/miners"
///
/// # Give up on a batch when a miner takes longer than this
/// miner_timeout: "500ms"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
///
/// # Miners registered in order; relative paths resolve against miners_dir
/// miners:
///   - path: "glob_entities.so"
///     symbol: "match_glob"
///     params: "invoice-*"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Units read per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Number of worker threads, non-positive for one per CPU
    #[serde(default)]
    pub thread_count: i64,

    /// Initial flag bitmask
    #[serde(default)]
    pub flags: u32,

    #[serde(default)]
    pub batch_unit: BatchUnit,

    /// Directory the standard miner modules are loaded from
    #[serde(default = "default_miners_dir")]
    pub miners_dir: PathBuf,

    /// Per-miner time limit for one batch, e.g. "250ms" or "2s"
    #[serde(default)]
    pub miner_timeout: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Miners to register when the extractor is built
    #[serde(default)]
    pub miners: Vec<MinerSpec>,
}

/// A miner to register from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerSpec {
    pub path: PathBuf,
    pub symbol: String,
    #[serde(default)]
    pub params: Option<String>,
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE as i64
}

pub(crate) fn default_miners_dir() -> PathBuf {
    PathBuf::from("miners")
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Effective batch size for a requested one
pub fn resolve_batch_size(requested: i64) -> usize {
    if requested <= 0 {
        DEFAULT_BATCH_SIZE
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    }
}

/// Effective worker count for a requested one
pub fn resolve_thread_count(requested: i64) -> usize {
    if requested <= 0 {
        num_cpus::get().max(1)
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            thread_count: 0,
            flags: 0,
            batch_unit: BatchUnit::default(),
            miners_dir: default_miners_dir(),
            miner_timeout: None,
            log_level: default_log_level(),
            miners: Vec::new(),
        }
    }
}

impl ExtractorConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration, adding `config_path` on top of the default locations.
    /// An explicitly given file must exist.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("occminer/config.yaml")),
            Some(PathBuf::from(".occminer.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Parsed per-miner timeout, `None` when miners may run indefinitely
    pub fn miner_timeout(&self) -> ExtractResult<Option<Duration>> {
        self.miner_timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw).map_err(|e| {
                    ExtractError::config(format!("invalid miner_timeout {:?}: {}", raw, e))
                })
            })
            .transpose()
    }

    /// Resolves a configured miner path against the miners directory
    pub fn miner_path(&self, spec: &MinerSpec) -> PathBuf {
        if spec.path.is_absolute() {
            spec.path.clone()
        } else {
            self.miners_dir.join(&spec.path)
        }
    }

    /// Installs a global tracing subscriber filtered at the configured level.
    /// `RUST_LOG` takes precedence when set. Does nothing if a subscriber is
    /// already installed.
    pub fn init_tracing(&self) {
        use tracing_subscriber::{EnvFilter, FmtSubscriber};

        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new(default_log_level()));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(env_filter)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            batch_size: 4096
            thread_count: 4
            flags: 2
            batch_unit: codepoints
            miners_dir: "/opt/miners"
            miner_timeout: "250ms"
            log_level: "debug"
            miners:
              - path: "glob_entities.so"
                symbol: "match_glob"
                params: "world"
              - path: "/elsewhere/regex_entities.so"
                symbol: "match_email"
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = ExtractorConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.batch_size, 4096);
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.flags, 2);
        assert_eq!(config.batch_unit, BatchUnit::Codepoints);
        assert_eq!(config.miners_dir, PathBuf::from("/opt/miners"));
        assert_eq!(
            config.miner_timeout().unwrap(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.miners.len(), 2);
        assert_eq!(config.miners[0].params.as_deref(), Some("world"));
        assert_eq!(config.miners[1].params, None);
        assert_eq!(
            config.miner_path(&config.miners[0]),
            PathBuf::from("/opt/miners/glob_entities.so")
        );
        assert_eq!(
            config.miner_path(&config.miners[1]),
            PathBuf::from("/elsewhere/regex_entities.so")
        );
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"log_level: \"warn\"\n").unwrap();

        let config = ExtractorConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.batch_size, 65536);
        assert_eq!(config.thread_count, 0);
        assert_eq!(config.flags, 0);
        assert_eq!(config.batch_unit, BatchUnit::Bytes);
        assert_eq!(config.miners_dir, PathBuf::from("miners"));
        assert_eq!(config.miner_timeout().unwrap(), None);
        assert!(config.miners.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"batch_size: \"lots\"\nminers: 5\n").unwrap();

        assert!(ExtractorConfig::load_from(Some(&config_path)).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ExtractorConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_timeout() {
        let config = ExtractorConfig {
            miner_timeout: Some("soon".to_string()),
            ..ExtractorConfig::default()
        };
        assert!(matches!(config.miner_timeout(), Err(ExtractError::Config(_))));
    }

    #[test]
    fn test_resolve_sizes() {
        for requested in [0, -1, -65536, i64::MIN] {
            assert_eq!(resolve_batch_size(requested), 65536);
            assert_eq!(resolve_thread_count(requested), num_cpus::get());
        }
        assert_eq!(resolve_batch_size(16), 16);
        assert_eq!(resolve_thread_count(3), 3);
    }
}
