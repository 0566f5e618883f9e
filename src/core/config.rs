//! Configuration management for host-sentry.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// File scan settings
    pub scan: ScanConfig,
    /// Port probe settings
    pub ports: PortScanConfig,
    /// Collector endpoint settings
    pub collector: CollectorConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            ports: PortScanConfig::default(),
            collector: CollectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::ConfigSave(format!("Failed to create config directory: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from the default location, or fall back to defaults.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Get the application data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("host-sentry")
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.scan.skip_large_files_mb == 0 {
            return Err(Error::ConfigInvalid {
                field: "scan.skip_large_files_mb".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.scan.progress_interval == 0 {
            return Err(Error::ConfigInvalid {
                field: "scan.progress_interval".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.ports.range_end == 0 {
            return Err(Error::ConfigInvalid {
                field: "ports.range_end".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.ports.concurrency == 0 {
            return Err(Error::ConfigInvalid {
                field: "ports.concurrency".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.ports.connect_timeout_ms == 0 {
            return Err(Error::ConfigInvalid {
                field: "ports.connect_timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// File scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Skip files larger than this size (MiB); they are never hashed
    pub skip_large_files_mb: u64,
    /// Whether to follow symbolic links during traversal
    pub follow_symlinks: bool,
    /// Paths to exclude from scanning
    pub exclude_paths: Vec<String>,
    /// Number of parallel hashing workers
    pub scan_threads: usize,
    /// Emit a progress event every N processed files
    pub progress_interval: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_large_files_mb: 100,
            follow_symlinks: false,
            exclude_paths: vec![
                #[cfg(windows)]
                "C:\\Windows\\WinSxS".to_string(),
                #[cfg(windows)]
                "C:\\$Recycle.Bin".to_string(),
                #[cfg(not(windows))]
                "/proc".to_string(),
                #[cfg(not(windows))]
                "/sys".to_string(),
                #[cfg(not(windows))]
                "/dev".to_string(),
            ],
            scan_threads: num_cpus(),
            progress_interval: 50,
        }
    }
}

/// Port probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortScanConfig {
    /// Probe the contiguous range 1..=range_end
    pub range_end: u16,
    /// Supplementary ports probed in addition to the range
    pub extra_ports: Vec<u16>,
    /// Per-probe connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Maximum concurrent probes; fixed per scan
    pub concurrency: usize,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            range_end: 1024,
            extra_ports: vec![1433, 3306, 3389, 5432, 5900, 8080, 8443],
            connect_timeout_ms: 500,
            concurrency: 100,
        }
    }
}

/// Collector endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Base URL of the collector service
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Get the number of CPUs, with a reasonable default.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
